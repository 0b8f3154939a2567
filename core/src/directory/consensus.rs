// Consensus Parsing — Relay records from a directory snapshot
//
// Reads the JSON relay list published by the directory, derives each
// relay's bandwidth weight and role, and narrows the list to relays located
// in countries the client has expressed trust in.

use super::geo::CountryLookup;
use super::relay::{Fingerprint, Relay, RelayRole};
use crate::path::TrustMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("Malformed consensus document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Relay {0} advertises no bandwidth")]
    MissingBandwidth(String),
}

#[derive(Debug, Deserialize)]
struct BandwidthEntry {
    #[serde(default)]
    measured: Option<u64>,
    #[serde(default)]
    average: Option<u64>,
}

/// One relay as published in the consensus document
#[derive(Debug, Deserialize)]
struct ConsensusEntry {
    fingerprint: String,
    ip: String,
    bandwidth: BandwidthEntry,
    #[serde(default)]
    family: Vec<String>,
    #[serde(default)]
    exit: Option<String>,
}

impl TryFrom<ConsensusEntry> for Relay {
    type Error = ConsensusError;

    fn try_from(entry: ConsensusEntry) -> Result<Self, Self::Error> {
        // Measured bandwidth wins unless it is absent or zero
        let bandwidth = entry
            .bandwidth
            .measured
            .filter(|bw| *bw > 0)
            .or(entry.bandwidth.average)
            .ok_or_else(|| ConsensusError::MissingBandwidth(entry.fingerprint.clone()))?;

        let role = if is_exit_policy(entry.exit.as_deref().unwrap_or_default()) {
            RelayRole::Exit
        } else {
            RelayRole::Guard
        };

        Ok(Relay {
            fingerprint: Fingerprint::new(&entry.fingerprint),
            ip: entry.ip,
            bandwidth,
            family: entry.family.iter().map(Fingerprint::new).collect(),
            role,
        })
    }
}

/// Parse a consensus document (a JSON array of relay entries)
pub fn parse_consensus(json: &str) -> Result<Vec<Relay>, ConsensusError> {
    let entries: Vec<ConsensusEntry> = serde_json::from_str(json)?;
    entries.into_iter().map(Relay::try_from).collect()
}

/// Whether a summarised exit policy lets any traffic out.
///
/// Rules are scanned in order; the first `accept` rule makes the relay an
/// exit, reaching `reject *:*` first does not.
pub fn is_exit_policy(policy: &str) -> bool {
    let policy = policy.to_lowercase();

    for rule in policy.split(',').map(str::trim) {
        if rule.starts_with("accept") {
            return true;
        }
        if rule == "reject *:*" {
            return false;
        }
    }

    false
}

/// Keep relays located in a country present in the trust map.
///
/// Relays whose address cannot be resolved are dropped.
pub fn filter_trusted(
    relays: Vec<Relay>,
    trust: &TrustMap,
    lookup: &impl CountryLookup,
) -> Vec<Relay> {
    let before = relays.len();

    let kept: Vec<Relay> = relays
        .into_iter()
        .filter(|relay| match lookup.country_of(&relay.ip) {
            Ok(country) => trust.contains(&country),
            Err(err) => {
                debug!(relay = %relay.fingerprint, "dropping relay: {}", err);
                false
            }
        })
        .collect();

    debug!(before, after = kept.len(), "filtered relays to trusted countries");
    kept
}
