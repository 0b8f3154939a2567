// Client Profile — Alliance and trust declarations of one client
//
// The client names groups of countries it treats as a single compromise
// domain, with a trust level per group. A country's trust is the highest
// level of any group listing it.

use crate::path::{AllianceGroup, TrustError, TrustMap};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientInputError {
    #[error("Malformed client input: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Trust(#[from] TrustError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct AllianceEntry {
    countries: Vec<String>,
    trust: f64,
}

#[derive(Debug, Deserialize)]
struct ClientInputFile {
    #[serde(rename = "Alliances")]
    alliances: Vec<AllianceEntry>,
    #[serde(rename = "Client")]
    client: String,
    #[serde(rename = "Destination")]
    destination: String,
}

/// Everything path selection needs to know about the client
#[derive(Debug, Clone, PartialEq)]
pub struct ClientProfile {
    pub alliances: Vec<AllianceGroup>,
    pub trust: TrustMap,
    pub client_ip: String,
    pub destination_ip: String,
}

impl ClientProfile {
    pub fn from_json(json: &str) -> Result<Self, ClientInputError> {
        let input: ClientInputFile = serde_json::from_str(json)?;

        let mut alliances = Vec::with_capacity(input.alliances.len());
        let mut trust = TrustMap::new();

        for entry in input.alliances {
            let group = AllianceGroup::new(entry.countries);
            for country in group.countries() {
                trust.raise(country.clone(), entry.trust)?;
            }
            alliances.push(group);
        }

        Ok(Self {
            alliances,
            trust,
            client_ip: input.client,
            destination_ip: input.destination,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ClientInputError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}
