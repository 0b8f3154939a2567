// Path Building — Compromise-aware guard, middle and exit selection
//
// Scores the guard role, draws a guard from its secure set, scores every
// exit against the chosen guard, draws an exit, then picks a middle relay
// outside both relays' families.

use super::alliance::AllianceGroup;
use super::security::{exit_security, guard_security, TrustMap};
use super::selection::{secure_relays, weighted_choice, AlphaConfig, SelectionError};
use crate::directory::geo::{CachedLookup, CountryLookup, GeoError};
use crate::directory::relay::{CountryCode, Fingerprint, Relay};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PathError {
    #[error("No secure guards available")]
    NoSecureGuards,
    #[error("No secure exits available")]
    NoSecureExits,
    #[error("No valid middle relays")]
    NoValidMiddle,
    #[error("Country unresolved for {0}")]
    CountryUnresolved(String),
    #[error("Invalid path configuration: {0}")]
    InvalidConfig(String),
}

impl From<SelectionError> for PathError {
    fn from(err: SelectionError) -> Self {
        match err {
            SelectionError::InvalidConfig(reason) => PathError::InvalidConfig(reason),
        }
    }
}

impl From<GeoError> for PathError {
    fn from(err: GeoError) -> Self {
        match err {
            GeoError::NotFound(ip) | GeoError::InvalidAddress(ip) => {
                PathError::CountryUnresolved(ip)
            }
            other => PathError::CountryUnresolved(other.to_string()),
        }
    }
}

/// Selected path: three distinct, non-affiliated relays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayPath {
    pub guard: Fingerprint,
    pub middle: Fingerprint,
    pub exit: Fingerprint,
}

impl RelayPath {
    /// Hops in circuit order
    pub fn hops(&self) -> [&Fingerprint; 3] {
        [&self.guard, &self.middle, &self.exit]
    }
}

/// How relay bandwidth turns into selection weight
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandwidthWeighting {
    /// Advertised bandwidth as is. Any non-zero safe relay already reaches
    /// `bandwidth_frac`, so the acceptable tier only opens behind
    /// zero-bandwidth relays.
    #[default]
    Raw,
    /// Share of the role pool's total bandwidth, making `bandwidth_frac` a
    /// fraction of pool mass
    PoolShare,
}

impl BandwidthWeighting {
    fn weights(&self, pool: &[&Relay]) -> HashMap<Fingerprint, f64> {
        match self {
            BandwidthWeighting::Raw => raw_bandwidth(pool),
            BandwidthWeighting::PoolShare => bandwidth_shares(pool),
        }
    }
}

/// Alpha parameters for both scored roles
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathConfig {
    pub guard: AlphaConfig,
    pub exit: AlphaConfig,
    #[serde(default)]
    pub weighting: BandwidthWeighting,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            guard: AlphaConfig::guard_default(),
            exit: AlphaConfig::exit_default(),
            weighting: BandwidthWeighting::Raw,
        }
    }
}

impl PathConfig {
    /// Validate path configuration
    pub fn validate(&self) -> Result<(), PathError> {
        self.guard
            .validate()
            .map_err(|e| PathError::InvalidConfig(format!("guard: {}", e)))?;
        self.exit
            .validate()
            .map_err(|e| PathError::InvalidConfig(format!("exit: {}", e)))?;
        Ok(())
    }
}

/// Path builder over one relay snapshot and one client's trust model
pub struct PathBuilder<L> {
    relays: Vec<Relay>,
    trust: TrustMap,
    alliances: Vec<AllianceGroup>,
    config: PathConfig,
    lookup: L,
}

impl<L: CountryLookup> PathBuilder<L> {
    /// Create a new path builder; fails if either alpha config is invalid
    pub fn new(
        relays: Vec<Relay>,
        trust: TrustMap,
        alliances: Vec<AllianceGroup>,
        config: PathConfig,
        lookup: L,
    ) -> Result<Self, PathError> {
        config.validate()?;
        Ok(Self {
            relays,
            trust,
            alliances,
            config,
            lookup,
        })
    }

    pub fn relays(&self) -> &[Relay] {
        &self.relays
    }

    pub fn trust(&self) -> &TrustMap {
        &self.trust
    }

    pub fn alliances(&self) -> &[AllianceGroup] {
        &self.alliances
    }

    pub fn config(&self) -> &PathConfig {
        &self.config
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    /// Select a path for a client and destination with known countries
    pub fn select_path<R: Rng + ?Sized>(
        &self,
        client: &CountryCode,
        destination: &CountryCode,
        rng: &mut R,
    ) -> Result<RelayPath, PathError> {
        let lookup = CachedLookup::new(&self.lookup);
        self.select_with(&lookup, client, destination, rng)
    }

    /// Select a path, resolving client and destination addresses first
    pub fn select_path_for<R: Rng + ?Sized>(
        &self,
        client_ip: &str,
        destination_ip: &str,
        rng: &mut R,
    ) -> Result<RelayPath, PathError> {
        let lookup = CachedLookup::new(&self.lookup);
        let client = lookup.country_of(client_ip)?;
        let destination = lookup.country_of(destination_ip)?;
        self.select_with(&lookup, &client, &destination, rng)
    }

    /// Aggregate score shared by every guard candidate
    pub fn guard_score(&self, client: &CountryCode) -> Result<f64, PathError> {
        let lookup = CachedLookup::new(&self.lookup);
        let guards: Vec<&Relay> = self.relays.iter().filter(|r| r.is_guard()).collect();
        self.score_guards(&lookup, client, &guards)
    }

    /// Score of every exit candidate given a guard located in `guard_country`
    pub fn exit_scores(
        &self,
        client: &CountryCode,
        destination: &CountryCode,
        guard_country: &CountryCode,
    ) -> Result<HashMap<Fingerprint, f64>, PathError> {
        let lookup = CachedLookup::new(&self.lookup);
        let exits: Vec<&Relay> = self.relays.iter().filter(|r| r.is_exit()).collect();
        self.score_exits(&lookup, client, destination, guard_country, &exits)
    }

    fn score_guards(
        &self,
        lookup: &impl CountryLookup,
        client: &CountryCode,
        guards: &[&Relay],
    ) -> Result<f64, PathError> {
        let guard_countries = guards
            .iter()
            .map(|g| lookup.country_of(&g.ip))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(guard_security(
            client,
            &guard_countries,
            &self.trust,
            &self.alliances,
        ))
    }

    fn score_exits(
        &self,
        lookup: &impl CountryLookup,
        client: &CountryCode,
        destination: &CountryCode,
        guard_country: &CountryCode,
        exits: &[&Relay],
    ) -> Result<HashMap<Fingerprint, f64>, PathError> {
        let mut scores = HashMap::with_capacity(exits.len());
        for exit in exits {
            let exit_country = lookup.country_of(&exit.ip)?;
            let score = exit_security(
                client,
                destination,
                guard_country,
                &exit_country,
                &self.trust,
                &self.alliances,
            );
            scores.insert(exit.fingerprint.clone(), score);
        }
        Ok(scores)
    }

    fn select_with<R: Rng + ?Sized>(
        &self,
        lookup: &impl CountryLookup,
        client: &CountryCode,
        destination: &CountryCode,
        rng: &mut R,
    ) -> Result<RelayPath, PathError> {
        let by_fingerprint: HashMap<&Fingerprint, &Relay> =
            self.relays.iter().map(|r| (&r.fingerprint, r)).collect();
        let guards: Vec<&Relay> = self.relays.iter().filter(|r| r.is_guard()).collect();
        let exits: Vec<&Relay> = self.relays.iter().filter(|r| r.is_exit()).collect();

        // Guard role is scored once for the whole pool
        let score = self.score_guards(lookup, client, &guards)?;
        let guard_ids: Vec<Fingerprint> = guards.iter().map(|g| g.fingerprint.clone()).collect();
        let guard_scores: HashMap<Fingerprint, f64> =
            guard_ids.iter().map(|fp| (fp.clone(), score)).collect();
        let guard_weights = self.config.weighting.weights(&guards);

        let secure_guards =
            secure_relays(&self.config.guard, &guard_scores, &guard_ids, &guard_weights);
        debug!(
            guards = guards.len(),
            score,
            secure = secure_guards.len(),
            "scored guard pool"
        );

        let guard = weighted_choice(&mut *rng, &secure_guards, &guard_weights)
            .and_then(|fp| by_fingerprint.get(&fp).copied())
            .ok_or(PathError::NoSecureGuards)?;
        let guard_country = lookup.country_of(&guard.ip)?;

        let exit_ids: Vec<Fingerprint> = exits.iter().map(|e| e.fingerprint.clone()).collect();
        let exit_scores = self.score_exits(lookup, client, destination, &guard_country, &exits)?;
        let exit_weights = self.config.weighting.weights(&exits);

        let secure_exits = secure_relays(&self.config.exit, &exit_scores, &exit_ids, &exit_weights);
        debug!(
            exits = exits.len(),
            secure = secure_exits.len(),
            guard = %guard.fingerprint,
            "scored exit pool"
        );

        let exit = weighted_choice(&mut *rng, &secure_exits, &exit_weights)
            .and_then(|fp| by_fingerprint.get(&fp).copied())
            .ok_or(PathError::NoSecureExits)?;

        let middles: Vec<&Relay> = self
            .relays
            .iter()
            .filter(|r| {
                r.fingerprint != guard.fingerprint
                    && r.fingerprint != exit.fingerprint
                    && !guard.declares_family(&r.fingerprint)
                    && !exit.declares_family(&r.fingerprint)
            })
            .collect();
        debug!(middles = middles.len(), "middle pool after family exclusion");

        let middle = middles.choose(rng).ok_or(PathError::NoValidMiddle)?;

        Ok(RelayPath {
            guard: guard.fingerprint.clone(),
            middle: middle.fingerprint.clone(),
            exit: exit.fingerprint.clone(),
        })
    }
}

fn raw_bandwidth(pool: &[&Relay]) -> HashMap<Fingerprint, f64> {
    pool.iter()
        .map(|r| (r.fingerprint.clone(), r.bandwidth as f64))
        .collect()
}

/// Each relay's share of its pool's total bandwidth
fn bandwidth_shares(pool: &[&Relay]) -> HashMap<Fingerprint, f64> {
    let total: f64 = pool.iter().map(|r| r.bandwidth as f64).sum();
    pool.iter()
        .map(|r| {
            let share = if total > 0.0 {
                r.bandwidth as f64 / total
            } else {
                0.0
            };
            (r.fingerprint.clone(), share)
        })
        .collect()
}
