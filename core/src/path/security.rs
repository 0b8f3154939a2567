// Security Scoring — Trust-weighted safety of guard and exit choices
//
// A score is the fraction of the client's total trust weight held by
// countries that no single alliance can use to compromise the relevant
// endpoints at once. Scores lie in [0, 1].

use super::alliance::{expand_alliance, AllianceGroup};
use crate::directory::relay::CountryCode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrustError {
    #[error("Invalid trust weight {weight} for {country}")]
    InvalidWeight { country: CountryCode, weight: f64 },
}

/// Per-country trust weights.
///
/// Weights are finite and non-negative; each represents the highest trust
/// the client places in any alliance that includes the country.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<CountryCode, f64>", into = "BTreeMap<CountryCode, f64>")]
pub struct TrustMap {
    weights: BTreeMap<CountryCode, f64>,
}

impl TrustMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(country, weight)` pairs; later pairs replace earlier ones
    pub fn from_weights<I, C>(weights: I) -> Result<Self, TrustError>
    where
        I: IntoIterator<Item = (C, f64)>,
        C: Into<CountryCode>,
    {
        let mut trust = Self::new();
        for (country, weight) in weights {
            trust.insert(country.into(), weight)?;
        }
        Ok(trust)
    }

    fn check(country: &CountryCode, weight: f64) -> Result<(), TrustError> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(TrustError::InvalidWeight {
                country: country.clone(),
                weight,
            });
        }
        Ok(())
    }

    /// Set the weight for a country
    pub fn insert(&mut self, country: CountryCode, weight: f64) -> Result<(), TrustError> {
        Self::check(&country, weight)?;
        self.weights.insert(country, weight);
        Ok(())
    }

    /// Keep the larger of the current and the offered weight
    pub fn raise(&mut self, country: CountryCode, weight: f64) -> Result<(), TrustError> {
        Self::check(&country, weight)?;
        let entry = self.weights.entry(country).or_insert(0.0);
        *entry = entry.max(weight);
        Ok(())
    }

    pub fn get(&self, country: &CountryCode) -> Option<f64> {
        self.weights.get(country).copied()
    }

    pub fn contains(&self, country: &CountryCode) -> bool {
        self.weights.contains_key(country)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CountryCode, f64)> {
        self.weights.iter().map(|(c, w)| (c, *w))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Share of total weight held by countries for which `unsafe_country`
    /// is false. Zero when the map is empty or carries no weight.
    pub fn safe_fraction(&self, unsafe_country: impl Fn(&CountryCode) -> bool) -> f64 {
        let total = self.total_weight();
        if self.is_empty() || total <= 0.0 {
            return 0.0;
        }

        let safe: f64 = self
            .weights
            .iter()
            .filter(|(country, _)| !unsafe_country(country))
            .map(|(_, weight)| weight)
            .sum();

        (safe / total).clamp(0.0, 1.0)
    }
}

impl TryFrom<BTreeMap<CountryCode, f64>> for TrustMap {
    type Error = TrustError;

    fn try_from(weights: BTreeMap<CountryCode, f64>) -> Result<Self, Self::Error> {
        Self::from_weights(weights)
    }
}

impl From<TrustMap> for BTreeMap<CountryCode, f64> {
    fn from(trust: TrustMap) -> Self {
        trust.weights
    }
}

/// Safety of the guard role.
///
/// Countries reachable from both the client's alliance closure and the
/// closure of the guard countries can observe the client-guard link.
pub fn guard_security(
    client_country: &CountryCode,
    guard_countries: &BTreeSet<CountryCode>,
    trust: &TrustMap,
    alliances: &[AllianceGroup],
) -> f64 {
    if trust.is_empty() {
        return 0.0;
    }

    let client_side = expand_alliance(&BTreeSet::from([client_country.clone()]), alliances);
    let guard_side = expand_alliance(guard_countries, alliances);

    trust.safe_fraction(|country| client_side.contains(country) && guard_side.contains(country))
}

/// Safety of an exit given the chosen guard.
///
/// A country counts against the score only when it lies in both the
/// client-guard closure and the exit-destination closure, i.e. one alliance
/// can watch both ends of the path.
pub fn exit_security(
    client_country: &CountryCode,
    dest_country: &CountryCode,
    guard_country: &CountryCode,
    exit_country: &CountryCode,
    trust: &TrustMap,
    alliances: &[AllianceGroup],
) -> f64 {
    if trust.is_empty() {
        return 0.0;
    }

    let left_bad = expand_alliance(
        &BTreeSet::from([client_country.clone(), guard_country.clone()]),
        alliances,
    );
    let right_bad = expand_alliance(
        &BTreeSet::from([exit_country.clone(), dest_country.clone()]),
        alliances,
    );

    trust.safe_fraction(|country| left_bad.contains(country) && right_bad.contains(country))
}
