// Secure Relay Selection — Two-tier thresholds over scored candidates
//
// Relays scoring close to the best candidate are always admitted ("safe").
// Relays within a looser band ("acceptable") are admitted only until the
// admitted bandwidth mass reaches a cap. The resulting set feeds a
// bandwidth-weighted draw.

use crate::directory::relay::Fingerprint;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SelectionError {
    #[error("Invalid alpha configuration: {0}")]
    InvalidConfig(String),
}

/// Tuning parameters for one role's secure set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlphaConfig {
    /// Safe tier: minimum score as a fraction of the best score
    pub safe_upper: f64,
    /// Safe tier: maximum unsafety as a multiple of the best unsafety
    pub safe_lower: f64,
    /// Acceptable tier: minimum score as a fraction of the best score
    pub accept_upper: f64,
    /// Acceptable tier: maximum unsafety as a multiple of the best unsafety
    pub accept_lower: f64,
    /// Bandwidth mass below which acceptable relays are still admitted
    pub bandwidth_frac: f64,
}

impl AlphaConfig {
    /// Guard-role defaults
    pub fn guard_default() -> Self {
        Self {
            safe_upper: 0.95,
            safe_lower: 2.0,
            accept_upper: 0.5,
            accept_lower: 5.0,
            bandwidth_frac: 0.2,
        }
    }

    /// Exit-role defaults; the acceptable band is wider than for guards
    pub fn exit_default() -> Self {
        Self {
            safe_upper: 0.95,
            safe_lower: 2.0,
            accept_upper: 0.1,
            accept_lower: 10.0,
            bandwidth_frac: 0.2,
        }
    }

    /// Validate alpha configuration
    pub fn validate(&self) -> Result<(), SelectionError> {
        let fields = [
            ("safe_upper", self.safe_upper),
            ("safe_lower", self.safe_lower),
            ("accept_upper", self.accept_upper),
            ("accept_lower", self.accept_lower),
            ("bandwidth_frac", self.bandwidth_frac),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(SelectionError::InvalidConfig(format!(
                    "{} must be a finite, non-negative number",
                    name
                )));
            }
        }
        if self.safe_upper > 1.0 || self.accept_upper > 1.0 {
            return Err(SelectionError::InvalidConfig(
                "safe_upper and accept_upper must not exceed 1.0".to_string(),
            ));
        }
        Ok(())
    }

    fn admits(upper: f64, lower: f64, score: f64, best: f64) -> bool {
        score >= upper * best && (1.0 - score) <= lower * (1.0 - best)
    }

    fn is_safe(&self, score: f64, best: f64) -> bool {
        Self::admits(self.safe_upper, self.safe_lower, score, best)
    }

    fn is_acceptable(&self, score: f64, best: f64) -> bool {
        Self::admits(self.accept_upper, self.accept_lower, score, best)
    }
}

impl Default for AlphaConfig {
    fn default() -> Self {
        Self::guard_default()
    }
}

/// Compute the secure set of `candidates`.
///
/// Candidates are ranked by score, highest first, ties kept in input order.
/// The walk admits safe relays, then acceptable relays while the admitted
/// weight stays below `bandwidth_frac`, and stops at the first relay that
/// fails. Candidates missing from `scores` or `weights`, or with a
/// non-finite score, are ignored. An empty result is possible and must be
/// handled by the caller.
pub fn secure_relays(
    alpha: &AlphaConfig,
    scores: &HashMap<Fingerprint, f64>,
    candidates: &[Fingerprint],
    weights: &HashMap<Fingerprint, f64>,
) -> BTreeSet<Fingerprint> {
    let mut seen = HashSet::new();
    let mut ranked: Vec<(&Fingerprint, f64, f64)> = candidates
        .iter()
        .filter(|fp| seen.insert(*fp))
        .filter_map(|fp| Some((fp, *scores.get(fp)?, *weights.get(fp)?)))
        .filter(|(_, score, _)| score.is_finite())
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut secure = BTreeSet::new();
    let Some(&(_, best, _)) = ranked.first() else {
        return secure;
    };

    let mut mass = 0.0;
    let mut i = 0;

    while i < ranked.len() && alpha.is_safe(ranked[i].1, best) {
        secure.insert(ranked[i].0.clone());
        mass += ranked[i].2;
        i += 1;
    }

    while i < ranked.len() && mass < alpha.bandwidth_frac && alpha.is_acceptable(ranked[i].1, best)
    {
        secure.insert(ranked[i].0.clone());
        mass += ranked[i].2;
        i += 1;
    }

    tracing::trace!(
        candidates = ranked.len(),
        best,
        secure = secure.len(),
        mass,
        "secure set computed"
    );

    secure
}

/// Draw one relay from `pool` with probability proportional to its weight.
///
/// Missing weights count as zero. If every weight is zero the draw is
/// uniform. Returns `None` only for an empty pool.
pub fn weighted_choice<R: Rng + ?Sized>(
    rng: &mut R,
    pool: &BTreeSet<Fingerprint>,
    weights: &HashMap<Fingerprint, f64>,
) -> Option<Fingerprint> {
    let members: Vec<&Fingerprint> = pool.iter().collect();
    let weight_of = |fp: &&Fingerprint| {
        weights
            .get(*fp)
            .copied()
            .filter(|w| w.is_finite() && *w > 0.0)
            .unwrap_or(0.0)
    };

    match members.choose_weighted(&mut *rng, weight_of) {
        Ok(fp) => Some((*fp).clone()),
        Err(err) => {
            tracing::debug!(pool = members.len(), %err, "no usable weights, drawing uniformly");
            members.choose(rng).map(|fp| (*fp).clone())
        }
    }
}
