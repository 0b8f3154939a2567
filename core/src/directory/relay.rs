// Relay Records — Immutable snapshot entries from the relay directory
//
// Relays are supplied whole and never mutated by path selection. Identity,
// address, bandwidth weight, declared family and the single role a relay
// may play in a path.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// ISO country code, normalised to trimmed upper case
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    pub fn new(code: impl AsRef<str>) -> Self {
        CountryCode(code.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CountryCode {
    fn from(code: String) -> Self {
        CountryCode::new(code)
    }
}

impl From<&str> for CountryCode {
    fn from(code: &str) -> Self {
        CountryCode::new(code)
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque relay identity.
///
/// Directory family lists prefix fingerprints with `$`; the prefix is
/// dropped so family entries compare equal to relay identities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(id: impl AsRef<str>) -> Self {
        let id = id.as_ref().trim();
        Fingerprint(id.strip_prefix('$').unwrap_or(id).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Fingerprint {
    fn from(id: String) -> Self {
        Fingerprint::new(id)
    }
}

impl From<&str> for Fingerprint {
    fn from(id: &str) -> Self {
        Fingerprint::new(id)
    }
}

impl From<Fingerprint> for String {
    fn from(id: Fingerprint) -> Self {
        id.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position a relay is eligible for.
///
/// Guard and exit are exclusive. `Middle` marks relays flagged as neither,
/// which can still serve as the middle hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayRole {
    Guard,
    Exit,
    Middle,
}

/// A relay as seen in one directory snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relay {
    pub fingerprint: Fingerprint,
    /// Address used only to derive the relay's country
    pub ip: String,
    /// Bandwidth weight (bytes/s as advertised or measured)
    pub bandwidth: u64,
    /// Relays declared as commonly operated, possibly including itself
    #[serde(default)]
    pub family: BTreeSet<Fingerprint>,
    pub role: RelayRole,
}

impl Relay {
    pub fn new(
        fingerprint: impl Into<Fingerprint>,
        ip: impl Into<String>,
        bandwidth: u64,
        role: RelayRole,
    ) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            ip: ip.into(),
            bandwidth,
            family: BTreeSet::new(),
            role,
        }
    }

    /// Attach a declared family
    pub fn with_family<I, F>(mut self, family: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Fingerprint>,
    {
        self.family = family.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_guard(&self) -> bool {
        self.role == RelayRole::Guard
    }

    pub fn is_exit(&self) -> bool {
        self.role == RelayRole::Exit
    }

    /// Whether this relay declares `other` as part of its family
    pub fn declares_family(&self, other: &Fingerprint) -> bool {
        self.family.contains(other)
    }
}
