// Geolocation — Mapping relay and endpoint addresses to countries
//
// Path selection consults a `CountryLookup` synchronously. Lookups are
// fallible; an unresolved address is reported, never matched as a wildcard.

use super::relay::CountryCode;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeoError {
    #[error("No country known for address {0}")]
    NotFound(String),
    #[error("Invalid IP address: {0}")]
    InvalidAddress(String),
    #[error("Malformed geolocation table: {0}")]
    MalformedTable(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Geolocation database error: {0}")]
    Database(String),
}

/// Resolves an address to the country it is located in
#[cfg_attr(test, mockall::automock)]
pub trait CountryLookup {
    fn country_of(&self, ip: &str) -> Result<CountryCode, GeoError>;
}

impl<T: CountryLookup + ?Sized> CountryLookup for &T {
    fn country_of(&self, ip: &str) -> Result<CountryCode, GeoError> {
        (**self).country_of(ip)
    }
}

pub(super) fn parse_address(ip: &str) -> Result<IpAddr, GeoError> {
    ip.trim()
        .parse::<IpAddr>()
        .map_err(|_| GeoError::InvalidAddress(ip.to_string()))
}

/// Exact-address country table
#[derive(Debug, Clone, Default)]
pub struct GeoTable {
    entries: HashMap<IpAddr, CountryCode>,
}

impl GeoTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a table from a JSON object of `"address": "CC"` pairs
    pub fn from_json(json: &str) -> Result<Self, GeoError> {
        let raw: HashMap<String, String> =
            serde_json::from_str(json).map_err(|e| GeoError::MalformedTable(e.to_string()))?;

        let mut table = Self::new();
        for (ip, country) in raw {
            table.insert(&ip, CountryCode::new(country))?;
        }
        Ok(table)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GeoError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| GeoError::IoError(e.to_string()))?;
        Self::from_json(&contents)
    }

    /// Add or replace the country for one address
    pub fn insert(&mut self, ip: &str, country: CountryCode) -> Result<(), GeoError> {
        let addr = parse_address(ip)?;
        self.entries.insert(addr, country);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CountryLookup for GeoTable {
    fn country_of(&self, ip: &str) -> Result<CountryCode, GeoError> {
        let addr = parse_address(ip)?;
        self.entries
            .get(&addr)
            .cloned()
            .ok_or_else(|| GeoError::NotFound(ip.to_string()))
    }
}

/// Pinned addresses in front of a fallback lookup.
///
/// Only a `NotFound` from the overrides falls through; an invalid address is
/// reported as is.
#[derive(Debug, Clone)]
pub struct WithOverrides<L> {
    overrides: GeoTable,
    inner: L,
}

impl<L: CountryLookup> WithOverrides<L> {
    pub fn new(overrides: GeoTable, inner: L) -> Self {
        Self { overrides, inner }
    }

    pub fn overrides(&self) -> &GeoTable {
        &self.overrides
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }
}

impl<L: CountryLookup> CountryLookup for WithOverrides<L> {
    fn country_of(&self, ip: &str) -> Result<CountryCode, GeoError> {
        match self.overrides.country_of(ip) {
            Err(GeoError::NotFound(_)) => self.inner.country_of(ip),
            pinned => pinned,
        }
    }
}

/// Memoising wrapper around another lookup.
///
/// Failures are cached as well, so a repeated unresolved address is not
/// looked up twice.
pub struct CachedLookup<L> {
    inner: L,
    cache: Mutex<HashMap<String, Result<CountryCode, GeoError>>>,
}

impl<L: CountryLookup> CachedLookup<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Number of distinct addresses looked up so far
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn into_inner(self) -> L {
        self.inner
    }
}

impl<L: CountryLookup> CountryLookup for CachedLookup<L> {
    fn country_of(&self, ip: &str) -> Result<CountryCode, GeoError> {
        if let Some(hit) = self.cache.lock().get(ip) {
            return hit.clone();
        }

        let resolved = self.inner.country_of(ip);
        self.cache.lock().insert(ip.to_string(), resolved.clone());
        resolved
    }
}
