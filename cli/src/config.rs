// Configuration management for the TrustPath CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/trustpath/config.json
// - Linux: ~/.config/trustpath/config.json
// - Windows: %APPDATA%\trustpath\config.json

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use trustpath_core::{
    CountryCode, CountryLookup, GeoError, GeoTable, MaxMindLookup, PathConfig, WithOverrides,
    GEOLITE2_COUNTRY,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Alpha parameters for guard and exit selection
    pub path: PathConfig,

    /// Addresses pinned to a country regardless of the geolocation table
    pub manual_countries: BTreeMap<String, String>,

    /// MaxMind `.mmdb` database or JSON table used when no --geo flag is
    /// given. Falls back to `GeoLite2-Country.mmdb` in the working directory.
    pub geo_database: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let mut manual_countries = BTreeMap::new();
        // Known residential address missing from public geolocation data
        manual_countries.insert("73.170.126.220".to_string(), "US".to_string());

        Self {
            path: PathConfig::default(),
            manual_countries,
            geo_database: None,
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("trustpath");

        // Create directory if it doesn't exist
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from file, or create default if not exists
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            config
                .path
                .validate()
                .with_context(|| format!("Invalid alpha settings in {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Build the country lookup: manual overrides in front of `geo`, the
    /// configured database, or `GeoLite2-Country.mmdb` if present
    pub fn geo_lookup(&self, geo: Option<&Path>) -> Result<WithOverrides<GeoSource>> {
        self.geo_lookup_with_default(geo, Path::new(GEOLITE2_COUNTRY))
    }

    fn geo_lookup_with_default(
        &self,
        geo: Option<&Path>,
        default_database: &Path,
    ) -> Result<WithOverrides<GeoSource>> {
        let source = match geo.or(self.geo_database.as_deref()) {
            Some(path) => GeoSource::open(path)?,
            None if default_database.exists() => GeoSource::open(default_database)?,
            None => {
                tracing::warn!(
                    "no geolocation source; only manual country entries will resolve"
                );
                GeoSource::Empty
            }
        };

        let mut overrides = GeoTable::new();
        for (ip, country) in &self.manual_countries {
            overrides
                .insert(ip, CountryCode::new(country))
                .with_context(|| format!("Invalid manual country entry for {}", ip))?;
        }

        Ok(WithOverrides::new(overrides, source))
    }
}

/// Where relay and endpoint countries come from
pub enum GeoSource {
    MaxMind(MaxMindLookup),
    Table(GeoTable),
    Empty,
}

impl GeoSource {
    /// Open `path` as a MaxMind database if it ends in `.mmdb`, otherwise as
    /// a JSON table
    pub fn open(path: &Path) -> Result<Self> {
        let is_mmdb = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("mmdb"));

        if is_mmdb {
            let lookup = MaxMindLookup::open(path).with_context(|| {
                format!("Failed to open geolocation database {}", path.display())
            })?;
            tracing::debug!(
                path = %path.display(),
                kind = lookup.database_type(),
                "opened MaxMind database"
            );
            Ok(GeoSource::MaxMind(lookup))
        } else {
            let table = GeoTable::from_file(path)
                .with_context(|| format!("Failed to load geolocation table {}", path.display()))?;
            Ok(GeoSource::Table(table))
        }
    }
}

impl CountryLookup for GeoSource {
    fn country_of(&self, ip: &str) -> Result<CountryCode, GeoError> {
        match self {
            GeoSource::MaxMind(lookup) => lookup.country_of(ip),
            GeoSource::Table(table) => table.country_of(ip),
            GeoSource::Empty => Err(GeoError::NotFound(ip.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.path, PathConfig::default());
        assert_eq!(
            config.manual_countries.get("73.170.126.220").map(String::as_str),
            Some("US")
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"manual_countries": {}}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(config.manual_countries.is_empty());
        assert_eq!(config.path, PathConfig::default());
    }

    #[test]
    fn test_invalid_alpha_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.path.guard.bandwidth_frac = -1.0;
        config.save_to(&path).unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_geo_lookup_applies_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let geo_path = dir.path().join("geo.json");
        std::fs::write(&geo_path, r#"{"8.8.8.8": "US", "73.170.126.220": "CA"}"#).unwrap();

        let config = Config::default();
        let table = config.geo_lookup(Some(&geo_path)).unwrap();
        assert_eq!(table.country_of("8.8.8.8").unwrap().as_str(), "US");
        // Manual entries win over the table
        assert_eq!(table.country_of("73.170.126.220").unwrap().as_str(), "US");
    }

    #[test]
    fn test_geo_lookup_without_source() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join(GEOLITE2_COUNTRY);

        let lookup = Config::default()
            .geo_lookup_with_default(None, &missing)
            .unwrap();
        assert!(matches!(lookup.inner(), GeoSource::Empty));
        assert_eq!(lookup.overrides().len(), 1);
        assert_eq!(lookup.country_of("73.170.126.220").unwrap().as_str(), "US");
        assert!(matches!(
            lookup.country_of("8.8.8.8"),
            Err(GeoError::NotFound(_))
        ));
    }

    #[test]
    fn test_geo_lookup_uses_configured_table() {
        let dir = tempfile::tempdir().unwrap();
        let geo_path = dir.path().join("geo.json");
        std::fs::write(&geo_path, r#"{"5.5.5.5": "SE"}"#).unwrap();

        let config = Config {
            geo_database: Some(geo_path),
            ..Config::default()
        };
        let lookup = config
            .geo_lookup_with_default(None, &dir.path().join(GEOLITE2_COUNTRY))
            .unwrap();
        assert!(matches!(lookup.inner(), GeoSource::Table(_)));
        assert_eq!(lookup.country_of("5.5.5.5").unwrap().as_str(), "SE");
    }

    #[test]
    fn test_geo_lookup_rejects_bad_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join(GEOLITE2_COUNTRY);
        std::fs::write(&db_path, b"not a maxmind database").unwrap();

        // An unreadable default database is an error, not a silent fallback
        let result = Config::default().geo_lookup_with_default(None, &db_path);
        assert!(result.is_err());
        assert!(Config::default().geo_lookup(Some(&db_path)).is_err());
    }
}
