// MaxMind — Country lookups against a GeoLite2/GeoIP2 country database
//
// Reads the `.mmdb` file into memory once. Addresses the database has no
// record for, or whose record carries no ISO code, resolve to `NotFound`.

use super::geo::{parse_address, CountryLookup, GeoError};
use super::relay::CountryCode;
use maxminddb::{geoip2, MaxMindDBError, Reader};
use std::path::Path;

/// File name of the free country database
pub const GEOLITE2_COUNTRY: &str = "GeoLite2-Country.mmdb";

pub struct MaxMindLookup {
    reader: Reader<Vec<u8>>,
}

impl MaxMindLookup {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GeoError> {
        let reader = Reader::open_readfile(path).map_err(open_error)?;
        Ok(Self { reader })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, GeoError> {
        let reader = Reader::from_source(bytes).map_err(open_error)?;
        Ok(Self { reader })
    }

    /// Database type from the file metadata, e.g. `GeoLite2-Country`
    pub fn database_type(&self) -> &str {
        &self.reader.metadata.database_type
    }
}

impl CountryLookup for MaxMindLookup {
    fn country_of(&self, ip: &str) -> Result<CountryCode, GeoError> {
        let addr = parse_address(ip)?;
        country_from_record(ip, self.reader.lookup::<geoip2::Country>(addr))
    }
}

fn open_error(err: MaxMindDBError) -> GeoError {
    match err {
        MaxMindDBError::IoError(msg) => GeoError::IoError(msg),
        other => GeoError::Database(other.to_string()),
    }
}

fn country_from_record(
    ip: &str,
    record: Result<geoip2::Country<'_>, MaxMindDBError>,
) -> Result<CountryCode, GeoError> {
    match record {
        Ok(record) => record
            .country
            .and_then(|country| country.iso_code)
            .map(CountryCode::new)
            .ok_or_else(|| GeoError::NotFound(ip.to_string())),
        Err(MaxMindDBError::AddressNotFoundError(_)) => Err(GeoError::NotFound(ip.to_string())),
        Err(err) => Err(GeoError::Database(err.to_string())),
    }
}
