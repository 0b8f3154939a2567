// Directory Inputs — Relay snapshots, geolocation and client profiles
//
// Everything path selection consumes from the outside world: relay records
// parsed from a consensus document, the country lookup (JSON table or
// MaxMind database), and the client's alliance and trust declarations.

pub mod client;
pub mod consensus;
pub mod geo;
pub mod maxmind;
pub mod relay;

pub use client::{ClientInputError, ClientProfile};
pub use consensus::{filter_trusted, is_exit_policy, parse_consensus, ConsensusError};
pub use geo::{CachedLookup, CountryLookup, GeoError, GeoTable, WithOverrides};
pub use maxmind::{MaxMindLookup, GEOLITE2_COUNTRY};
pub use relay::{CountryCode, Fingerprint, Relay, RelayRole};
