// TrustPath Core — Alliance-aware relay path selection
//
// Given a relay snapshot, a client's per-country trust and the alliances of
// countries that share operator control, choose a guard, middle and exit
// such that no single alliance is likely to observe both ends of the path.
//
// The core is synchronous and performs no I/O beyond the optional file
// loaders in `directory`. Randomness is always supplied by the caller.

pub mod directory;
pub mod path;

pub use directory::{
    filter_trusted, is_exit_policy, parse_consensus, CachedLookup, ClientInputError,
    ClientProfile, ConsensusError, CountryCode, CountryLookup, Fingerprint, GeoError, GeoTable,
    MaxMindLookup, Relay, RelayRole, WithOverrides, GEOLITE2_COUNTRY,
};
pub use path::{
    exit_security, expand_alliance, guard_security, secure_relays, weighted_choice, AllianceGroup,
    AlphaConfig, BandwidthWeighting, PathBuilder, PathConfig, PathError, RelayPath,
    SelectionError, TrustError, TrustMap,
};
