// Path Selection — Alliance-aware guard/middle/exit choice
//
// Provides alliance closure, trust-weighted security scoring, two-tier
// secure set selection and the path builder that ties them together.

pub mod alliance;
pub mod builder;
pub mod security;
pub mod selection;

pub use alliance::{expand_alliance, AllianceGroup};
pub use builder::{BandwidthWeighting, PathBuilder, PathConfig, PathError, RelayPath};
pub use security::{exit_security, guard_security, TrustError, TrustMap};
pub use selection::{secure_relays, weighted_choice, AlphaConfig, SelectionError};
