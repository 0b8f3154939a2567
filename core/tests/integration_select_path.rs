// Integration tests for end-to-end path selection
//
// Covers deterministic single-candidate paths, seeded reproducibility,
// path invariants over a larger snapshot and exit exclusion by alliance.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use trustpath_core::{
    AllianceGroup, AlphaConfig, CountryCode, Fingerprint, GeoTable, PathBuilder, PathConfig,
    PathError, Relay, RelayRole, TrustMap,
};

fn loose_config() -> PathConfig {
    let alpha = AlphaConfig {
        safe_upper: 0.9,
        safe_lower: 2.0,
        accept_upper: 0.5,
        accept_lower: 5.0,
        bandwidth_frac: 0.2,
    };
    PathConfig {
        guard: alpha,
        exit: alpha,
        ..PathConfig::default()
    }
}

fn geo(entries: &[(&str, &str)]) -> GeoTable {
    let mut table = GeoTable::new();
    for (ip, country) in entries {
        table.insert(ip, CountryCode::new(country)).unwrap();
    }
    table
}

/// Snapshot with guards and exits spread over several countries and a few
/// declared families
fn large_snapshot() -> (Vec<Relay>, GeoTable) {
    let countries = ["DE", "FR", "SE", "US", "GB"];
    let mut relays = Vec::new();
    let mut entries = Vec::new();

    for i in 0..30u8 {
        let ip = format!("10.0.0.{}", i + 1);
        let role = match i % 3 {
            0 => RelayRole::Guard,
            1 => RelayRole::Exit,
            _ => RelayRole::Middle,
        };
        let id = format!("R{:02}", i);
        // Relays three apart share a role and declare each other as family
        let sibling = if (i / 3) % 2 == 0 { i + 3 } else { i - 3 };
        let relay = Relay::new(id.as_str(), ip.as_str(), 100 + u64::from(i) * 10, role)
            .with_family([id.clone(), format!("R{:02}", sibling)]);

        entries.push((ip, countries[usize::from(i) % countries.len()].to_string()));
        relays.push(relay);
    }

    let mut table = GeoTable::new();
    for (ip, country) in &entries {
        table.insert(ip, CountryCode::new(country)).unwrap();
    }
    (relays, table)
}

fn large_trust() -> (TrustMap, Vec<AllianceGroup>) {
    let trust = TrustMap::from_weights([
        ("US", 1.0),
        ("GB", 0.8),
        ("DE", 0.9),
        ("FR", 0.5),
        ("SE", 0.8),
    ])
    .unwrap();
    let alliances = vec![AllianceGroup::new(["US", "GB"]), AllianceGroup::new(["FR"])];
    (trust, alliances)
}

#[test]
fn test_single_candidate_per_role() {
    let relays = vec![
        Relay::new("G", "8.8.8.8", 100, RelayRole::Guard),
        Relay::new("M", "9.9.9.9", 100, RelayRole::Middle),
        Relay::new("E", "5.5.5.5", 100, RelayRole::Exit),
    ];
    let lookup = geo(&[
        ("1.1.1.1", "US"),
        ("8.8.8.8", "DE"),
        ("9.9.9.9", "FR"),
        ("5.5.5.5", "SE"),
        ("2.2.2.2", "SE"),
    ]);
    let trust = TrustMap::from_weights([("US", 1.0), ("DE", 0.9), ("FR", 0.5), ("SE", 0.8)]).unwrap();
    let alliances = vec![AllianceGroup::new(["US", "GB"]), AllianceGroup::new(["FR"])];

    let builder = PathBuilder::new(relays, trust, alliances, loose_config(), lookup).unwrap();

    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(seed);
        let path = builder.select_path_for("1.1.1.1", "2.2.2.2", &mut rng).unwrap();
        assert_eq!(path.guard.as_str(), "G");
        assert_eq!(path.middle.as_str(), "M");
        assert_eq!(path.exit.as_str(), "E");
    }
}

#[test]
fn test_path_invariants_over_many_seeds() {
    let (relays, lookup) = large_snapshot();
    let (trust, alliances) = large_trust();
    let builder = PathBuilder::new(relays.clone(), trust, alliances, PathConfig::default(), lookup)
        .unwrap();

    let by_id: std::collections::HashMap<&Fingerprint, &Relay> =
        relays.iter().map(|r| (&r.fingerprint, r)).collect();

    for seed in 0..100 {
        let mut rng = StdRng::seed_from_u64(seed);
        let path = builder
            .select_path(&CountryCode::new("US"), &CountryCode::new("SE"), &mut rng)
            .unwrap();

        let hops = path.hops();
        let distinct: HashSet<_> = hops.iter().collect();
        assert_eq!(distinct.len(), 3, "hops must be distinct: {:?}", path);

        assert!(by_id[&path.guard].is_guard());
        assert!(by_id[&path.exit].is_exit());

        for a in hops {
            for b in hops {
                if a != b {
                    assert!(
                        !by_id[a].declares_family(b),
                        "{} declares {} as family in {:?}",
                        a,
                        b,
                        path
                    );
                }
            }
        }
    }
}

#[test]
fn test_same_seed_same_path() {
    let (relays, lookup) = large_snapshot();
    let (trust, alliances) = large_trust();
    let builder =
        PathBuilder::new(relays, trust, alliances, PathConfig::default(), lookup).unwrap();

    let client = CountryCode::new("US");
    let dest = CountryCode::new("FR");

    let first = builder
        .select_path(&client, &dest, &mut StdRng::seed_from_u64(99))
        .unwrap();
    let second = builder
        .select_path(&client, &dest, &mut StdRng::seed_from_u64(99))
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_exit_in_client_alliance_is_never_chosen() {
    // Guard in SE; X1 in GB shares the {US, GB} alliance with the client,
    // X2 in FR does not and scores a perfect 1.0.
    let relays = vec![
        Relay::new("G", "10.1.0.1", 100, RelayRole::Guard),
        Relay::new("X1", "10.1.0.2", 10_000, RelayRole::Exit),
        Relay::new("X2", "10.1.0.3", 1, RelayRole::Exit),
        Relay::new("M", "10.1.0.4", 100, RelayRole::Middle),
    ];
    let lookup = geo(&[
        ("10.1.0.1", "SE"),
        ("10.1.0.2", "GB"),
        ("10.1.0.3", "FR"),
        ("10.1.0.4", "DE"),
    ]);
    let trust =
        TrustMap::from_weights([("US", 1.0), ("GB", 1.0), ("SE", 1.0), ("FR", 1.0)]).unwrap();
    let alliances = vec![AllianceGroup::new(["US", "GB"])];
    let builder =
        PathBuilder::new(relays, trust, alliances, PathConfig::default(), lookup).unwrap();

    let client = CountryCode::new("US");
    let dest = CountryCode::new("FR");

    let scores = builder
        .exit_scores(&client, &dest, &CountryCode::new("SE"))
        .unwrap();
    assert!((scores[&Fingerprint::new("X1")] - 0.5).abs() < 1e-12);
    assert_eq!(scores[&Fingerprint::new("X2")], 1.0);

    for seed in 0..50 {
        let path = builder
            .select_path(&client, &dest, &mut StdRng::seed_from_u64(seed))
            .unwrap();
        assert_eq!(path.exit.as_str(), "X2");
    }
}

#[test]
fn test_empty_snapshot_has_no_secure_guards() {
    let builder = PathBuilder::new(
        vec![],
        TrustMap::from_weights([("US", 1.0)]).unwrap(),
        vec![],
        PathConfig::default(),
        GeoTable::new(),
    )
    .unwrap();

    let result = builder.select_path(
        &CountryCode::new("US"),
        &CountryCode::new("US"),
        &mut StdRng::seed_from_u64(0),
    );
    assert_eq!(result, Err(PathError::NoSecureGuards));
}

#[test]
fn test_exit_family_excludes_only_middle() {
    // The exit declares both the guard and M1 as family. The guard stays a
    // valid guard; only M1 is excluded from the middle pool.
    let relays = vec![
        Relay::new("G", "10.2.0.1", 100, RelayRole::Guard),
        Relay::new("E", "10.2.0.2", 100, RelayRole::Exit).with_family(["E", "G", "M1"]),
        Relay::new("M1", "10.2.0.3", 100, RelayRole::Middle),
        Relay::new("M2", "10.2.0.4", 100, RelayRole::Middle),
    ];
    let lookup = geo(&[
        ("10.2.0.1", "DE"),
        ("10.2.0.2", "SE"),
        ("10.2.0.3", "FR"),
        ("10.2.0.4", "FR"),
    ]);
    let trust = TrustMap::from_weights([("US", 1.0), ("DE", 1.0), ("SE", 1.0)]).unwrap();
    let builder =
        PathBuilder::new(relays, trust, vec![], loose_config(), lookup).unwrap();

    for seed in 0..20 {
        let path = builder
            .select_path(
                &CountryCode::new("US"),
                &CountryCode::new("SE"),
                &mut StdRng::seed_from_u64(seed),
            )
            .unwrap();
        assert_eq!(path.guard.as_str(), "G");
        assert_eq!(path.exit.as_str(), "E");
        assert_eq!(path.middle.as_str(), "M2");
    }
}

#[test]
fn test_unresolved_relay_address() {
    let relays = vec![
        Relay::new("G", "10.3.0.1", 100, RelayRole::Guard),
        Relay::new("E", "10.3.0.2", 100, RelayRole::Exit),
        Relay::new("M", "10.3.0.3", 100, RelayRole::Middle),
    ];
    // Exit address missing from the table
    let lookup = geo(&[("10.3.0.1", "DE"), ("10.3.0.3", "FR")]);
    let trust = TrustMap::from_weights([("US", 1.0), ("DE", 1.0)]).unwrap();
    let builder = PathBuilder::new(relays, trust, vec![], loose_config(), lookup).unwrap();

    let result = builder.select_path(
        &CountryCode::new("US"),
        &CountryCode::new("SE"),
        &mut StdRng::seed_from_u64(0),
    );
    assert_eq!(
        result,
        Err(PathError::CountryUnresolved("10.3.0.2".to_string()))
    );
}
