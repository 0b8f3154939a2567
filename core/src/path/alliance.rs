// Alliance Expansion — Transitive closure of country alliances
//
// Countries sharing operator trust or control form alliance groups. Groups
// may overlap, so a compromise domain is the closure of a seed set under
// every group it touches.

use crate::directory::relay::CountryCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A set of countries considered mutually operator-affiliated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllianceGroup(BTreeSet<CountryCode>);

impl AllianceGroup {
    pub fn new<I, C>(countries: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<CountryCode>,
    {
        AllianceGroup(countries.into_iter().map(Into::into).collect())
    }

    pub fn countries(&self) -> &BTreeSet<CountryCode> {
        &self.0
    }

    pub fn contains(&self, country: &CountryCode) -> bool {
        self.0.contains(country)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn touches(&self, set: &BTreeSet<CountryCode>) -> bool {
        !self.0.is_disjoint(set)
    }
}

impl<C: Into<CountryCode>> FromIterator<C> for AllianceGroup {
    fn from_iter<I: IntoIterator<Item = C>>(iter: I) -> Self {
        AllianceGroup::new(iter)
    }
}

/// Smallest superset of `seed` closed under alliance membership.
///
/// A country is always in its own closure, with or without a group naming it.
pub fn expand_alliance(
    seed: &BTreeSet<CountryCode>,
    groups: &[AllianceGroup],
) -> BTreeSet<CountryCode> {
    let mut expanded = seed.clone();

    loop {
        let mut changed = false;

        for group in groups {
            if group.touches(&expanded) && !group.0.is_subset(&expanded) {
                expanded.extend(group.0.iter().cloned());
                changed = true;
            }
        }

        if !changed {
            return expanded;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(codes: &[&str]) -> BTreeSet<CountryCode> {
        codes.iter().map(|c| CountryCode::new(c)).collect()
    }

    fn chained_groups() -> Vec<AllianceGroup> {
        vec![
            AllianceGroup::new(["DE", "US"]),
            AllianceGroup::new(["US", "GB", "CA"]),
            AllianceGroup::new(["DE", "FR"]),
        ]
    }

    #[test]
    fn test_expand_reaches_whole_chain() {
        let groups = chained_groups();
        let everyone = set(&["US", "DE", "GB", "CA", "FR"]);

        assert_eq!(expand_alliance(&set(&["US"]), &groups), everyone);
        assert_eq!(expand_alliance(&set(&["FR"]), &groups), everyone);
        assert_eq!(expand_alliance(&set(&["GB"]), &groups), everyone);
    }

    #[test]
    fn test_expand_unallied_country_is_itself() {
        assert_eq!(expand_alliance(&set(&["CN"]), &chained_groups()), set(&["CN"]));
    }

    #[test]
    fn test_expand_empty_inputs() {
        assert!(expand_alliance(&BTreeSet::new(), &chained_groups()).is_empty());
        assert_eq!(expand_alliance(&set(&["SE"]), &[]), set(&["SE"]));
    }

    #[test]
    fn test_expand_needs_multiple_passes() {
        // The link to {PT, ES} is only discovered after {BR, PT} is merged,
        // which itself depends on the last group in the list.
        let groups = vec![
            AllianceGroup::new(["PT", "ES"]),
            AllianceGroup::new(["BR", "PT"]),
            AllianceGroup::new(["AR", "BR"]),
        ];
        assert_eq!(
            expand_alliance(&set(&["AR"]), &groups),
            set(&["AR", "BR", "PT", "ES"])
        );
    }

    #[test]
    fn test_expand_disjoint_seeds() {
        let groups = vec![AllianceGroup::new(["US", "GB"]), AllianceGroup::new(["FR"])];
        assert_eq!(
            expand_alliance(&set(&["GB", "FR"]), &groups),
            set(&["US", "GB", "FR"])
        );
    }

    #[test]
    fn test_alliance_group_deserialization() {
        let group: AllianceGroup = serde_json::from_str(r#"["us", "GB"]"#).unwrap();
        assert!(group.contains(&CountryCode::new("US")));
        assert_eq!(group.len(), 2);
    }
}
