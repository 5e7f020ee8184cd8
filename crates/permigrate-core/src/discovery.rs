//! Group discovery and differencing
//!
//! Discovery lists a node's groups and drops service-managed system groups.
//! The differencer computes which source group titles are missing on the
//! destination, preserving source order and leaving associated groups to
//! the associated-group resolver.

use crate::error::MigrationError;
use crate::port::SiteSession;
use crate::retry::ThrottlePolicy;
use indexmap::IndexSet;
use once_cell::sync::Lazy;
use permigrate_model::{AssociatedGroupSet, Group};
use regex::Regex;

/// Title prefixes of service-managed groups
pub const SYSTEM_GROUP_PREFIXES: &[&str] = &[
    "Limited Access",
    "SharingLinks",
    "STE_",
    "Everyone",
    "Company Administrator",
    "Excel Services Viewers",
    "Viewers",
];

static BARE_GUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}$")
        .expect("GUID pattern is valid")
});

/// System-group exclusion filter
#[derive(Debug, Clone, Default)]
pub struct GroupFilter {
    extra_prefixes: Vec<String>,
}

impl GroupFilter {
    /// Filter with built-in prefixes plus `extra_prefixes`
    #[inline]
    #[must_use]
    pub fn new(extra_prefixes: Vec<String>) -> Self {
        Self { extra_prefixes }
    }

    /// Whether `title` names a system group
    #[must_use]
    pub fn is_system(&self, title: &str) -> bool {
        SYSTEM_GROUP_PREFIXES.iter().any(|p| title.starts_with(p))
            || self.extra_prefixes.iter().any(|p| title.starts_with(p.as_str()))
            || BARE_GUID.is_match(title)
    }

    /// Keep only non-system groups, in input order
    #[must_use]
    pub fn retain(&self, groups: Vec<Group>) -> Vec<Group> {
        groups
            .into_iter()
            .filter(|g| !self.is_system(&g.title))
            .collect()
    }
}

/// List the non-system groups of the session's node
///
/// # Errors
/// Returns [`MigrationError::EnumerationFailed`] if the group list cannot be
/// read; this halts the plan.
pub async fn discover_groups(
    session: &dyn SiteSession,
    filter: &GroupFilter,
    throttle: &ThrottlePolicy,
) -> Result<Vec<Group>, MigrationError> {
    let url = session.node().url.clone();
    let all = throttle
        .call("list_groups", move || session.list_groups())
        .await
        .map_err(|e| MigrationError::enumeration("groups", &url, e))?;

    let total = all.len();
    let groups = filter.retain(all);
    tracing::info!(url = %url, total, kept = groups.len(), "Discovered groups");
    Ok(groups)
}

/// Source group titles missing on the destination
///
/// Case-sensitive exact comparison. Titles of the source's associated
/// groups are never returned. Output follows source order, each title once.
#[must_use]
pub fn diff_groups(
    source: &[Group],
    dest: &[Group],
    source_associated: &AssociatedGroupSet,
) -> Vec<String> {
    let existing: IndexSet<&str> = dest.iter().map(|g| g.title.as_str()).collect();
    let mut missing: IndexSet<&str> = IndexSet::new();

    for group in source {
        let title = group.title.as_str();
        if existing.contains(title) || source_associated.contains_title(title) {
            continue;
        }
        missing.insert(title);
    }

    missing.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn groups(titles: &[&str]) -> Vec<Group> {
        titles.iter().map(|t| Group::new(*t)).collect()
    }

    #[test]
    fn system_groups_are_filtered() {
        let filter = GroupFilter::default();
        assert!(filter.is_system("Limited Access System Group"));
        assert!(filter.is_system("SharingLinks.1234.Flexible"));
        assert!(filter.is_system("Everyone except external users"));
        assert!(filter.is_system("3f2504e0-4f89-11d3-9a0c-0305e82c3301"));
        assert!(!filter.is_system("Editors"));
        assert!(!filter.is_system("Project 3f2504e0-4f89-11d3-9a0c-0305e82c3301"));
    }

    #[test]
    fn extra_prefixes_extend_builtins() {
        let filter = GroupFilter::new(vec!["Temp_".to_string()]);
        assert!(filter.is_system("Temp_Import"));
        assert!(filter.is_system("STE_Reader"));
    }

    #[test]
    fn diff_preserves_source_order() {
        let source = groups(&["Zeta", "Owners", "Alpha", "Mid"]);
        let dest = groups(&["Owners"]);
        assert_eq!(
            diff_groups(&source, &dest, &AssociatedGroupSet::default()),
            vec!["Zeta", "Alpha", "Mid"]
        );
    }

    #[test]
    fn diff_is_case_sensitive() {
        let source = groups(&["Editors"]);
        let dest = groups(&["editors"]);
        assert_eq!(
            diff_groups(&source, &dest, &AssociatedGroupSet::default()),
            vec!["Editors"]
        );
    }

    #[test]
    fn diff_excludes_associated_groups() {
        let source = groups(&["Site Owners", "Editors", "Site Visitors"]);
        let associated = AssociatedGroupSet {
            owner: Some(Group::new("Site Owners")),
            member: None,
            visitor: Some(Group::new("Site Visitors")),
        };
        assert_eq!(diff_groups(&source, &[], &associated), vec!["Editors"]);
    }

    proptest! {
        #[test]
        fn prop_diff_after_apply_is_empty(
            src in prop::collection::vec("[A-Ca-c]{1,3}", 0..20),
            dst in prop::collection::vec("[A-Ca-c]{1,3}", 0..20),
        ) {
            let source: Vec<Group> = src.iter().map(Group::new).collect();
            let mut dest: Vec<Group> = dst.iter().map(Group::new).collect();
            let none = AssociatedGroupSet::default();

            let missing = diff_groups(&source, &dest, &none);
            for title in &missing {
                prop_assert!(!dst.contains(title));
            }
            dest.extend(missing.iter().map(Group::new));
            prop_assert!(diff_groups(&source, &dest, &none).is_empty());
        }
    }
}
