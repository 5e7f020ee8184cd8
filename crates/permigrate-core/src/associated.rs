//! Associated-group resolution
//!
//! Associated (owner/member/visitor) groups are never recreated. Their
//! source membership is merged into the destination group bound to the
//! same role, and principals naming a source associated group are
//! translated to the destination group of the same role.

use crate::error::MigrationError;
use crate::port::SiteSession;
use crate::retry::ThrottlePolicy;
use permigrate_model::{
    AssociatedGroupSet, AssociatedRole, AuditLog, EntityKind, PrincipalKind, PrincipalRef,
    FULL_CONTROL,
};
use std::collections::{HashMap, HashSet};

/// Read a node's associated groups
///
/// # Errors
/// Returns [`MigrationError::EnumerationFailed`] if the set cannot be read.
pub async fn read_associated(
    session: &dyn SiteSession,
    throttle: &ThrottlePolicy,
) -> Result<AssociatedGroupSet, MigrationError> {
    throttle
        .call("associated_groups", move || session.associated_groups())
        .await
        .map_err(|e| MigrationError::enumeration("associated groups", &session.node().url, e))
}

/// Source associated-group title to destination title, per role
#[derive(Debug, Clone, Default)]
pub struct AssociatedTitleMap {
    titles: HashMap<String, String>,
}

impl AssociatedTitleMap {
    /// Pair titles of roles bound on both sides
    #[must_use]
    pub fn new(source: &AssociatedGroupSet, dest: &AssociatedGroupSet) -> Self {
        let titles = AssociatedRole::ALL
            .iter()
            .filter_map(|&role| match (source.get(role), dest.get(role)) {
                (Some(s), Some(d)) if s.title != d.title => {
                    Some((s.title.clone(), d.title.clone()))
                }
                _ => None,
            })
            .collect();
        Self { titles }
    }

    /// Destination title for `title`, or `title` itself
    #[must_use]
    pub fn translate<'a>(&'a self, title: &'a str) -> &'a str {
        self.titles.get(title).map_or(title, String::as_str)
    }

    /// Principal with a group login translated
    #[must_use]
    pub fn translate_principal(&self, principal: &PrincipalRef) -> PrincipalRef {
        let mut translated = principal.clone();
        if principal.kind == PrincipalKind::Group {
            translated.login_name = self.translate(&principal.login_name).to_string();
        }
        translated
    }

    /// Whether no titles differ between the two sides
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}

/// Merge source associated membership into the destination, role by role
///
/// Members already present on the destination group are left alone, so a
/// second merge adds nothing. Returns the number of members added.
pub async fn merge_associated(
    dest: &dyn SiteSession,
    source_set: &AssociatedGroupSet,
    dest_set: &AssociatedGroupSet,
    titles: &AssociatedTitleMap,
    throttle: &ThrottlePolicy,
    audit: &mut AuditLog,
) -> usize {
    let mut added_total = 0;

    for role in AssociatedRole::ALL {
        let (source_group, dest_group) = match (source_set.get(role), dest_set.get(role)) {
            (Some(s), Some(d)) => (s, d),
            (None, _) => {
                audit.skipped(
                    EntityKind::AssociatedGroup,
                    role.label(),
                    "no source associated group",
                );
                continue;
            }
            (_, None) => {
                audit.skipped(
                    EntityKind::AssociatedGroup,
                    role.label(),
                    "no destination associated group",
                );
                continue;
            }
        };

        let target = dest_group.title.as_str();
        let key = format!("{}:{target}", role.label());
        let mut seen: HashSet<&str> =
            dest_group.members.iter().map(|m| m.login_name.as_str()).collect();
        let mut added = 0;
        let mut failed = 0;

        for member in &source_group.members {
            let translated = titles.translate_principal(member);
            if !seen.insert(member.login_name.as_str())
                || dest_group.has_member(&translated.login_name)
            {
                continue;
            }
            let member_key = format!("{target}/{}", translated.login_name);
            let login = translated.login_name.as_str();

            let resolved = match throttle
                .call("resolve_principal", move || dest.resolve_principal(login))
                .await
            {
                Ok(p) => p,
                Err(e) => {
                    audit.record(EntityKind::Member, member_key, e.outcome(), e.to_string());
                    failed += 1;
                    continue;
                }
            };

            let principal = &resolved;
            match throttle
                .call("add_group_member", move || dest.add_group_member(target, principal))
                .await
            {
                Ok(()) => added += 1,
                Err(e) => {
                    audit.record(EntityKind::Member, member_key, e.outcome(), e.to_string());
                    failed += 1;
                }
            }
        }

        let detail = format!(
            "merged from '{}': {added} added, {failed} not added",
            source_group.title
        );
        if failed == 0 {
            audit.success(EntityKind::AssociatedGroup, key, detail);
        } else {
            audit.warning(EntityKind::AssociatedGroup, key, detail);
        }
        tracing::info!(
            role = role.label(),
            group = target,
            added,
            failed,
            "Merged associated group"
        );
        added_total += added;
    }

    added_total
}

/// Warn when the destination owners group lacks Full Control
///
/// Detection only; nothing is repaired. Returns whether the check passed.
pub fn check_owner_full_control(dest_set: &AssociatedGroupSet, audit: &mut AuditLog) -> bool {
    let Some(owner) = dest_set.owner.as_ref() else {
        return true;
    };
    if owner.has_role(FULL_CONTROL) {
        return true;
    }
    tracing::warn!(group = %owner.title, "Owners group does not hold {}", FULL_CONTROL);
    audit.warning(
        EntityKind::AssociatedGroup,
        format!("owner:{}", owner.title),
        format!("owners group does not hold {FULL_CONTROL}"),
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use permigrate_model::Group;

    fn set(owner: &str, member: &str) -> AssociatedGroupSet {
        AssociatedGroupSet {
            owner: Some(Group::new(owner)),
            member: Some(Group::new(member)),
            visitor: None,
        }
    }

    #[test]
    fn title_map_pairs_differing_roles() {
        let map =
            AssociatedTitleMap::new(&set("A Owners", "A Members"), &set("B Owners", "A Members"));
        assert_eq!(map.translate("A Owners"), "B Owners");
        assert_eq!(map.translate("A Members"), "A Members");
        assert_eq!(map.translate("Editors"), "Editors");
    }

    #[test]
    fn identical_sets_need_no_translation() {
        let map = AssociatedTitleMap::new(&set("Owners", "Members"), &set("Owners", "Members"));
        assert!(map.is_empty());
    }

    #[test]
    fn principal_translation_ignores_users() {
        let map = AssociatedTitleMap::new(&set("A Owners", "x"), &set("B Owners", "x"));
        let user = PrincipalRef::user("A Owners");
        assert_eq!(map.translate_principal(&user).login_name, "A Owners");
        let group = PrincipalRef::group("A Owners");
        assert_eq!(map.translate_principal(&group).login_name, "B Owners");
    }

    #[test]
    fn missing_full_control_is_warned() {
        let mut audit = AuditLog::new();
        let dest = AssociatedGroupSet {
            owner: Some(Group::new("Owners").with_role("Edit")),
            ..AssociatedGroupSet::default()
        };
        assert!(!check_owner_full_control(&dest, &mut audit));
        assert_eq!(audit.counts().warning, 1);

        let ok = AssociatedGroupSet {
            owner: Some(Group::new("Owners").with_role(FULL_CONTROL)),
            ..AssociatedGroupSet::default()
        };
        assert!(check_owner_full_control(&ok, &mut AuditLog::new()));
    }
}
