//! Broken-inheritance scan and remediation
//!
//! The scanner walks every visible list on the source node and, for lists
//! that support folders, the full folder hierarchy in depth-first
//! pre-order. Containers with explicit permissions are captured together
//! with their role assignments. The applier replays those captures on the
//! destination through the plan's remap rule.

use crate::associated::AssociatedTitleMap;
use crate::config::MigrationConfig;
use crate::error::MigrationError;
use crate::port::{Confirmation, ConfirmationRequest, FolderInfo, SiteSession};
use crate::retry::ThrottlePolicy;
use permigrate_model::{
    AuditLog, ContainerItem, ContainerKind, EntityKind, PermissionAssignment, PrincipalRef,
    RemapRule, Remapped,
};
use std::collections::HashSet;
use uuid::Uuid;

/// Folder names never descended into
pub const DEFAULT_FOLDER_SKIP_LIST: &[&str] =
    &["Forms", "Attachments", "_cts", "_private", "_vti_history", "Item"];

/// Finds lists and folders with explicit permissions
#[derive(Debug, Clone)]
pub struct BrokenInheritanceScanner {
    excluded: HashSet<String>,
    skip: HashSet<String>,
    throttle: ThrottlePolicy,
}

impl BrokenInheritanceScanner {
    /// Scanner honoring the configured exclusions and skip list
    #[must_use]
    pub fn new(config: &MigrationConfig) -> Self {
        Self {
            excluded: config.excluded_containers.iter().cloned().collect(),
            skip: config.folder_skip_list.iter().cloned().collect(),
            throttle: config.throttle(),
        }
    }

    /// Capture every container with explicit permissions
    ///
    /// Hidden lists are ignored; excluded lists are recorded as skipped.
    /// Folder enumeration and assignment read failures are recorded as
    /// warnings and the walk continues.
    ///
    /// # Errors
    /// Returns [`MigrationError::EnumerationFailed`] if the list of
    /// containers cannot be read.
    pub async fn scan(
        &self,
        session: &dyn SiteSession,
        audit: &mut AuditLog,
    ) -> Result<Vec<ContainerItem>, MigrationError> {
        let lists = self
            .throttle
            .call("list_containers", move || session.list_containers())
            .await
            .map_err(|e| MigrationError::enumeration("containers", &session.node().url, e))?;

        let mut items = Vec::new();
        for list in lists {
            if list.hidden {
                tracing::trace!(list = %list.title, "Skipping hidden list");
                continue;
            }
            if self.excluded.contains(&list.title) {
                audit.skipped(EntityKind::Container, &list.path, "excluded by configuration");
                continue;
            }

            if list.has_unique_role_assignments {
                if let Some(item) = self
                    .capture(session, ContainerKind::List, &list.title, &list.path, None, audit)
                    .await
                {
                    items.push(item);
                }
            }
            if !list.supports_folders {
                continue;
            }

            let mut stack = self.children(session, &list.path, audit).await;
            while let Some(folder) = stack.pop() {
                if folder.has_unique_role_assignments {
                    if let Some(item) = self
                        .capture(
                            session,
                            ContainerKind::Folder,
                            &folder.name,
                            &folder.path,
                            Some(list.id),
                            audit,
                        )
                        .await
                    {
                        items.push(item);
                    }
                }
                stack.extend(self.children(session, &folder.path, audit).await);
            }
        }

        tracing::info!(
            url = %session.node().url,
            found = items.len(),
            "Scanned for broken inheritance"
        );
        Ok(items)
    }

    /// Child folders of `parent`, minus the skip list, reversed for stack order
    async fn children(
        &self,
        session: &dyn SiteSession,
        parent: &str,
        audit: &mut AuditLog,
    ) -> Vec<FolderInfo> {
        match self
            .throttle
            .call("list_folders", move || session.list_folders(parent))
            .await
        {
            Ok(folders) => folders
                .into_iter()
                .filter(|f| !self.skip.contains(&f.name))
                .rev()
                .collect(),
            Err(e) => {
                audit.warning(
                    EntityKind::Container,
                    parent,
                    format!("could not list folders: {e}"),
                );
                Vec::new()
            }
        }
    }

    async fn capture(
        &self,
        session: &dyn SiteSession,
        kind: ContainerKind,
        title: &str,
        path: &str,
        parent_container_id: Option<Uuid>,
        audit: &mut AuditLog,
    ) -> Option<ContainerItem> {
        match self
            .throttle
            .call("role_assignments", move || session.role_assignments(path))
            .await
        {
            Ok(assignments) => Some(ContainerItem {
                kind,
                title: title.to_string(),
                path: path.to_string(),
                has_unique_role_assignments: true,
                assignments,
                parent_container_id,
            }),
            Err(e) => {
                audit.warning(
                    EntityKind::Container,
                    path,
                    format!("could not read role assignments: {e}"),
                );
                None
            }
        }
    }
}

/// Replays captured containers on the destination
pub struct ContainerApplier<'a> {
    rule: &'a RemapRule,
    titles: &'a AssociatedTitleMap,
    confirmation: &'a dyn Confirmation,
    throttle: ThrottlePolicy,
}

impl<'a> ContainerApplier<'a> {
    /// Applier for one plan
    #[must_use]
    pub fn new(
        rule: &'a RemapRule,
        titles: &'a AssociatedTitleMap,
        confirmation: &'a dyn Confirmation,
        throttle: ThrottlePolicy,
    ) -> Self {
        Self {
            rule,
            titles,
            confirmation,
            throttle,
        }
    }

    /// Break inheritance and apply grants for each item, in scan order
    ///
    /// Returns the number of containers remediated without any failure.
    pub async fn apply(
        &self,
        dest: &dyn SiteSession,
        items: &[ContainerItem],
        audit: &mut AuditLog,
    ) -> usize {
        let mut applied = 0;
        for item in items {
            if self.apply_one(dest, item, audit).await {
                applied += 1;
            }
        }
        applied
    }

    /// Copyable (principal, role) grants of an item
    ///
    /// Individual user assignments and service-managed levels are dropped;
    /// group principals are translated to destination associated titles.
    #[must_use]
    pub fn grants(&self, item: &ContainerItem) -> Vec<(PrincipalRef, String)> {
        item.assignments
            .iter()
            .filter(|a| !a.principal.is_user())
            .flat_map(|a| {
                let principal = self.titles.translate_principal(&a.principal);
                a.copyable_roles()
                    .map(move |role| (principal.clone(), role.to_string()))
            })
            .collect()
    }

    async fn apply_one(
        &self,
        dest: &dyn SiteSession,
        item: &ContainerItem,
        audit: &mut AuditLog,
    ) -> bool {
        let dest_path = match self.rule.remap(&item.path) {
            Remapped::Mapped(p) => p,
            Remapped::Unmapped(p) => {
                audit.warning(EntityKind::Container, p, "path is outside the source root");
                return false;
            }
        };

        let users = item.assignments.iter().filter(|a| a.principal.is_user()).count();
        if users > 0 {
            tracing::debug!(path = %dest_path, users, "Not copying individual user assignments");
        }
        let grants = self.grants(item);

        let request = ConfirmationRequest::RemediateContainer {
            path: dest_path.clone(),
            grants: grants.len(),
        };
        if !self.confirmation.confirm(&request) {
            audit.skipped(EntityKind::Container, dest_path, "declined by operator");
            return false;
        }

        let path = dest_path.as_str();
        let existing = match self
            .throttle
            .call("role_assignments", move || dest.role_assignments(path))
            .await
        {
            Ok(existing) => existing,
            Err(e) if e.is_not_found() => {
                audit.skipped(
                    EntityKind::Container,
                    dest_path,
                    format!("destination container does not exist: {e}"),
                );
                return false;
            }
            Err(e) => {
                audit.failed(EntityKind::Container, dest_path, e.to_string());
                return false;
            }
        };

        if let Err(e) = self
            .throttle
            .call("break_inheritance", move || dest.break_inheritance(path))
            .await
        {
            audit.failed(
                EntityKind::Container,
                dest_path,
                format!("could not break inheritance: {e}"),
            );
            return false;
        }

        let mut granted = 0;
        let mut present = 0;
        let mut failed = 0;
        for (principal, role) in &grants {
            if holds_role(&existing, &principal.login_name, role) {
                present += 1;
                continue;
            }
            let role_name = role.as_str();
            match self
                .throttle
                .call("grant_item_role", move || dest.grant_item_role(path, principal, role_name))
                .await
            {
                Ok(()) => granted += 1,
                Err(e) => {
                    failed += 1;
                    audit.record(
                        EntityKind::PermissionLevel,
                        format!("{dest_path}:{}/{role}", principal.login_name),
                        e.outcome(),
                        e.to_string(),
                    );
                }
            }
        }

        let detail = format!(
            "{} '{}': inheritance broken, {granted} granted, {present} already present, \
             {failed} failed",
            kind_label(item.kind),
            item.title
        );
        if failed == 0 {
            audit.success(EntityKind::Container, dest_path, detail);
            true
        } else {
            audit.warning(EntityKind::Container, dest_path, detail);
            false
        }
    }
}

fn holds_role(assignments: &[PermissionAssignment], login_name: &str, role: &str) -> bool {
    assignments
        .iter()
        .any(|a| a.principal.login_name == login_name && a.role_names.iter().any(|r| r == role))
}

fn kind_label(kind: ContainerKind) -> &'static str {
    match kind {
        ContainerKind::List => "list",
        ContainerKind::Folder => "folder",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::MockConfirmation;
    use permigrate_model::LIMITED_ACCESS;

    fn item(assignments: Vec<PermissionAssignment>) -> ContainerItem {
        ContainerItem {
            kind: ContainerKind::Folder,
            title: "Q1".into(),
            path: "/sites/a/Docs/Q1".into(),
            has_unique_role_assignments: true,
            assignments,
            parent_container_id: None,
        }
    }

    #[test]
    fn default_skip_list_covers_system_folders() {
        let config = MigrationConfig::default();
        let scanner = BrokenInheritanceScanner::new(&config);
        for name in ["Forms", "Attachments", "_cts", "_private", "_vti_history", "Item"] {
            assert!(scanner.skip.contains(name), "{name}");
        }
    }

    #[test]
    fn grants_drop_users_and_limited_access() {
        let rule = RemapRule::new("/sites/a", "/sites/b");
        let titles = AssociatedTitleMap::default();
        let mut confirm = MockConfirmation::new();
        confirm.expect_confirm().never();
        let applier = ContainerApplier::new(&rule, &titles, &confirm, ThrottlePolicy::default());

        let grants = applier.grants(&item(vec![
            PermissionAssignment::new(
                PrincipalRef::group("Editors"),
                vec!["Contribute".into(), LIMITED_ACCESS.into()],
            ),
            PermissionAssignment::new(PrincipalRef::user("ann"), vec!["Read".into()]),
            PermissionAssignment::new(
                PrincipalRef::security_group("c:0t.c|tenant|x"),
                vec!["Read".into()],
            ),
        ]));

        assert_eq!(grants.len(), 2);
        assert_eq!(grants[0], (PrincipalRef::group("Editors"), "Contribute".to_string()));
        assert_eq!(grants[1].1, "Read");
    }

    #[test]
    fn holds_role_matches_login_and_role() {
        let existing = vec![PermissionAssignment::new(
            PrincipalRef::group("Editors"),
            vec!["Read".into()],
        )];
        assert!(holds_role(&existing, "Editors", "Read"));
        assert!(!holds_role(&existing, "Editors", "Contribute"));
        assert!(!holds_role(&existing, "Readers", "Read"));
    }
}
