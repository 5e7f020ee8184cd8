//! Two-phase group creation
//!
//! Pass 1 creates every missing group and copies its members and
//! permission levels. Pass 2 assigns owners, only for groups this run
//! created, once every group that could be an owner exists. Creation is
//! paced in batches with a pause between them.

use crate::associated::AssociatedTitleMap;
use crate::config::MigrationConfig;
use crate::port::SiteSession;
use crate::progress::Progress;
use crate::retry::ThrottlePolicy;
use indexmap::IndexSet;
use permigrate_model::{AuditLog, EntityKind, Group};
use std::time::Duration;

/// Result of one orchestration run
#[derive(Debug, Clone, Default)]
pub struct OrchestrationOutcome {
    /// Titles created in this run, in creation order
    pub created: IndexSet<String>,
    /// Progress milestones reported during pass 1
    pub milestones: Vec<usize>,
    /// Owners assigned in pass 2
    pub owners_set: usize,
}

/// Creates missing groups on the destination
pub struct GroupOrchestrator<'a> {
    dest: &'a dyn SiteSession,
    titles: &'a AssociatedTitleMap,
    throttle: ThrottlePolicy,
    batch_size: usize,
    batch_pause: Duration,
    progress_threshold: usize,
}

impl<'a> GroupOrchestrator<'a> {
    /// Orchestrator writing to `dest`
    #[must_use]
    pub fn new(
        dest: &'a dyn SiteSession,
        config: &MigrationConfig,
        titles: &'a AssociatedTitleMap,
    ) -> Self {
        Self {
            dest,
            titles,
            throttle: config.throttle(),
            batch_size: config.batch_size.max(1),
            batch_pause: config.batch_pause(),
            progress_threshold: config.progress_threshold,
        }
    }

    /// Create `groups` (source definitions, in order), then assign owners
    pub async fn run(&self, groups: &[Group], audit: &mut AuditLog) -> OrchestrationOutcome {
        let total = groups.len();
        let mut created = IndexSet::new();
        let mut progress = Progress::new("groups", total, self.progress_threshold);

        tracing::info!(total, "Creating missing groups");
        for (i, group) in groups.iter().enumerate() {
            let index = i + 1;
            if self.create(group, audit).await {
                created.insert(group.title.clone());
                self.copy_members(group, audit).await;
                self.copy_roles(group, audit).await;
            }
            progress.tick(index);

            if index % self.batch_size == 0 && index < total && !self.batch_pause.is_zero() {
                tracing::debug!(index, pause_ms = ?self.batch_pause, "Pausing between batches");
                tokio::time::sleep(self.batch_pause).await;
            }
        }

        let owners_set = self.assign_owners(groups, &created, audit).await;
        OrchestrationOutcome {
            created,
            milestones: progress.into_milestones(),
            owners_set,
        }
    }

    async fn create(&self, group: &Group, audit: &mut AuditLog) -> bool {
        let dest = self.dest;
        let title = group.title.as_str();
        let description = group.description.as_str();
        match self
            .throttle
            .call("create_group", move || dest.create_group(title, description))
            .await
        {
            Ok(()) => {
                audit.success(EntityKind::Group, title, "created");
                true
            }
            Err(e @ crate::error::RemoteError::AlreadyExists(_)) => {
                audit.skipped(EntityKind::Group, title, e.to_string());
                false
            }
            Err(e) => {
                tracing::warn!(group = title, "Create failed: {}", e);
                audit.failed(EntityKind::Group, title, e.to_string());
                false
            }
        }
    }

    async fn copy_members(&self, group: &Group, audit: &mut AuditLog) {
        let dest = self.dest;
        let title = group.title.as_str();
        let mut added = 0;
        let mut failed = 0;

        for member in &group.members {
            let principal = self.titles.translate_principal(member);
            let login = principal.login_name.as_str();
            let key = format!("{title}/{login}");

            let resolved = match self
                .throttle
                .call("resolve_principal", move || dest.resolve_principal(login))
                .await
            {
                Ok(p) => p,
                Err(e) => {
                    audit.record(EntityKind::Member, key, e.outcome(), e.to_string());
                    failed += 1;
                    continue;
                }
            };

            let resolved = &resolved;
            match self
                .throttle
                .call("add_group_member", move || dest.add_group_member(title, resolved))
                .await
            {
                Ok(()) => added += 1,
                Err(e) => {
                    audit.record(EntityKind::Member, key, e.outcome(), e.to_string());
                    failed += 1;
                }
            }
        }

        let detail = format!("{added} of {} member(s) added", group.members.len());
        if failed == 0 {
            audit.success(EntityKind::Membership, title, detail);
        } else {
            audit.warning(EntityKind::Membership, title, detail);
        }
    }

    async fn copy_roles(&self, group: &Group, audit: &mut AuditLog) {
        let dest = self.dest;
        let title = group.title.as_str();
        let mut granted = 0;
        let mut failed = 0;

        let roles: Vec<&str> = group
            .permission_levels
            .iter()
            .map(String::as_str)
            .filter(|r| *r != permigrate_model::LIMITED_ACCESS)
            .collect();

        for &role in &roles {
            match self
                .throttle
                .call("grant_group_role", move || dest.grant_group_role(title, role))
                .await
            {
                Ok(()) => granted += 1,
                Err(e) => {
                    audit.record(
                        EntityKind::PermissionLevel,
                        format!("{title}/{role}"),
                        e.outcome(),
                        e.to_string(),
                    );
                    failed += 1;
                }
            }
        }

        let detail = format!("{granted} of {} permission level(s) granted", roles.len());
        if failed == 0 {
            audit.success(EntityKind::PermissionLevel, title, detail);
        } else {
            audit.warning(EntityKind::PermissionLevel, title, detail);
        }
    }

    async fn assign_owners(
        &self,
        groups: &[Group],
        created: &IndexSet<String>,
        audit: &mut AuditLog,
    ) -> usize {
        let dest = self.dest;
        let batch: IndexSet<&str> = groups.iter().map(|g| g.title.as_str()).collect();
        let mut assigned = 0;

        for group in groups {
            let title = group.title.as_str();
            if !created.contains(title) {
                continue;
            }
            if !group.has_owner() {
                audit.skipped(EntityKind::Owner, title, "no owner specified");
                continue;
            }

            let declared = group.owner_title.as_str();
            if batch.contains(declared) && !created.contains(declared) {
                audit.skipped(
                    EntityKind::Owner,
                    title,
                    format!("owner group '{declared}' was not created"),
                );
                continue;
            }

            let owner = self.titles.translate(declared);
            match self
                .throttle
                .call("set_group_owner", move || dest.set_group_owner(title, owner))
                .await
            {
                Ok(()) => {
                    assigned += 1;
                    audit.success(EntityKind::Owner, title, format!("owner set to '{owner}'"));
                }
                Err(e) => {
                    tracing::warn!(group = title, owner, "Owner not set: {}", e);
                    audit.warning(
                        EntityKind::Owner,
                        title,
                        format!("could not set owner '{owner}': {e}"),
                    );
                }
            }
        }

        assigned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::memory::{InMemoryTenant, Operation, SiteState};
    use crate::port::RemoteAccess;
    use permigrate_model::{Node, Outcome, PrincipalRef};

    fn tenant() -> InMemoryTenant {
        InMemoryTenant::new()
            .with_site(SiteState::new(Node::new("/sites/dest", "Dest")))
            .with_principal(PrincipalRef::user("ann"))
    }

    fn config() -> MigrationConfig {
        MigrationConfig::default().without_delays()
    }

    #[tokio::test]
    async fn owner_created_later_in_batch_is_assigned() {
        let tenant = tenant();
        let session = tenant.connect("/sites/dest").await.unwrap();
        let titles = AssociatedTitleMap::default();
        let mut audit = AuditLog::new();

        let groups = vec![Group::new("B").with_owner("A"), Group::new("A")];
        let outcome = GroupOrchestrator::new(session.as_ref(), &config(), &titles)
            .run(&groups, &mut audit)
            .await;

        assert_eq!(outcome.created.len(), 2);
        assert_eq!(outcome.owners_set, 1);
        assert_eq!(tenant.group("/sites/dest", "B").unwrap().owner_title, "A");
        assert_eq!(audit.find(EntityKind::Owner, "A").unwrap().outcome, Outcome::Skipped);
    }

    #[tokio::test]
    async fn owner_that_failed_creation_is_skipped() {
        let tenant = tenant();
        tenant.fail(Operation::CreateGroup, "A", RemoteError::AccessDenied("denied".into()));
        let session = tenant.connect("/sites/dest").await.unwrap();
        let titles = AssociatedTitleMap::default();
        let mut audit = AuditLog::new();

        let groups = vec![Group::new("A"), Group::new("B").with_owner("A")];
        let outcome = GroupOrchestrator::new(session.as_ref(), &config(), &titles)
            .run(&groups, &mut audit)
            .await;

        assert_eq!(outcome.created.iter().collect::<Vec<_>>(), vec!["B"]);
        assert_eq!(audit.find(EntityKind::Group, "A").unwrap().outcome, Outcome::Failed);
        let owner = audit.find(EntityKind::Owner, "B").unwrap();
        assert_eq!(owner.outcome, Outcome::Skipped);
        assert!(owner.detail.contains("was not created"));
        assert_eq!(tenant.group("/sites/dest", "B").unwrap().owner_title, "");
    }

    #[tokio::test]
    async fn existing_group_is_skipped_and_not_owned() {
        let tenant = InMemoryTenant::new().with_site(
            SiteState::new(Node::new("/sites/dest", "Dest")).with_group(Group::new("A")),
        );
        let session = tenant.connect("/sites/dest").await.unwrap();
        let titles = AssociatedTitleMap::default();
        let mut audit = AuditLog::new();

        let outcome = GroupOrchestrator::new(session.as_ref(), &config(), &titles)
            .run(&[Group::new("A").with_owner("ann")], &mut audit)
            .await;

        assert!(outcome.created.is_empty());
        assert_eq!(audit.find(EntityKind::Group, "A").unwrap().outcome, Outcome::Skipped);
        assert!(audit.find(EntityKind::Owner, "A").is_none());
    }

    #[tokio::test]
    async fn members_and_roles_are_copied_without_limited_access() {
        let tenant = tenant();
        tenant.fail(Operation::ResolvePrincipal, "ghost", RemoteError::NotFound("ghost".into()));
        let session = tenant.connect("/sites/dest").await.unwrap();
        let titles = AssociatedTitleMap::default();
        let mut audit = AuditLog::new();

        let group = Group::new("Editors")
            .with_member(PrincipalRef::user("ann"))
            .with_member(PrincipalRef::user("ghost"))
            .with_role("Contribute")
            .with_role(permigrate_model::LIMITED_ACCESS);
        GroupOrchestrator::new(session.as_ref(), &config(), &titles)
            .run(&[group], &mut audit)
            .await;

        let copied = tenant.group("/sites/dest", "Editors").unwrap();
        assert!(copied.has_member("ann"));
        assert!(!copied.has_member("ghost"));
        assert_eq!(copied.permission_levels, vec!["Contribute".to_string()]);
        let ghost = audit.find(EntityKind::Member, "Editors/ghost").unwrap();
        assert_eq!(ghost.outcome, Outcome::Skipped);
        let membership = audit.find(EntityKind::Membership, "Editors").unwrap();
        assert_eq!(membership.outcome, Outcome::Warning);
    }
}
