//! Migration engine
//!
//! [`MigrationEngine`] runs one plan through the fixed pipeline:
//!
//! 1. Operator confirmation
//! 2. Connect to both nodes (with retry); wrap the destination for dry runs
//! 3. Discover groups and associated groups on both sides
//! 4. Create missing groups, then assign owners
//! 5. Merge associated-group membership and check owner rights
//! 6. Scan the source for broken inheritance and replay it on the destination
//!
//! [`MigrationEngine::run`] does this for the root pair and then, when
//! enabled, for every paired subsite.

use crate::associated::{
    check_owner_full_control, merge_associated, read_associated, AssociatedTitleMap,
};
use crate::config::MigrationConfig;
use crate::discovery::{diff_groups, discover_groups, GroupFilter};
use crate::dry_run::DryRunSession;
use crate::error::MigrationError;
use crate::orchestrator::GroupOrchestrator;
use crate::port::{AutoApprove, Confirmation, ConfirmationRequest, RemoteAccess, SiteSession};
use crate::retry::connect_with_retry;
use crate::scanner::{BrokenInheritanceScanner, ContainerApplier};
use crate::subsite::{enumerate_descendants, is_below_any, match_subsites};
use permigrate_model::{AuditLog, EntityKind, Group, MigrationPlan, OutcomeCounts, RunId};
use serde::Serialize;
use std::sync::Arc;

/// What happened to one node pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    /// Source node URL
    pub source: String,
    /// Destination node URL
    pub dest: String,
    /// Operator declined the pair
    pub declined: bool,
    /// Groups missing on the destination
    pub groups_requested: usize,
    /// Groups created
    pub groups_created: usize,
    /// Owners assigned
    pub owners_set: usize,
    /// Members merged into associated groups
    pub associated_members_added: usize,
    /// Containers with explicit permissions found on the source
    pub containers_scanned: usize,
    /// Containers remediated without failure
    pub containers_applied: usize,
    /// Group-creation progress milestones
    pub milestones: Vec<usize>,
    /// Mutating calls suppressed by dry-run mode
    pub suppressed_writes: usize,
}

impl NodeSummary {
    fn for_plan(plan: &MigrationPlan) -> Self {
        Self {
            source: plan.source().url.clone(),
            dest: plan.dest().url.clone(),
            ..Self::default()
        }
    }
}

/// Result of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    /// Run identifier
    pub run_id: RunId,
    /// Whether mutations were suppressed
    pub dry_run: bool,
    /// Node pairs in processing order
    pub nodes: Vec<NodeSummary>,
    /// Source subsites with no destination counterpart
    pub unmatched_subsites: Vec<String>,
    /// Every recorded outcome
    pub audit: AuditLog,
}

impl MigrationReport {
    /// Outcome totals
    #[inline]
    #[must_use]
    pub fn counts(&self) -> OutcomeCounts {
        self.audit.counts()
    }

    /// Whether any entity failed
    #[inline]
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.counts().failed > 0
    }

    /// Audit records as JSON lines
    ///
    /// # Errors
    /// Propagates serializer failures.
    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        self.audit.to_json_lines()
    }
}

/// Destination session, live or dry-run wrapped
enum Destination {
    Live(Box<dyn SiteSession>),
    DryRun(DryRunSession),
}

impl Destination {
    fn session(&self) -> &dyn SiteSession {
        match self {
            Self::Live(s) => s.as_ref(),
            Self::DryRun(s) => s,
        }
    }

    fn suppressed(&self) -> usize {
        match self {
            Self::Live(_) => 0,
            Self::DryRun(s) => s.intercepted(),
        }
    }
}

/// Permission migration engine
pub struct MigrationEngine {
    remote: Arc<dyn RemoteAccess>,
    config: MigrationConfig,
    confirmation: Arc<dyn Confirmation>,
}

impl MigrationEngine {
    /// Engine over `remote` that approves every step
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteAccess>, config: MigrationConfig) -> Self {
        Self {
            remote,
            config,
            confirmation: Arc::new(AutoApprove),
        }
    }

    /// With operator confirmation
    #[must_use]
    pub fn with_confirmation(mut self, confirmation: Arc<dyn Confirmation>) -> Self {
        self.confirmation = confirmation;
        self
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Migrate `source_root` into `dest_root`, then paired subsites
    ///
    /// Failures below the root pair are recorded in the report; a failing
    /// subsite halts only its own subtree.
    ///
    /// # Errors
    /// Returns an error if the configuration or plan is invalid. If the root
    /// pair fails partway, returns [`MigrationError::Halted`] carrying every
    /// outcome recorded up to the failure.
    pub async fn run(
        &self,
        source_root: &str,
        dest_root: &str,
    ) -> Result<MigrationReport, MigrationError> {
        self.config.validate()?;
        let plan = MigrationPlan::for_roots(source_root, dest_root)?;
        let mut audit = AuditLog::new();
        tracing::info!(
            run_id = %audit.run_id(),
            source = source_root,
            dest = dest_root,
            dry_run = self.config.dry_run,
            "Starting migration"
        );

        let root = match self.migrate_plan(&plan, &mut audit).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!(source = %plan.source().url, "Root migration halted: {}", e);
                audit.failed(EntityKind::Node, &plan.source().url, e.to_string());
                return Err(MigrationError::halted(e, audit));
            }
        };
        let mut report = MigrationReport {
            run_id: audit.run_id(),
            dry_run: self.config.dry_run,
            nodes: vec![root],
            unmatched_subsites: Vec::new(),
            audit: AuditLog::default(),
        };

        if self.config.include_subsites && !report.nodes[0].declined {
            self.migrate_subsites(&plan, &mut report, &mut audit).await;
        }

        report.audit = audit;
        let counts = report.counts();
        tracing::info!(
            run_id = %report.run_id,
            nodes = report.nodes.len(),
            success = counts.success,
            failed = counts.failed,
            skipped = counts.skipped,
            warning = counts.warning,
            "Migration finished"
        );
        Ok(report)
    }

    async fn connect_pair(
        &self,
        plan: &MigrationPlan,
    ) -> Result<(Box<dyn SiteSession>, Box<dyn SiteSession>), MigrationError> {
        let remote = self.remote.as_ref();
        let source = connect_with_retry(remote, &plan.source().url, &self.config.connect).await?;
        let dest = connect_with_retry(remote, &plan.dest().url, &self.config.connect).await?;
        Ok((source, dest))
    }

    async fn migrate_subsites(
        &self,
        root: &MigrationPlan,
        report: &mut MigrationReport,
        audit: &mut AuditLog,
    ) {
        let throttle = self.config.throttle();
        let (source, dest) = match self.connect_pair(root).await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::error!(source = %root.source().url, "Subsite pairing aborted: {}", e);
                audit.failed(
                    EntityKind::Subsite,
                    &root.source().url,
                    format!("could not reconnect to pair subsites: {e}"),
                );
                return;
            }
        };

        let source_nodes = enumerate_descendants(source.as_ref(), root.source(), &throttle).await;
        let enumerated = match source_nodes {
            Ok(nodes) => enumerate_descendants(dest.as_ref(), root.dest(), &throttle)
                .await
                .map(|dest_nodes| (nodes, dest_nodes)),
            Err(e) => Err(e),
        };
        let (source_nodes, dest_nodes) = match enumerated {
            Ok(pair) => pair,
            Err(e) => {
                tracing::error!(source = %root.source().url, "Subsite enumeration failed: {}", e);
                audit.failed(
                    EntityKind::Subsite,
                    &root.source().url,
                    format!("could not enumerate subsites: {e}"),
                );
                return;
            }
        };

        let matched = match_subsites(root.rule(), &source_nodes, &dest_nodes);
        tracing::info!(
            pairs = matched.pairs.len(),
            unmatched = matched.unmatched.len(),
            "Paired subsites"
        );
        for node in &matched.unmatched {
            audit.warning(
                EntityKind::Subsite,
                &node.url,
                "no matching destination subsite; create it and rerun",
            );
            report.unmatched_subsites.push(node.url.clone());
        }

        let mut failed_roots: Vec<String> = Vec::new();
        for (source_node, dest_node) in matched.pairs {
            let source_path = source_node.path();
            if is_below_any(&source_path, &failed_roots) {
                audit.skipped(EntityKind::Node, &source_node.url, "parent node failed");
                continue;
            }

            let source_url = source_node.url.clone();
            let outcome = match MigrationPlan::new(source_node, dest_node) {
                Ok(plan) => self.migrate_plan(&plan, audit).await,
                Err(e) => Err(e.into()),
            };
            match outcome {
                Ok(summary) => report.nodes.push(summary),
                Err(e) => {
                    tracing::error!(source = %source_url, "Subsite migration failed: {}", e);
                    audit.failed(EntityKind::Node, &source_url, e.to_string());
                    failed_roots.push(source_path);
                }
            }
        }
    }

    /// Run the full pipeline for one node pair
    ///
    /// # Errors
    /// Returns an error if either node cannot be connected, or if groups,
    /// associated groups, or containers cannot be enumerated.
    pub async fn migrate_plan(
        &self,
        plan: &MigrationPlan,
        audit: &mut AuditLog,
    ) -> Result<NodeSummary, MigrationError> {
        let mut summary = NodeSummary::for_plan(plan);
        let request = ConfirmationRequest::MigratePlan {
            source: summary.source.clone(),
            dest: summary.dest.clone(),
        };
        if !self.confirmation.confirm(&request) {
            audit.skipped(EntityKind::Node, &summary.source, "declined by operator");
            summary.declined = true;
            return Ok(summary);
        }
        tracing::info!(source = %summary.source, dest = %summary.dest, "Migrating node");

        let throttle = self.config.throttle();
        let (source, live) = self.connect_pair(plan).await?;
        let destination = if self.config.dry_run {
            Destination::DryRun(DryRunSession::new(live))
        } else {
            Destination::Live(live)
        };
        let dest = destination.session();

        let filter = GroupFilter::new(self.config.extra_system_group_prefixes.clone());
        let source_groups = discover_groups(source.as_ref(), &filter, &throttle).await?;
        let dest_groups = discover_groups(dest, &filter, &throttle).await?;
        let source_associated = read_associated(source.as_ref(), &throttle).await?;
        let dest_associated = read_associated(dest, &throttle).await?;
        let titles = AssociatedTitleMap::new(&source_associated, &dest_associated);

        let missing: Vec<Group> = diff_groups(&source_groups, &dest_groups, &source_associated)
            .iter()
            .filter_map(|title| source_groups.iter().find(|g| &g.title == title).cloned())
            .collect();
        summary.groups_requested = missing.len();

        let outcome = GroupOrchestrator::new(dest, &self.config, &titles)
            .run(&missing, audit)
            .await;
        summary.groups_created = outcome.created.len();
        summary.owners_set = outcome.owners_set;
        summary.milestones = outcome.milestones;

        summary.associated_members_added = merge_associated(
            dest,
            &source_associated,
            &dest_associated,
            &titles,
            &throttle,
            audit,
        )
        .await;
        check_owner_full_control(&dest_associated, audit);

        let items = BrokenInheritanceScanner::new(&self.config)
            .scan(source.as_ref(), audit)
            .await?;
        summary.containers_scanned = items.len();
        let confirmation = self.confirmation.as_ref();
        let applier = ContainerApplier::new(plan.rule(), &titles, confirmation, throttle);
        summary.containers_applied = applier.apply(dest, &items, audit).await;

        summary.suppressed_writes = destination.suppressed();
        audit.success(
            EntityKind::Node,
            &summary.source,
            format!("migrated to {}", summary.dest),
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for MigrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryTenant, SiteState};
    use crate::port::MockConfirmation;
    use crate::retry::RetryPolicy;
    use permigrate_model::{Node, Outcome};

    fn tenant() -> InMemoryTenant {
        InMemoryTenant::new()
            .with_site(
                SiteState::new(Node::new("/sites/a", "A")).with_group(Group::new("Editors")),
            )
            .with_site(SiteState::new(Node::new("/sites/b", "B")))
    }

    fn config() -> MigrationConfig {
        MigrationConfig::default()
            .without_delays()
            .with_connect_policy(RetryPolicy::immediate(3))
    }

    #[tokio::test]
    async fn declined_plan_is_skipped_without_connecting() {
        let tenant = tenant();
        let mut confirm = MockConfirmation::new();
        confirm.expect_confirm().times(1).return_const(false);

        let engine = MigrationEngine::new(Arc::new(tenant.clone()), config())
            .with_confirmation(Arc::new(confirm));
        let report = engine.run("/sites/a", "/sites/b").await.unwrap();

        assert!(report.nodes[0].declined);
        assert_eq!(tenant.stats().connects, 0);
        assert_eq!(
            report.audit.find(EntityKind::Node, "/sites/a").unwrap().outcome,
            Outcome::Skipped
        );
    }

    #[tokio::test]
    async fn unreachable_root_is_an_error() {
        let tenant = tenant();
        tenant.make_unreachable("/sites/b");
        let engine = MigrationEngine::new(Arc::new(tenant.clone()), config());

        let err = engine.run("/sites/a", "/sites/b").await.unwrap_err();
        assert!(matches!(err.cause(), MigrationError::ConnectionFailed { attempts: 3, .. }));
        let node = err.audit().and_then(|a| a.find(EntityKind::Node, "/sites/a")).unwrap();
        assert_eq!(node.outcome, Outcome::Failed);
    }

    #[tokio::test]
    async fn empty_root_url_is_invalid() {
        let engine = MigrationEngine::new(Arc::new(tenant()), config());
        let err = engine.run("", "/sites/b").await.unwrap_err();
        assert!(matches!(err, MigrationError::InvalidPlan(_)));
    }
}
