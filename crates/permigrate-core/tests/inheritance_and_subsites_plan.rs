//! Functional tests for broken-inheritance remediation and subsite pairing.
//!
//! These tests cover the container and hierarchy side of a migration:
//! - The scanner walks lists and folders depth-first and honors the folder
//!   skip list and container exclusions.
//! - Captured grants are replayed under the destination root, including
//!   when a nested source root is promoted to a top-level destination.
//! - A failing subsite halts only its own subtree.

use permigrate_core::prelude::*;
use permigrate_core::{
    AssociatedTitleMap, AutoApprove, BrokenInheritanceScanner, ContainerApplier, ThrottlePolicy,
};
use permigrate_model::{ContainerKind, EntityKind, Outcome, PrincipalRef, RemapRule};
use permigrate_test_utils::{
    flattening_tenant, folder_tree_tenant, grant, quick_config, two_site_tenant, DEST_ROOT,
    FLAT_DEST_ROOT, FLAT_SOURCE_ROOT, SOURCE_ROOT, TREE_ROOT,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

/// Declines every container remediation, approves everything else
struct DeclineContainers;

impl Confirmation for DeclineContainers {
    fn confirm(&self, request: &ConfirmationRequest) -> bool {
        !matches!(request, ConfirmationRequest::RemediateContainer { .. })
    }
}

/// Tenet: the folder walk descends into inheriting folders but never into
/// skip-listed ones.
///
/// `F` inherits, `F/G` is explicit, `F/Forms` is explicit but skipped along
/// with its explicit children: exactly one item is captured, and listing
/// below `F/Forms` would surface as a warning.
#[tokio::test]
async fn scanner_skips_system_folders() {
    let tenant = folder_tree_tenant();
    tenant.fail(
        permigrate_core::Operation::ListFolders,
        "/sites/tree/Docs/F/Forms",
        permigrate_core::RemoteError::AccessDenied("Access denied.".into()),
    );
    let session = tenant.connect(TREE_ROOT).await.expect("tree site connects");
    let mut audit = AuditLog::new();

    let items = BrokenInheritanceScanner::new(&quick_config())
        .scan(session.as_ref(), &mut audit)
        .await
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].path, "/sites/tree/Docs/F/G");
    assert_eq!(items[0].kind, ContainerKind::Folder);
    assert!(items[0].parent_container_id.is_some());
    assert!(audit.is_empty());
}

/// Tenet: scan order is list order, then folder pre-order, and captures
/// carry the assignments read at scan time.
#[tokio::test]
async fn scanner_captures_in_preorder() {
    let tenant = two_site_tenant();
    let session = tenant.connect(SOURCE_ROOT).await.unwrap();
    let mut audit = AuditLog::new();

    let items = BrokenInheritanceScanner::new(&quick_config())
        .scan(session.as_ref(), &mut audit)
        .await
        .unwrap();

    let paths: Vec<_> = items.iter().map(|i| i.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "/sites/alpha/Shared Documents/Finance",
            "/sites/alpha/Shared Documents/Public/Archive",
            "/sites/alpha/Lists/Issues",
        ]
    );
    assert_eq!(items[2].kind, ContainerKind::List);
    assert_eq!(items[0].assignments.len(), 2);
}

/// Tenet: excluded containers are recorded as skipped and not captured.
#[tokio::test]
async fn excluded_containers_are_skipped() {
    let tenant = two_site_tenant();
    let session = tenant.connect(SOURCE_ROOT).await.unwrap();
    let mut audit = AuditLog::new();
    let config = quick_config().with_excluded_containers(vec!["Issues".to_string()]);

    let items = BrokenInheritanceScanner::new(&config)
        .scan(session.as_ref(), &mut audit)
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(
        audit.find(EntityKind::Container, "/sites/alpha/Lists/Issues").unwrap().outcome,
        Outcome::Skipped
    );
}

/// Tenet: unreadable folders produce a warning and the walk continues.
#[tokio::test]
async fn unreadable_folder_is_a_warning() {
    let tenant = two_site_tenant();
    tenant.fail(
        permigrate_core::Operation::ListFolders,
        "/sites/alpha/Shared Documents/Public",
        permigrate_core::RemoteError::AccessDenied("Access denied.".into()),
    );
    let session = tenant.connect(SOURCE_ROOT).await.unwrap();
    let mut audit = AuditLog::new();

    let items = BrokenInheritanceScanner::new(&quick_config())
        .scan(session.as_ref(), &mut audit)
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(audit.counts().warning, 1);
}

/// Tenet: remediation breaks inheritance and grants group roles on the
/// remapped destination path; user grants and Limited Access never copy.
#[tokio::test]
async fn remediation_applies_grants_under_destination_root() {
    let tenant = two_site_tenant();
    let report = MigrationEngine::new(Arc::new(tenant.clone()), quick_config())
        .run(SOURCE_ROOT, DEST_ROOT)
        .await
        .unwrap();

    assert_eq!(report.nodes[0].containers_scanned, 3);
    assert_eq!(report.nodes[0].containers_applied, 3);

    let dest = tenant.site(DEST_ROOT).unwrap();
    let docs = &dest.containers[0];
    let finance = &docs.folders[0];
    assert!(finance.unique);
    assert_eq!(finance.assignments, vec![grant(PrincipalRef::group("Editors"), &["Contribute"])]);

    let forms = &docs.folders[1];
    assert!(!forms.unique);

    let archive = &docs.folders[2].folders[0];
    assert!(archive.unique);
    assert_eq!(archive.assignments, vec![grant(PrincipalRef::group("Readers"), &["Read"])]);

    assert!(dest.containers[1].unique);
}

/// Tenet: a declined container is skipped and left inheriting.
#[tokio::test]
async fn declined_container_is_untouched() {
    let tenant = two_site_tenant();
    let report = MigrationEngine::new(Arc::new(tenant.clone()), quick_config())
        .with_confirmation(Arc::new(DeclineContainers))
        .run(SOURCE_ROOT, DEST_ROOT)
        .await
        .unwrap();

    assert_eq!(report.nodes[0].containers_applied, 0);
    let finance = report
        .audit
        .find(EntityKind::Container, "/sites/beta/Shared Documents/Finance")
        .unwrap();
    assert_eq!(finance.outcome, Outcome::Skipped);
    assert!(!tenant.site(DEST_ROOT).unwrap().containers[0].folders[0].unique);
}

/// Tenet: an item outside the plan's source root is reported, not applied.
#[tokio::test]
async fn unmapped_item_is_a_warning() {
    let tenant = two_site_tenant();
    let dest = tenant.connect(DEST_ROOT).await.unwrap();
    let rule = RemapRule::new(SOURCE_ROOT, DEST_ROOT);
    let titles = AssociatedTitleMap::default();
    let applier = ContainerApplier::new(&rule, &titles, &AutoApprove, ThrottlePolicy::default());
    let item = permigrate_model::ContainerItem {
        kind: ContainerKind::List,
        title: "Elsewhere".into(),
        path: "/sites/other/Elsewhere".into(),
        has_unique_role_assignments: true,
        assignments: Vec::new(),
        parent_container_id: None,
    };
    let mut audit = AuditLog::new();

    let applied = applier.apply(dest.as_ref(), &[item], &mut audit).await;

    assert_eq!(applied, 0);
    assert_eq!(
        audit.find(EntityKind::Container, "/sites/other/Elsewhere").unwrap().outcome,
        Outcome::Warning
    );
    assert_eq!(tenant.stats().mutations, 0);
}

/// Tenet: a nested source root promoted to a top-level destination pairs
/// its children by remapped path, and unmatched children are reported.
#[tokio::test]
async fn flattened_hierarchy_pairs_subsites() {
    let tenant = flattening_tenant();
    let report = MigrationEngine::new(Arc::new(tenant.clone()), quick_config())
        .run(FLAT_SOURCE_ROOT, FLAT_DEST_ROOT)
        .await
        .unwrap();

    let pairs: Vec<_> = report
        .nodes
        .iter()
        .map(|n| (n.source.as_str(), n.dest.as_str()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("/sites/Teams/Audit/NPSG/MAPS", "/sites/MAPS"),
            ("/sites/Teams/Audit/NPSG/MAPS/ProjectA", "/sites/MAPS/ProjectA"),
            ("/sites/Teams/Audit/NPSG/MAPS/ProjectA/Phase1", "/sites/MAPS/ProjectA/Phase1"),
        ]
    );
    assert_eq!(
        report.unmatched_subsites,
        vec!["/sites/Teams/Audit/NPSG/MAPS/Archive".to_string()]
    );
    assert_eq!(
        report
            .audit
            .find(EntityKind::Subsite, "/sites/Teams/Audit/NPSG/MAPS/Archive")
            .unwrap()
            .outcome,
        Outcome::Warning
    );

    let leads = tenant.group("/sites/MAPS/ProjectA", "ProjectA Leads").unwrap();
    assert_eq!(leads.owner_title, "ProjectA Leads");
    let deliverables = &tenant.site("/sites/MAPS/ProjectA").unwrap().containers[0];
    assert!(deliverables.unique);
    assert_eq!(
        deliverables.assignments,
        vec![grant(PrincipalRef::group("ProjectA Leads"), &["Design"])]
    );
    assert!(tenant.group("/sites/MAPS/ProjectA/Phase1", "Phase1 Team").is_some());
    assert!(tenant.site("/sites/MAPS/Archive").is_none());
}

/// Tenet: associated membership merges into a destination group with a
/// different title bound to the same role.
#[tokio::test]
async fn associated_merge_follows_role_not_title() {
    let tenant = flattening_tenant();
    MigrationEngine::new(Arc::new(tenant.clone()), quick_config().with_subsites(false))
        .run(FLAT_SOURCE_ROOT, FLAT_DEST_ROOT)
        .await
        .unwrap();

    let members = tenant.group(FLAT_DEST_ROOT, "MAPS Members (new)").unwrap();
    assert!(members.has_member("ann"));
    assert!(members.has_member("bob"));
    assert!(tenant.group(FLAT_DEST_ROOT, "MAPS Members").is_none());
    assert!(tenant.group(FLAT_DEST_ROOT, "MAPS Reviewers").is_some());
}

/// Tenet: a subsite that cannot be reached fails alone; its descendants
/// are skipped and the root result stands.
#[tokio::test]
async fn unreachable_subsite_halts_only_its_subtree() {
    let tenant = flattening_tenant();
    tenant.make_unreachable("/sites/MAPS/ProjectA");

    let report = MigrationEngine::new(Arc::new(tenant.clone()), quick_config())
        .run(FLAT_SOURCE_ROOT, FLAT_DEST_ROOT)
        .await
        .expect("root pair still migrates");

    assert_eq!(report.nodes.len(), 1);
    let project = report
        .audit
        .find(EntityKind::Node, "/sites/Teams/Audit/NPSG/MAPS/ProjectA")
        .unwrap();
    assert_eq!(project.outcome, Outcome::Failed);
    assert!(project.detail.contains("after 3 attempt(s)"));

    let phase1 = report
        .audit
        .find(EntityKind::Node, "/sites/Teams/Audit/NPSG/MAPS/ProjectA/Phase1")
        .unwrap();
    assert_eq!(phase1.outcome, Outcome::Skipped);
    assert!(tenant.group(FLAT_DEST_ROOT, "MAPS Reviewers").is_some());
}

/// Tenet: transient connect failures within the retry budget are absorbed.
#[tokio::test]
async fn flaky_connect_is_retried() {
    let tenant = two_site_tenant();
    tenant.fail_connects(DEST_ROOT, 2);

    let report = MigrationEngine::new(Arc::new(tenant.clone()), quick_config())
        .run(SOURCE_ROOT, DEST_ROOT)
        .await
        .expect("third attempt connects");

    assert_eq!(report.nodes[0].groups_created, 2);
}

/// Tenet: exhausting the connect budget on the root is a hard error.
#[tokio::test]
async fn root_connect_exhaustion_is_an_error() {
    let tenant = two_site_tenant();
    tenant.fail_connects(SOURCE_ROOT, 3);

    let err = MigrationEngine::new(Arc::new(tenant.clone()), quick_config())
        .run(SOURCE_ROOT, DEST_ROOT)
        .await
        .unwrap_err();

    assert!(matches!(err.cause(), MigrationError::ConnectionFailed { attempts: 3, .. }));
    assert!(err.is_retryable());
}

/// Cuts the source root off once container remediation starts
struct UnplugSourceOnRemediation(InMemoryTenant);

impl Confirmation for UnplugSourceOnRemediation {
    fn confirm(&self, request: &ConfirmationRequest) -> bool {
        if matches!(request, ConfirmationRequest::RemediateContainer { .. }) {
            self.0.make_unreachable(SOURCE_ROOT);
        }
        true
    }
}

/// Tenet: losing the root after its pair has migrated fails subsite
/// pairing only; the root's report and audit trail are still returned.
#[tokio::test]
async fn lost_root_during_subsite_pairing_is_recorded() {
    let tenant = two_site_tenant();
    let report = MigrationEngine::new(Arc::new(tenant.clone()), quick_config())
        .with_confirmation(Arc::new(UnplugSourceOnRemediation(tenant.clone())))
        .run(SOURCE_ROOT, DEST_ROOT)
        .await
        .expect("root pair result is kept");

    assert_eq!(report.nodes.len(), 1);
    assert_eq!(report.nodes[0].groups_created, 2);
    assert_eq!(
        report.audit.find(EntityKind::Node, SOURCE_ROOT).unwrap().outcome,
        Outcome::Success
    );
    let pairing = report.audit.find(EntityKind::Subsite, SOURCE_ROOT).unwrap();
    assert_eq!(pairing.outcome, Outcome::Failed);
    assert!(pairing.detail.contains("could not reconnect"));
}
