//! Testing utilities for permigrate workspace
//!
//! Shared tenant fixtures and configuration helpers.

#![allow(missing_docs)]

use permigrate_core::{
    FolderState, InMemoryTenant, ListState, MigrationConfig, RetryPolicy, SiteState,
};
use permigrate_model::{
    AssociatedRole, Group, Node, PermissionAssignment, PrincipalRef, FULL_CONTROL, LIMITED_ACCESS,
};

pub const SOURCE_ROOT: &str = "/sites/alpha";
pub const DEST_ROOT: &str = "/sites/beta";

pub const FLAT_SOURCE_ROOT: &str = "/sites/Teams/Audit/NPSG/MAPS";
pub const FLAT_DEST_ROOT: &str = "/sites/MAPS";

pub const BULK_SOURCE_ROOT: &str = "/sites/bulk-src";
pub const BULK_DEST_ROOT: &str = "/sites/bulk-dst";

pub const TREE_ROOT: &str = "/sites/tree";

/// Configuration with every sleep removed and three immediate connect attempts
pub fn quick_config() -> MigrationConfig {
    MigrationConfig::default()
        .without_delays()
        .with_connect_policy(RetryPolicy::immediate(3))
}

pub fn user(login: &str) -> PrincipalRef {
    PrincipalRef::user(login).with_display_name(login.to_uppercase())
}

pub fn grant(principal: PrincipalRef, roles: &[&str]) -> PermissionAssignment {
    PermissionAssignment::new(principal, roles.iter().map(ToString::to_string).collect())
}

fn directory(tenant: InMemoryTenant) -> InMemoryTenant {
    ["ann", "bob", "carl", "dana"]
        .into_iter()
        .fold(tenant, |t, login| t.with_principal(user(login)))
}

/// Source has Owners, Editors, and Readers; destination has only Owners
///
/// Source containers:
/// - `Shared Documents/Finance`: explicit (Editors: Contribute, ann: Read)
/// - `Shared Documents/Forms`: explicit, but a skipped system folder
/// - `Shared Documents/Public/Archive`: explicit (Readers: Read)
/// - `Issues`: explicit list without folders (Editors: Edit)
/// - `Style Library`: hidden and explicit
pub fn two_site_tenant() -> InMemoryTenant {
    let source = SiteState::new(Node::new(SOURCE_ROOT, "Alpha"))
        .with_associated(
            AssociatedRole::Owner,
            Group::new("Owners")
                .with_member(user("ann"))
                .with_member(user("dana"))
                .with_role(FULL_CONTROL),
        )
        .with_group(
            Group::new("Editors")
                .with_description("Content editors")
                .with_owner("Owners")
                .with_member(user("ann"))
                .with_member(user("bob"))
                .with_role("Edit"),
        )
        .with_group(
            Group::new("Readers")
                .with_description("Read-only audience")
                .with_owner("Editors")
                .with_member(user("carl"))
                .with_role("Read")
                .with_role(LIMITED_ACCESS),
        )
        .with_group(Group::new("SharingLinks.0c1d.OrganizationView"))
        .with_container(
            ListState::new("Documents", "/sites/alpha/Shared Documents")
                .with_folder(FolderState::new("Finance").with_unique(vec![
                    grant(PrincipalRef::group("Editors"), &["Contribute"]),
                    grant(user("ann"), &["Read"]),
                ]))
                .with_folder(
                    FolderState::new("Forms")
                        .with_unique(vec![grant(PrincipalRef::group("Readers"), &["Read"])]),
                )
                .with_folder(FolderState::new("Public").with_folder(
                    FolderState::new("Archive").with_unique(vec![grant(
                        PrincipalRef::group("Readers"),
                        &["Read", LIMITED_ACCESS],
                    )]),
                )),
        )
        .with_container(
            ListState::new("Issues", "/sites/alpha/Lists/Issues")
                .without_folders()
                .with_unique(vec![grant(PrincipalRef::group("Editors"), &["Edit"])]),
        )
        .with_container(
            ListState::new("Style Library", "/sites/alpha/Style Library")
                .hidden()
                .with_unique(vec![grant(PrincipalRef::group("Owners"), &[FULL_CONTROL])]),
        );

    let dest = SiteState::new(Node::new(DEST_ROOT, "Beta"))
        .with_associated(
            AssociatedRole::Owner,
            Group::new("Owners")
                .with_member(user("dana"))
                .with_role(FULL_CONTROL),
        )
        .with_container(
            ListState::new("Documents", "/sites/beta/Shared Documents")
                .with_folder(FolderState::new("Finance"))
                .with_folder(FolderState::new("Forms"))
                .with_folder(FolderState::new("Public").with_folder(FolderState::new("Archive"))),
        )
        .with_container(ListState::new("Issues", "/sites/beta/Lists/Issues").without_folders());

    directory(InMemoryTenant::new().with_site(source).with_site(dest))
}

/// A nested source hierarchy promoted to a top-level destination root
///
/// Source `MAPS` has children `ProjectA` (with `Phase1` below it) and
/// `Archive`; the destination only has `ProjectA` and `ProjectA/Phase1`.
pub fn flattening_tenant() -> InMemoryTenant {
    let project = format!("{FLAT_SOURCE_ROOT}/ProjectA");
    let phase1 = format!("{project}/Phase1");
    let archive = format!("{FLAT_SOURCE_ROOT}/Archive");
    let dest_project = format!("{FLAT_DEST_ROOT}/ProjectA");
    let dest_phase1 = format!("{dest_project}/Phase1");

    let source_root = SiteState::new(
        Node::new(FLAT_SOURCE_ROOT, "MAPS").with_parent("/sites/Teams/Audit/NPSG"),
    )
    .with_associated(
        AssociatedRole::Member,
        Group::new("MAPS Members").with_member(user("ann")).with_member(user("bob")),
    )
    .with_group(Group::new("MAPS Reviewers").with_member(user("carl")).with_role("Read"));

    let source_project = SiteState::new(
        Node::new(&project, "ProjectA").with_parent(FLAT_SOURCE_ROOT),
    )
        .with_group(
            Group::new("ProjectA Leads")
                .with_owner("ProjectA Leads")
                .with_member(user("dana"))
                .with_role("Design"),
        )
        .with_container(
            ListState::new("Deliverables", format!("{project}/Deliverables")).with_unique(vec![
                grant(PrincipalRef::group("ProjectA Leads"), &["Design"]),
                grant(user("carl"), &["Read"]),
            ]),
        );

    let source_phase1 = SiteState::new(Node::new(&phase1, "Phase1").with_parent(&project))
        .with_group(Group::new("Phase1 Team").with_member(user("bob")).with_role("Contribute"));
    let source_archive = SiteState::new(
        Node::new(&archive, "Archive").with_parent(FLAT_SOURCE_ROOT),
    )
        .with_group(Group::new("Archivists"));

    let dest_root = SiteState::new(Node::new(FLAT_DEST_ROOT, "MAPS")).with_associated(
        AssociatedRole::Member,
        Group::new("MAPS Members (new)").with_member(user("bob")),
    );
    let dest_project_site = SiteState::new(
        Node::new(&dest_project, "ProjectA").with_parent(FLAT_DEST_ROOT),
    )
        .with_container(ListState::new("Deliverables", format!("{dest_project}/Deliverables")));
    let dest_phase1_site =
        SiteState::new(Node::new(&dest_phase1, "Phase1").with_parent(&dest_project));

    directory(
        InMemoryTenant::new()
            .with_site(source_root)
            .with_site(source_project)
            .with_site(source_phase1)
            .with_site(source_archive)
            .with_site(dest_root)
            .with_site(dest_project_site)
            .with_site(dest_phase1_site),
    )
}

/// `count` source groups, each owned by the previous one, and an empty destination
pub fn bulk_groups_tenant(count: usize) -> InMemoryTenant {
    let mut source = SiteState::new(Node::new(BULK_SOURCE_ROOT, "Bulk source"));
    for i in 1..=count {
        let mut group = Group::new(format!("Group {i:03}"))
            .with_member(user("ann"))
            .with_role("Read");
        if i > 1 {
            group = group.with_owner(format!("Group {:03}", i - 1));
        }
        source = source.with_group(group);
    }
    let dest = SiteState::new(Node::new(BULK_DEST_ROOT, "Bulk destination"));

    directory(InMemoryTenant::new().with_site(source).with_site(dest))
}

/// Single site whose `Docs` library holds `F` (inheriting) with children
/// `G` (explicit) and `Forms` (explicit, skipped); `Forms` itself holds
/// explicit `Forms/Templates` and `Forms/Templates/Legal`
pub fn folder_tree_tenant() -> InMemoryTenant {
    let team_read = || vec![grant(PrincipalRef::group("Team"), &["Read"])];
    let forms = FolderState::new("Forms")
        .with_unique(team_read())
        .with_folder(
            FolderState::new("Templates")
                .with_unique(team_read())
                .with_folder(FolderState::new("Legal").with_unique(team_read())),
        );
    let site = SiteState::new(Node::new(TREE_ROOT, "Tree")).with_container(
        ListState::new("Docs", format!("{TREE_ROOT}/Docs")).with_folder(
            FolderState::new("F")
                .with_folder(FolderState::new("G").with_unique(team_read()))
                .with_folder(forms),
        ),
    );
    InMemoryTenant::new().with_site(site)
}
