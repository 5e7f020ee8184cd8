//! Typed records for access-control migration
//!
//! Provides the data model shared by the engine and its collaborators:
//! - [`types`]: nodes, groups, principals, associated groups, container items, plans
//! - [`path`]: host stripping and source-root → destination-root remapping
//! - [`audit`]: the ordered per-entity outcome log

pub mod audit;
pub mod path;
pub mod types;

// Re-exports
pub use audit::{AuditLog, EntityKind, MigrationResult, Outcome, OutcomeCounts};
pub use path::{normalize, remap, strip_host, RemapRule, Remapped};
pub use types::{
    AssociatedGroupSet, AssociatedRole, ContainerItem, ContainerKind, Group, MigrationPlan, Node,
    PermissionAssignment, PlanError, PrincipalKind, PrincipalRef, RunId, FULL_CONTROL,
    LIMITED_ACCESS,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
