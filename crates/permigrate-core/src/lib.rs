//! Permigrate Core - access-control migration engine
//!
//! Copies the access-control configuration of one site node into another:
//! - Discovers groups on both sides and creates the missing ones in two passes
//! - Merges associated (owner/member/visitor) group membership
//! - Finds lists and folders with broken inheritance and replays them under
//!   the destination root
//! - Pairs subsites by remapped path and repeats the pipeline per pair
//! - Supports dry runs, throttling backoff, connect retries, and pacing
//!
//! # Example
//!
//! ```rust,ignore
//! use permigrate_core::{InMemoryTenant, MigrationConfig, MigrationEngine};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tenant = InMemoryTenant::from_json(&std::fs::read_to_string("tenant.json")?)?;
//! let engine = MigrationEngine::new(Arc::new(tenant), MigrationConfig::new().with_dry_run(true));
//!
//! let report = engine.run("/sites/Teams/Audit/MAPS", "/sites/MAPS").await?;
//! println!("{} records", report.audit.len());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

// Core modules
pub mod associated;
pub mod config;
pub mod discovery;
pub mod dry_run;
pub mod engine;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod port;
pub mod progress;
pub mod retry;
pub mod scanner;
pub mod subsite;

// Re-exports for convenience
pub use associated::{
    check_owner_full_control, merge_associated, read_associated, AssociatedTitleMap,
};
pub use config::MigrationConfig;
pub use discovery::{diff_groups, discover_groups, GroupFilter, SYSTEM_GROUP_PREFIXES};
pub use dry_run::DryRunSession;
pub use engine::{MigrationEngine, MigrationReport, NodeSummary};
pub use error::{ConfigError, MigrationError, RemoteError};
pub use memory::{
    AssociatedTitles, CallStats, FolderState, InMemoryTenant, ListState, MemorySession, Operation,
    SiteState, TenantSnapshot,
};
pub use orchestrator::{GroupOrchestrator, OrchestrationOutcome};
pub use port::{
    AutoApprove, Confirmation, ConfirmationRequest, ContainerInfo, FolderInfo, RemoteAccess,
    SiteSession,
};
pub use progress::{is_milestone, Progress};
pub use retry::{connect_with_retry, RetryPolicy, ThrottlePolicy};
pub use scanner::{BrokenInheritanceScanner, ContainerApplier, DEFAULT_FOLDER_SKIP_LIST};
pub use subsite::{enumerate_descendants, match_subsites, SubsiteMatch};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving a migration
    pub use crate::{
        Confirmation, ConfirmationRequest, InMemoryTenant, MigrationConfig, MigrationEngine,
        MigrationError, MigrationReport, RemoteAccess, SiteSession,
    };
    pub use permigrate_model::{AuditLog, EntityKind, Outcome};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
