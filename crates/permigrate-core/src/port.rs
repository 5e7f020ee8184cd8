//! Ports to the engine's external collaborators
//!
//! - [`RemoteAccess`] / [`SiteSession`]: the remote service. Implementations
//!   attempt each call once; retry and backoff belong to the engine.
//! - [`Confirmation`]: per-item operator approval, supplied by the CLI.

use crate::error::RemoteError;
use async_trait::async_trait;
use permigrate_model::{AssociatedGroupSet, Group, Node, PermissionAssignment, PrincipalRef};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Top-level list or library on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// List identifier
    pub id: Uuid,
    /// List title
    pub title: String,
    /// Server-relative path of the list root folder
    pub path: String,
    /// Hidden (system) list
    pub hidden: bool,
    /// Whether the list type can hold folders
    pub supports_folders: bool,
    /// Whether permissions are explicitly assigned
    pub has_unique_role_assignments: bool,
}

/// Immediate child folder of a list or folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderInfo {
    /// Folder name
    pub name: String,
    /// Server-relative path
    pub path: String,
    /// Whether permissions are explicitly assigned
    pub has_unique_role_assignments: bool,
}

/// Opens sessions against nodes
#[async_trait]
pub trait RemoteAccess: Send + Sync {
    /// Authenticate to the node at `url`
    async fn connect(&self, url: &str) -> Result<Box<dyn SiteSession>, RemoteError>;
}

/// Authenticated session bound to one node
///
/// Read operations come first, mutating operations last. Every mutating
/// operation is a single remote call.
#[async_trait]
pub trait SiteSession: Send + Sync {
    /// Node this session is bound to
    fn node(&self) -> &Node;

    /// All groups on the node, in service order
    async fn list_groups(&self) -> Result<Vec<Group>, RemoteError>;

    /// The node's owner/member/visitor groups
    async fn associated_groups(&self) -> Result<AssociatedGroupSet, RemoteError>;

    /// Resolve a principal by login identity
    async fn resolve_principal(&self, login_name: &str) -> Result<PrincipalRef, RemoteError>;

    /// Immediate child nodes of `parent_url`
    async fn list_subsites(&self, parent_url: &str) -> Result<Vec<Node>, RemoteError>;

    /// Lists and libraries on the node
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, RemoteError>;

    /// Immediate child folders of a list root or folder
    async fn list_folders(&self, parent_path: &str) -> Result<Vec<FolderInfo>, RemoteError>;

    /// Explicit role assignments on a list or folder
    async fn role_assignments(&self, path: &str) -> Result<Vec<PermissionAssignment>, RemoteError>;

    /// Create a group with title and description only
    async fn create_group(&self, title: &str, description: &str) -> Result<(), RemoteError>;

    /// Set the owner of a group
    async fn set_group_owner(&self, title: &str, owner_title: &str) -> Result<(), RemoteError>;

    /// Add a resolved principal to a group
    async fn add_group_member(&self, title: &str, member: &PrincipalRef) -> Result<(), RemoteError>;

    /// Bind a permission level to a group on this node
    async fn grant_group_role(&self, title: &str, role: &str) -> Result<(), RemoteError>;

    /// Stop inheriting permissions on a list or folder, keeping current grants
    async fn break_inheritance(&self, path: &str) -> Result<(), RemoteError>;

    /// Grant a permission level to a principal on a list or folder
    async fn grant_item_role(
        &self,
        path: &str,
        principal: &PrincipalRef,
        role: &str,
    ) -> Result<(), RemoteError>;
}

/// Question put to the operator before a mutating step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationRequest {
    /// Migrate one (source, destination) node pair
    MigratePlan {
        /// Source node URL
        source: String,
        /// Destination node URL
        dest: String,
    },
    /// Break inheritance and apply grants on a destination container
    RemediateContainer {
        /// Destination path
        path: String,
        /// Number of grants to apply
        grants: usize,
    },
}

impl std::fmt::Display for ConfirmationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MigratePlan { source, dest } => {
                write!(f, "Migrate permissions {source} -> {dest}?")
            }
            Self::RemediateContainer { path, grants } => {
                write!(f, "Break inheritance on {path} and apply {grants} grant(s)?")
            }
        }
    }
}

/// Operator approval capability
#[cfg_attr(test, mockall::automock)]
pub trait Confirmation: Send + Sync {
    /// Whether to proceed with the step
    fn confirm(&self, request: &ConfirmationRequest) -> bool;
}

/// Approves everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl Confirmation for AutoApprove {
    fn confirm(&self, _request: &ConfirmationRequest) -> bool {
        true
    }
}
