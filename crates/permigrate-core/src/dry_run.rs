//! Dry-run session wrapper
//!
//! [`DryRunSession`] forwards every read to the wrapped session and turns
//! every mutating call into a logged no-op that reports success. Control
//! flow and audit output upstream stay identical to a live run; only
//! write-side failures cannot surface.

use crate::error::RemoteError;
use crate::port::{ContainerInfo, FolderInfo, SiteSession};
use async_trait::async_trait;
use permigrate_model::{AssociatedGroupSet, Group, Node, PermissionAssignment, PrincipalRef};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Read-through, write-suppressing session
pub struct DryRunSession {
    inner: Box<dyn SiteSession>,
    intercepted: AtomicUsize,
}

impl DryRunSession {
    /// Wrap a live session
    #[inline]
    #[must_use]
    pub fn new(inner: Box<dyn SiteSession>) -> Self {
        Self {
            inner,
            intercepted: AtomicUsize::new(0),
        }
    }

    /// Number of mutating calls suppressed so far
    #[inline]
    #[must_use]
    pub fn intercepted(&self) -> usize {
        self.intercepted.load(Ordering::Relaxed)
    }

    fn suppress(&self, action: std::fmt::Arguments<'_>) -> Result<(), RemoteError> {
        self.intercepted.fetch_add(1, Ordering::Relaxed);
        tracing::info!(node = %self.inner.node().url, "[DRY RUN] would {}", action);
        Ok(())
    }
}

impl std::fmt::Debug for DryRunSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DryRunSession")
            .field("node", self.inner.node())
            .field("intercepted", &self.intercepted())
            .finish()
    }
}

#[async_trait]
impl SiteSession for DryRunSession {
    fn node(&self) -> &Node {
        self.inner.node()
    }

    async fn list_groups(&self) -> Result<Vec<Group>, RemoteError> {
        self.inner.list_groups().await
    }

    async fn associated_groups(&self) -> Result<AssociatedGroupSet, RemoteError> {
        self.inner.associated_groups().await
    }

    async fn resolve_principal(&self, login_name: &str) -> Result<PrincipalRef, RemoteError> {
        self.inner.resolve_principal(login_name).await
    }

    async fn list_subsites(&self, parent_url: &str) -> Result<Vec<Node>, RemoteError> {
        self.inner.list_subsites(parent_url).await
    }

    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, RemoteError> {
        self.inner.list_containers().await
    }

    async fn list_folders(&self, parent_path: &str) -> Result<Vec<FolderInfo>, RemoteError> {
        self.inner.list_folders(parent_path).await
    }

    async fn role_assignments(&self, path: &str) -> Result<Vec<PermissionAssignment>, RemoteError> {
        self.inner.role_assignments(path).await
    }

    async fn create_group(&self, title: &str, _description: &str) -> Result<(), RemoteError> {
        self.suppress(format_args!("create group '{title}'"))
    }

    async fn set_group_owner(&self, title: &str, owner_title: &str) -> Result<(), RemoteError> {
        self.suppress(format_args!("set owner of '{title}' to '{owner_title}'"))
    }

    async fn add_group_member(
        &self,
        title: &str,
        member: &PrincipalRef,
    ) -> Result<(), RemoteError> {
        self.suppress(format_args!("add '{}' to '{title}'", member.login_name))
    }

    async fn grant_group_role(&self, title: &str, role: &str) -> Result<(), RemoteError> {
        self.suppress(format_args!("grant '{role}' to group '{title}'"))
    }

    async fn break_inheritance(&self, path: &str) -> Result<(), RemoteError> {
        self.suppress(format_args!("break inheritance on {path}"))
    }

    async fn grant_item_role(
        &self,
        path: &str,
        principal: &PrincipalRef,
        role: &str,
    ) -> Result<(), RemoteError> {
        self.suppress(format_args!(
            "grant '{role}' to '{}' on {path}",
            principal.login_name
        ))
    }
}
