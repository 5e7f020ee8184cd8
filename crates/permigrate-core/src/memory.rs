//! In-memory tenant
//!
//! [`InMemoryTenant`] implements [`RemoteAccess`] over a serde-loadable
//! snapshot of sites, groups, principals, and containers. It counts every
//! call and supports fault injection (unreachable nodes, flaky connects,
//! per-operation failures, and one-shot throttling), which makes it the
//! harness for engine tests and the backend for offline replays.

use crate::error::RemoteError;
use crate::port::{ContainerInfo, FolderInfo, RemoteAccess, SiteSession};
use async_trait::async_trait;
use parking_lot::Mutex;
use permigrate_model::{
    normalize, AssociatedGroupSet, AssociatedRole, Group, Node, PermissionAssignment,
    PrincipalKind, PrincipalRef,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

fn default_true() -> bool {
    true
}

/// Titles of a site's associated groups
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociatedTitles {
    /// Owners group title
    #[serde(default)]
    pub owner: Option<String>,
    /// Members group title
    #[serde(default)]
    pub member: Option<String>,
    /// Visitors group title
    #[serde(default)]
    pub visitor: Option<String>,
}

impl AssociatedTitles {
    fn slot(&mut self, role: AssociatedRole) -> &mut Option<String> {
        match role {
            AssociatedRole::Owner => &mut self.owner,
            AssociatedRole::Member => &mut self.member,
            AssociatedRole::Visitor => &mut self.visitor,
        }
    }

    fn get(&self, role: AssociatedRole) -> Option<&str> {
        match role {
            AssociatedRole::Owner => self.owner.as_deref(),
            AssociatedRole::Member => self.member.as_deref(),
            AssociatedRole::Visitor => self.visitor.as_deref(),
        }
    }
}

/// Folder inside a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderState {
    /// Folder name
    pub name: String,
    /// Explicit permissions
    #[serde(default)]
    pub unique: bool,
    /// Role assignments
    #[serde(default)]
    pub assignments: Vec<PermissionAssignment>,
    /// Child folders
    #[serde(default)]
    pub folders: Vec<FolderState>,
}

impl FolderState {
    /// Inheriting folder with no children
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unique: false,
            assignments: Vec::new(),
            folders: Vec::new(),
        }
    }

    /// With explicit permissions
    #[must_use]
    pub fn with_unique(mut self, assignments: Vec<PermissionAssignment>) -> Self {
        self.unique = true;
        self.assignments = assignments;
        self
    }

    /// With child folder
    #[must_use]
    pub fn with_folder(mut self, folder: FolderState) -> Self {
        self.folders.push(folder);
        self
    }
}

/// List or library on a site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListState {
    /// List identifier
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// List title
    pub title: String,
    /// Server-relative root folder path
    pub path: String,
    /// Hidden (system) list
    #[serde(default)]
    pub hidden: bool,
    /// Whether folders are allowed
    #[serde(default = "default_true")]
    pub supports_folders: bool,
    /// Explicit permissions
    #[serde(default)]
    pub unique: bool,
    /// Role assignments
    #[serde(default)]
    pub assignments: Vec<PermissionAssignment>,
    /// Top-level folders
    #[serde(default)]
    pub folders: Vec<FolderState>,
}

impl ListState {
    /// Visible, inheriting list that supports folders
    #[must_use]
    pub fn new(title: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            path: path.into(),
            hidden: false,
            supports_folders: true,
            unique: false,
            assignments: Vec::new(),
            folders: Vec::new(),
        }
    }

    /// Mark hidden
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Mark as a list type without folders
    #[must_use]
    pub fn without_folders(mut self) -> Self {
        self.supports_folders = false;
        self
    }

    /// With explicit permissions
    #[must_use]
    pub fn with_unique(mut self, assignments: Vec<PermissionAssignment>) -> Self {
        self.unique = true;
        self.assignments = assignments;
        self
    }

    /// With top-level folder
    #[must_use]
    pub fn with_folder(mut self, folder: FolderState) -> Self {
        self.folders.push(folder);
        self
    }
}

/// One site and everything the engine can see on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteState {
    /// Node identity
    pub node: Node,
    /// Groups, in service order
    #[serde(default)]
    pub groups: Vec<Group>,
    /// Associated group bindings
    #[serde(default)]
    pub associated: AssociatedTitles,
    /// Lists and libraries
    #[serde(default)]
    pub containers: Vec<ListState>,
}

impl SiteState {
    /// Empty site
    #[must_use]
    pub fn new(node: Node) -> Self {
        Self {
            node,
            groups: Vec::new(),
            associated: AssociatedTitles::default(),
            containers: Vec::new(),
        }
    }

    /// With group (assigns an id if unset)
    #[must_use]
    pub fn with_group(mut self, mut group: Group) -> Self {
        if group.id == 0 {
            group.id = self.next_group_id();
        }
        self.groups.push(group);
        self
    }

    /// With group bound as the associated group for `role`
    #[must_use]
    pub fn with_associated(mut self, role: AssociatedRole, group: Group) -> Self {
        *self.associated.slot(role) = Some(group.title.clone());
        self.with_group(group)
    }

    /// With list or library
    #[must_use]
    pub fn with_container(mut self, list: ListState) -> Self {
        self.containers.push(list);
        self
    }

    /// Group by exact title
    #[must_use]
    pub fn group(&self, title: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.title == title)
    }

    fn group_mut(&mut self, title: &str) -> Result<&mut Group, RemoteError> {
        self.groups
            .iter_mut()
            .find(|g| g.title == title)
            .ok_or_else(|| RemoteError::NotFound(format!("group '{title}' cannot be found")))
    }

    fn next_group_id(&self) -> u32 {
        self.groups.iter().map(|g| g.id).max().unwrap_or(0) + 1
    }

    fn locate(&self, path: &str) -> Option<Location> {
        let path = normalize(path);
        for (list_index, list) in self.containers.iter().enumerate() {
            let root = normalize(&list.path);
            if path == root {
                return Some(Location {
                    list: list_index,
                    folders: Vec::new(),
                });
            }
            let rest = path.strip_prefix(root.as_str()).and_then(|r| r.strip_prefix('/'));
            let Some(rest) = rest else {
                continue;
            };

            let mut chain = Vec::new();
            let mut level = &list.folders;
            let mut found = true;
            for name in rest.split('/') {
                match level.iter().position(|f| f.name == name) {
                    Some(i) => {
                        chain.push(i);
                        level = &level[i].folders;
                    }
                    None => {
                        found = false;
                        break;
                    }
                }
            }
            if found {
                return Some(Location {
                    list: list_index,
                    folders: chain,
                });
            }
        }
        None
    }

    fn item(&self, loc: &Location) -> ItemView<'_> {
        let list = &self.containers[loc.list];
        match loc.folders.split_first() {
            None => ItemView {
                unique: list.unique,
                assignments: &list.assignments,
                folders: &list.folders,
                supports_folders: list.supports_folders,
            },
            Some((&first, rest)) => {
                let mut folder = &list.folders[first];
                for &i in rest {
                    folder = &folder.folders[i];
                }
                ItemView {
                    unique: folder.unique,
                    assignments: &folder.assignments,
                    folders: &folder.folders,
                    supports_folders: list.supports_folders,
                }
            }
        }
    }

    fn item_mut(&mut self, loc: &Location) -> (&mut bool, &mut Vec<PermissionAssignment>) {
        let list = &mut self.containers[loc.list];
        match loc.folders.split_first() {
            None => (&mut list.unique, &mut list.assignments),
            Some((&first, rest)) => {
                let mut folder = &mut list.folders[first];
                for &i in rest {
                    folder = &mut folder.folders[i];
                }
                (&mut folder.unique, &mut folder.assignments)
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Location {
    list: usize,
    folders: Vec<usize>,
}

struct ItemView<'a> {
    unique: bool,
    assignments: &'a [PermissionAssignment],
    folders: &'a [FolderState],
    supports_folders: bool,
}

/// Serializable tenant contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSnapshot {
    /// Sites, roots and subsites alike
    #[serde(default)]
    pub sites: Vec<SiteState>,
    /// Directory principals resolvable by login
    #[serde(default)]
    pub principals: Vec<PrincipalRef>,
}

/// Remote operations, for fault injection and call accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// List groups (key: site path)
    ListGroups,
    /// Read associated groups (key: site path)
    AssociatedGroups,
    /// Resolve principal (key: login)
    ResolvePrincipal,
    /// List subsites (key: parent path)
    ListSubsites,
    /// List containers (key: site path)
    ListContainers,
    /// List folders (key: parent path)
    ListFolders,
    /// Read role assignments (key: item path)
    RoleAssignments,
    /// Create group (key: title)
    CreateGroup,
    /// Set group owner (key: group title)
    SetGroupOwner,
    /// Add group member (key: login)
    AddGroupMember,
    /// Grant group role (key: group title)
    GrantGroupRole,
    /// Break inheritance (key: item path)
    BreakInheritance,
    /// Grant item role (key: item path)
    GrantItemRole,
}

impl Operation {
    /// Whether the operation changes tenant state
    #[must_use]
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Self::CreateGroup
                | Self::SetGroupOwner
                | Self::AddGroupMember
                | Self::GrantGroupRole
                | Self::BreakInheritance
                | Self::GrantItemRole
        )
    }
}

/// Call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    /// Connect attempts
    pub connects: usize,
    /// Read calls
    pub reads: usize,
    /// Mutating calls, including ones that failed
    pub mutations: usize,
}

#[derive(Debug, Default)]
struct Faults {
    unreachable: HashSet<String>,
    connect_failures: HashMap<String, u32>,
    failures: HashMap<(Operation, String), RemoteError>,
    throttles: HashMap<(Operation, String), u32>,
}

#[derive(Debug, Default)]
struct TenantState {
    snapshot: TenantSnapshot,
    faults: Faults,
    stats: CallStats,
}

impl TenantState {
    fn enter(&mut self, op: Operation, key: &str) -> Result<(), RemoteError> {
        if op.is_mutation() {
            self.stats.mutations += 1;
        } else {
            self.stats.reads += 1;
        }

        let fault_key = (op, key.to_string());
        if let Some(remaining) = self.faults.throttles.get_mut(&fault_key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RemoteError::Throttled(
                    "The remote server returned an error: (429) Too Many Requests.".into(),
                ));
            }
        }
        match self.faults.failures.get(&fault_key) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn site(&self, path: &str) -> Result<&SiteState, RemoteError> {
        self.snapshot
            .sites
            .iter()
            .find(|s| s.node.path() == path)
            .ok_or_else(|| RemoteError::NotFound(format!("site {path} does not exist")))
    }

    fn site_mut(&mut self, path: &str) -> Result<&mut SiteState, RemoteError> {
        self.snapshot
            .sites
            .iter_mut()
            .find(|s| s.node.path() == path)
            .ok_or_else(|| RemoteError::NotFound(format!("site {path} does not exist")))
    }

    fn directory_principal(&self, login_name: &str) -> Option<&PrincipalRef> {
        self.snapshot
            .principals
            .iter()
            .find(|p| p.login_name == login_name)
    }
}

/// Shared, mutable in-memory tenant
#[derive(Debug, Clone, Default)]
pub struct InMemoryTenant {
    state: Arc<Mutex<TenantState>>,
}

impl InMemoryTenant {
    /// Empty tenant
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tenant holding `snapshot`
    #[must_use]
    pub fn from_snapshot(snapshot: TenantSnapshot) -> Self {
        let tenant = Self::new();
        tenant.state.lock().snapshot = snapshot;
        tenant
    }

    /// Tenant from a JSON snapshot
    ///
    /// # Errors
    /// Propagates JSON syntax and schema errors.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::from_snapshot(serde_json::from_str(json)?))
    }

    /// Current contents as pretty JSON
    ///
    /// # Errors
    /// Propagates serializer failures.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.state.lock().snapshot)
    }

    /// Copy of the current contents
    #[must_use]
    pub fn snapshot(&self) -> TenantSnapshot {
        self.state.lock().snapshot.clone()
    }

    /// With site
    #[must_use]
    pub fn with_site(self, site: SiteState) -> Self {
        self.state.lock().snapshot.sites.push(site);
        self
    }

    /// With directory principal
    #[must_use]
    pub fn with_principal(self, principal: PrincipalRef) -> Self {
        self.state.lock().snapshot.principals.push(principal);
        self
    }

    /// Copy of the site at `url`
    #[must_use]
    pub fn site(&self, url: &str) -> Option<SiteState> {
        self.state.lock().site(&normalize(url)).ok().cloned()
    }

    /// Copy of a group on the site at `url`
    #[must_use]
    pub fn group(&self, url: &str, title: &str) -> Option<Group> {
        self.site(url).and_then(|s| s.group(title).cloned())
    }

    /// Call counters since creation or the last reset
    #[must_use]
    pub fn stats(&self) -> CallStats {
        self.state.lock().stats
    }

    /// Every connect to `url` fails
    pub fn make_unreachable(&self, url: &str) {
        self.state.lock().faults.unreachable.insert(normalize(url));
    }

    /// The next `times` connects to `url` fail
    pub fn fail_connects(&self, url: &str, times: u32) {
        self.state
            .lock()
            .faults
            .connect_failures
            .insert(normalize(url), times);
    }

    /// Every `op` on `key` fails with `error`
    pub fn fail(&self, op: Operation, key: &str, error: RemoteError) {
        self.state
            .lock()
            .faults
            .failures
            .insert((op, key.to_string()), error);
    }

    /// The next `times` calls of `op` on `key` are throttled
    pub fn throttle(&self, op: Operation, key: &str, times: u32) {
        self.state
            .lock()
            .faults
            .throttles
            .insert((op, key.to_string()), times);
    }
}

#[async_trait]
impl RemoteAccess for InMemoryTenant {
    async fn connect(&self, url: &str) -> Result<Box<dyn SiteSession>, RemoteError> {
        let path = normalize(url);
        let mut state = self.state.lock();
        state.stats.connects += 1;

        if state.faults.unreachable.contains(&path) {
            return Err(RemoteError::Connection(format!("Unable to connect to {url}")));
        }
        if let Some(remaining) = state.faults.connect_failures.get_mut(&path) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RemoteError::Connection(format!("Unable to connect to {url}")));
            }
        }

        let node = state
            .site(&path)
            .map_err(|e| RemoteError::Connection(e.to_string()))?
            .node
            .clone();
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
            node,
            path,
        }))
    }
}

/// Session against one site of an [`InMemoryTenant`]
#[derive(Debug)]
pub struct MemorySession {
    state: Arc<Mutex<TenantState>>,
    node: Node,
    path: String,
}

#[async_trait]
impl SiteSession for MemorySession {
    fn node(&self) -> &Node {
        &self.node
    }

    async fn list_groups(&self) -> Result<Vec<Group>, RemoteError> {
        let mut state = self.state.lock();
        state.enter(Operation::ListGroups, &self.path)?;
        Ok(state.site(&self.path)?.groups.clone())
    }

    async fn associated_groups(&self) -> Result<AssociatedGroupSet, RemoteError> {
        let mut state = self.state.lock();
        state.enter(Operation::AssociatedGroups, &self.path)?;
        let site = state.site(&self.path)?;
        let bound = |role| {
            site.associated
                .get(role)
                .and_then(|title| site.group(title).cloned())
        };
        Ok(AssociatedGroupSet {
            owner: bound(AssociatedRole::Owner),
            member: bound(AssociatedRole::Member),
            visitor: bound(AssociatedRole::Visitor),
        })
    }

    async fn resolve_principal(&self, login_name: &str) -> Result<PrincipalRef, RemoteError> {
        let mut state = self.state.lock();
        state.enter(Operation::ResolvePrincipal, login_name)?;
        if let Some(principal) = state.directory_principal(login_name) {
            return Ok(principal.clone());
        }
        match state.site(&self.path)?.group(login_name) {
            Some(group) => Ok(PrincipalRef::group(group.title.clone())),
            None => Err(RemoteError::NotFound(format!(
                "principal '{login_name}' does not exist"
            ))),
        }
    }

    async fn list_subsites(&self, parent_url: &str) -> Result<Vec<Node>, RemoteError> {
        let parent = normalize(parent_url);
        let mut state = self.state.lock();
        state.enter(Operation::ListSubsites, &parent)?;
        Ok(state
            .snapshot
            .sites
            .iter()
            .filter(|s| s.node.parent_url.as_deref().map(normalize).as_deref() == Some(&*parent))
            .map(|s| s.node.clone())
            .collect())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, RemoteError> {
        let mut state = self.state.lock();
        state.enter(Operation::ListContainers, &self.path)?;
        Ok(state
            .site(&self.path)?
            .containers
            .iter()
            .map(|l| ContainerInfo {
                id: l.id,
                title: l.title.clone(),
                path: normalize(&l.path),
                hidden: l.hidden,
                supports_folders: l.supports_folders,
                has_unique_role_assignments: l.unique,
            })
            .collect())
    }

    async fn list_folders(&self, parent_path: &str) -> Result<Vec<FolderInfo>, RemoteError> {
        let parent = normalize(parent_path);
        let mut state = self.state.lock();
        state.enter(Operation::ListFolders, &parent)?;
        let site = state.site(&self.path)?;
        let loc = site
            .locate(&parent)
            .ok_or_else(|| RemoteError::NotFound(format!("folder {parent} does not exist")))?;
        let item = site.item(&loc);
        if !item.supports_folders {
            return Err(RemoteError::Unsupported(format!(
                "{parent} does not support folders"
            )));
        }
        Ok(item
            .folders
            .iter()
            .map(|f| FolderInfo {
                name: f.name.clone(),
                path: format!("{parent}/{}", f.name),
                has_unique_role_assignments: f.unique,
            })
            .collect())
    }

    async fn role_assignments(&self, path: &str) -> Result<Vec<PermissionAssignment>, RemoteError> {
        let path = normalize(path);
        let mut state = self.state.lock();
        state.enter(Operation::RoleAssignments, &path)?;
        let site = state.site(&self.path)?;
        let loc = site
            .locate(&path)
            .ok_or_else(|| RemoteError::NotFound(format!("{path} does not exist")))?;
        let item = site.item(&loc);
        tracing::trace!(path = %path, unique = item.unique, "Read role assignments");
        Ok(item.assignments.to_vec())
    }

    async fn create_group(&self, title: &str, description: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.enter(Operation::CreateGroup, title)?;
        let site = state.site_mut(&self.path)?;
        if site.group(title).is_some() {
            return Err(RemoteError::AlreadyExists(format!(
                "The specified name is already in use: {title}"
            )));
        }
        let mut group = Group::new(title).with_description(description);
        group.id = site.next_group_id();
        site.groups.push(group);
        Ok(())
    }

    async fn set_group_owner(&self, title: &str, owner_title: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.enter(Operation::SetGroupOwner, title)?;
        let owner_known = state.directory_principal(owner_title).is_some()
            || state.site(&self.path)?.group(owner_title).is_some();
        if !owner_known {
            return Err(RemoteError::NotFound(format!(
                "owner '{owner_title}' cannot be found"
            )));
        }
        state.site_mut(&self.path)?.group_mut(title)?.owner_title = owner_title.to_string();
        Ok(())
    }

    async fn add_group_member(
        &self,
        title: &str,
        member: &PrincipalRef,
    ) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.enter(Operation::AddGroupMember, &member.login_name)?;
        state
            .site_mut(&self.path)?
            .group_mut(title)?
            .add_member(member.clone());
        Ok(())
    }

    async fn grant_group_role(&self, title: &str, role: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.enter(Operation::GrantGroupRole, title)?;
        state.site_mut(&self.path)?.group_mut(title)?.add_role(role);
        Ok(())
    }

    async fn break_inheritance(&self, path: &str) -> Result<(), RemoteError> {
        let path = normalize(path);
        let mut state = self.state.lock();
        state.enter(Operation::BreakInheritance, &path)?;
        let site = state.site_mut(&self.path)?;
        let loc = site
            .locate(&path)
            .ok_or_else(|| RemoteError::NotFound(format!("{path} does not exist")))?;
        let (unique, _) = site.item_mut(&loc);
        *unique = true;
        Ok(())
    }

    async fn grant_item_role(
        &self,
        path: &str,
        principal: &PrincipalRef,
        role: &str,
    ) -> Result<(), RemoteError> {
        let path = normalize(path);
        let mut state = self.state.lock();
        state.enter(Operation::GrantItemRole, &path)?;
        let site = state.site_mut(&self.path)?;
        if principal.kind == PrincipalKind::Group && site.group(&principal.login_name).is_none() {
            return Err(RemoteError::NotFound(format!(
                "group '{}' cannot be found",
                principal.login_name
            )));
        }
        let loc = site
            .locate(&path)
            .ok_or_else(|| RemoteError::NotFound(format!("{path} does not exist")))?;
        let (_, assignments) = site.item_mut(&loc);
        match assignments
            .iter_mut()
            .find(|a| a.principal.login_name == principal.login_name)
        {
            Some(existing) => {
                if !existing.role_names.iter().any(|r| r == role) {
                    existing.role_names.push(role.to_string());
                }
            }
            None => assignments.push(PermissionAssignment::new(
                principal.clone(),
                vec![role.to_string()],
            )),
        }
        Ok(())
    }
}
