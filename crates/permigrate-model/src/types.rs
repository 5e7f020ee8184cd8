//! Core types for permission migration
//!
//! Defines the fundamental records the engine works with:
//! - Nodes (sites and subsites)
//! - Groups and the principals they contain
//! - Associated group sets bound to a node
//! - Role assignments and container items with broken inheritance
//! - Migration plans pairing a source node with a destination node

use crate::path::{normalize, RemapRule};
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use uuid::Uuid;

/// Permission level the owner associated group must always keep
pub const FULL_CONTROL: &str = "Full Control";

/// Service-managed permission level that is never copied
pub const LIMITED_ACCESS: &str = "Limited Access";

/// Unique migration run identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Generate new run ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A position in the content hierarchy (site or subsite)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    /// Absolute or server-relative URL
    pub url: String,
    /// URL of the parent node, `None` for a root
    #[serde(default)]
    pub parent_url: Option<String>,
    /// Display title
    #[serde(default)]
    pub title: String,
}

impl Node {
    /// Create a root node
    #[inline]
    #[must_use]
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            parent_url: None,
            title: title.into(),
        }
    }

    /// With parent URL
    #[inline]
    #[must_use]
    pub fn with_parent(mut self, parent_url: impl Into<String>) -> Self {
        self.parent_url = Some(parent_url.into());
        self
    }

    /// Server-relative path in canonical form
    #[inline]
    #[must_use]
    pub fn path(&self) -> String {
        normalize(&self.url)
    }
}

/// Kind of security principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    /// Individual account
    #[default]
    User,
    /// Site group
    Group,
    /// Directory security group
    SecurityGroup,
}

/// Reference to a principal, identified by login name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalRef {
    /// Login identity (claims string or group title)
    pub login_name: String,
    /// Display name
    #[serde(default)]
    pub display_name: String,
    /// Principal kind
    #[serde(default)]
    pub kind: PrincipalKind,
}

impl PrincipalRef {
    /// User principal
    #[must_use]
    pub fn user(login_name: impl Into<String>) -> Self {
        let login_name = login_name.into();
        Self {
            display_name: login_name.clone(),
            login_name,
            kind: PrincipalKind::User,
        }
    }

    /// Site group principal (login is the group title)
    #[must_use]
    pub fn group(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            display_name: title.clone(),
            login_name: title,
            kind: PrincipalKind::Group,
        }
    }

    /// Directory security group principal
    #[must_use]
    pub fn security_group(login_name: impl Into<String>) -> Self {
        Self {
            kind: PrincipalKind::SecurityGroup,
            ..Self::user(login_name)
        }
    }

    /// With display name
    #[inline]
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Whether this principal is an individual account
    #[inline]
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.kind == PrincipalKind::User
    }
}

/// A named principal containing members and granted permission levels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Service-assigned identifier, stable for the group's lifetime
    #[serde(default)]
    pub id: u32,
    /// Title, unique per node, case-sensitive
    pub title: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Title of the owning principal, blank when unset
    #[serde(default)]
    pub owner_title: String,
    /// Members, unique by login name, in insertion order
    #[serde(default)]
    pub members: Vec<PrincipalRef>,
    /// Permission levels bound to the group on its node
    #[serde(default)]
    pub permission_levels: Vec<String>,
}

impl Group {
    /// Create group with title only
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: 0,
            title: title.into(),
            description: String::new(),
            owner_title: String::new(),
            members: Vec::new(),
            permission_levels: Vec::new(),
        }
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// With owner title
    #[inline]
    #[must_use]
    pub fn with_owner(mut self, owner_title: impl Into<String>) -> Self {
        self.owner_title = owner_title.into();
        self
    }

    /// With member (ignored if the login is already present)
    #[inline]
    #[must_use]
    pub fn with_member(mut self, member: PrincipalRef) -> Self {
        self.add_member(member);
        self
    }

    /// With permission level (ignored if already granted)
    #[inline]
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.add_role(role);
        self
    }

    /// Whether an owner is recorded
    #[inline]
    #[must_use]
    pub fn has_owner(&self) -> bool {
        !self.owner_title.trim().is_empty()
    }

    /// Whether a member with this login exists
    #[inline]
    #[must_use]
    pub fn has_member(&self, login_name: &str) -> bool {
        self.members.iter().any(|m| m.login_name == login_name)
    }

    /// Whether the group holds this permission level
    #[inline]
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.permission_levels.iter().any(|r| r == role)
    }

    /// Add member by union; returns `false` if already present
    pub fn add_member(&mut self, member: PrincipalRef) -> bool {
        if self.has_member(&member.login_name) {
            return false;
        }
        self.members.push(member);
        true
    }

    /// Grant permission level by union; returns `false` if already granted
    pub fn add_role(&mut self, role: impl Into<String>) -> bool {
        let role = role.into();
        if self.has_role(&role) {
            return false;
        }
        self.permission_levels.push(role);
        true
    }
}

/// Role of an associated group within its node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociatedRole {
    /// Owners group
    Owner,
    /// Members group
    Member,
    /// Visitors group
    Visitor,
}

impl AssociatedRole {
    /// All roles in resolution order
    pub const ALL: [Self; 3] = [Self::Owner, Self::Member, Self::Visitor];

    /// Lowercase label
    #[inline]
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Member => "member",
            Self::Visitor => "visitor",
        }
    }
}

impl std::fmt::Display for AssociatedRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The three identity-bound groups of one node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociatedGroupSet {
    /// Owners group
    #[serde(default)]
    pub owner: Option<Group>,
    /// Members group
    #[serde(default)]
    pub member: Option<Group>,
    /// Visitors group
    #[serde(default)]
    pub visitor: Option<Group>,
}

impl AssociatedGroupSet {
    /// Group bound to `role`, if any
    #[inline]
    #[must_use]
    pub fn get(&self, role: AssociatedRole) -> Option<&Group> {
        match role {
            AssociatedRole::Owner => self.owner.as_ref(),
            AssociatedRole::Member => self.member.as_ref(),
            AssociatedRole::Visitor => self.visitor.as_ref(),
        }
    }

    /// Titles of the bound groups
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        AssociatedRole::ALL
            .into_iter()
            .filter_map(|role| self.get(role).map(|g| g.title.as_str()))
    }

    /// Whether `title` names one of the bound groups
    #[inline]
    #[must_use]
    pub fn contains_title(&self, title: &str) -> bool {
        self.titles().any(|t| t == title)
    }
}

/// Binding of a principal to named permission levels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionAssignment {
    /// Principal receiving the roles
    pub principal: PrincipalRef,
    /// Role names in service order
    pub role_names: Vec<String>,
}

impl PermissionAssignment {
    /// Create assignment
    #[inline]
    #[must_use]
    pub fn new(principal: PrincipalRef, role_names: Vec<String>) -> Self {
        Self {
            principal,
            role_names,
        }
    }

    /// Roles that may be copied (drops service-managed levels)
    pub fn copyable_roles(&self) -> impl Iterator<Item = &str> {
        self.role_names
            .iter()
            .map(String::as_str)
            .filter(|r| *r != LIMITED_ACCESS)
    }
}

/// Container granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// List or document library
    List,
    /// Folder within a list or library
    Folder,
}

/// A list/library/folder captured by the broken-inheritance scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerItem {
    /// Container granularity
    pub kind: ContainerKind,
    /// List title or folder name
    pub title: String,
    /// Server-relative path
    pub path: String,
    /// Whether permissions are explicitly assigned
    pub has_unique_role_assignments: bool,
    /// Assignments captured at scan time
    pub assignments: Vec<PermissionAssignment>,
    /// Identifier of the owning list, `None` for lists themselves
    pub parent_container_id: Option<Uuid>,
}

/// A (source node, destination node) pair to migrate
///
/// Immutable once constructed; the remap rule is derived from the pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    source: Node,
    dest: Node,
    rule: RemapRule,
}

impl MigrationPlan {
    /// Pair a source node with a destination node
    ///
    /// # Errors
    /// Returns [`PlanError::EmptyUrl`] if either URL is blank.
    pub fn new(source: Node, dest: Node) -> Result<Self, PlanError> {
        if source.url.trim().is_empty() {
            return Err(PlanError::EmptyUrl("source"));
        }
        if dest.url.trim().is_empty() {
            return Err(PlanError::EmptyUrl("destination"));
        }
        let rule = RemapRule::new(&source.url, &dest.url);
        Ok(Self { source, dest, rule })
    }

    /// Plan for two top-level roots given by URL
    ///
    /// # Errors
    /// Returns [`PlanError::EmptyUrl`] if either URL is blank.
    pub fn for_roots(source_url: &str, dest_url: &str) -> Result<Self, PlanError> {
        Self::new(Node::new(source_url, ""), Node::new(dest_url, ""))
    }

    /// Source node
    #[inline]
    #[must_use]
    pub fn source(&self) -> &Node {
        &self.source
    }

    /// Destination node
    #[inline]
    #[must_use]
    pub fn dest(&self) -> &Node {
        &self.dest
    }

    /// Remap rule for paths under this pair
    #[inline]
    #[must_use]
    pub fn rule(&self) -> &RemapRule {
        &self.rule
    }
}

/// Plan construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// One side has no URL
    #[error("{0} URL is empty")]
    EmptyUrl(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_member_union_is_idempotent() {
        let mut group = Group::new("Editors");
        assert!(group.add_member(PrincipalRef::user("i:0#.f|membership|ann@example.com")));
        assert!(!group.add_member(PrincipalRef::user("i:0#.f|membership|ann@example.com")));
        assert_eq!(group.members.len(), 1);
    }

    #[test]
    fn blank_owner_is_not_an_owner() {
        assert!(!Group::new("A").with_owner("   ").has_owner());
        assert!(Group::new("B").with_owner("A").has_owner());
    }

    #[test]
    fn associated_titles_skip_missing_roles() {
        let set = AssociatedGroupSet {
            owner: Some(Group::new("Site Owners")),
            member: None,
            visitor: Some(Group::new("Site Visitors")),
        };
        let titles: Vec<_> = set.titles().collect();
        assert_eq!(titles, vec!["Site Owners", "Site Visitors"]);
        assert!(set.contains_title("Site Owners"));
        assert!(!set.contains_title("Site Members"));
    }

    #[test]
    fn copyable_roles_drop_limited_access() {
        let assignment = PermissionAssignment::new(
            PrincipalRef::group("Readers"),
            vec![LIMITED_ACCESS.to_string(), "Read".to_string()],
        );
        assert_eq!(assignment.copyable_roles().collect::<Vec<_>>(), vec!["Read"]);
    }

    #[test]
    fn plan_rejects_blank_urls() {
        assert_eq!(
            MigrationPlan::for_roots("", "/sites/B"),
            Err(PlanError::EmptyUrl("source"))
        );
        let plan = MigrationPlan::for_roots("https://h/sites/A/", "/sites/B").unwrap();
        assert_eq!(plan.rule().source_root(), "/sites/A");
    }
}
