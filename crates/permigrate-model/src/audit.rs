//! Audit trail of per-entity migration outcomes
//!
//! Records are appended in chronological order and never mutated after
//! append. The log is passed by `&mut` through the call chain; there is no
//! process-wide recorder.

use crate::types::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of entity an outcome refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A migration plan as a whole
    Node,
    /// Group creation
    Group,
    /// Per-group membership copy summary
    Membership,
    /// Single member addition
    Member,
    /// Permission level grant on a group
    PermissionLevel,
    /// Group ownership (pass 2)
    Owner,
    /// Associated group merge or invariant check
    AssociatedGroup,
    /// List, library, or folder remediation
    Container,
    /// Subsite pairing
    Subsite,
}

impl EntityKind {
    /// Lowercase label
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Group => "group",
            Self::Membership => "membership",
            Self::Member => "member",
            Self::PermissionLevel => "permission_level",
            Self::Owner => "owner",
            Self::AssociatedGroup => "associated_group",
            Self::Container => "container",
            Self::Subsite => "subsite",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of one entity-level operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Applied (or would be applied, in a dry run)
    Success,
    /// Attempted and rejected
    Failed,
    /// Not attempted, nothing to do or target missing
    Skipped,
    /// Needs manual follow-up
    Warning,
}

/// One appended audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Entity kind
    pub entity_kind: EntityKind,
    /// Entity key (title, path, or `group/login`)
    pub entity_key: String,
    /// Outcome
    pub outcome: Outcome,
    /// Free-text detail
    pub detail: String,
    /// Time of append
    pub timestamp: DateTime<Utc>,
}

/// Tally of outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    /// Successes
    pub success: usize,
    /// Failures
    pub failed: usize,
    /// Skips
    pub skipped: usize,
    /// Warnings
    pub warning: usize,
}

impl OutcomeCounts {
    /// Count one outcome
    #[inline]
    pub fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.success += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Warning => self.warning += 1,
        }
    }

    /// Sum of all outcomes
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.success + self.failed + self.skipped + self.warning
    }
}

/// Ordered, append-only outcome log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLog {
    run_id: RunId,
    records: Vec<MigrationResult>,
}

impl AuditLog {
    /// Create an empty log for a fresh run
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run this log belongs to
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Append a record stamped with the current time
    pub fn record(
        &mut self,
        entity_kind: EntityKind,
        entity_key: impl Into<String>,
        outcome: Outcome,
        detail: impl Into<String>,
    ) {
        self.records.push(MigrationResult {
            entity_kind,
            entity_key: entity_key.into(),
            outcome,
            detail: detail.into(),
            timestamp: Utc::now(),
        });
    }

    /// Append a success
    #[inline]
    pub fn success(&mut self, kind: EntityKind, key: impl Into<String>, detail: impl Into<String>) {
        self.record(kind, key, Outcome::Success, detail);
    }

    /// Append a failure
    #[inline]
    pub fn failed(&mut self, kind: EntityKind, key: impl Into<String>, detail: impl Into<String>) {
        self.record(kind, key, Outcome::Failed, detail);
    }

    /// Append a skip
    #[inline]
    pub fn skipped(&mut self, kind: EntityKind, key: impl Into<String>, detail: impl Into<String>) {
        self.record(kind, key, Outcome::Skipped, detail);
    }

    /// Append a warning
    #[inline]
    pub fn warning(&mut self, kind: EntityKind, key: impl Into<String>, detail: impl Into<String>) {
        self.record(kind, key, Outcome::Warning, detail);
    }

    /// Records in append order
    #[inline]
    #[must_use]
    pub fn records(&self) -> &[MigrationResult] {
        &self.records
    }

    /// Number of records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing was recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First record for a given kind and key
    #[must_use]
    pub fn find(&self, kind: EntityKind, key: &str) -> Option<&MigrationResult> {
        self.records
            .iter()
            .find(|r| r.entity_kind == kind && r.entity_key == key)
    }

    /// Tally over all records
    #[must_use]
    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for r in &self.records {
            counts.add(r.outcome);
        }
        counts
    }

    /// Tally per entity kind
    #[must_use]
    pub fn counts_by_kind(&self) -> BTreeMap<EntityKind, OutcomeCounts> {
        let mut by_kind: BTreeMap<EntityKind, OutcomeCounts> = BTreeMap::new();
        for r in &self.records {
            by_kind.entry(r.entity_kind).or_default().add(r.outcome);
        }
        by_kind
    }

    /// One JSON object per line, in append order
    ///
    /// # Errors
    /// Propagates serializer failures.
    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for r in &self.records {
            out.push_str(&serde_json::to_string(r)?);
            out.push('\n');
        }
        Ok(out)
    }
}
