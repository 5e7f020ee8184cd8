//! Error types for the migration engine
//!
//! Provides error handling for:
//! - Remote service failures, classified from raw service messages
//! - Plan-level failures that halt a subtree (connection, enumeration)
//! - Configuration loading

use permigrate_model::{AuditLog, Outcome, PlanError};
use std::path::PathBuf;

/// Failure reported by the remote service for a single operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// Node unreachable or authentication failed
    #[error("connection failed: {0}")]
    Connection(String),

    /// Group, member, or container missing
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller lacks rights for this entity
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Entity already present
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Service is rate-limiting the caller
    #[error("throttled: {0}")]
    Throttled(String),

    /// Operation not supported for this entity type
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Anything else the service reported
    #[error("service error: {0}")]
    Service(String),
}

impl RemoteError {
    /// Classify a raw service error message
    ///
    /// Throttling signatures are checked first; a 429 that also mentions a
    /// missing resource is still a throttle.
    #[must_use]
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if contains_any(&lower, THROTTLED) {
            Self::Throttled(message)
        } else if contains_any(&lower, ACCESS_DENIED) {
            Self::AccessDenied(message)
        } else if contains_any(&lower, NOT_FOUND) {
            Self::NotFound(message)
        } else if contains_any(&lower, ALREADY_EXISTS) {
            Self::AlreadyExists(message)
        } else if contains_any(&lower, CONNECTION) {
            Self::Connection(message)
        } else {
            Self::Service(message)
        }
    }

    /// Check if the service asked the caller to slow down
    #[inline]
    #[must_use]
    pub fn is_throttling(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }

    /// Check if the entity is simply absent
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Audit outcome for an entity-level operation that hit this error
    #[inline]
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        if self.is_not_found() {
            Outcome::Skipped
        } else {
            Outcome::Failed
        }
    }
}

const THROTTLED: &[&str] = &[
    "429",
    "too many requests",
    "throttl",
    "503",
    "server too busy",
    "rate limit",
];
const ACCESS_DENIED: &[&str] = &[
    "401",
    "403",
    "access denied",
    "access is denied",
    "unauthorized",
    "forbidden",
];
const NOT_FOUND: &[&str] = &[
    "404",
    "not found",
    "does not exist",
    "cannot be found",
    "can not be found",
];
const ALREADY_EXISTS: &[&str] = &["already exists", "already in use"];
const CONNECTION: &[&str] = &[
    "unable to connect",
    "could not connect",
    "timed out",
    "name or service not known",
    "connection",
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Errors that halt the migration of one plan's subtree
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Node could not be reached within the retry budget
    #[error("could not connect to {url} after {attempts} attempt(s): {source}")]
    ConnectionFailed {
        /// Node URL
        url: String,
        /// Attempts made
        attempts: u32,
        /// Last failure
        #[source]
        source: RemoteError,
    },

    /// Group, associated-group, container, or subsite list could not be read
    #[error("failed to enumerate {what} on {url}: {source}")]
    EnumerationFailed {
        /// What was being listed
        what: &'static str,
        /// Node URL
        url: String,
        /// Underlying failure
        #[source]
        source: RemoteError,
    },

    /// Plan could not be constructed
    #[error("invalid plan: {0}")]
    InvalidPlan(#[from] PlanError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Root pair halted partway; carries every outcome recorded before the halt
    #[error("{source} ({recorded} outcome(s) recorded before halting)", recorded = .audit.len())]
    Halted {
        /// Failure that stopped the root pair
        #[source]
        source: Box<MigrationError>,
        /// Audit trail up to and including the failure
        audit: Box<AuditLog>,
    },
}

impl MigrationError {
    /// Create enumeration error
    #[inline]
    pub fn enumeration(what: &'static str, url: impl Into<String>, source: RemoteError) -> Self {
        Self::EnumerationFailed {
            what,
            url: url.into(),
            source,
        }
    }

    /// Wrap `source` with the audit trail recorded so far
    #[must_use]
    pub fn halted(source: MigrationError, audit: AuditLog) -> Self {
        Self::Halted {
            source: Box::new(source),
            audit: Box::new(audit),
        }
    }

    /// Innermost failure, looking through [`MigrationError::Halted`]
    #[must_use]
    pub fn cause(&self) -> &MigrationError {
        match self {
            Self::Halted { source, .. } => source.cause(),
            other => other,
        }
    }

    /// Outcomes recorded before a halt, if any were carried
    #[must_use]
    pub fn audit(&self) -> Option<&AuditLog> {
        match self {
            Self::Halted { audit, .. } => Some(audit),
            _ => None,
        }
    }

    /// Check if a later rerun may succeed without operator action
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Halted { source, .. } => source.is_retryable(),
            Self::ConnectionFailed { .. } => true,
            Self::EnumerationFailed { source, .. } => {
                matches!(source, RemoteError::Throttled(_) | RemoteError::Connection(_))
            }
            Self::InvalidPlan(_) | Self::Config(_) => false,
        }
    }
}

/// Errors while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error during file read
    #[error("io error reading {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or schema error
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range
    #[error("invalid value: {0}")]
    Invalid(String),
}
