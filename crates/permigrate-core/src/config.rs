//! Engine configuration
//!
//! [`MigrationConfig`] carries every static policy the engine applies:
//! dry-run mode, exclusion lists, pacing, throttling backoff, and connect
//! retries. Loadable from TOML; every field has a default.

use crate::error::ConfigError;
use crate::retry::{RetryPolicy, ThrottlePolicy};
use crate::scanner::DEFAULT_FOLDER_SKIP_LIST;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Migration configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Perform reads and decisions only; mutating calls become no-ops
    pub dry_run: bool,
    /// Pair and migrate child nodes after the root
    pub include_subsites: bool,
    /// Container titles left out of broken-inheritance remediation
    pub excluded_containers: Vec<String>,
    /// Folder names never descended into
    pub folder_skip_list: Vec<String>,
    /// Group title prefixes treated as system groups, on top of the built-ins
    pub extra_system_group_prefixes: Vec<String>,
    /// Groups created between pacing pauses
    pub batch_size: usize,
    /// Pacing pause in milliseconds
    pub batch_pause_ms: u64,
    /// Sleep before retrying a throttled call, in milliseconds
    pub throttle_backoff_ms: u64,
    /// Retries of a throttled call
    pub max_throttle_retries: u32,
    /// Connect retry policy
    pub connect: RetryPolicy,
    /// Batches larger than this only report progress at milestones
    pub progress_threshold: usize,
}

impl MigrationConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With dry-run mode
    #[inline]
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// With subsite migration toggled
    #[inline]
    #[must_use]
    pub fn with_subsites(mut self, include: bool) -> Self {
        self.include_subsites = include;
        self
    }

    /// With container titles excluded from remediation
    #[inline]
    #[must_use]
    pub fn with_excluded_containers(mut self, titles: Vec<String>) -> Self {
        self.excluded_containers = titles;
        self
    }

    /// With pacing batch size and pause
    #[inline]
    #[must_use]
    pub fn with_batching(mut self, batch_size: usize, pause: Duration) -> Self {
        self.batch_size = batch_size;
        self.batch_pause_ms = duration_ms(pause);
        self
    }

    /// With connect retry policy
    #[inline]
    #[must_use]
    pub fn with_connect_policy(mut self, policy: RetryPolicy) -> Self {
        self.connect = policy;
        self
    }

    /// Zero every sleep: pacing, throttling backoff, and connect delay
    #[must_use]
    pub fn without_delays(mut self) -> Self {
        self.batch_pause_ms = 0;
        self.throttle_backoff_ms = 0;
        self.connect.delay_ms = 0;
        self
    }

    /// Pacing pause
    #[inline]
    #[must_use]
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    /// Throttling policy derived from this configuration
    #[inline]
    #[must_use]
    pub fn throttle(&self) -> ThrottlePolicy {
        ThrottlePolicy::new(
            Duration::from_millis(self.throttle_backoff_ms),
            self.max_throttle_retries,
        )
    }

    /// Parse configuration from TOML
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] on malformed input and
    /// [`ConfigError::Invalid`] on out-of-range values.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`MigrationConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.connect.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "connect.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            include_subsites: true,
            excluded_containers: Vec::new(),
            folder_skip_list: DEFAULT_FOLDER_SKIP_LIST
                .iter()
                .map(ToString::to_string)
                .collect(),
            extra_system_group_prefixes: Vec::new(),
            batch_size: 10,
            batch_pause_ms: 2_000,
            throttle_backoff_ms: 60_000,
            max_throttle_retries: 3,
            connect: RetryPolicy::default(),
            progress_threshold: 100,
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
