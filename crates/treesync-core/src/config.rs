//! Region configuration
//!
//! Loaded from TOML, optionally overridden from `TREESYNC_*` environment
//! variables, validated once at load time.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use treesync_fetch::DEFAULT_OVERSUBSCRIBE_FACTOR;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "TREESYNC_";

/// Tunables of one synchronized region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum number of items shown
    pub limit_hint: usize,
    /// Ratio between ids requested and ids shown
    pub oversubscribe_factor: usize,
    /// Quiet period between a resolved fetch and the build; 0 disables
    pub debounce_ms: u64,
    /// Deadline for one fetch; none waits forever
    pub fetch_timeout_ms: Option<u64>,
    /// Journal entries retained
    pub journal_capacity: usize,
    /// Treat "nothing featured" as idle rather than an error.
    ///
    /// On by default, which widens the idle outcome: otherwise only the
    /// no-selection case ends in [`Phase::Idle`](crate::Phase::Idle) and an
    /// empty or missing featured collection is a `NotFound` error like any
    /// other key. Set to `false` for that stricter behavior.
    pub featured_not_found_is_idle: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            limit_hint: 12,
            oversubscribe_factor: DEFAULT_OVERSUBSCRIBE_FACTOR,
            debounce_ms: 150,
            fetch_timeout_ms: None,
            journal_capacity: 1024,
            featured_not_found_is_idle: true,
        }
    }
}

impl SyncConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With display limit
    #[inline]
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit_hint = limit;
        self
    }

    /// With debounce window
    #[inline]
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With fetch deadline
    #[inline]
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// With journal capacity
    #[inline]
    #[must_use]
    pub fn with_journal_capacity(mut self, capacity: usize) -> Self {
        self.journal_capacity = capacity;
        self
    }

    #[inline]
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[inline]
    #[must_use]
    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }

    /// Parse and validate TOML text
    ///
    /// # Errors
    /// `ConfigError::Parse` on malformed TOML, `ConfigError::InvalidValue`
    /// when a value is out of range
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TREESYNC_*` overrides from the process environment
    ///
    /// # Errors
    /// `ConfigError::InvalidValue` if an override does not parse
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup (`TREESYNC_LIMIT_HINT`,
    /// `TREESYNC_DEBOUNCE_MS`, `TREESYNC_FETCH_TIMEOUT_MS`)
    ///
    /// # Errors
    /// `ConfigError::InvalidValue` if an override does not parse
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));

        if let Some(raw) = var("LIMIT_HINT") {
            self.limit_hint = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("limit_hint", raw))?;
        }
        if let Some(raw) = var("DEBOUNCE_MS") {
            self.debounce_ms = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("debounce_ms", raw))?;
        }
        if let Some(raw) = var("FETCH_TIMEOUT_MS") {
            self.fetch_timeout_ms = match raw.trim() {
                "" | "none" => None,
                v => Some(
                    v.parse()
                        .map_err(|_| ConfigError::invalid("fetch_timeout_ms", raw.clone()))?,
                ),
            };
        }
        self.validate()?;
        Ok(self)
    }

    /// Check ranges
    ///
    /// # Errors
    /// `ConfigError::InvalidValue` naming the first bad field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limit_hint == 0 {
            return Err(ConfigError::invalid("limit_hint", "0"));
        }
        if self.oversubscribe_factor == 0 {
            return Err(ConfigError::invalid("oversubscribe_factor", "0"));
        }
        if self.journal_capacity == 0 {
            return Err(ConfigError::invalid("journal_capacity", "0"));
        }
        if self.fetch_timeout_ms == Some(0) {
            return Err(ConfigError::invalid("fetch_timeout_ms", "0"));
        }
        Ok(())
    }
}
