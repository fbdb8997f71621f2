//! Database configuration.

use crate::error::{DbError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for merge and write behavior.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DbConfig {
    /// Maximum merge attempts when commits conflict.
    pub max_txn_retries: usize,
    /// Backoff before each retry (in milliseconds). The last entry is
    /// reused once the list is exhausted.
    pub retry_intervals_ms: Vec<u64>,
    /// Buffer size of the event bus.
    pub event_capacity: usize,
    /// Verify `_sig` links of merged blocks.
    pub verify_signatures: bool,
    /// Sign locally written blocks when an identity is configured.
    pub sign_blocks: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            max_txn_retries: 5,
            retry_intervals_ms: vec![10, 50, 100, 250, 500],
            event_capacity: 1024,
            verify_signatures: true,
            sign_blocks: false,
        }
    }
}

impl DbConfig {
    /// Load a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: DbConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_txn_retries == 0 {
            return Err(DbError::InvalidConfig("max_txn_retries must be at least 1".into()));
        }
        if self.retry_intervals_ms.is_empty() {
            return Err(DbError::InvalidConfig("retry_intervals_ms must not be empty".into()));
        }
        if self.event_capacity == 0 {
            return Err(DbError::InvalidConfig("event_capacity must be positive".into()));
        }
        Ok(())
    }

    /// Backoff before retry number `attempt` (0-based).
    pub fn retry_interval(&self, attempt: usize) -> Duration {
        let ms = self
            .retry_intervals_ms
            .get(attempt)
            .or(self.retry_intervals_ms.last())
            .copied()
            .unwrap_or(0);
        Duration::from_millis(ms)
    }
}

/// Builder for database configuration.
pub struct DbConfigBuilder {
    config: DbConfig,
}

impl DbConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: DbConfig::default(),
        }
    }

    pub fn max_txn_retries(mut self, retries: usize) -> Self {
        self.config.max_txn_retries = retries;
        self
    }

    pub fn retry_intervals(mut self, ms: Vec<u64>) -> Self {
        self.config.retry_intervals_ms = ms;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn verify_signatures(mut self, enabled: bool) -> Self {
        self.config.verify_signatures = enabled;
        self
    }

    pub fn sign_blocks(mut self, enabled: bool) -> Self {
        self.config.sign_blocks = enabled;
        self
    }

    pub fn build(self) -> Result<DbConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for DbConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
