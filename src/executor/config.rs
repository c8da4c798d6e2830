/*!
 * Pool Configuration
 *
 * Runtime configuration shared by both thread pool flavours
 */

use crate::core::errors::{SyncError, SyncResult};
use crate::core::limits::{
    DEFAULT_KEEP_ALIVE, FALLBACK_POOL_SIZE, LONG_KEEP_ALIVE, MAX_POOL_SIZE, SHORT_KEEP_ALIVE,
    WORKER_THREAD_PREFIX,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::time::Duration;
use tracing::warn;

/// Thread pool configuration
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of live worker threads
    pub max_pool_size: usize,
    /// How long an idle worker waits for new work before terminating
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "keep_alive_ms")]
    pub keep_alive: Duration,
    /// Worker threads are named `<prefix>-<id>`
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pool_size: cpu_count(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            thread_name_prefix: WORKER_THREAD_PREFIX.to_string(),
        }
    }
}

impl PoolConfig {
    /// Configuration with an explicit size and keep-alive
    pub fn new(max_pool_size: usize, keep_alive: Duration) -> Self {
        Self {
            max_pool_size,
            keep_alive,
            ..Default::default()
        }
    }

    /// Configuration that reclaims idle workers quickly
    pub fn low_latency() -> Self {
        Self {
            keep_alive: SHORT_KEEP_ALIVE,
            ..Default::default()
        }
    }

    /// Configuration that keeps idle workers around for bursty load
    pub fn long_lived() -> Self {
        Self {
            keep_alive: LONG_KEEP_ALIVE,
            ..Default::default()
        }
    }

    /// Set the maximum pool size
    pub fn with_max_pool_size(mut self, max_pool_size: usize) -> Self {
        self.max_pool_size = max_pool_size;
        self
    }

    /// Set the idle keep-alive
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Set the worker thread name prefix
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> SyncResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SyncError::InvalidConfig(format!("malformed pool config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> SyncResult<()> {
        if self.max_pool_size == 0 {
            return Err(SyncError::InvalidConfig(
                "max_pool_size must be at least 1".into(),
            ));
        }
        if self.max_pool_size > MAX_POOL_SIZE {
            return Err(SyncError::InvalidConfig(format!(
                "max_pool_size {} exceeds limit {}",
                self.max_pool_size, MAX_POOL_SIZE
            )));
        }
        Ok(())
    }

    pub(crate) fn thread_name(&self, id: u64) -> String {
        format!("{}-{}", self.thread_name_prefix, id)
    }
}

fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or_else(|_| {
            warn!("Failed to detect CPU count, defaulting to {}", FALLBACK_POOL_SIZE);
            FALLBACK_POOL_SIZE
        })
}
