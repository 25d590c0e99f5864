//! Configuration types for the scheduler core.

use crate::error::{Result, SchedulerError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker pool sizing and backpressure.
    pub workers: WorkerPoolConfig,
    /// How long `shutdown` waits for in-flight worker jobs (milliseconds).
    pub shutdown_wait_ms: u64,
    /// Prefix for worker and timer thread names.
    pub thread_name_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: WorkerPoolConfig::default(),
            shutdown_wait_ms: 5_000,
            thread_name_prefix: "sprocket".to_owned(),
        }
    }
}

/// Worker pool sizing and backpressure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Threads kept alive for the pool's whole lifetime.
    pub min_threads: usize,
    /// Thread ceiling.
    pub max_threads: usize,
    /// Idle time after which threads above the minimum are reclaimed
    /// (seconds).
    pub idle_timeout_secs: u64,
    /// Backlog queue capacity. Zero means direct handoff: a submission only
    /// queues if a worker is already waiting for it.
    pub backlog_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            min_threads: 0,
            max_threads: 8,
            idle_timeout_secs: 60,
            backlog_capacity: 0,
        }
    }
}

impl SchedulerConfig {
    /// Load and validate a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| SchedulerError::Config(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the scheduler relies on.
    ///
    /// # Errors
    ///
    /// Returns an error when the worker pool is sized to zero, the minimum
    /// exceeds the ceiling, or the thread-name prefix is empty.
    pub fn validate(&self) -> Result<()> {
        if self.workers.max_threads == 0 {
            return Err(SchedulerError::Config(
                "max_threads must be at least 1".into(),
            ));
        }
        if self.workers.min_threads > self.workers.max_threads {
            return Err(SchedulerError::Config(format!(
                "min_threads ({}) exceeds max_threads ({})",
                self.workers.min_threads, self.workers.max_threads
            )));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(SchedulerError::Config(
                "thread_name_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn shutdown_wait(&self) -> Duration {
        Duration::from_millis(self.shutdown_wait_ms)
    }
}

impl WorkerPoolConfig {
    pub(crate) fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}
