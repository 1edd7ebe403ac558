use std::env;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const WORKER_COUNT_ENV: &str = "PHOTO_WORKER_COUNT";
pub const WORKER_MEMORY_ENV: &str = "PHOTO_WORKER_MEMORY_MB";
pub const DEFAULT_MAX_QUEUE_SIZE_MB: u64 = 512;

/// Fully resolved pool shape, fixed for the lifetime of one pool instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    pub worker_count: usize,
    pub max_queue_size_mb: u64,
}

impl WorkerPoolConfig {
    pub fn max_queue_bytes(&self) -> u64 {
        self.max_queue_size_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            max_queue_size_mb: DEFAULT_MAX_QUEUE_SIZE_MB,
        }
    }
}

/// One fewer than the available cores, but never below two.
pub fn default_worker_count() -> usize {
    num_cpus::get().saturating_sub(1).max(2)
}

/// Optional overrides, resolved into a [`WorkerPoolConfig`] each time a pool
/// is created. Explicit values win over the environment, which wins over the
/// defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolSettings {
    pub worker_count: Option<usize>,
    pub max_queue_size_mb: Option<u64>,
}

impl WorkerPoolSettings {
    pub fn resolve(&self) -> WorkerPoolConfig {
        self.resolve_with(|key| env::var(key).ok())
    }

    pub fn resolve_with<F>(&self, lookup: F) -> WorkerPoolConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = WorkerPoolConfig::default();
        let worker_count = self
            .worker_count
            .filter(|count| *count >= 1)
            .or_else(|| positive_env(&lookup, WORKER_COUNT_ENV))
            .unwrap_or(defaults.worker_count);
        let max_queue_size_mb = self
            .max_queue_size_mb
            .filter(|mb| *mb >= 1)
            .or_else(|| positive_env(&lookup, WORKER_MEMORY_ENV))
            .unwrap_or(defaults.max_queue_size_mb);

        WorkerPoolConfig {
            worker_count,
            max_queue_size_mb,
        }
    }
}

fn positive_env<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + PartialOrd + From<u8>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) if value >= T::from(1) => Some(value),
        _ => {
            warn!(key, value = %raw, "ignoring invalid worker pool override");
            None
        }
    }
}
