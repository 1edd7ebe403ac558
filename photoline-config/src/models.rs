use std::time::Duration;

use anyhow::bail;
use photoline_core::pool::{DEFAULT_IDLE_TIMEOUT, WorkerPoolSettings};
use photoline_core::preview::ImagePreviewCodec;
use photoline_core::preview::codec::{DEFAULT_PREVIEW_MAX_DIMENSION, DEFAULT_PREVIEW_QUALITY};
use photoline_core::scan::service::DEFAULT_STATUS_RETENTION;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotolineConfig {
    pub scanner: ScannerSettings,
    /// Leave fields unset to defer to `PHOTO_WORKER_COUNT` /
    /// `PHOTO_WORKER_MEMORY_MB` and then the built-in defaults.
    pub worker_pool: WorkerPoolSettings,
    pub preview: PreviewSettings,
    pub logging: LoggingSettings,
}

impl PhotolineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scanner.idle_timeout_ms == 0 {
            bail!("scanner.idle_timeout_ms must be greater than zero");
        }
        if self.preview.max_dimension == 0 {
            bail!("preview.max_dimension must be greater than zero");
        }
        if !(1..=100).contains(&self.preview.quality) {
            bail!(
                "preview.quality must be between 1 and 100, got {}",
                self.preview.quality
            );
        }
        if self.worker_pool.worker_count == Some(0) {
            bail!("worker_pool.worker_count must be at least 1");
        }
        if self.worker_pool.max_queue_size_mb == Some(0) {
            bail!("worker_pool.max_queue_size_mb must be at least 1");
        }
        Ok(())
    }
}

/// Scan job lifecycle tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerSettings {
    /// How long an unused preview pool is kept alive (ms).
    pub idle_timeout_ms: u64,
    /// How long finished job statuses stay queryable (ms).
    pub status_retention_ms: u64,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT.as_millis() as u64,
            status_retention_ms: DEFAULT_STATUS_RETENTION.as_millis() as u64,
        }
    }
}

impl ScannerSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn status_retention(&self) -> Duration {
        Duration::from_millis(self.status_retention_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewSettings {
    pub max_dimension: u32,
    pub quality: u8,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_PREVIEW_MAX_DIMENSION,
            quality: DEFAULT_PREVIEW_QUALITY,
        }
    }
}

impl PreviewSettings {
    pub fn codec(&self) -> ImagePreviewCodec {
        ImagePreviewCodec::new(self.max_dimension, self.quality)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}
