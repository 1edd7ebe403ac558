//! Caller-facing entry points for starting and observing scans.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use super::orchestrator::PhotoScanJob;
use super::status::{ScanStatus, ScanStatusTracker};
use crate::error::Result;
use crate::pool::LazyPreviewPool;
use crate::types::{JobId, ScanMode, UserId};

pub const DEFAULT_STATUS_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Admits at most one live job per user and runs it in the background.
#[derive(Debug, Clone)]
pub struct ScanService {
    job: Arc<PhotoScanJob>,
    tracker: Arc<ScanStatusTracker>,
    previews: Arc<LazyPreviewPool>,
    status_retention: Duration,
}

impl ScanService {
    pub fn new(job: Arc<PhotoScanJob>) -> Self {
        let tracker = Arc::clone(job.tracker());
        let previews = Arc::clone(job.previews());
        Self {
            job,
            tracker,
            previews,
            status_retention: DEFAULT_STATUS_RETENTION,
        }
    }

    /// How long finished job entries are kept before the next admission
    /// purges them.
    pub fn with_status_retention(mut self, retention: Duration) -> Self {
        self.status_retention = retention;
        self
    }

    /// Starts a full scan. Must be called from within a tokio runtime.
    pub fn start_scan(&self, user_id: UserId) -> Result<JobId> {
        self.start(user_id, ScanMode::Full)
    }

    /// Starts a delta scan. Must be called from within a tokio runtime.
    pub fn start_delta_scan(&self, user_id: UserId) -> Result<JobId> {
        self.start(user_id, ScanMode::Delta)
    }

    fn start(&self, user_id: UserId, mode: ScanMode) -> Result<JobId> {
        if let Ok(retention) = chrono::Duration::from_std(self.status_retention) {
            self.tracker.purge_finished(Utc::now() - retention);
        }

        let job_id = JobId::new();
        self.tracker.begin_scan_job(user_id, job_id)?;

        let job = Arc::clone(&self.job);
        tokio::spawn(async move {
            // Outcome is logged and reflected in the tracker.
            let _ = job.run(user_id, job_id, mode).await;
        });

        info!(user_id = %user_id, job_id = %job_id, ?mode, "scan job started");
        Ok(job_id)
    }

    pub fn get_status(&self, user_id: UserId) -> Option<ScanStatus> {
        self.tracker.get(user_id)
    }

    pub fn delete_status(&self, user_id: UserId) -> Option<ScanStatus> {
        self.tracker.delete(user_id)
    }

    /// Tears the preview pool down immediately.
    pub async fn shutdown(&self) {
        self.previews.force_terminate().await;
    }
}
