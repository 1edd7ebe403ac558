//! Per-user scan job state.
//!
//! Each user owns at most one entry. Entries are created when a job is
//! admitted, mutated by the orchestrator while it runs, and stay around in a
//! terminal state until deleted or purged.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, ScanError};
use crate::types::{JobId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanJobState {
    Initializing,
    InProgress,
    Completed,
    Error,
}

impl ScanJobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanJobState::Completed | ScanJobState::Error)
    }
}

/// Progress counter bumped by [`ScanStatusTracker::update_in_progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanProgressKind {
    IncreasedScanned,
    NotMatchedMatchedWithIncreased,
    NotMatchedDeleted,
    MatchedUpdated,
}

/// Snapshot of one user's scan job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStatus {
    pub job_id: JobId,
    pub status: ScanJobState,
    pub photos_increased: u64,
    pub photos_increased_scanned: u64,
    pub photos_not_matched: u64,
    pub photos_not_matched_matched_with_increase: u64,
    pub photos_not_matched_deleted: u64,
    pub photos_matched: u64,
    pub photos_matched_updated: u64,
    pub updated_at: DateTime<Utc>,
}

impl ScanStatus {
    fn initializing(job_id: JobId) -> Self {
        Self {
            job_id,
            status: ScanJobState::Initializing,
            photos_increased: 0,
            photos_increased_scanned: 0,
            photos_not_matched: 0,
            photos_not_matched_matched_with_increase: 0,
            photos_not_matched_deleted: 0,
            photos_matched: 0,
            photos_matched_updated: 0,
            updated_at: Utc::now(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// In-memory job table keyed by user. Different users never contend on the
/// same shard entry.
#[derive(Debug, Default)]
pub struct ScanStatusTracker {
    jobs: DashMap<UserId, ScanStatus>,
}

fn job_not_found(user_id: UserId) -> ScanError {
    ScanError::NotFound(format!("Job not found for user {user_id}"))
}

impl ScanStatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a new job for `user_id`, failing with `Conflict` while an
    /// earlier job for the same user has not reached a terminal state.
    pub fn begin_scan_job(&self, user_id: UserId, job_id: JobId) -> Result<()> {
        match self.jobs.entry(user_id) {
            Entry::Occupied(mut entry) => {
                let current = entry.get();
                if !current.status.is_terminal() {
                    return Err(ScanError::Conflict(format!(
                        "scan job {} is already {:?} for user {user_id}",
                        current.job_id, current.status
                    )));
                }
                entry.insert(ScanStatus::initializing(job_id));
            }
            Entry::Vacant(entry) => {
                entry.insert(ScanStatus::initializing(job_id));
            }
        }
        info!(user_id = %user_id, job_id = %job_id, "scan job admitted");
        Ok(())
    }

    /// Creates or overwrites the entry in `Initializing` with zeroed counters.
    pub fn initialize_scan_job(&self, user_id: UserId, job_id: JobId) {
        self.jobs.insert(user_id, ScanStatus::initializing(job_id));
    }

    pub fn set_in_progress(
        &self,
        user_id: UserId,
        increased: usize,
        not_matched: usize,
        matched: usize,
    ) -> Result<()> {
        let mut entry =
            self.jobs.get_mut(&user_id).ok_or_else(|| job_not_found(user_id))?;
        entry.status = ScanJobState::InProgress;
        entry.photos_increased = increased as u64;
        entry.photos_not_matched = not_matched as u64;
        entry.photos_matched = matched as u64;
        entry.touch();
        Ok(())
    }

    pub fn update_in_progress(
        &self,
        user_id: UserId,
        kind: ScanProgressKind,
    ) -> Result<()> {
        let mut entry =
            self.jobs.get_mut(&user_id).ok_or_else(|| job_not_found(user_id))?;
        match kind {
            ScanProgressKind::IncreasedScanned => {
                entry.photos_increased_scanned += 1
            }
            ScanProgressKind::NotMatchedMatchedWithIncreased => {
                entry.photos_not_matched_matched_with_increase += 1
            }
            ScanProgressKind::NotMatchedDeleted => {
                entry.photos_not_matched_deleted += 1
            }
            ScanProgressKind::MatchedUpdated => entry.photos_matched_updated += 1,
        }
        entry.touch();
        Ok(())
    }

    /// Marks the job as failed. A job that never got an entry is left alone.
    pub fn set_error(&self, user_id: UserId) {
        if let Some(mut entry) = self.jobs.get_mut(&user_id) {
            entry.status = ScanJobState::Error;
            entry.touch();
        }
    }

    pub fn complete(&self, user_id: UserId) -> Result<()> {
        let mut entry =
            self.jobs.get_mut(&user_id).ok_or_else(|| job_not_found(user_id))?;
        entry.status = ScanJobState::Completed;
        entry.touch();
        Ok(())
    }

    pub fn get(&self, user_id: UserId) -> Option<ScanStatus> {
        self.jobs.get(&user_id).map(|entry| entry.value().clone())
    }

    pub fn delete(&self, user_id: UserId) -> Option<ScanStatus> {
        self.jobs.remove(&user_id).map(|(_, status)| status)
    }

    /// Drops terminal entries last touched before `older_than`. Returns the
    /// number of removed entries.
    pub fn purge_finished(&self, older_than: DateTime<Utc>) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, status| {
            !(status.status.is_terminal() && status.updated_at < older_than)
        });
        let removed = before.saturating_sub(self.jobs.len());
        if removed > 0 {
            debug!(removed, "purged finished scan jobs");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn second_job_conflicts_until_first_is_terminal() {
        let tracker = ScanStatusTracker::new();
        let user = UserId::new();
        tracker.begin_scan_job(user, JobId::new()).unwrap();

        let err = tracker.begin_scan_job(user, JobId::new()).unwrap_err();
        assert!(matches!(err, ScanError::Conflict(_)));

        tracker.set_in_progress(user, 1, 2, 3).unwrap();
        assert!(matches!(
            tracker.begin_scan_job(user, JobId::new()),
            Err(ScanError::Conflict(_))
        ));

        tracker.complete(user).unwrap();
        let next = JobId::new();
        tracker.begin_scan_job(user, next).unwrap();
        let status = tracker.get(user).unwrap();
        assert_eq!(status.job_id, next);
        assert_eq!(status.status, ScanJobState::Initializing);
        assert_eq!(status.photos_matched, 0);
    }

    #[test]
    fn counters_follow_progress_kinds() {
        let tracker = ScanStatusTracker::new();
        let user = UserId::new();
        tracker.initialize_scan_job(user, JobId::new());
        tracker.set_in_progress(user, 2, 1, 4).unwrap();
        tracker
            .update_in_progress(user, ScanProgressKind::IncreasedScanned)
            .unwrap();
        tracker
            .update_in_progress(user, ScanProgressKind::IncreasedScanned)
            .unwrap();
        tracker
            .update_in_progress(user, ScanProgressKind::NotMatchedDeleted)
            .unwrap();
        tracker
            .update_in_progress(user, ScanProgressKind::MatchedUpdated)
            .unwrap();

        let status = tracker.get(user).unwrap();
        assert_eq!(status.status, ScanJobState::InProgress);
        assert_eq!(status.photos_increased, 2);
        assert_eq!(status.photos_not_matched, 1);
        assert_eq!(status.photos_matched, 4);
        assert_eq!(status.photos_increased_scanned, 2);
        assert_eq!(status.photos_not_matched_deleted, 1);
        assert_eq!(status.photos_matched_updated, 1);
        assert_eq!(status.photos_not_matched_matched_with_increase, 0);
    }

    #[test]
    fn missing_job_is_reported_except_for_errors() {
        let tracker = ScanStatusTracker::new();
        let user = UserId::new();
        assert!(matches!(
            tracker.set_in_progress(user, 0, 0, 0),
            Err(ScanError::NotFound(_))
        ));
        assert!(matches!(
            tracker.update_in_progress(user, ScanProgressKind::MatchedUpdated),
            Err(ScanError::NotFound(_))
        ));
        assert!(matches!(tracker.complete(user), Err(ScanError::NotFound(_))));

        tracker.set_error(user);
        assert!(tracker.get(user).is_none());
    }

    #[test]
    fn purge_only_touches_old_terminal_jobs() {
        let tracker = ScanStatusTracker::new();
        let finished = UserId::new();
        let running = UserId::new();
        tracker.initialize_scan_job(finished, JobId::new());
        tracker.set_error(finished);
        tracker.initialize_scan_job(running, JobId::new());

        let cutoff = Utc::now() + Duration::seconds(1);
        assert_eq!(tracker.purge_finished(cutoff), 1);
        assert!(tracker.get(finished).is_none());
        assert!(tracker.get(running).is_some());
    }

    #[test]
    fn status_serializes_in_camel_case() {
        let tracker = ScanStatusTracker::new();
        let user = UserId::new();
        tracker.initialize_scan_job(user, JobId::new());
        let json = serde_json::to_value(tracker.get(user).unwrap()).unwrap();
        assert!(json.get("photosNotMatchedMatchedWithIncrease").is_some());
        assert_eq!(json["status"], "Initializing");
    }
}
