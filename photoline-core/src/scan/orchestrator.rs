//! Drives one scan run from catalog load to pool drain.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::diff::{DiffSet, absolute_path, build_diff};
use super::fs::FileSystem;
use super::processing::{FileProcessor, PreviewSubmitter};
use super::status::{ScanProgressKind, ScanStatusTracker};
use crate::catalog::CatalogRepository;
use crate::error::{Result, ScanError};
use crate::hashing::content_hash;
use crate::metadata::MetadataExtractor;
use crate::pool::LazyPreviewPool;
use crate::preview::{
    PreviewResult, PreviewTask, delete_preview, move_preview, preview_path,
};
use crate::types::{CatalogFileRecord, FileStatus, JobId, ScanMode, UserId};

/// Validated paths of the library being scanned.
#[derive(Debug)]
struct ScanScope {
    user_id: UserId,
    base: PathBuf,
    cache: PathBuf,
}

impl ScanScope {
    fn preview_task(&self, relative_path: &str, buffer: Vec<u8>) -> PreviewTask {
        PreviewTask {
            user_id: self.user_id,
            buffer,
            output_path: preview_path(&self.cache, relative_path),
            file_path: relative_path.to_string(),
        }
    }
}

/// One scan pipeline, shared by every run the service starts.
pub struct PhotoScanJob {
    catalog: Arc<dyn CatalogRepository>,
    fs: Arc<dyn FileSystem>,
    processor: FileProcessor,
    tracker: Arc<ScanStatusTracker>,
    previews: Arc<LazyPreviewPool>,
}

impl std::fmt::Debug for PhotoScanJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotoScanJob")
            .field("tracker", &self.tracker)
            .field("previews", &self.previews)
            .finish_non_exhaustive()
    }
}

impl PhotoScanJob {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        fs: Arc<dyn FileSystem>,
        metadata: Arc<dyn MetadataExtractor>,
        tracker: Arc<ScanStatusTracker>,
        previews: Arc<LazyPreviewPool>,
    ) -> Self {
        let processor = FileProcessor::new(Arc::clone(&catalog), metadata);
        Self {
            catalog,
            fs,
            processor,
            tracker,
            previews,
        }
    }

    pub fn tracker(&self) -> &Arc<ScanStatusTracker> {
        &self.tracker
    }

    pub fn previews(&self) -> &Arc<LazyPreviewPool> {
        &self.previews
    }

    /// Runs a scan to completion and records the terminal state. Setup
    /// failures flip the job to `Error` and are returned; per-file failures
    /// are logged and skipped.
    pub async fn run(&self, user_id: UserId, job_id: JobId, mode: ScanMode) -> Result<()> {
        info!(user_id = %user_id, job_id = %job_id, ?mode, "starting photo scan job");

        match self.execute(user_id, job_id, mode).await {
            Ok(()) => {
                self.tracker.complete(user_id)?;
                info!(user_id = %user_id, job_id = %job_id, "completed photo scan job");
                Ok(())
            }
            Err(err) => {
                error!(user_id = %user_id, job_id = %job_id, error = %err, "photo scan job failed");
                self.tracker.set_error(user_id);
                Err(err)
            }
        }
    }

    async fn execute(&self, user_id: UserId, job_id: JobId, mode: ScanMode) -> Result<()> {
        let scope = self.validated_scope(user_id).await?;
        self.tracker.initialize_scan_job(user_id, job_id);

        let records = self.catalog.find_records_for_user(user_id).await?;
        info!(user_id = %user_id, records = records.len(), "loaded existing catalog files");

        let mut diff = build_diff(self.fs.as_ref(), &scope.base, records).await?;
        let counts = diff.counts();
        self.tracker
            .set_in_progress(user_id, counts.increased, counts.not_matched, counts.matched)?;

        let mut previews = PreviewSubmitter::new(&self.previews);
        self.process_increased(&scope, &mut diff, &mut previews).await;
        self.process_not_matched(&scope, &mut diff).await;
        if !mode.is_delta() {
            self.process_matched(&scope, &mut diff, &mut previews).await;
        }
        previews.finish().await;
        Ok(())
    }

    async fn validated_scope(&self, user_id: UserId) -> Result<ScanScope> {
        let user = self
            .catalog
            .find_scan_user(user_id)
            .await?
            .ok_or_else(|| ScanError::NotFound(format!("user {user_id} not found")))?;

        let (Some(base), Some(cache)) = (user.base_path(), user.cache_path()) else {
            return Err(ScanError::Validation(
                "user base path or cache path not set".into(),
            ));
        };

        Ok(ScanScope {
            user_id,
            base: base.to_path_buf(),
            cache: cache.to_path_buf(),
        })
    }

    async fn process_increased(
        &self,
        scope: &ScanScope,
        diff: &mut DiffSet,
        previews: &mut PreviewSubmitter<'_>,
    ) {
        let increased = diff.take_increased();
        info!(count = increased.len(), "processing increased files");
        for relative_path in increased {
            if let Err(err) = self
                .process_increased_file(scope, diff, &relative_path, previews)
                .await
            {
                error!(path = %relative_path, error = %err, "failed to process increased file");
            }
        }
    }

    async fn process_increased_file(
        &self,
        scope: &ScanScope,
        diff: &mut DiffSet,
        relative_path: &str,
        previews: &mut PreviewSubmitter<'_>,
    ) -> Result<()> {
        let full_path = absolute_path(&scope.base, relative_path);
        let buffer = self.fs.read(&full_path).await?;
        let hash = content_hash(&buffer);

        if let Some(moved) = diff.take_hash_match(&hash) {
            debug!(from = %moved.file_path, to = relative_path, "hash match; treating as move");
            self.catalog
                .update_file_path_by_id(moved.id, relative_path.to_string())
                .await?;
            self.tracker.update_in_progress(
                scope.user_id,
                ScanProgressKind::NotMatchedMatchedWithIncreased,
            )?;
            if self.carry_preview(&scope.cache, &moved.file_path, relative_path).await {
                let result = PreviewResult::ready(
                    scope.user_id,
                    relative_path.to_string(),
                    preview_path(&scope.cache, relative_path),
                );
                self.previews.sink().record(&result).await;
                return Ok(());
            }
            return previews
                .submit(scope.preview_task(relative_path, buffer))
                .await;
        }

        self.processor
            .process_new_file(scope.user_id, relative_path, &full_path, hash)
            .await?;
        // Counted once the photo exists, whether or not its preview queues.
        self.tracker
            .update_in_progress(scope.user_id, ScanProgressKind::IncreasedScanned)?;
        previews
            .submit(scope.preview_task(relative_path, buffer))
            .await
    }

    /// Returns whether an existing preview now sits at the new location.
    async fn carry_preview(&self, cache: &Path, from: &str, to: &str) -> bool {
        match move_preview(cache, from, to).await {
            Ok(moved) => moved,
            Err(err) => {
                warn!(from, to, error = %err, "failed to move preview; regenerating");
                false
            }
        }
    }

    async fn process_not_matched(&self, scope: &ScanScope, diff: &mut DiffSet) {
        let missing = diff.take_not_matched();
        info!(count = missing.len(), "processing not matched files for deletion");
        for record in missing {
            match self.delete_missing(scope, &record).await {
                Ok(()) => {
                    if let Err(err) = self
                        .tracker
                        .update_in_progress(scope.user_id, ScanProgressKind::NotMatchedDeleted)
                    {
                        warn!(error = %err, "failed to record deletion progress");
                    }
                }
                Err(err) => {
                    error!(path = %record.file_path, error = %err, "failed to delete photo file");
                }
            }
        }
    }

    /// The only file of a photo takes the photo with it when it is the
    /// Source; anything else removes just that file record.
    async fn delete_missing(&self, scope: &ScanScope, record: &CatalogFileRecord) -> Result<()> {
        debug!(path = %record.file_path, "deleting photo file");
        let sole_source = record.status == FileStatus::Source
            && self.catalog.count_files_by_photo(record.photo_id).await? == 1;

        if sole_source {
            self.catalog.delete_photo_and_files(record.photo_id).await?;
        } else {
            self.catalog.delete_file_record(record.id).await?;
        }

        if let Err(err) = delete_preview(&scope.cache, &record.file_path).await {
            warn!(path = %record.file_path, error = %err, "failed to delete preview");
        }
        Ok(())
    }

    async fn process_matched(
        &self,
        scope: &ScanScope,
        diff: &mut DiffSet,
        previews: &mut PreviewSubmitter<'_>,
    ) {
        let matched = diff.take_matched();
        info!(count = matched.len(), "processing matched files for updates");
        for record in matched {
            if let Err(err) = self.process_matched_file(scope, &record, previews).await {
                error!(path = %record.file_path, error = %err, "failed to process matched file");
            }
        }
    }

    async fn process_matched_file(
        &self,
        scope: &ScanScope,
        record: &CatalogFileRecord,
        previews: &mut PreviewSubmitter<'_>,
    ) -> Result<()> {
        let full_path = absolute_path(&scope.base, &record.file_path);
        let buffer = self.fs.read(&full_path).await?;
        let hash = content_hash(&buffer);

        if hash != record.file_hash {
            debug!(path = %record.file_path, "content changed");
            self.processor
                .process_changed_file(record, &full_path, hash)
                .await?;
            self.tracker
                .update_in_progress(scope.user_id, ScanProgressKind::MatchedUpdated)?;
        }

        previews
            .submit(scope.preview_task(&record.file_path, buffer))
            .await
    }
}
