//! Per-file catalog work shared by the scan phases.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::catalog::CatalogRepository;
use crate::error::Result;
use crate::metadata::MetadataExtractor;
use crate::pool::{LazyPreviewPool, PreviewWorkerPool};
use crate::preview::PreviewTask;
use crate::types::{
    CatalogFileRecord, FileRecordUpdate, FileStatus, NewFileRecord, NewPhoto,
    PhotoId, PreviewStatus, UserId, file_name_and_type,
};

/// Extracts metadata and writes the resulting catalog rows for new and
/// changed files.
#[derive(Clone)]
pub struct FileProcessor {
    catalog: Arc<dyn CatalogRepository>,
    metadata: Arc<dyn MetadataExtractor>,
}

impl std::fmt::Debug for FileProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileProcessor").finish_non_exhaustive()
    }
}

impl FileProcessor {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        metadata: Arc<dyn MetadataExtractor>,
    ) -> Self {
        Self { catalog, metadata }
    }

    /// Creates a photo titled after the file basename, with the file as its
    /// Source and a pending preview.
    pub async fn process_new_file(
        &self,
        user_id: UserId,
        relative_path: &str,
        full_path: &Path,
        file_hash: String,
    ) -> Result<PhotoId> {
        let metadata = self.metadata.extract(full_path).await?;
        let (file_name, file_type) = file_name_and_type(relative_path);

        let photo = NewPhoto {
            title: file_name.clone(),
            attributes: metadata.photo,
            file: NewFileRecord {
                file_name,
                file_type,
                file_path: relative_path.to_string(),
                file_hash,
                attributes: metadata.file,
                status: FileStatus::Source,
                preview_status: PreviewStatus::Pending,
            },
            location: metadata.gps,
        };

        let photo_id = self.catalog.create_photo(user_id, photo).await?;
        debug!(path = relative_path, photo_id = %photo_id, "processed new file");
        Ok(photo_id)
    }

    /// Rewrites a record whose content changed. Source files also refresh
    /// their photo's title, attributes and location.
    pub async fn process_changed_file(
        &self,
        record: &CatalogFileRecord,
        full_path: &Path,
        file_hash: String,
    ) -> Result<()> {
        let metadata = self.metadata.extract(full_path).await?;
        let (file_name, file_type) = file_name_and_type(&record.file_path);

        if record.status == FileStatus::Source {
            self.catalog
                .update_photo(record.photo_id, file_name.clone(), metadata.photo)
                .await?;
            if let Some(location) = metadata.gps {
                self.catalog
                    .upsert_photo_location(record.photo_id, location)
                    .await?;
            }
        }

        self.catalog
            .update_file_record(
                record.id,
                FileRecordUpdate {
                    file_name,
                    file_type,
                    file_hash,
                    attributes: metadata.file,
                },
            )
            .await?;
        debug!(path = %record.file_path, "processed changed file");
        Ok(())
    }
}

/// Checks the shared pool out on the first submission of a scan and hands
/// it back once the scan's work has drained.
pub(crate) struct PreviewSubmitter<'a> {
    previews: &'a LazyPreviewPool,
    pool: Option<Arc<PreviewWorkerPool>>,
    submitted: usize,
}

impl<'a> PreviewSubmitter<'a> {
    pub(crate) fn new(previews: &'a LazyPreviewPool) -> Self {
        Self {
            previews,
            pool: None,
            submitted: 0,
        }
    }

    pub(crate) async fn submit(&mut self, task: PreviewTask) -> Result<()> {
        let pool = match &self.pool {
            Some(pool) => Arc::clone(pool),
            None => {
                let pool = self.previews.get_pool().await;
                self.pool = Some(Arc::clone(&pool));
                pool
            }
        };
        pool.add_task(task).await?;
        self.submitted += 1;
        Ok(())
    }

    /// Waits for every submitted preview, then releases the checkout.
    pub(crate) async fn finish(self) {
        let Some(pool) = self.pool else {
            return;
        };
        pool.wait_for_completion().await;
        let stats = pool.stats().await;
        info!(
            submitted = self.submitted,
            completed = stats.completed,
            failed = stats.failed,
            "preview generation drained"
        );
        self.previews.release_pool(&pool).await;
    }
}
