use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::CatalogRepository;
use crate::error::{Result, ScanError};
use crate::preview::{PreviewResult, PreviewResultSink};
use crate::types::{
    CatalogFileRecord, FileAttributes, FileId, FileRecordUpdate, FileStatus,
    GpsAttributes, NewPhoto, PhotoAttributes, PhotoId, PreviewStatus, ScanUser,
    UserId,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoEntry {
    pub id: PhotoId,
    pub user_id: UserId,
    pub title: String,
    pub attributes: PhotoAttributes,
    pub location: Option<GpsAttributes>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub id: FileId,
    pub user_id: UserId,
    pub photo_id: PhotoId,
    pub file_name: String,
    pub file_type: String,
    pub file_path: String,
    pub file_hash: String,
    pub attributes: FileAttributes,
    pub status: FileStatus,
    pub preview_status: PreviewStatus,
    pub preview_path: Option<PathBuf>,
    pub preview_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileEntry {
    fn record(&self) -> CatalogFileRecord {
        CatalogFileRecord {
            id: self.id,
            file_path: self.file_path.clone(),
            file_hash: self.file_hash.clone(),
            photo_id: self.photo_id,
            status: self.status,
        }
    }
}

/// Serializable image of the whole catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSnapshot {
    pub users: Vec<ScanUser>,
    pub photos: Vec<PhotoEntry>,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Default)]
struct CatalogState {
    users: BTreeMap<UserId, ScanUser>,
    photos: BTreeMap<PhotoId, PhotoEntry>,
    files: BTreeMap<FileId, FileEntry>,
}

/// Catalog kept entirely in memory. Serves the CLI (persisted as a JSON
/// snapshot between runs) and tests.
#[derive(Default)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
}

impl fmt::Debug for InMemoryCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("InMemoryCatalog");
        match self.state.try_read() {
            Ok(state) => {
                debug
                    .field("users", &state.users.len())
                    .field("photos", &state.photos.len())
                    .field("files", &state.files.len());
            }
            Err(_) => {
                debug.field("state", &"<locked>");
            }
        }
        debug.finish()
    }
}

fn photo_not_found(photo_id: PhotoId) -> ScanError {
    ScanError::NotFound(format!("photo {photo_id} not found"))
}

fn file_not_found(file_id: FileId) -> ScanError {
    ScanError::NotFound(format!("file {file_id} not found"))
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        let state = CatalogState {
            users: snapshot.users.into_iter().map(|u| (u.id, u)).collect(),
            photos: snapshot.photos.into_iter().map(|p| (p.id, p)).collect(),
            files: snapshot.files.into_iter().map(|f| (f.id, f)).collect(),
        };
        Self {
            state: RwLock::new(state),
        }
    }

    pub async fn snapshot(&self) -> CatalogSnapshot {
        let state = self.state.read().await;
        CatalogSnapshot {
            users: state.users.values().cloned().collect(),
            photos: state.photos.values().cloned().collect(),
            files: state.files.values().cloned().collect(),
        }
    }

    /// Registers or replaces a library owner.
    pub async fn add_user(&self, user: ScanUser) {
        self.state.write().await.users.insert(user.id, user);
    }

    pub async fn photos_for_user(&self, user_id: UserId) -> Vec<PhotoEntry> {
        let state = self.state.read().await;
        state
            .photos
            .values()
            .filter(|photo| photo.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn files_for_user(&self, user_id: UserId) -> Vec<FileEntry> {
        let state = self.state.read().await;
        state
            .files
            .values()
            .filter(|file| file.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn photo(&self, photo_id: PhotoId) -> Option<PhotoEntry> {
        self.state.read().await.photos.get(&photo_id).cloned()
    }

    pub async fn file(&self, file_id: FileId) -> Option<FileEntry> {
        self.state.read().await.files.get(&file_id).cloned()
    }

    /// Attaches an extra file to an existing photo, e.g. a sidecar or an
    /// exported rendition.
    pub async fn attach_file(
        &self,
        photo_id: PhotoId,
        file_path: &str,
        file_hash: &str,
        status: FileStatus,
    ) -> Result<FileId> {
        let mut state = self.state.write().await;
        let user_id = state
            .photos
            .get(&photo_id)
            .map(|photo| photo.user_id)
            .ok_or_else(|| photo_not_found(photo_id))?;
        let (file_name, file_type) = crate::types::file_name_and_type(file_path);
        let now = Utc::now();
        let id = FileId::new();
        state.files.insert(
            id,
            FileEntry {
                id,
                user_id,
                photo_id,
                file_name,
                file_type,
                file_path: file_path.to_string(),
                file_hash: file_hash.to_string(),
                attributes: FileAttributes::default(),
                status,
                preview_status: PreviewStatus::Pending,
                preview_path: None,
                preview_error: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn find_scan_user(&self, user_id: UserId) -> Result<Option<ScanUser>> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn find_records_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CatalogFileRecord>> {
        let state = self.state.read().await;
        Ok(state
            .files
            .values()
            .filter(|file| file.user_id == user_id)
            .map(FileEntry::record)
            .collect())
    }

    async fn create_photo(&self, user_id: UserId, photo: NewPhoto) -> Result<PhotoId> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&user_id) {
            return Err(ScanError::NotFound(format!("user {user_id} not found")));
        }
        if state
            .files
            .values()
            .any(|file| file.user_id == user_id && file.file_path == photo.file.file_path)
        {
            return Err(ScanError::Conflict(format!(
                "file path already cataloged: {}",
                photo.file.file_path
            )));
        }

        let now = Utc::now();
        let photo_id = PhotoId::new();
        let file_id = FileId::new();
        state.photos.insert(
            photo_id,
            PhotoEntry {
                id: photo_id,
                user_id,
                title: photo.title,
                attributes: photo.attributes,
                location: photo.location,
                created_at: now,
                updated_at: now,
            },
        );
        let file = photo.file;
        state.files.insert(
            file_id,
            FileEntry {
                id: file_id,
                user_id,
                photo_id,
                file_name: file.file_name,
                file_type: file.file_type,
                file_path: file.file_path,
                file_hash: file.file_hash,
                attributes: file.attributes,
                status: file.status,
                preview_status: file.preview_status,
                preview_path: None,
                preview_error: None,
                created_at: now,
                updated_at: now,
            },
        );
        debug!(photo_id = %photo_id, file_id = %file_id, "photo created");
        Ok(photo_id)
    }

    async fn update_photo(
        &self,
        photo_id: PhotoId,
        title: String,
        attributes: PhotoAttributes,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let photo = state
            .photos
            .get_mut(&photo_id)
            .ok_or_else(|| photo_not_found(photo_id))?;
        photo.title = title;
        photo.attributes = attributes;
        photo.updated_at = Utc::now();
        Ok(())
    }

    async fn upsert_photo_location(
        &self,
        photo_id: PhotoId,
        location: GpsAttributes,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let photo = state
            .photos
            .get_mut(&photo_id)
            .ok_or_else(|| photo_not_found(photo_id))?;
        photo.location = Some(location);
        photo.updated_at = Utc::now();
        Ok(())
    }

    async fn update_file_record(
        &self,
        file_id: FileId,
        update: FileRecordUpdate,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let file = state
            .files
            .get_mut(&file_id)
            .ok_or_else(|| file_not_found(file_id))?;
        file.file_name = update.file_name;
        file.file_type = update.file_type;
        file.file_hash = update.file_hash;
        file.attributes = update.attributes;
        file.preview_status = PreviewStatus::Pending;
        file.preview_error = None;
        file.updated_at = Utc::now();
        Ok(())
    }

    async fn update_file_path_by_id(&self, file_id: FileId, file_path: String) -> Result<()> {
        let mut state = self.state.write().await;
        let file = state
            .files
            .get_mut(&file_id)
            .ok_or_else(|| file_not_found(file_id))?;
        let (file_name, file_type) = crate::types::file_name_and_type(&file_path);
        file.file_name = file_name;
        file.file_type = file_type;
        file.file_path = file_path;
        file.updated_at = Utc::now();
        Ok(())
    }

    async fn count_files_by_photo(&self, photo_id: PhotoId) -> Result<usize> {
        let state = self.state.read().await;
        Ok(state
            .files
            .values()
            .filter(|file| file.photo_id == photo_id)
            .count())
    }

    async fn delete_file_record(&self, file_id: FileId) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .files
            .remove(&file_id)
            .map(|_| ())
            .ok_or_else(|| file_not_found(file_id))
    }

    async fn delete_photo_and_files(&self, photo_id: PhotoId) -> Result<()> {
        let mut state = self.state.write().await;
        if state.photos.remove(&photo_id).is_none() {
            return Err(photo_not_found(photo_id));
        }
        state.files.retain(|_, file| file.photo_id != photo_id);
        debug!(photo_id = %photo_id, "photo and files deleted");
        Ok(())
    }
}

#[async_trait]
impl PreviewResultSink for InMemoryCatalog {
    async fn record(&self, result: &PreviewResult) {
        let mut state = self.state.write().await;
        let Some(file) = state
            .files
            .values_mut()
            .find(|file| file.user_id == result.user_id && file.file_path == result.file_path)
        else {
            warn!(path = %result.file_path, "preview finished for a file no longer in the catalog");
            return;
        };

        if result.success {
            file.preview_status = PreviewStatus::Ready;
            file.preview_path = result.output_path.clone();
            file.preview_error = None;
        } else {
            file.preview_status = PreviewStatus::Failed;
            file.preview_error = result.error.clone();
        }
        file.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewFileRecord;

    fn user() -> ScanUser {
        ScanUser {
            id: UserId::new(),
            base_path: Some(PathBuf::from("/photos")),
            cache_path: Some(PathBuf::from("/cache")),
        }
    }

    fn new_photo(path: &str, hash: &str) -> NewPhoto {
        let (file_name, file_type) = crate::types::file_name_and_type(path);
        NewPhoto {
            title: file_name.clone(),
            attributes: PhotoAttributes::default(),
            file: NewFileRecord {
                file_name,
                file_type,
                file_path: path.to_string(),
                file_hash: hash.to_string(),
                attributes: FileAttributes::default(),
                status: FileStatus::Source,
                preview_status: PreviewStatus::Pending,
            },
            location: None,
        }
    }

    #[tokio::test]
    async fn create_then_list_records() {
        let catalog = InMemoryCatalog::new();
        let owner = user();
        catalog.add_user(owner.clone()).await;

        let photo_id = catalog
            .create_photo(owner.id, new_photo("2020/a.jpg", "h1"))
            .await
            .unwrap();

        let records = catalog.find_records_for_user(owner.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].photo_id, photo_id);
        assert_eq!(records[0].file_path, "2020/a.jpg");
        assert_eq!(records[0].status, FileStatus::Source);

        let dup = catalog
            .create_photo(owner.id, new_photo("2020/a.jpg", "h2"))
            .await;
        assert!(matches!(dup, Err(ScanError::Conflict(_))));
    }

    #[tokio::test]
    async fn deleting_a_photo_removes_every_file() {
        let catalog = InMemoryCatalog::new();
        let owner = user();
        catalog.add_user(owner.clone()).await;
        let photo_id = catalog
            .create_photo(owner.id, new_photo("a.jpg", "h1"))
            .await
            .unwrap();
        catalog
            .attach_file(photo_id, "a.xmp.jpg", "h2", FileStatus::Derived)
            .await
            .unwrap();
        assert_eq!(catalog.count_files_by_photo(photo_id).await.unwrap(), 2);

        catalog.delete_photo_and_files(photo_id).await.unwrap();

        assert!(catalog.photo(photo_id).await.is_none());
        assert!(catalog.files_for_user(owner.id).await.is_empty());
    }

    #[tokio::test]
    async fn preview_results_update_the_file_record() {
        let catalog = InMemoryCatalog::new();
        let owner = user();
        catalog.add_user(owner.clone()).await;
        catalog
            .create_photo(owner.id, new_photo("ok.jpg", "h1"))
            .await
            .unwrap();
        catalog
            .create_photo(owner.id, new_photo("bad.jpg", "h2"))
            .await
            .unwrap();

        catalog
            .record(&PreviewResult {
                user_id: owner.id,
                success: true,
                file_path: "ok.jpg".into(),
                output_path: Some(PathBuf::from("/cache/previews/aa/x.jpg")),
                error: None,
            })
            .await;
        catalog
            .record(&PreviewResult::failed(owner.id, "bad.jpg".into(), "decode failed"))
            .await;

        let files = catalog.files_for_user(owner.id).await;
        let ok = files.iter().find(|f| f.file_path == "ok.jpg").unwrap();
        let bad = files.iter().find(|f| f.file_path == "bad.jpg").unwrap();
        assert_eq!(ok.preview_status, PreviewStatus::Ready);
        assert_eq!(
            ok.preview_path.as_deref(),
            Some(std::path::Path::new("/cache/previews/aa/x.jpg"))
        );
        assert_eq!(bad.preview_status, PreviewStatus::Failed);
        assert_eq!(bad.preview_error.as_deref(), Some("decode failed"));
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_json() {
        let catalog = InMemoryCatalog::new();
        let owner = user();
        catalog.add_user(owner.clone()).await;
        catalog
            .create_photo(owner.id, new_photo("a.jpg", "h1"))
            .await
            .unwrap();

        let json = serde_json::to_string(&catalog.snapshot().await).unwrap();
        let restored =
            InMemoryCatalog::from_snapshot(serde_json::from_str(&json).unwrap());

        assert_eq!(restored.snapshot().await, catalog.snapshot().await);
        assert!(restored.find_scan_user(owner.id).await.unwrap().is_some());
    }
}
