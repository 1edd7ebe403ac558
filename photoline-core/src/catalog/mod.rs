pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    CatalogFileRecord, FileId, FileRecordUpdate, GpsAttributes, NewPhoto,
    PhotoAttributes, PhotoId, ScanUser, UserId,
};

pub use memory::{CatalogSnapshot, FileEntry, InMemoryCatalog, PhotoEntry};

/// Catalog persistence port consumed by the scanner.
///
/// Paths are the `/`-separated form relative to the owner's base path.
/// Adapters map these calls onto their storage; the scanner never assumes
/// anything about transactions beyond a single call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn find_scan_user(&self, user_id: UserId) -> Result<Option<ScanUser>>;

    async fn find_records_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CatalogFileRecord>>;

    /// Creates the photo, its Source file record and, when present, its
    /// location.
    async fn create_photo(&self, user_id: UserId, photo: NewPhoto) -> Result<PhotoId>;

    async fn update_photo(
        &self,
        photo_id: PhotoId,
        title: String,
        attributes: PhotoAttributes,
    ) -> Result<()>;

    async fn upsert_photo_location(
        &self,
        photo_id: PhotoId,
        location: GpsAttributes,
    ) -> Result<()>;

    async fn update_file_record(
        &self,
        file_id: FileId,
        update: FileRecordUpdate,
    ) -> Result<()>;

    async fn update_file_path_by_id(&self, file_id: FileId, file_path: String) -> Result<()>;

    async fn count_files_by_photo(&self, photo_id: PhotoId) -> Result<usize>;

    async fn delete_file_record(&self, file_id: FileId) -> Result<()>;

    async fn delete_photo_and_files(&self, photo_id: PhotoId) -> Result<()>;
}
