use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ids::{FileId, PhotoId, UserId};
use super::metadata::{FileAttributes, GpsAttributes, PhotoAttributes};

/// Marker stored in user records before the owner configured a real path.
pub const PATH_PLACEHOLDER: &str = "placeholder";

/// Role of a file within its photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileStatus {
    /// Primary file of the photo; drives the photo's title and attributes.
    Source,
    /// Auxiliary rendition or sidecar attached to the same photo.
    Derived,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub enum PreviewStatus {
    #[default]
    Pending,
    Processing,
    Ready,
    Failed,
}

/// Projection of a catalog file used while reconciling a library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFileRecord {
    pub id: FileId,
    /// Path relative to the owner's base path, `/`-separated.
    pub file_path: String,
    pub file_hash: String,
    pub photo_id: PhotoId,
    pub status: FileStatus,
}

/// Owner of a library as needed by a scan run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanUser {
    pub id: UserId,
    pub base_path: Option<PathBuf>,
    pub cache_path: Option<PathBuf>,
}

impl ScanUser {
    pub fn base_path(&self) -> Option<&Path> {
        configured(self.base_path.as_deref())
    }

    pub fn cache_path(&self) -> Option<&Path> {
        configured(self.cache_path.as_deref())
    }
}

fn configured(path: Option<&Path>) -> Option<&Path> {
    path.filter(|p| {
        !p.as_os_str().is_empty() && *p != Path::new(PATH_PLACEHOLDER)
    })
}

/// Scan flavour requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMode {
    /// Reconcile additions, renames and deletions only.
    Delta,
    /// Delta plus re-hashing every matched file.
    Full,
}

impl ScanMode {
    pub fn is_delta(self) -> bool {
        matches!(self, ScanMode::Delta)
    }
}

/// Payload for creating a photo together with its Source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPhoto {
    pub title: String,
    pub attributes: PhotoAttributes,
    pub file: NewFileRecord,
    pub location: Option<GpsAttributes>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFileRecord {
    pub file_name: String,
    pub file_type: String,
    pub file_path: String,
    pub file_hash: String,
    pub attributes: FileAttributes,
    pub status: FileStatus,
    pub preview_status: PreviewStatus,
}

/// Content-derived fields rewritten when a file changed on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecordUpdate {
    pub file_name: String,
    pub file_type: String,
    pub file_hash: String,
    pub attributes: FileAttributes,
}

/// Splits a relative catalog path into its basename and extension (case
/// preserved), the way titles and file types are stored.
pub fn file_name_and_type(relative_path: &str) -> (String, String) {
    let name = relative_path
        .rsplit('/')
        .next()
        .unwrap_or(relative_path)
        .to_string();
    let file_type = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_string())
        .unwrap_or_default();
    (name, file_type)
}
