use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, ScanError};
use crate::hashing::path_digest;

pub const PREVIEW_DIR: &str = "previews";
pub const PREVIEW_EXTENSION: &str = "jpg";

/// Cache location of the preview for a catalog path.
///
/// The relative path (not the content) is digested, and the first two hex
/// characters shard the files into `previews/<prefix>/<digest>.jpg`.
pub fn preview_path(cache_root: &Path, relative_path: &str) -> PathBuf {
    let digest = path_digest(relative_path);
    cache_root
        .join(PREVIEW_DIR)
        .join(&digest[..2])
        .join(format!("{digest}.{PREVIEW_EXTENSION}"))
}

/// Removes the preview for `relative_path`. Returns whether a file was removed;
/// a preview that never existed is not an error.
pub async fn delete_preview(cache_root: &Path, relative_path: &str) -> Result<bool> {
    let path = preview_path(cache_root, relative_path);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => {
            debug!(path = %path.display(), "removed preview");
            Ok(true)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(ScanError::Io(io::Error::new(
            err.kind(),
            format!("failed to remove preview {}: {err}", path.display()),
        ))),
    }
}

/// Carries an existing preview over to the location derived from the new
/// catalog path. Returns `false` when there was nothing to move.
pub async fn move_preview(
    cache_root: &Path,
    old_relative_path: &str,
    new_relative_path: &str,
) -> Result<bool> {
    let from = preview_path(cache_root, old_relative_path);
    let to = preview_path(cache_root, new_relative_path);
    if !tokio::fs::try_exists(&from).await.unwrap_or(false) {
        return Ok(false);
    }
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|err| {
            ScanError::Io(io::Error::new(
                err.kind(),
                format!("failed to create preview dir {}: {err}", parent.display()),
            ))
        })?;
    }
    tokio::fs::rename(&from, &to).await.map_err(|err| {
        ScanError::Io(io::Error::new(
            err.kind(),
            format!(
                "failed to move preview {} -> {}: {err}",
                from.display(),
                to.display()
            ),
        ))
    })?;
    debug!(from = %from.display(), to = %to.display(), "moved preview");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_paths_are_sharded_by_digest_prefix() {
        let root = Path::new("/cache");
        let path = preview_path(root, "2020/a.jpg");
        let digest = path_digest("2020/a.jpg");

        assert_eq!(
            path,
            root.join("previews")
                .join(&digest[..2])
                .join(format!("{digest}.jpg"))
        );
        assert_ne!(path, preview_path(root, "2021/a.jpg"));
    }

    #[tokio::test]
    async fn delete_of_missing_preview_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!delete_preview(dir.path(), "nope.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn move_carries_preview_to_new_location() {
        let dir = tempfile::tempdir().unwrap();
        let old = preview_path(dir.path(), "2020/a.jpg");
        std::fs::create_dir_all(old.parent().unwrap()).unwrap();
        std::fs::write(&old, b"preview").unwrap();

        assert!(move_preview(dir.path(), "2020/a.jpg", "2021/a.jpg").await.unwrap());
        assert!(!old.exists());
        let new = preview_path(dir.path(), "2021/a.jpg");
        assert_eq!(std::fs::read(new).unwrap(), b"preview");

        assert!(!move_preview(dir.path(), "2020/a.jpg", "2022/a.jpg").await.unwrap());
    }
}
