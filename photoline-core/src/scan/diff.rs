//! Reconciliation of a catalog snapshot against the files found on disk.
//!
//! Every catalog record starts in `not_matched`. Walking the library moves
//! records whose path still exists into `matched`; unknown photo paths are
//! appended to `increased`. Whatever is left in `not_matched` after the
//! increased files were checked for renames is a deletion candidate.

use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path};

use tracing::{debug, info, warn};

use super::extensions::is_photo_file;
use super::fs::FileSystem;
use crate::error::Result;
use crate::types::CatalogFileRecord;

/// Outcome of classifying one path found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Matched,
    Increased,
    Ignored,
}

/// Set sizes reported once the walk finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiffCounts {
    pub increased: usize,
    pub not_matched: usize,
    pub matched: usize,
}

/// The three reconciliation sets of one scan run. A path is a member of at
/// most one set at any time.
#[derive(Debug, Default)]
pub struct DiffSet {
    not_matched: BTreeMap<String, CatalogFileRecord>,
    matched: BTreeMap<String, CatalogFileRecord>,
    increased: Vec<String>,
    increased_seen: HashSet<String>,
}

impl DiffSet {
    /// Starts a diff with every catalog record in `not_matched`.
    pub fn seed(records: impl IntoIterator<Item = CatalogFileRecord>) -> Self {
        let mut not_matched = BTreeMap::new();
        for record in records {
            if let Some(previous) =
                not_matched.insert(record.file_path.clone(), record)
            {
                warn!(
                    path = %previous.file_path,
                    file_id = %previous.id,
                    "duplicate catalog path; keeping the last record"
                );
            }
        }
        Self {
            not_matched,
            matched: BTreeMap::new(),
            increased: Vec::new(),
            increased_seen: HashSet::new(),
        }
    }

    pub fn classify(&mut self, relative_path: String) -> Classification {
        if !is_photo_file(&relative_path) {
            return Classification::Ignored;
        }
        if let Some(record) = self.not_matched.remove(&relative_path) {
            self.matched.insert(relative_path, record);
            return Classification::Matched;
        }
        if self.matched.contains_key(&relative_path)
            || !self.increased_seen.insert(relative_path.clone())
        {
            return Classification::Ignored;
        }
        self.increased.push(relative_path);
        Classification::Increased
    }

    /// Removes and returns the first not-matched record carrying `hash`.
    pub fn take_hash_match(&mut self, hash: &str) -> Option<CatalogFileRecord> {
        let path = self
            .not_matched
            .iter()
            .find(|(_, record)| record.file_hash == hash)
            .map(|(path, _)| path.clone())?;
        self.not_matched.remove(&path)
    }

    pub fn counts(&self) -> DiffCounts {
        DiffCounts {
            increased: self.increased.len(),
            not_matched: self.not_matched.len(),
            matched: self.matched.len(),
        }
    }

    pub fn increased(&self) -> &[String] {
        &self.increased
    }

    pub fn matched(&self) -> &BTreeMap<String, CatalogFileRecord> {
        &self.matched
    }

    pub fn not_matched(&self) -> &BTreeMap<String, CatalogFileRecord> {
        &self.not_matched
    }

    /// Hands the increased paths to the caller in lexicographic order.
    pub fn take_increased(&mut self) -> Vec<String> {
        self.increased_seen.clear();
        let mut increased = std::mem::take(&mut self.increased);
        increased.sort();
        increased
    }

    /// Drains the records that are still unmatched (deletion candidates).
    pub fn take_not_matched(&mut self) -> Vec<CatalogFileRecord> {
        std::mem::take(&mut self.not_matched).into_values().collect()
    }

    /// Drains the matched records in lexicographic path order.
    pub fn take_matched(&mut self) -> Vec<CatalogFileRecord> {
        std::mem::take(&mut self.matched).into_values().collect()
    }
}

/// Converts an absolute path below `base` into the `/`-separated relative
/// form used as catalog key.
pub fn relative_catalog_path(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Joins a catalog path back onto the library root.
pub fn absolute_path(base: &Path, relative_path: &str) -> std::path::PathBuf {
    relative_path
        .split('/')
        .filter(|part| !part.is_empty())
        .fold(base.to_path_buf(), |acc, part| acc.join(part))
}

/// Walks `base` recursively and classifies every file against `records`.
///
/// A directory that cannot be listed aborts the walk; a single entry whose
/// metadata cannot be read is skipped. Symlinks are never followed.
pub async fn build_diff(
    fs: &dyn FileSystem,
    base: &Path,
    records: Vec<CatalogFileRecord>,
) -> Result<DiffSet> {
    let mut diff = DiffSet::seed(records);
    let mut pending = vec![base.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = fs.read_dir(&dir).await?;
        while let Some(path) = entries.next_entry().await? {
            let metadata = match fs.metadata(&path).await {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if metadata.is_symlink {
                debug!(path = %path.display(), "skipping symlink");
                continue;
            }
            if metadata.is_dir {
                pending.push(path);
                continue;
            }
            if !metadata.is_file {
                continue;
            }
            let Some(relative) = relative_catalog_path(base, &path) else {
                warn!(path = %path.display(), "skipping path that is not valid UTF-8 below the library root");
                continue;
            };
            let class = diff.classify(relative);
            if class != Classification::Ignored {
                debug!(path = %path.display(), ?class, "classified");
            }
        }
    }

    diff.increased.sort();
    let counts = diff.counts();
    info!(
        increased = counts.increased,
        not_matched = counts.not_matched,
        matched = counts.matched,
        "scan comparison complete"
    );
    Ok(diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::fs::InMemoryFs;
    use crate::types::{FileId, FileStatus, PhotoId};
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn record(path: &str, hash: &str) -> CatalogFileRecord {
        CatalogFileRecord {
            id: FileId::new(),
            file_path: path.to_string(),
            file_hash: hash.to_string(),
            photo_id: PhotoId::new(),
            status: FileStatus::Source,
        }
    }

    #[tokio::test]
    async fn walk_partitions_catalog_and_disk_paths() {
        let base = PathBuf::from("/library");
        let mut fs = InMemoryFs::new();
        fs.add_dir(base.clone());
        fs.add_file("/library/2020/a.jpg", b"a".to_vec());
        fs.add_file("/library/2020/b.JPG", b"b".to_vec());
        fs.add_file("/library/2021/c.nef", b"c".to_vec());
        fs.add_file("/library/2021/notes.txt", b"ignored".to_vec());

        let records = vec![
            record("2020/a.jpg", "ha"),
            record("2019/gone.jpg", "hg"),
        ];

        let diff = build_diff(&fs, &base, records).await.expect("walk");

        let matched: BTreeSet<_> = diff.matched().keys().cloned().collect();
        let not_matched: BTreeSet<_> =
            diff.not_matched().keys().cloned().collect();
        let increased: BTreeSet<_> = diff.increased().iter().cloned().collect();

        assert_eq!(matched, BTreeSet::from(["2020/a.jpg".to_string()]));
        assert_eq!(not_matched, BTreeSet::from(["2019/gone.jpg".to_string()]));
        assert_eq!(
            increased,
            BTreeSet::from(["2020/b.JPG".to_string(), "2021/c.nef".to_string()])
        );
        assert!(matched.is_disjoint(&not_matched));
        assert!(matched.is_disjoint(&increased));
        assert!(not_matched.is_disjoint(&increased));
        assert_eq!(
            diff.increased(),
            &["2020/b.JPG".to_string(), "2021/c.nef".to_string()]
        );
    }

    #[test]
    fn hash_match_removes_record_from_not_matched() {
        let mut diff = DiffSet::seed(vec![record("old/a.jpg", "h1")]);
        assert_eq!(diff.classify("new/a.jpg".into()), Classification::Increased);

        let moved = diff.take_hash_match("h1").expect("hash match");
        assert_eq!(moved.file_path, "old/a.jpg");
        assert!(diff.not_matched().is_empty());
        assert!(diff.take_hash_match("h1").is_none());
    }

    #[test]
    fn repeated_paths_are_not_double_counted() {
        let mut diff = DiffSet::seed(vec![record("a.jpg", "h")]);
        assert_eq!(diff.classify("a.jpg".into()), Classification::Matched);
        assert_eq!(diff.classify("a.jpg".into()), Classification::Ignored);
        assert_eq!(diff.classify("b.jpg".into()), Classification::Increased);
        assert_eq!(diff.classify("b.jpg".into()), Classification::Ignored);
        assert_eq!(
            diff.counts(),
            DiffCounts {
                increased: 1,
                not_matched: 0,
                matched: 1
            }
        );
    }

    #[test]
    fn many_new_paths_are_each_counted_once() {
        let mut diff = DiffSet::default();
        for i in 0..5_000 {
            assert_eq!(
                diff.classify(format!("batch/{i:05}.jpg")),
                Classification::Increased
            );
        }
        assert_eq!(
            diff.classify("batch/00042.jpg".into()),
            Classification::Ignored
        );
        assert_eq!(diff.counts().increased, 5_000);

        let taken = diff.take_increased();
        assert_eq!(taken.first().map(String::as_str), Some("batch/00000.jpg"));
        assert_eq!(diff.classify("batch/00042.jpg".into()), Classification::Increased);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_directories_are_not_walked() {
        use crate::scan::fs::RealFs;

        let dir = tempfile::tempdir().expect("tempdir");
        let base = dir.path().join("library");
        std::fs::create_dir_all(base.join("2020")).expect("mkdir");
        std::fs::write(base.join("2020/a.png"), b"a").expect("write");
        std::os::unix::fs::symlink(base.join("2020"), base.join("favourites"))
            .expect("dir symlink");
        std::os::unix::fs::symlink(&base, base.join("2020/loop")).expect("loop symlink");
        std::os::unix::fs::symlink(base.join("2020/a.png"), base.join("alias.png"))
            .expect("file symlink");

        let diff = build_diff(&RealFs::new(), &base, Vec::new())
            .await
            .expect("walk");

        assert_eq!(diff.increased(), &["2020/a.png".to_string()]);
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        let base = Path::new("/library");
        assert_eq!(
            relative_catalog_path(base, Path::new("/library/2020/x/a.jpg")),
            Some("2020/x/a.jpg".to_string())
        );
        assert_eq!(relative_catalog_path(base, Path::new("/elsewhere/a.jpg")), None);
        assert_eq!(
            absolute_path(base, "2020/x/a.jpg"),
            PathBuf::from("/library/2020/x/a.jpg")
        );
    }
}
