use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Result, ScanError};

/// Minimal, async-capable filesystem abstraction used by the scanner.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Open a directory for iteration.
    async fn read_dir(&self, path: &Path) -> Result<Box<dyn ReadDirStream + Send>>;

    /// Fetch lightweight metadata of the entry itself; symlinks are not
    /// followed.
    async fn metadata(&self, path: &Path) -> Result<FsMetadata>;

    /// Read a whole file into memory.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;
}

/// Lightweight metadata needed by the scanner.
#[derive(Debug, Clone, Copy)]
pub struct FsMetadata {
    pub is_dir: bool,
    pub is_file: bool,
    pub is_symlink: bool,
}

/// Async directory iterator (similar to tokio::fs::ReadDir).
#[async_trait]
pub trait ReadDirStream {
    /// Return next entry's path, or None when exhausted.
    async fn next_entry(&mut self) -> Result<Option<PathBuf>>;
}

/// Real filesystem implementation backed by tokio::fs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

fn io_context(op: &str, path: &Path, err: io::Error) -> ScanError {
    ScanError::Io(io::Error::new(
        err.kind(),
        format!("{op} failed for {}: {err}", path.display()),
    ))
}

#[async_trait]
impl FileSystem for RealFs {
    async fn read_dir(&self, path: &Path) -> Result<Box<dyn ReadDirStream + Send>> {
        let rd = tokio::fs::read_dir(path)
            .await
            .map_err(|e| io_context("read_dir", path, e))?;
        Ok(Box::new(RealReadDir { inner: rd }))
    }

    async fn metadata(&self, path: &Path) -> Result<FsMetadata> {
        let file_type = tokio::fs::symlink_metadata(path)
            .await
            .map_err(|e| io_context("symlink_metadata", path, e))?
            .file_type();
        Ok(FsMetadata {
            is_dir: file_type.is_dir(),
            is_file: file_type.is_file(),
            is_symlink: file_type.is_symlink(),
        })
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| io_context("read", path, e))
    }
}

struct RealReadDir {
    inner: tokio::fs::ReadDir,
}

#[async_trait]
impl ReadDirStream for RealReadDir {
    async fn next_entry(&mut self) -> Result<Option<PathBuf>> {
        Ok(self.inner.next_entry().await?.map(|entry| entry.path()))
    }
}

/// In-memory filesystem for tests.
/// Note: Paths are treated literally; callers should use consistent absolute or relative paths.
#[derive(Debug, Default, Clone)]
pub struct InMemoryFs {
    nodes: HashMap<PathBuf, Node>,
}

#[derive(Debug, Clone)]
enum Node {
    Dir { children: Vec<PathBuf> },
    File { contents: Vec<u8> },
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    pub fn add_dir<P: Into<PathBuf>>(&mut self, path: P) {
        let path = path.into();
        if self.nodes.contains_key(&path) {
            return;
        }
        self.ensure_parent_link(&path);
        self.nodes.insert(
            path,
            Node::Dir {
                children: Vec::new(),
            },
        );
    }

    pub fn add_file<P: Into<PathBuf>>(&mut self, path: P, contents: impl Into<Vec<u8>>) {
        let path = path.into();
        self.ensure_parent_link(&path);
        self.nodes.insert(
            path,
            Node::File {
                contents: contents.into(),
            },
        );
    }

    fn ensure_parent_link(&mut self, path: &Path) {
        if let Some(parent) = path.parent() {
            // Ensure parent directory exists
            if !self.nodes.contains_key(parent) {
                self.nodes.insert(
                    parent.to_path_buf(),
                    Node::Dir {
                        children: Vec::new(),
                    },
                );
                self.ensure_parent_link(parent);
            }
            if let Some(Node::Dir { children }) = self.nodes.get_mut(parent)
                && !children.iter().any(|p| p.as_path() == path)
            {
                children.push(path.to_path_buf());
            }
        }
    }

    fn missing(path: &Path) -> ScanError {
        ScanError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no such path: {}", path.display()),
        ))
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn read_dir(&self, path: &Path) -> Result<Box<dyn ReadDirStream + Send>> {
        match self.nodes.get(path) {
            Some(Node::Dir { children }) => Ok(Box::new(InMemReadDir {
                queue: children.clone().into(),
            })),
            Some(Node::File { .. }) => Err(ScanError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("read_dir on file: {}", path.display()),
            ))),
            None => Err(Self::missing(path)),
        }
    }

    async fn metadata(&self, path: &Path) -> Result<FsMetadata> {
        match self.nodes.get(path) {
            Some(Node::Dir { .. }) => Ok(FsMetadata {
                is_dir: true,
                is_file: false,
                is_symlink: false,
            }),
            Some(Node::File { .. }) => Ok(FsMetadata {
                is_dir: false,
                is_file: true,
                is_symlink: false,
            }),
            None => Err(Self::missing(path)),
        }
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        match self.nodes.get(path) {
            Some(Node::File { contents }) => Ok(contents.clone()),
            Some(Node::Dir { .. }) => Err(ScanError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("read on directory: {}", path.display()),
            ))),
            None => Err(Self::missing(path)),
        }
    }
}

struct InMemReadDir {
    queue: VecDeque<PathBuf>,
}

#[async_trait]
impl ReadDirStream for InMemReadDir {
    async fn next_entry(&mut self) -> Result<Option<PathBuf>> {
        Ok(self.queue.pop_front())
    }
}
