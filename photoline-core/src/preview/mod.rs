//! Preview generation: task/result types, the cache layout, the codec and
//! the executor that runs inside pool workers.

pub mod codec;
pub mod executor;
pub mod store;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::types::UserId;

pub use codec::{ImagePreviewCodec, PreviewCodec};
pub use executor::PreviewExecutor;
pub use store::{delete_preview, move_preview, preview_path};

/// One unit of preview work: the file bytes already read by the scanner
/// plus the cache location to write to.
#[derive(Clone)]
pub struct PreviewTask {
    pub user_id: UserId,
    pub buffer: Vec<u8>,
    pub output_path: PathBuf,
    /// Catalog path of the source file, relative to the library root.
    pub file_path: String,
}

impl PreviewTask {
    /// Bytes this task holds while queued.
    pub fn byte_len(&self) -> u64 {
        self.buffer.len() as u64
    }
}

impl std::fmt::Debug for PreviewTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewTask")
            .field("user_id", &self.user_id)
            .field("buffer_len", &self.buffer.len())
            .field("output_path", &self.output_path)
            .field("file_path", &self.file_path)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewResult {
    pub user_id: UserId,
    pub success: bool,
    pub file_path: String,
    pub output_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl PreviewResult {
    pub fn succeeded(task: &PreviewTask) -> Self {
        Self::ready(task.user_id, task.file_path.clone(), task.output_path.clone())
    }

    pub fn ready(user_id: UserId, file_path: String, output_path: PathBuf) -> Self {
        Self {
            user_id,
            success: true,
            file_path,
            output_path: Some(output_path),
            error: None,
        }
    }

    pub fn failed(user_id: UserId, file_path: String, error: impl Into<String>) -> Self {
        Self {
            user_id,
            success: false,
            file_path,
            output_path: None,
            error: Some(error.into()),
        }
    }
}

/// Receives every preview outcome as soon as a worker reports it.
#[async_trait]
pub trait PreviewResultSink: Send + Sync {
    async fn record(&self, result: &PreviewResult);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPreviewSink;

#[async_trait]
impl PreviewResultSink for NoopPreviewSink {
    async fn record(&self, _result: &PreviewResult) {}
}
