use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use super::codec::PreviewCodec;
use super::{PreviewResult, PreviewTask};
use crate::error::{Result, ScanError};

/// Per-task work performed inside a pool worker. Every failure is folded
/// into the returned [`PreviewResult`]; `execute` never returns an error.
#[derive(Clone)]
pub struct PreviewExecutor {
    codec: Arc<dyn PreviewCodec>,
}

impl std::fmt::Debug for PreviewExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewExecutor").finish_non_exhaustive()
    }
}

impl PreviewExecutor {
    pub fn new(codec: Arc<dyn PreviewCodec>) -> Self {
        Self { codec }
    }

    /// Blocking; call from `spawn_blocking`.
    pub fn execute(&self, task: &PreviewTask) -> PreviewResult {
        match self.render_to_disk(task) {
            Ok(()) => {
                debug!(
                    path = %task.file_path,
                    output = %task.output_path.display(),
                    "preview written"
                );
                PreviewResult::succeeded(task)
            }
            Err(err) => {
                warn!(path = %task.file_path, error = %err, "preview generation failed");
                PreviewResult::failed(task.user_id, task.file_path.clone(), err.to_string())
            }
        }
    }

    fn render_to_disk(&self, task: &PreviewTask) -> Result<()> {
        let parent = task.output_path.parent().ok_or_else(|| {
            ScanError::Validation(format!(
                "preview path has no parent: {}",
                task.output_path.display()
            ))
        })?;
        std::fs::create_dir_all(parent)?;

        let bytes = self.codec.render(&task.buffer)?;
        write_replacing(&task.output_path, &bytes)
    }
}

/// Writes through a temp file and renames over the target so readers never
/// see a half-written preview.
fn write_replacing(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
    if let Err(err) = std::fs::write(&tmp, bytes) {
        let _ = std::fs::remove_file(&tmp);
        return Err(err.into());
    }
    std::fs::rename(&tmp, path).map_err(|err| {
        let _ = std::fs::remove_file(&tmp);
        ScanError::Io(err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;

    struct EchoCodec;

    impl PreviewCodec for EchoCodec {
        fn render(&self, buffer: &[u8]) -> Result<Vec<u8>> {
            if buffer.is_empty() {
                return Err(ScanError::Validation("empty buffer".into()));
            }
            Ok(buffer.to_vec())
        }
    }

    fn task(dir: &Path, buffer: &[u8]) -> PreviewTask {
        PreviewTask {
            user_id: UserId::new(),
            buffer: buffer.to_vec(),
            output_path: dir.join("previews").join("ab").join("abcd.jpg"),
            file_path: "2020/a.jpg".into(),
        }
    }

    #[test]
    fn creates_directories_and_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let executor = PreviewExecutor::new(Arc::new(EchoCodec));
        let task = task(dir.path(), b"pixels");

        let result = executor.execute(&task);

        assert!(result.success);
        assert_eq!(result.output_path.as_deref(), Some(task.output_path.as_path()));
        assert_eq!(std::fs::read(&task.output_path).unwrap(), b"pixels");
    }

    #[test]
    fn codec_failures_become_failed_results() {
        let dir = tempfile::tempdir().unwrap();
        let executor = PreviewExecutor::new(Arc::new(EchoCodec));
        let task = task(dir.path(), b"");

        let result = executor.execute(&task);

        assert!(!result.success);
        assert_eq!(result.file_path, "2020/a.jpg");
        assert!(result.error.unwrap().contains("empty buffer"));
        assert!(!task.output_path.exists());
    }
}
