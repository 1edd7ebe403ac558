//! Fixed-size preview worker pool with byte-bounded backpressure.
//!
//! Producers suspend in [`PreviewWorkerPool::add_task`] while the bytes of
//! queued, not yet dispatched tasks exceed the configured limit. Workers
//! run the executor on tokio's blocking pool and report every outcome to
//! the result sink before the counters move.

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::config::WorkerPoolConfig;
use crate::error::{Result, ScanError};
use crate::preview::{PreviewExecutor, PreviewResult, PreviewResultSink, PreviewTask};

/// Point-in-time counters of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolStats {
    pub completed: u64,
    pub failed: u64,
    pub queued: usize,
    pub queued_bytes: u64,
    pub active: usize,
    pub workers: usize,
}

#[derive(Debug, Default)]
struct PoolState {
    queue: VecDeque<PreviewTask>,
    queued_bytes: u64,
    active: usize,
    completed: u64,
    failed: u64,
    terminated: bool,
}

impl PoolState {
    fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.active == 0
    }
}

struct Shared {
    state: Mutex<PoolState>,
    /// Signalled when a task is queued.
    work_ready: Notify,
    /// Signalled when queued bytes drop.
    capacity: Notify,
    /// Signalled when a task finishes.
    drained: Notify,
    executor: PreviewExecutor,
    sink: Arc<dyn PreviewResultSink>,
}

pub struct PreviewWorkerPool {
    config: WorkerPoolConfig,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for PreviewWorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewWorkerPool")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PreviewWorkerPool {
    /// Spawns `config.worker_count` workers on the current runtime.
    pub fn new(
        config: WorkerPoolConfig,
        executor: PreviewExecutor,
        sink: Arc<dyn PreviewResultSink>,
    ) -> Self {
        let config = WorkerPoolConfig {
            worker_count: config.worker_count.max(1),
            ..config
        };
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState::default()),
            work_ready: Notify::new(),
            capacity: Notify::new(),
            drained: Notify::new(),
            executor,
            sink,
        });

        let workers = (0..config.worker_count)
            .map(|index| tokio::spawn(run_worker(Arc::clone(&shared), index)))
            .collect();

        info!(
            workers = config.worker_count,
            max_queue_mb = config.max_queue_size_mb,
            "preview worker pool started"
        );

        Self {
            config,
            shared,
            workers: Mutex::new(workers),
        }
    }

    pub fn config(&self) -> WorkerPoolConfig {
        self.config
    }

    /// Queues a task, suspending while the queued bytes exceed the limit.
    pub async fn add_task(&self, task: PreviewTask) -> Result<()> {
        let max_bytes = self.config.max_queue_bytes();
        let mut task = Some(task);

        loop {
            let mut capacity = pin!(self.shared.capacity.notified());
            capacity.as_mut().enable();

            {
                let mut state = self.shared.state.lock().await;
                if state.terminated {
                    return Err(ScanError::Worker("preview pool has been terminated".into()));
                }
                if state.queued_bytes <= max_bytes
                    && let Some(task) = task.take()
                {
                    state.queued_bytes += task.byte_len();
                    state.queue.push_back(task);
                    break;
                }
            }

            debug!("preview queue full; waiting for capacity");
            capacity.await;
        }

        self.shared.work_ready.notify_one();
        Ok(())
    }

    /// Resolves once every submitted task has produced a result, or the pool
    /// was terminated.
    pub async fn wait_for_completion(&self) {
        loop {
            let mut drained = pin!(self.shared.drained.notified());
            drained.as_mut().enable();
            {
                let state = self.shared.state.lock().await;
                if state.terminated || state.is_drained() {
                    return;
                }
            }
            drained.await;
        }
    }

    pub async fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock().await;
        PoolStats {
            completed: state.completed,
            failed: state.failed,
            queued: state.queue.len(),
            queued_bytes: state.queued_bytes,
            active: state.active,
            workers: self.config.worker_count,
        }
    }

    pub async fn is_terminated(&self) -> bool {
        self.shared.state.lock().await.terminated
    }

    /// Stops every worker and drops queued work. Blocking renders already in
    /// flight run to completion but their results are discarded.
    pub async fn terminate(&self) {
        let dropped = {
            let mut state = self.shared.state.lock().await;
            if state.terminated {
                return;
            }
            state.terminated = true;
            let dropped = state.queue.len();
            state.queue.clear();
            state.queued_bytes = 0;
            state.active = 0;
            dropped
        };

        for handle in self.workers.lock().await.drain(..) {
            handle.abort();
        }

        self.shared.work_ready.notify_waiters();
        self.shared.capacity.notify_waiters();
        self.shared.drained.notify_waiters();
        info!(dropped_tasks = dropped, "preview worker pool terminated");
    }
}

impl Drop for PreviewWorkerPool {
    fn drop(&mut self) {
        for handle in self.workers.get_mut().drain(..) {
            handle.abort();
        }
    }
}

async fn run_worker(shared: Arc<Shared>, index: usize) {
    loop {
        let mut work_ready = pin!(shared.work_ready.notified());
        work_ready.as_mut().enable();

        let task = {
            let mut state = shared.state.lock().await;
            if state.terminated {
                return;
            }
            let next = state.queue.pop_front();
            if let Some(task) = &next {
                state.queued_bytes = state.queued_bytes.saturating_sub(task.byte_len());
                state.active += 1;
            }
            next
        };

        let Some(task) = task else {
            work_ready.await;
            continue;
        };
        shared.capacity.notify_waiters();

        let result = render(&shared.executor, task, index).await;
        shared.sink.record(&result).await;

        {
            let mut state = shared.state.lock().await;
            state.active = state.active.saturating_sub(1);
            if result.success {
                state.completed += 1;
            } else {
                state.failed += 1;
            }
        }
        shared.drained.notify_waiters();
    }
}

/// A panicking render counts as a failed task; the worker stays in rotation.
async fn render(executor: &PreviewExecutor, task: PreviewTask, worker: usize) -> PreviewResult {
    let user_id = task.user_id;
    let file_path = task.file_path.clone();
    let executor = executor.clone();

    match tokio::task::spawn_blocking(move || executor.execute(&task)).await {
        Ok(result) => result,
        Err(err) => {
            error!(worker, path = %file_path, error = %err, "preview worker crashed");
            PreviewResult::failed(user_id, file_path, format!("preview worker crashed: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::{NoopPreviewSink, PreviewCodec};
    use crate::types::UserId;
    use std::path::Path;

    struct CopyCodec;

    impl PreviewCodec for CopyCodec {
        fn render(&self, buffer: &[u8]) -> Result<Vec<u8>> {
            if buffer == b"panic" {
                panic!("codec exploded");
            }
            if buffer == b"fail" {
                return Err(ScanError::Validation("bad input".into()));
            }
            Ok(buffer.to_vec())
        }
    }

    fn pool(workers: usize) -> PreviewWorkerPool {
        PreviewWorkerPool::new(
            WorkerPoolConfig {
                worker_count: workers,
                max_queue_size_mb: 16,
            },
            PreviewExecutor::new(Arc::new(CopyCodec)),
            Arc::new(NoopPreviewSink),
        )
    }

    fn task(dir: &Path, name: &str, buffer: &[u8]) -> PreviewTask {
        PreviewTask {
            user_id: UserId::new(),
            buffer: buffer.to_vec(),
            output_path: dir.join(format!("{name}.jpg")),
            file_path: name.to_string(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn counts_successes_failures_and_crashes() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(2);

        pool.add_task(task(dir.path(), "a", b"ok")).await.unwrap();
        pool.add_task(task(dir.path(), "b", b"fail")).await.unwrap();
        pool.add_task(task(dir.path(), "c", b"panic")).await.unwrap();
        pool.add_task(task(dir.path(), "d", b"ok again")).await.unwrap();
        pool.wait_for_completion().await;

        let stats = pool.stats().await;
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.queued_bytes, 0);
        assert_eq!(std::fs::read(dir.path().join("d.jpg")).unwrap(), b"ok again");

        pool.terminate().await;
    }

    #[tokio::test]
    async fn terminated_pool_rejects_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(1);
        pool.terminate().await;

        assert!(pool.is_terminated().await);
        let err = pool.add_task(task(dir.path(), "a", b"ok")).await.unwrap_err();
        assert!(matches!(err, ScanError::Worker(_)));
        pool.wait_for_completion().await;
    }
}
