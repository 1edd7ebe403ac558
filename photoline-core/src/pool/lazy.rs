//! On-demand ownership of the preview worker pool.
//!
//! The pool is created by the first checkout, kept while any checkout is
//! outstanding, and torn down once the last checkout has been released for
//! the whole idle window.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::config::WorkerPoolSettings;
use super::worker_pool::PreviewWorkerPool;
use crate::preview::{PreviewExecutor, PreviewResultSink};

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LazyPoolState {
    /// No pool exists.
    Idle,
    /// A pool exists and no teardown is scheduled.
    Active,
    /// A pool exists and the idle timer is armed.
    Releasing,
}

#[derive(Debug, Default)]
struct LazyInner {
    pool: Option<Arc<PreviewWorkerPool>>,
    idle_timer: Option<JoinHandle<()>>,
    checkouts: usize,
    /// Bumped whenever a pending timer is invalidated.
    generation: u64,
}

impl LazyInner {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
            debug!("idle teardown cancelled");
        }
        self.generation = self.generation.wrapping_add(1);
    }
}

pub struct LazyPreviewPool {
    inner: Arc<Mutex<LazyInner>>,
    settings: WorkerPoolSettings,
    executor: PreviewExecutor,
    sink: Arc<dyn PreviewResultSink>,
    idle_timeout: Duration,
}

impl std::fmt::Debug for LazyPreviewPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyPreviewPool")
            .field("settings", &self.settings)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

impl LazyPreviewPool {
    pub fn new(
        settings: WorkerPoolSettings,
        executor: PreviewExecutor,
        sink: Arc<dyn PreviewResultSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LazyInner::default())),
            settings,
            executor,
            sink,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Sink every pool created by this manager reports to.
    pub fn sink(&self) -> &Arc<dyn PreviewResultSink> {
        &self.sink
    }

    /// Checks the pool out, creating it if needed and cancelling any pending
    /// idle teardown. Pair every call with [`Self::release_pool`].
    pub async fn get_pool(&self) -> Arc<PreviewWorkerPool> {
        let mut inner = self.inner.lock().await;
        inner.cancel_timer();
        inner.checkouts += 1;

        if let Some(pool) = &inner.pool {
            return Arc::clone(pool);
        }

        let config = self.settings.resolve();
        let pool = Arc::new(PreviewWorkerPool::new(
            config,
            self.executor.clone(),
            Arc::clone(&self.sink),
        ));
        inner.pool = Some(Arc::clone(&pool));
        pool
    }

    /// Returns one checkout of `pool`. When none remain, the idle timer is
    /// armed. Releasing a pool that was already torn down is a no-op.
    pub async fn release_pool(&self, pool: &Arc<PreviewWorkerPool>) {
        let mut inner = self.inner.lock().await;
        let current = inner
            .pool
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, pool));
        if !current {
            debug!("release of a retired preview pool ignored");
            return;
        }
        inner.checkouts = inner.checkouts.saturating_sub(1);
        if inner.checkouts > 0 {
            return;
        }

        inner.cancel_timer();
        let generation = inner.generation;
        let shared = Arc::clone(&self.inner);
        let idle_timeout = self.idle_timeout;

        inner.idle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(idle_timeout).await;
            let pool = {
                let mut inner = shared.lock().await;
                if inner.generation != generation || inner.checkouts > 0 {
                    return;
                }
                inner.idle_timer = None;
                inner.pool.take()
            };
            if let Some(pool) = pool {
                pool.terminate().await;
                info!(idle_ms = idle_timeout.as_millis() as u64, "idle preview pool torn down");
            }
        }));
        debug!(idle_ms = idle_timeout.as_millis() as u64, "idle teardown armed");
    }

    /// Tears the pool down immediately, whatever its state.
    pub async fn force_terminate(&self) {
        let pool = {
            let mut inner = self.inner.lock().await;
            inner.cancel_timer();
            inner.checkouts = 0;
            inner.pool.take()
        };
        if let Some(pool) = pool {
            pool.terminate().await;
            info!("preview pool force-terminated");
        }
    }

    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.pool.is_some()
    }

    pub async fn state(&self) -> LazyPoolState {
        let inner = self.inner.lock().await;
        match (&inner.pool, &inner.idle_timer) {
            (None, _) => LazyPoolState::Idle,
            (Some(_), Some(_)) => LazyPoolState::Releasing,
            (Some(_), None) => LazyPoolState::Active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::{ImagePreviewCodec, NoopPreviewSink};

    fn lazy(idle: Duration) -> LazyPreviewPool {
        LazyPreviewPool::new(
            WorkerPoolSettings {
                worker_count: Some(1),
                max_queue_size_mb: Some(4),
            },
            PreviewExecutor::new(Arc::new(ImagePreviewCodec::default())),
            Arc::new(NoopPreviewSink),
        )
        .with_idle_timeout(idle)
    }

    #[tokio::test]
    async fn reacquire_before_timeout_keeps_the_same_pool() {
        let manager = lazy(Duration::from_millis(200));
        assert_eq!(manager.state().await, LazyPoolState::Idle);

        let first = manager.get_pool().await;
        assert_eq!(manager.state().await, LazyPoolState::Active);

        manager.release_pool(&first).await;
        assert_eq!(manager.state().await, LazyPoolState::Releasing);

        let second = manager.get_pool().await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.state().await, LazyPoolState::Active);

        manager.force_terminate().await;
        assert!(first.is_terminated().await);
        assert!(!manager.is_active().await);
    }

    #[tokio::test]
    async fn outstanding_checkout_blocks_the_idle_timer() {
        let manager = lazy(Duration::from_millis(20));
        let pool = manager.get_pool().await;
        let _again = manager.get_pool().await;

        manager.release_pool(&pool).await;
        assert_eq!(manager.state().await, LazyPoolState::Active);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(manager.is_active().await);
        assert!(!pool.is_terminated().await);

        manager.force_terminate().await;
    }

    #[tokio::test]
    async fn stale_release_leaves_the_replacement_pool_alone() {
        let manager = lazy(Duration::from_millis(20));
        let retired = manager.get_pool().await;
        manager.force_terminate().await;
        assert!(retired.is_terminated().await);

        let replacement = manager.get_pool().await;
        manager.release_pool(&retired).await;
        assert_eq!(manager.state().await, LazyPoolState::Active);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(manager.is_active().await);
        assert!(!replacement.is_terminated().await);

        manager.release_pool(&replacement).await;
        assert_eq!(manager.state().await, LazyPoolState::Releasing);
        manager.force_terminate().await;
    }
}
