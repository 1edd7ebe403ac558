use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use photoline_core::error::Result;
use photoline_core::pool::{
    LazyPoolState, LazyPreviewPool, PreviewWorkerPool, WorkerPoolConfig, WorkerPoolSettings,
};
use photoline_core::preview::{NoopPreviewSink, PreviewCodec, PreviewExecutor, PreviewTask};
use photoline_core::types::UserId;

const MB: usize = 1024 * 1024;

/// Blocks every render until the test lets it through.
struct GatedCodec {
    gate: Mutex<Receiver<()>>,
}

impl PreviewCodec for GatedCodec {
    fn render(&self, _buffer: &[u8]) -> Result<Vec<u8>> {
        let gate = self.gate.lock().unwrap();
        gate.recv().unwrap();
        Ok(vec![0xFF, 0xD8, 0xFF, 0xD9])
    }
}

fn gated_executor() -> (PreviewExecutor, Sender<()>) {
    let (tx, rx) = channel();
    let codec = GatedCodec {
        gate: Mutex::new(rx),
    };
    (PreviewExecutor::new(Arc::new(codec)), tx)
}

fn task(dir: &std::path::Path, name: &str, bytes: usize) -> PreviewTask {
    PreviewTask {
        user_id: UserId::new(),
        buffer: vec![0u8; bytes],
        output_path: dir.join(format!("{name}.jpg")),
        file_path: name.to_string(),
    }
}

async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn add_task_suspends_while_queued_bytes_exceed_the_limit() {
    let dir = tempfile::tempdir().unwrap();
    let (executor, gate) = gated_executor();
    let pool = Arc::new(PreviewWorkerPool::new(
        WorkerPoolConfig {
            worker_count: 1,
            max_queue_size_mb: 1,
        },
        executor,
        Arc::new(NoopPreviewSink),
    ));

    pool.add_task(task(dir.path(), "first", 2 * MB)).await.unwrap();
    wait_until(|| {
        let pool = Arc::clone(&pool);
        async move {
            let stats = pool.stats().await;
            stats.active == 1 && stats.queued == 0
        }
    })
    .await;

    // The single worker is busy, so this one stays queued.
    pool.add_task(task(dir.path(), "second", 2 * MB)).await.unwrap();
    assert_eq!(pool.stats().await.queued_bytes, 2 * MB as u64);

    let producer = {
        let pool = Arc::clone(&pool);
        let third = task(dir.path(), "third", 2 * MB);
        tokio::spawn(async move { pool.add_task(third).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!producer.is_finished());
    assert_eq!(pool.stats().await.queued, 1);

    // Finishing the first task lets the worker take the second one, which
    // drains the queue and admits the third.
    gate.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), producer)
        .await
        .expect("producer resumed")
        .unwrap()
        .unwrap();

    gate.send(()).unwrap();
    gate.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), pool.wait_for_completion())
        .await
        .expect("pool drained");

    let stats = pool.stats().await;
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.queued_bytes, 0);
    assert!(dir.path().join("third.jpg").exists());

    pool.terminate().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wait_for_completion_covers_in_flight_work() {
    let dir = tempfile::tempdir().unwrap();
    let (executor, gate) = gated_executor();
    let pool = Arc::new(PreviewWorkerPool::new(
        WorkerPoolConfig {
            worker_count: 2,
            max_queue_size_mb: 16,
        },
        executor,
        Arc::new(NoopPreviewSink),
    ));
    pool.add_task(task(dir.path(), "a", 16)).await.unwrap();
    pool.add_task(task(dir.path(), "b", 16)).await.unwrap();

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.wait_for_completion().await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!waiter.is_finished());

    gate.send(()).unwrap();
    gate.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter released")
        .unwrap();
    assert_eq!(pool.stats().await.completed, 2);

    pool.terminate().await;
}

#[tokio::test]
async fn idle_pool_is_torn_down_and_rebuilt_on_demand() {
    let (executor, _gate) = gated_executor();
    let manager = LazyPreviewPool::new(
        WorkerPoolSettings {
            worker_count: Some(1),
            max_queue_size_mb: Some(1),
        },
        executor,
        Arc::new(NoopPreviewSink),
    )
    .with_idle_timeout(Duration::from_millis(50));

    let first = manager.get_pool().await;
    assert!(manager.is_active().await);
    manager.release_pool(&first).await;
    assert_eq!(manager.state().await, LazyPoolState::Releasing);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!manager.is_active().await);
    assert_eq!(manager.state().await, LazyPoolState::Idle);
    assert!(first.is_terminated().await);

    let second = manager.get_pool().await;
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(!second.is_terminated().await);

    manager.force_terminate().await;
    assert!(second.is_terminated().await);
    assert_eq!(manager.state().await, LazyPoolState::Idle);
}
