pub mod config;
pub mod lazy;
pub mod worker_pool;

pub use config::{WorkerPoolConfig, WorkerPoolSettings, default_worker_count};
pub use lazy::{DEFAULT_IDLE_TIMEOUT, LazyPoolState, LazyPreviewPool};
pub use worker_pool::{PoolStats, PreviewWorkerPool};
