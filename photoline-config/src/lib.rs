//! Configuration for Photoline.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working setup. Worker pool overrides left unset here still fall through
//! to the `PHOTO_WORKER_*` environment variables when a pool is created.

pub mod loader;
pub mod models;

pub use loader::{CONFIG_JSON_ENV, CONFIG_PATH_ENV, ConfigSource};
pub use models::{LoggingSettings, PhotolineConfig, PreviewSettings, ScannerSettings};
