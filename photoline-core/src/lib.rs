//! Photo library scanning: reconciles a catalog against the files on disk
//! and renders previews on a lazily managed worker pool.

pub mod catalog;
pub mod error;
pub mod hashing;
pub mod metadata;
pub mod pool;
pub mod preview;
pub mod scan;
pub mod types;

pub use error::{Result, ScanError};
