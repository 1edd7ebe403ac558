pub mod diff;
pub mod extensions;
pub mod fs;
pub mod orchestrator;
pub mod processing;
pub mod service;
pub mod status;

pub use diff::{DiffCounts, DiffSet, build_diff};
pub use fs::{FileSystem, InMemoryFs, RealFs};
pub use orchestrator::PhotoScanJob;
pub use processing::FileProcessor;
pub use service::ScanService;
pub use status::{ScanJobState, ScanProgressKind, ScanStatus, ScanStatusTracker};
