pub mod exif;

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ExtractedMetadata;

pub use self::exif::ExifMetadataExtractor;

/// Reads photo, file and GPS attributes for a file on disk.
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<ExtractedMetadata>;
}

/// Parses exposure strings such as `1/125` or `2.5` into seconds.
pub fn parse_exposure_time(raw: &str) -> Option<f64> {
    let raw = raw.trim().trim_end_matches(" s").trim();
    if raw.is_empty() {
        return None;
    }
    let value = match raw.split_once('/') {
        Some((numerator, denominator)) => {
            let numerator: f64 = numerator.trim().parse().ok()?;
            let denominator: f64 = denominator.trim().parse().ok()?;
            if denominator == 0.0 {
                return None;
            }
            numerator / denominator
        }
        None => raw.parse().ok()?,
    };
    value.is_finite().then_some(value)
}
