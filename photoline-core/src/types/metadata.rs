use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Capture settings and camera details stored on the photo itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhotoAttributes {
    pub iso: Option<u32>,
    /// Exposure in seconds.
    pub exposure_time: Option<f64>,
    /// Exposure as written by the camera, e.g. `1/125`.
    pub exposure_time_value: Option<String>,
    pub f_number: Option<f64>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub lens_make: Option<String>,
    pub lens_model: Option<String>,
    pub focal_length: Option<f64>,
    pub focal_length_35mm: Option<f64>,
    pub date_taken: Option<DateTime<Utc>>,
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileAttributes {
    pub file_size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub width: u32,
    pub height: u32,
    pub orientation: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpsAttributes {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Everything the metadata extractor reports for one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    pub photo: PhotoAttributes,
    pub file: FileAttributes,
    pub gps: Option<GpsAttributes>,
}
