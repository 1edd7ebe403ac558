use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{ColorType, DynamicImage, ImageDecoder, ImageReader};

use crate::error::{Result, ScanError};

pub const DEFAULT_PREVIEW_MAX_DIMENSION: u32 = 1200;
pub const DEFAULT_PREVIEW_QUALITY: u8 = 85;

/// Turns an encoded source image into preview bytes. Runs on a blocking
/// thread, so implementations may do heavy CPU work synchronously.
pub trait PreviewCodec: Send + Sync {
    fn render(&self, buffer: &[u8]) -> Result<Vec<u8>>;
}

/// Decode, auto-orient, shrink to fit a square box and encode as JPEG.
#[derive(Debug, Clone, Copy)]
pub struct ImagePreviewCodec {
    pub max_dimension: u32,
    pub quality: u8,
}

impl Default for ImagePreviewCodec {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_PREVIEW_MAX_DIMENSION,
            quality: DEFAULT_PREVIEW_QUALITY,
        }
    }
}

impl ImagePreviewCodec {
    pub fn new(max_dimension: u32, quality: u8) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
            quality: quality.clamp(1, 100),
        }
    }
}

impl PreviewCodec for ImagePreviewCodec {
    fn render(&self, buffer: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = ImageReader::new(Cursor::new(buffer))
            .with_guessed_format()?
            .into_decoder()?;
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        let mut image = DynamicImage::from_decoder(decoder)?;
        image.apply_orientation(orientation);

        let max = self.max_dimension;
        if image.width() > max || image.height() > max {
            image = image.resize(max, max, FilterType::Lanczos3);
        }

        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(ScanError::Validation("image has no pixels".into()));
        }

        let mut out = Cursor::new(Vec::new());
        let mut encoder = JpegEncoder::new_with_quality(&mut out, self.quality);
        encoder.encode(rgb.as_raw(), width, height, ColorType::Rgb8.into())?;
        Ok(out.into_inner())
    }
}
