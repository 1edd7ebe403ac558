//! EXIF-backed metadata extraction.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use exif::{Exif, Field, In, Reader, Tag, Value};
use tracing::debug;

use super::{MetadataExtractor, parse_exposure_time};
use crate::error::{Result, ScanError};
use crate::types::{ExtractedMetadata, FileAttributes, GpsAttributes, PhotoAttributes};

const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Reads EXIF tags with `kamadak-exif` on the blocking pool. Files without
/// EXIF produce default photo attributes; dimensions then come from the
/// image header when the format is decodable.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExifMetadataExtractor;

impl ExifMetadataExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetadataExtractor for ExifMetadataExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedMetadata> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || extract_blocking(&path)).await?
    }
}

fn extract_blocking(path: &Path) -> Result<ExtractedMetadata> {
    let fs_meta = std::fs::metadata(path)?;
    let exif = read_exif(path)?;

    let mut file = FileAttributes {
        file_size: fs_meta.len(),
        modified_at: fs_meta.modified().ok().map(DateTime::<Utc>::from),
        width: 0,
        height: 0,
        orientation: 1,
    };

    if let Ok((width, height)) = image::image_dimensions(path) {
        file.width = width;
        file.height = height;
    }

    let Some(exif) = exif else {
        debug!(path = %path.display(), "no EXIF data");
        return Ok(ExtractedMetadata {
            photo: PhotoAttributes::default(),
            file,
            gps: None,
        });
    };

    if file.width == 0 || file.height == 0 {
        file.width = uint(&exif, Tag::PixelXDimension)
            .or_else(|| uint(&exif, Tag::ImageWidth))
            .unwrap_or(0);
        file.height = uint(&exif, Tag::PixelYDimension)
            .or_else(|| uint(&exif, Tag::ImageLength))
            .unwrap_or(0);
    }
    file.orientation = uint(&exif, Tag::Orientation)
        .and_then(|v| u16::try_from(v).ok())
        .unwrap_or(1);

    Ok(ExtractedMetadata {
        photo: photo_attributes(&exif),
        file,
        gps: gps_attributes(&exif),
    })
}

fn read_exif(path: &Path) -> Result<Option<Exif>> {
    let mut reader = BufReader::new(File::open(path)?);
    match Reader::new().read_from_container(&mut reader) {
        Ok(exif) => Ok(Some(exif)),
        Err(
            exif::Error::NotFound(_)
            | exif::Error::NotSupported(_)
            | exif::Error::BlankValue(_)
            | exif::Error::InvalidFormat(_),
        ) => Ok(None),
        Err(exif::Error::Io(err)) => Err(ScanError::Io(err)),
        Err(err) => Err(ScanError::Metadata(format!("{}: {err}", path.display()))),
    }
}

fn photo_attributes(exif: &Exif) -> PhotoAttributes {
    let exposure_time_value = field(exif, Tag::ExposureTime).map(|f| f.display_value().to_string());
    let time_zone = ascii(exif, Tag::OffsetTimeOriginal).or_else(|| ascii(exif, Tag::OffsetTime));

    PhotoAttributes {
        iso: uint(exif, Tag::PhotographicSensitivity),
        exposure_time: exposure_time_value.as_deref().and_then(parse_exposure_time),
        exposure_time_value,
        f_number: rational(exif, Tag::FNumber, 0),
        camera_make: ascii(exif, Tag::Make),
        camera_model: ascii(exif, Tag::Model),
        lens_make: ascii(exif, Tag::LensMake),
        lens_model: ascii(exif, Tag::LensModel),
        focal_length: rational(exif, Tag::FocalLength, 0),
        focal_length_35mm: uint(exif, Tag::FocalLengthIn35mmFilm).map(f64::from),
        date_taken: ascii(exif, Tag::DateTimeOriginal)
            .or_else(|| ascii(exif, Tag::DateTime))
            .and_then(|raw| parse_exif_datetime(&raw, time_zone.as_deref())),
        time_zone,
    }
}

fn gps_attributes(exif: &Exif) -> Option<GpsAttributes> {
    let latitude = dms(exif, Tag::GPSLatitude)?;
    let longitude = dms(exif, Tag::GPSLongitude)?;
    let latitude = match ascii(exif, Tag::GPSLatitudeRef).as_deref() {
        Some("S") => -latitude,
        _ => latitude,
    };
    let longitude = match ascii(exif, Tag::GPSLongitudeRef).as_deref() {
        Some("W") => -longitude,
        _ => longitude,
    };
    let altitude = rational(exif, Tag::GPSAltitude, 0).map(|alt| {
        if uint(exif, Tag::GPSAltitudeRef) == Some(1) {
            -alt
        } else {
            alt
        }
    });

    Some(GpsAttributes {
        latitude,
        longitude,
        altitude,
        timestamp: gps_timestamp(exif),
    })
}

fn gps_timestamp(exif: &Exif) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(&ascii(exif, Tag::GPSDateStamp)?, "%Y:%m:%d").ok()?;
    let hours = rational(exif, Tag::GPSTimeStamp, 0)?;
    let minutes = rational(exif, Tag::GPSTimeStamp, 1)?;
    let seconds = rational(exif, Tag::GPSTimeStamp, 2)?;
    let time = date.and_hms_opt(hours as u32, minutes as u32, seconds as u32)?;
    Some(Utc.from_utc_datetime(&time))
}

fn parse_exif_datetime(raw: &str, offset: Option<&str>) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), EXIF_DATE_FORMAT).ok()?;
    let offset = offset.and_then(|o| o.trim().parse::<FixedOffset>().ok());
    match offset {
        Some(offset) => offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc)),
        None => Some(Utc.from_utc_datetime(&naive)),
    }
}

fn field(exif: &Exif, tag: Tag) -> Option<&Field> {
    exif.get_field(tag, In::PRIMARY)
        .or_else(|| exif.fields().find(|f| f.tag == tag))
}

fn uint(exif: &Exif, tag: Tag) -> Option<u32> {
    field(exif, tag)?.value.get_uint(0)
}

fn rational(exif: &Exif, tag: Tag, index: usize) -> Option<f64> {
    let value = match &field(exif, tag)?.value {
        Value::Rational(values) => values.get(index).map(|r| r.to_f64()),
        Value::SRational(values) => values.get(index).map(|r| r.to_f64()),
        _ => None,
    };
    value.filter(|v| v.is_finite())
}

fn dms(exif: &Exif, tag: Tag) -> Option<f64> {
    let degrees = rational(exif, tag, 0)?;
    let minutes = rational(exif, tag, 1).unwrap_or(0.0);
    let seconds = rational(exif, tag, 2).unwrap_or(0.0);
    Some(degrees + minutes / 60.0 + seconds / 3600.0)
}

fn ascii(exif: &Exif, tag: Tag) -> Option<String> {
    match &field(exif, tag)?.value {
        Value::Ascii(values) => values
            .first()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .map(|s| s.trim_matches(char::from(0)).trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}
