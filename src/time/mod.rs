//! Capture time extraction
//!
//! This module resolves the instant a photo was taken from:
//! - EXIF capture tags (with sub-second and UTC offset companions)
//! - File system creation time
//! - File system modification time

pub mod exif;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Cursor, Seek};
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, warn};

/// Source of the extracted timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSource {
    /// Extracted from EXIF metadata
    Exif,
    /// From file system creation time
    FileCreated,
    /// From file system modification time
    FileModified,
    /// Creation time recorded by an asset store
    AssetStore,
}

/// Result of timestamp extraction
#[derive(Debug, Clone, Copy)]
pub struct CaptureTime {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    /// Source of the timestamp
    pub source: TimeSource,
}

/// How EXIF date strings without a UTC offset are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NaiveZone {
    /// The machine's local time zone (what the camera clock usually follows)
    #[default]
    Local,
    /// UTC
    Utc,
}

impl NaiveZone {
    /// Unix seconds for a wall-clock time in this zone
    pub fn resolve(&self, naive: &NaiveDateTime) -> Option<f64> {
        match self {
            NaiveZone::Local => Local
                .from_local_datetime(naive)
                .earliest()
                .map(|dt| unix_seconds(&dt)),
            NaiveZone::Utc => Some(unix_seconds(&Utc.from_utc_datetime(naive))),
        }
    }
}

pub(crate) fn unix_seconds<Tz: TimeZone>(dt: &DateTime<Tz>) -> f64 {
    dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_nanos()) / 1e9
}

fn system_seconds(time: SystemTime) -> f64 {
    let datetime: DateTime<Utc> = time.into();
    unix_seconds(&datetime)
}

/// Capture time from a reader over an image container
fn read_container<R: BufRead + Seek>(reader: &mut R, zone: NaiveZone) -> Option<f64> {
    let exif = ::exif::Reader::new().read_from_container(reader).ok()?;
    exif::capture_timestamp(&exif, zone)
}

/// Extract the capture time of an in-memory image from its EXIF data only
pub fn extract_from_bytes(bytes: &[u8], zone: NaiveZone) -> Option<CaptureTime> {
    let timestamp = read_container(&mut Cursor::new(bytes), zone)?;
    Some(CaptureTime {
        timestamp,
        source: TimeSource::Exif,
    })
}

/// Extract the capture time of an image file
///
/// The extraction follows this priority:
/// 1. EXIF capture tags
/// 2. File system creation time
/// 3. File system modification time
pub fn extract_from_file(path: &Path, zone: NaiveZone) -> Option<CaptureTime> {
    match File::open(path) {
        Ok(file) => {
            if let Some(timestamp) = read_container(&mut BufReader::new(file), zone) {
                debug!(?path, "Extracted time from EXIF");
                return Some(CaptureTime {
                    timestamp,
                    source: TimeSource::Exif,
                });
            }
            debug!(?path, "No usable EXIF time, trying file system times");
        }
        Err(e) => {
            warn!(?path, error = %e, "Unable to open image");
            return None;
        }
    }

    file_system_time(path)
}

/// Creation time, falling back to modification time
pub fn file_system_time(path: &Path) -> Option<CaptureTime> {
    let metadata = fs::metadata(path).ok()?;

    if let Ok(created) = metadata.created() {
        warn!(?path, "Using file creation time as fallback");
        return Some(CaptureTime {
            timestamp: system_seconds(created),
            source: TimeSource::FileCreated,
        });
    }

    let modified = metadata.modified().ok()?;
    warn!(?path, "Using file modification time as fallback");
    Some(CaptureTime {
        timestamp: system_seconds(modified),
        source: TimeSource::FileModified,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exif_subseconds_and_offset() {
        use crate::geotag::test_support::{ascii_field, jpeg_with_fields};
        use ::exif::Tag;

        let bytes = jpeg_with_fields(&[
            ascii_field(Tag::DateTimeOriginal, "2024:01:15 14:30:00"),
            ascii_field(Tag::SubSecTimeOriginal, "25"),
            ascii_field(Tag::OffsetTimeOriginal, "+09:00"),
        ]);
        let capture = extract_from_bytes(&bytes, NaiveZone::Local).unwrap();
        assert_eq!(capture.source, TimeSource::Exif);
        // 2024-01-15T05:30:00.25Z
        assert!((capture.timestamp - 1_705_296_600.25).abs() < 1e-6, "{}", capture.timestamp);
    }

    #[test]
    fn test_exif_companions_fall_through_empty_tags() {
        use crate::geotag::test_support::{ascii_field, jpeg_with_fields};
        use ::exif::Tag;

        let bytes = jpeg_with_fields(&[
            ascii_field(Tag::DateTimeOriginal, "2024:01:15 14:30:00"),
            ascii_field(Tag::SubSecTimeOriginal, "  "),
            ascii_field(Tag::SubSecTime, "5"),
            ascii_field(Tag::OffsetTime, "-03:00"),
        ]);
        let capture = extract_from_bytes(&bytes, NaiveZone::Utc).unwrap();
        // 2024-01-15T17:30:00.5Z
        assert!((capture.timestamp - 1_705_339_800.5).abs() < 1e-6, "{}", capture.timestamp);
    }

    #[test]
    fn test_naive_zone_utc() {
        let naive = NaiveDateTime::parse_from_str("2024-03-01 00:00:00.5", "%Y-%m-%d %H:%M:%S%.f")
            .unwrap();
        assert_eq!(NaiveZone::Utc.resolve(&naive), Some(1_709_251_200.5));
    }

    #[test]
    fn test_non_image_falls_back_to_file_time() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("fake.jpg");
        fs::write(&path, b"not really a jpeg").unwrap();

        let mtime = filetime::FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&path, mtime).unwrap();

        let time = extract_from_file(&path, NaiveZone::Utc).unwrap();
        assert_ne!(time.source, TimeSource::Exif);
        if time.source == TimeSource::FileModified {
            assert_eq!(time.timestamp, 1_600_000_000.0);
        }
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(extract_from_file(&dir.path().join("nope.jpg"), NaiveZone::Utc).is_none());
    }

    #[test]
    fn test_bytes_without_exif() {
        assert!(extract_from_bytes(b"\xFF\xD8\xFF\xD9", NaiveZone::Utc).is_none());
    }
}
