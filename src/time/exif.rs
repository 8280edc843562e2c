//! EXIF capture time extraction for images

use super::NaiveZone;
use chrono::{DateTime, NaiveDateTime};
use exif::{Exif, In, Tag, Value};
use tracing::trace;

/// EXIF tags to try for the capture date, in priority order
const DATE_TAGS: &[Tag] = &[
    Tag::DateTimeOriginal,  // When the original image was taken
    Tag::DateTimeDigitized, // When the image was digitized
    Tag::DateTime,          // File modification date/time
];

/// Fractional-second companions of `DATE_TAGS`
const SUBSEC_TAGS: &[Tag] = &[
    Tag::SubSecTimeOriginal,
    Tag::SubSecTimeDigitized,
    Tag::SubSecTime,
];

/// UTC offset companions of `DATE_TAGS`
const OFFSET_TAGS: &[Tag] = &[
    Tag::OffsetTimeOriginal,
    Tag::OffsetTimeDigitized,
    Tag::OffsetTime,
];

/// Accepted layouts, tried in order against every composite string
const ZONED_FORMATS: &[&str] = &[
    "%Y:%m:%d %H:%M:%S%.f %:z",
    "%Y:%m:%d %H:%M:%S %:z",
    "%Y-%m-%dT%H:%M:%S%.f %:z",
    "%Y-%m-%dT%H:%M:%S %:z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y:%m:%d %H:%M:%S%.f",
    "%Y:%m:%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
];

/// Capture instant (Unix seconds) recorded in the EXIF data, if any
pub fn capture_timestamp(exif: &Exif, zone: NaiveZone) -> Option<f64> {
    let date = first_ascii(exif, DATE_TAGS)?;
    let subsec = first_ascii(exif, SUBSEC_TAGS);
    let offset = first_ascii(exif, OFFSET_TAGS);
    trace!(%date, ?subsec, ?offset, "Found EXIF date");

    composite_candidates(&date, subsec.as_deref(), offset.as_deref())
        .iter()
        .find_map(|candidate| parse_exif_datetime(candidate, zone))
}

/// First non-empty ASCII value among `tags`
fn first_ascii(exif: &Exif, tags: &[Tag]) -> Option<String> {
    tags.iter().find_map(|tag| {
        let field = exif.get_field(*tag, In::PRIMARY)?;
        match &field.value {
            Value::Ascii(values) => values
                .iter()
                .map(|v| String::from_utf8_lossy(v).trim_matches(['\0', ' ']).to_string())
                .find(|s| !s.is_empty()),
            _ => None,
        }
    })
}

/// Combine date, sub-second and offset values into strings worth parsing,
/// most precise first
pub fn composite_candidates(date: &str, subsec: Option<&str>, offset: Option<&str>) -> Vec<String> {
    let subsec = subsec.filter(|s| !s.is_empty());
    let offset = offset.filter(|s| !s.is_empty());
    let mut candidates = Vec::with_capacity(2);

    match subsec {
        Some(sub) => {
            if let Some(off) = offset {
                candidates.push(format!("{}.{} {}", date, sub, off));
            }
            candidates.push(format!("{}.{}", date, sub));
        }
        None => {
            if let Some(off) = offset {
                candidates.push(format!("{} {}", date, off));
            }
            candidates.push(date.to_string());
        }
    }

    candidates
}

/// Parse one composite date string into Unix seconds
///
/// Strings without an offset are read in `zone`.
pub fn parse_exif_datetime(s: &str, zone: NaiveZone) -> Option<f64> {
    let s = s.trim().trim_matches('"');

    // chrono's %:z does not accept a bare "Z"
    let zoned = match s.strip_suffix(" Z") {
        Some(rest) => format!("{} +00:00", rest),
        None => s.to_string(),
    };

    for format in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&zoned, format) {
            return Some(super::unix_seconds(&dt));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return zone.resolve(&naive);
        }
    }

    None
}
