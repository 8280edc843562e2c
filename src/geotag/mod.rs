//! GPS metadata writer
//!
//! Images are opened as a [`MetadataContainer`], checked for existing
//! coordinates, given new GPS tags and re-encoded with the pixel data passed
//! through untouched. File-backed images are then swapped in atomically.

pub mod heif;
pub mod jpeg;

use crate::error::{Error, Result};
use crate::track::LocationSample;
use exif::{In, Tag, Value};
use filetime::FileTime;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use tracing::{debug, trace};

/// `GPSVersionID` written when the image carries none
pub const GPS_VERSION: [u8; 4] = [2, 3, 0, 0];

/// Denominator used for the seconds part of a coordinate
const SECONDS_SCALE: u32 = 10_000;

/// Denominator used for altitude in meters
const ALTITUDE_SCALE: u32 = 100;

/// Container formats the writer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Heif,
}

impl ImageFormat {
    /// Sniff the container format from leading magic bytes
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8]) {
            return Some(ImageFormat::Jpeg);
        }

        if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
            let brand = &bytes[8..12];
            if [b"heic", b"heix", b"heim", b"heis", b"hevc", b"hevx", b"mif1", b"msf1"]
                .iter()
                .any(|b| brand == *b)
            {
                return Some(ImageFormat::Heif);
            }
        }

        None
    }
}

/// Coordinates to embed in an image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters, negative below sea level
    pub altitude: f64,
}

impl From<&LocationSample> for GpsFix {
    fn from(sample: &LocationSample) -> Self {
        Self {
            latitude: sample.latitude,
            longitude: sample.longitude,
            altitude: sample.altitude,
        }
    }
}

impl GpsFix {
    pub fn latitude_ref(&self) -> &'static str {
        if self.latitude >= 0.0 { "N" } else { "S" }
    }

    pub fn longitude_ref(&self) -> &'static str {
        if self.longitude >= 0.0 { "E" } else { "W" }
    }

    /// `GPSAltitudeRef`: 0 above sea level, 1 below
    pub fn altitude_ref(&self) -> u8 {
        if self.altitude < 0.0 { 1 } else { 0 }
    }

    /// Degrees, minutes and seconds of `|latitude|` as `(numerator, denominator)` pairs
    pub fn latitude_dms(&self) -> [(u32, u32); 3] {
        to_dms(self.latitude.abs())
    }

    pub fn longitude_dms(&self) -> [(u32, u32); 3] {
        to_dms(self.longitude.abs())
    }

    /// `|altitude|` as a rational
    pub fn altitude_rational(&self) -> (u32, u32) {
        (
            (self.altitude.abs() * f64::from(ALTITUDE_SCALE)).round() as u32,
            ALTITUDE_SCALE,
        )
    }
}

/// Split non-negative decimal degrees into rational degrees, minutes and seconds
pub fn to_dms(degrees: f64) -> [(u32, u32); 3] {
    let whole = degrees.floor();
    let minutes_decimal = (degrees - whole) * 60.0;
    let minutes = minutes_decimal.floor();
    let seconds = (minutes_decimal - minutes) * 60.0;

    [
        (whole as u32, 1),
        (minutes as u32, 1),
        (
            (seconds * f64::from(SECONDS_SCALE)).round() as u32,
            SECONDS_SCALE,
        ),
    ]
}

/// Capabilities needed from an image's metadata container
pub trait MetadataContainer {
    /// Whether a latitude or longitude tag is already present
    fn has_location(&self) -> bool;

    /// Stage the GPS tags for `fix`, replacing any present
    fn set_location(&mut self, fix: &GpsFix) -> Result<()>;

    /// Encode the image with its updated metadata
    fn finalize(self: Box<Self>) -> Result<Vec<u8>>;
}

/// Parse `bytes` into the container matching their format
pub fn open_container(bytes: Vec<u8>, item: &str) -> Result<Box<dyn MetadataContainer>> {
    match ImageFormat::detect(&bytes) {
        Some(ImageFormat::Jpeg) => Ok(Box::new(jpeg::JpegContainer::parse(bytes, item)?)),
        Some(ImageFormat::Heif) => Ok(Box::new(heif::HeifContainer::parse(bytes, item)?)),
        None => Err(Error::UnsupportedFormat {
            item: item.to_string(),
        }),
    }
}

/// Outcome of geotagging an in-memory image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Geotagged {
    /// Re-encoded image bytes
    Written(Vec<u8>),
    /// GPS tags already present and overwriting was not requested
    Skipped,
}

/// Outcome of geotagging a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Skipped,
}

/// Geotag an image held in memory; no file I/O is performed
pub fn geotag_bytes(bytes: Vec<u8>, item: &str, fix: &GpsFix, overwrite: bool) -> Result<Geotagged> {
    let mut container = open_container(bytes, item)?;

    if container.has_location() && !overwrite {
        debug!(item, "Image already has GPS data, leaving it untouched");
        return Ok(Geotagged::Skipped);
    }

    container.set_location(fix)?;
    let encoded = container.finalize()?;
    trace!(item, size = encoded.len(), "Encoded geotagged image");
    Ok(Geotagged::Written(encoded))
}

/// Whether an encoded image already carries GPS coordinates
pub fn has_location(bytes: &[u8], item: &str) -> Result<bool> {
    Ok(open_container(bytes.to_vec(), item)?.has_location())
}

/// Geotag an image file in place
pub fn geotag_file(path: &Path, fix: &GpsFix, overwrite: bool) -> Result<WriteOutcome> {
    let item = path.display().to_string();
    // Taken before reading so the read itself does not move the access time
    let attributes = FileAttributes::capture(path)?;
    let bytes = fs::read(path)?;

    match geotag_bytes(bytes, &item, fix, overwrite)? {
        Geotagged::Skipped => Ok(WriteOutcome::Skipped),
        Geotagged::Written(encoded) => {
            replace_file_with(path, &encoded, &attributes)?;
            Ok(WriteOutcome::Written)
        }
    }
}

/// File attributes restored after a replace
#[derive(Debug, Clone)]
pub struct FileAttributes {
    permissions: fs::Permissions,
    accessed: FileTime,
    modified: FileTime,
}

impl FileAttributes {
    pub fn capture(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;
        Ok(Self {
            permissions: metadata.permissions(),
            accessed: FileTime::from_last_access_time(&metadata),
            modified: FileTime::from_last_modification_time(&metadata),
        })
    }

    fn restore(&self, path: &Path) -> std::io::Result<()> {
        fs::set_permissions(path, self.permissions.clone())?;
        filetime::set_file_times(path, self.accessed, self.modified)
    }
}

/// Atomically replace `path` with `bytes`, keeping its permissions and times
pub fn replace_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let attributes = FileAttributes::capture(path).map_err(|source| Error::FileReplace {
        path: path.to_path_buf(),
        source,
    })?;
    replace_file_with(path, bytes, &attributes)
}

/// Atomically replace `path` with `bytes`, then apply `attributes`
///
/// The new content goes to a sibling temporary file that is renamed over the
/// original, so readers see either the old or the new file, never a partial one.
pub fn replace_file_with(path: &Path, bytes: &[u8], attributes: &FileAttributes) -> Result<()> {
    let fail = |source: std::io::Error| Error::FileReplace {
        path: path.to_path_buf(),
        source,
    };

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut temp = tempfile::Builder::new()
        .prefix(".gps-fixer-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(fail)?;
    temp.write_all(bytes).map_err(fail)?;
    temp.as_file().sync_all().map_err(fail)?;
    temp.persist(path).map_err(|e| fail(e.error))?;
    attributes.restore(path).map_err(fail)?;

    debug!(?path, size = bytes.len(), "Replaced image file");
    Ok(())
}

/// Coordinates currently stored in an image, if both latitude and longitude are present
pub fn read_location(bytes: &[u8]) -> Option<GpsFix> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;

    let ascii = |tag: Tag| -> Option<u8> {
        match &exif.get_field(tag, In::PRIMARY)?.value {
            Value::Ascii(values) => values.first()?.first().copied(),
            _ => None,
        }
    };
    let degrees = |tag: Tag| -> Option<f64> {
        match &exif.get_field(tag, In::PRIMARY)?.value {
            Value::Rational(parts) if parts.len() >= 3 => Some(
                parts[0].to_f64() + parts[1].to_f64() / 60.0 + parts[2].to_f64() / 3600.0,
            ),
            _ => None,
        }
    };

    let mut latitude = degrees(Tag::GPSLatitude)?;
    if ascii(Tag::GPSLatitudeRef) == Some(b'S') {
        latitude = -latitude;
    }
    let mut longitude = degrees(Tag::GPSLongitude)?;
    if ascii(Tag::GPSLongitudeRef) == Some(b'W') {
        longitude = -longitude;
    }

    let mut altitude = match exif.get_field(Tag::GPSAltitude, In::PRIMARY).map(|f| &f.value) {
        Some(Value::Rational(parts)) if !parts.is_empty() => parts[0].to_f64(),
        _ => 0.0,
    };
    let below_sea_level = exif
        .get_field(Tag::GPSAltitudeRef, In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        == Some(1);
    if below_sea_level {
        altitude = -altitude;
    }

    Some(GpsFix {
        latitude,
        longitude,
        altitude,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use exif::experimental::Writer;
    use exif::{Field, In, Tag, Value};
    use img_parts::jpeg::Jpeg;
    use img_parts::{Bytes, ImageEXIF};
    use std::io::Cursor;

    /// A small baseline JPEG without any EXIF segment
    pub fn plain_jpeg() -> Vec<u8> {
        let image = image::RgbImage::from_fn(16, 16, |x, y| image::Rgb([x as u8 * 16, y as u8 * 16, 128]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut out, image::ImageFormat::Jpeg)
            .unwrap();
        out.into_inner()
    }

    pub fn ascii_field(tag: Tag, text: &str) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![text.as_bytes().to_vec()]),
        }
    }

    fn tiff_with_fields(fields: &[Field]) -> Vec<u8> {
        let mut writer = Writer::new();
        for field in fields {
            writer.push_field(field);
        }
        let mut tiff = Cursor::new(Vec::new());
        writer.write(&mut tiff, false).unwrap();
        tiff.into_inner()
    }

    /// A JPEG carrying exactly `fields` in its EXIF segment
    pub fn jpeg_with_fields(fields: &[Field]) -> Vec<u8> {
        let mut jpeg = Jpeg::from_bytes(Bytes::from(plain_jpeg())).unwrap();
        jpeg.set_exif(Some(Bytes::from(tiff_with_fields(fields))));
        jpeg.encoder().bytes().to_vec()
    }

    fn iso_box(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = ((body.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(body);
        out
    }

    fn full_box(kind: &[u8; 4], version: u8, body: &[u8]) -> Vec<u8> {
        let mut payload = vec![version, 0, 0, 0];
        payload.extend_from_slice(body);
        iso_box(kind, &payload)
    }

    /// Version 0 `iloc` with one file-relative extent for item 1
    fn item_location(offset: u32, length: u32) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend(0x4400u16.to_be_bytes()); // 4-byte offsets and lengths
        body.extend(1u16.to_be_bytes()); // item count
        body.extend(1u16.to_be_bytes()); // item id
        body.extend(0u16.to_be_bytes()); // data reference index
        body.extend(1u16.to_be_bytes()); // extent count
        body.extend(offset.to_be_bytes());
        body.extend(length.to_be_bytes());
        full_box(b"iloc", 0, &body)
    }

    /// A minimal HEIF whose only item is an EXIF block holding `fields`
    ///
    /// Layout: `ftyp`, `meta` (`hdlr`, `iinf`, `iloc`), then `mdat` with the
    /// EXIF item. No image item is present; the writer never looks at one.
    pub fn heif_with_fields(fields: &[Field]) -> Vec<u8> {
        let mut exif_item = 6u32.to_be_bytes().to_vec();
        exif_item.extend_from_slice(b"Exif\0\0");
        exif_item.extend(tiff_with_fields(fields));

        let ftyp = iso_box(b"ftyp", b"heic\0\0\0\0mif1heic");

        let mut handler = vec![0; 4];
        handler.extend_from_slice(b"pict");
        handler.extend([0; 12]);
        handler.push(0); // empty name
        let hdlr = full_box(b"hdlr", 0, &handler);

        let mut entry = 1u16.to_be_bytes().to_vec();
        entry.extend([0, 0]); // protection index
        entry.extend_from_slice(b"Exif\0"); // item type, empty item name
        let mut item_info = 1u16.to_be_bytes().to_vec();
        item_info.extend(full_box(b"infe", 2, &entry));
        let iinf = full_box(b"iinf", 0, &item_info);

        let meta_len = 12 + hdlr.len() + iinf.len() + item_location(0, 0).len();
        let exif_offset = ftyp.len() + meta_len + 8;
        let iloc = item_location(exif_offset as u32, exif_item.len() as u32);
        let meta = full_box(b"meta", 0, &[hdlr, iinf, iloc].concat());
        assert_eq!(meta.len(), meta_len);

        [ftyp, meta, iso_box(b"mdat", &exif_item)].concat()
    }

    /// A JPEG whose capture time is `date` with the given UTC offset
    pub fn jpeg_taken_at(date: &str, offset: &str) -> Vec<u8> {
        jpeg_with_fields(&[
            ascii_field(Tag::DateTimeOriginal, date),
            ascii_field(Tag::OffsetTimeOriginal, offset),
        ])
    }
}
