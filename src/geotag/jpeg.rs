//! JPEG metadata container
//!
//! The APP1 EXIF segment is parsed with kamadak-exif, rebuilt with its
//! experimental writer and swapped back in through img-parts. Entropy-coded
//! image data is never touched.

use super::{GPS_VERSION, GpsFix, MetadataContainer};
use crate::error::{Error, Result};
use exif::experimental::Writer;
use exif::{Exif, Field, In, Rational, Tag, Value};
use img_parts::jpeg::Jpeg;
use img_parts::{Bytes, ImageEXIF};
use std::io::Cursor;
use tracing::trace;

/// Tags owned by the geotagger; existing copies are dropped on write
const LOCATION_TAGS: &[Tag] = &[
    Tag::GPSLatitudeRef,
    Tag::GPSLatitude,
    Tag::GPSLongitudeRef,
    Tag::GPSLongitude,
    Tag::GPSAltitudeRef,
    Tag::GPSAltitude,
];

pub struct JpegContainer {
    item: String,
    jpeg: Jpeg,
    exif: Option<Exif>,
    staged: Vec<Field>,
}

impl JpegContainer {
    pub fn parse(bytes: Vec<u8>, item: &str) -> Result<Self> {
        let jpeg = Jpeg::from_bytes(Bytes::from(bytes)).map_err(|e| Error::MetadataLoad {
            item: item.to_string(),
            message: e.to_string(),
        })?;

        let exif = match jpeg.exif() {
            Some(raw) => Some(exif::Reader::new().read_raw(raw.to_vec()).map_err(|e| {
                Error::MetadataLoad {
                    item: item.to_string(),
                    message: e.to_string(),
                }
            })?),
            None => None,
        };
        trace!(item, has_exif = exif.is_some(), "Parsed JPEG container");

        Ok(Self {
            item: item.to_string(),
            jpeg,
            exif,
            staged: Vec::new(),
        })
    }

    fn has_field(&self, tag: Tag) -> bool {
        self.exif
            .as_ref()
            .is_some_and(|exif| exif.get_field(tag, In::PRIMARY).is_some())
    }
}

fn gps_field(tag: Tag, value: Value) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value,
    }
}

fn rationals(parts: &[(u32, u32)]) -> Value {
    Value::Rational(
        parts
            .iter()
            .map(|&(num, denom)| Rational { num, denom })
            .collect(),
    )
}

fn ascii(text: &str) -> Value {
    Value::Ascii(vec![text.as_bytes().to_vec()])
}

/// Embedded JPEG thumbnail referenced by IFD1, if any
fn thumbnail(exif: &Exif) -> Option<&[u8]> {
    let offset = exif
        .get_field(Tag::JPEGInterchangeFormat, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    let length = exif
        .get_field(Tag::JPEGInterchangeFormatLength, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    exif.buf().get(offset..offset.checked_add(length)?)
}

/// Whether an existing field can be carried over into the rebuilt segment
fn keep_field(field: &Field, staged: &[Field]) -> bool {
    (field.ifd_num == In::PRIMARY || field.ifd_num == In::THUMBNAIL)
        && !matches!(field.value, Value::Unknown(..))
        && !staged.iter().any(|s| s.tag == field.tag)
}

impl MetadataContainer for JpegContainer {
    fn has_location(&self) -> bool {
        self.has_field(Tag::GPSLatitude) || self.has_field(Tag::GPSLongitude)
    }

    fn set_location(&mut self, fix: &GpsFix) -> Result<()> {
        self.staged.retain(|f| !LOCATION_TAGS.contains(&f.tag));

        if !self.has_field(Tag::GPSVersionID) && !self.staged.iter().any(|f| f.tag == Tag::GPSVersionID) {
            self.staged
                .push(gps_field(Tag::GPSVersionID, Value::Byte(GPS_VERSION.to_vec())));
        }

        self.staged.extend([
            gps_field(Tag::GPSLatitudeRef, ascii(fix.latitude_ref())),
            gps_field(Tag::GPSLatitude, rationals(&fix.latitude_dms())),
            gps_field(Tag::GPSLongitudeRef, ascii(fix.longitude_ref())),
            gps_field(Tag::GPSLongitude, rationals(&fix.longitude_dms())),
            gps_field(Tag::GPSAltitudeRef, Value::Byte(vec![fix.altitude_ref()])),
            gps_field(Tag::GPSAltitude, rationals(&[fix.altitude_rational()])),
        ]);
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<Vec<u8>> {
        let Self {
            item,
            mut jpeg,
            exif,
            staged,
        } = *self;

        let kept: Vec<&Field> = exif
            .iter()
            .flat_map(|exif| exif.fields())
            .filter(|field| keep_field(field, &staged))
            .collect();

        let mut writer = Writer::new();
        for field in kept.iter().copied().chain(staged.iter()) {
            writer.push_field(field);
        }
        if let Some(thumb) = exif.as_ref().and_then(thumbnail) {
            writer.set_jpeg(thumb, In::THUMBNAIL);
        }

        let little_endian = exif.as_ref().is_some_and(|exif| exif.little_endian());
        let mut tiff = Cursor::new(Vec::new());
        writer
            .write(&mut tiff, little_endian)
            .map_err(|e| Error::MetadataWrite {
                item: item.clone(),
                message: e.to_string(),
            })?;

        let tiff = tiff.into_inner();
        if tiff.len() > usize::from(u16::MAX) - 8 {
            return Err(Error::Finalize {
                item,
                message: format!("EXIF segment of {} bytes does not fit in APP1", tiff.len()),
            });
        }

        trace!(item = %item, fields = kept.len() + staged.len(), "Rebuilt EXIF segment");
        jpeg.set_exif(Some(Bytes::from(tiff)));
        Ok(jpeg.encoder().bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn fix() -> GpsFix {
        GpsFix {
            latitude: 35.681236,
            longitude: 139.767125,
            altitude: 40.0,
        }
    }

    #[test]
    fn test_plain_jpeg_has_no_location() {
        let container = JpegContainer::parse(plain_jpeg(), "plain.jpg").unwrap();
        assert!(!container.has_location());
        assert!(container.exif.is_none());
    }

    #[test]
    fn test_version_not_duplicated() {
        let mut container = JpegContainer::parse(plain_jpeg(), "plain.jpg").unwrap();
        container.set_location(&fix()).unwrap();
        container.set_location(&fix()).unwrap();

        let versions = container
            .staged
            .iter()
            .filter(|f| f.tag == Tag::GPSVersionID)
            .count();
        assert_eq!(versions, 1);
        assert_eq!(container.staged.len(), 7);
    }

    #[test]
    fn test_existing_version_kept() {
        let input = jpeg_with_fields(&[gps_field(Tag::GPSVersionID, Value::Byte(vec![2, 2, 0, 0]))]);
        let mut container = JpegContainer::parse(input, "a.jpg").unwrap();
        assert!(!container.has_location());
        container.set_location(&fix()).unwrap();
        assert!(container.staged.iter().all(|f| f.tag != Tag::GPSVersionID));

        let out = Box::new(container).finalize().unwrap();
        let exif = exif::Reader::new()
            .read_from_container(&mut Cursor::new(&out))
            .unwrap();
        let version = exif.get_field(Tag::GPSVersionID, In::PRIMARY).unwrap();
        assert!(matches!(&version.value, Value::Byte(v) if v.as_slice() == [2, 2, 0, 0]));
    }

    #[test]
    fn test_latitude_only_counts_as_location() {
        let input = jpeg_with_fields(&[
            gps_field(Tag::GPSLatitudeRef, ascii("N")),
            gps_field(Tag::GPSLatitude, rationals(&[(1, 1), (0, 1), (0, 1)])),
        ]);
        let container = JpegContainer::parse(input, "a.jpg").unwrap();
        assert!(container.has_location());
    }
}
