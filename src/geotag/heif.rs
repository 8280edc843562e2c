//! HEIF/HEIC metadata container backed by little_exif

use super::{GPS_VERSION, GpsFix, MetadataContainer};
use crate::error::{Error, Result};
use little_exif::exif_tag::ExifTag;
use little_exif::filetype::FileExtension;
use little_exif::metadata::Metadata;
use little_exif::rational::uR64;
use std::panic::{self, AssertUnwindSafe};
use tracing::trace;

pub struct HeifContainer {
    item: String,
    bytes: Vec<u8>,
    metadata: Metadata,
}

fn ur64(parts: &[(u32, u32)]) -> Vec<uR64> {
    parts
        .iter()
        .map(|&(nominator, denominator)| uR64 {
            nominator,
            denominator,
        })
        .collect()
}

/// little_exif panics on some malformed boxes; treat that as a failed call
fn guarded<T>(f: impl FnOnce() -> std::io::Result<T>) -> std::result::Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("metadata library panicked".to_string()),
    }
}

impl HeifContainer {
    pub fn parse(bytes: Vec<u8>, item: &str) -> Result<Self> {
        let metadata = guarded(|| Metadata::new_from_vec(&bytes, FileExtension::HEIF)).map_err(
            |message| Error::MetadataLoad {
                item: item.to_string(),
                message,
            },
        )?;
        trace!(item, "Parsed HEIF container");

        Ok(Self {
            item: item.to_string(),
            bytes,
            metadata,
        })
    }

    fn has_tag(&self, tag: &ExifTag) -> bool {
        self.metadata.get_tag(tag).next().is_some()
    }
}

impl MetadataContainer for HeifContainer {
    fn has_location(&self) -> bool {
        self.has_tag(&ExifTag::GPSLatitude(Vec::new()))
            || self.has_tag(&ExifTag::GPSLongitude(Vec::new()))
    }

    fn set_location(&mut self, fix: &GpsFix) -> Result<()> {
        if !self.has_tag(&ExifTag::GPSVersionID(Vec::new())) {
            self.metadata
                .set_tag(ExifTag::GPSVersionID(GPS_VERSION.to_vec()));
        }

        self.metadata
            .set_tag(ExifTag::GPSLatitudeRef(fix.latitude_ref().to_string()));
        self.metadata
            .set_tag(ExifTag::GPSLatitude(ur64(&fix.latitude_dms())));
        self.metadata
            .set_tag(ExifTag::GPSLongitudeRef(fix.longitude_ref().to_string()));
        self.metadata
            .set_tag(ExifTag::GPSLongitude(ur64(&fix.longitude_dms())));
        self.metadata
            .set_tag(ExifTag::GPSAltitudeRef(vec![fix.altitude_ref()]));
        self.metadata
            .set_tag(ExifTag::GPSAltitude(ur64(&[fix.altitude_rational()])));
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<Vec<u8>> {
        let Self {
            item,
            mut bytes,
            metadata,
        } = *self;

        guarded(|| metadata.write_to_vec(&mut bytes, FileExtension::HEIF))
            .map_err(|message| Error::Finalize {
                item: item.clone(),
                message,
            })?;

        trace!(item = %item, size = bytes.len(), "Rewrote HEIF metadata");
        Ok(bytes)
    }
}
