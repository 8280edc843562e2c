//! Location track loading and nearest-timestamp lookup

pub mod columns;

use crate::error::{Error, Result};
use crate::log::BatchLog;
use crate::table::{ParseOptions, Table};
use columns::ColumnMap;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// One timestamped GPS fix
///
/// Values are kept exactly as parsed; no range checks are applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocationSample {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Meters
    pub altitude: f64,
    /// Degrees
    pub heading: f64,
    pub speed: f64,
}

/// Map table rows to samples, dropping rows that are not fully numeric
fn samples_of(table: &Table) -> Vec<LocationSample> {
    let Some(columns) = ColumnMap::resolve(table.header()) else {
        warn!(header = ?table.header(), "Track header lacks one or more location columns");
        return Vec::new();
    };

    let samples: Vec<LocationSample> =
        table.rows().filter_map(|row| columns.sample(&row)).collect();
    debug!(
        rows = table.len(),
        usable = samples.len(),
        "Mapped track rows to samples"
    );
    samples
}

/// Samples sorted by timestamp
#[derive(Debug, Clone, Default)]
pub struct LocationTrack {
    samples: Vec<LocationSample>,
}

impl LocationTrack {
    /// Build a track, stable-sorting by timestamp so equal timestamps keep row order
    pub fn from_samples(mut samples: Vec<LocationSample>) -> Self {
        samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Self { samples }
    }

    /// Collect every complete numeric row of a parsed table
    pub fn from_table(table: &Table) -> Self {
        Self::from_samples(samples_of(table))
    }

    /// Read and parse a track file, reporting progress to `log`
    pub fn load(path: &Path, options: &ParseOptions, log: &BatchLog) -> Result<Self> {
        log.info(format!("reading from {}", path.display()));

        let text = fs::read_to_string(path)?;
        let table = Table::parse(&text, options)?;

        let samples = samples_of(&table);
        log.progress(format!("preparing {} gps record", samples.len()));
        let track = Self::from_samples(samples);
        log.progress(format!("loaded {} locations", track.len()));

        if track.is_empty() {
            return Err(Error::NoRecords {
                path: path.to_path_buf(),
            });
        }

        Ok(track)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[LocationSample] {
        &self.samples
    }

    /// Sample whose timestamp is closest to `timestamp`
    ///
    /// A binary search converges on an anchor index and only the five samples
    /// around it are compared, so the result is approximate when timestamps
    /// repeat or sampling density is very uneven. Exact ties keep the earlier
    /// sample.
    pub fn nearest(&self, timestamp: f64) -> Option<&LocationSample> {
        if self.samples.is_empty() {
            return None;
        }

        let len = self.samples.len() as isize;
        let mut left: isize = 0;
        let mut right: isize = len - 1;

        while left < right {
            let mid = (left + right) / 2;
            let candidate = self.samples[mid as usize].timestamp;
            if candidate == timestamp {
                left = mid;
                right = mid;
                break;
            } else if candidate < timestamp {
                left = mid + 1;
            } else {
                right = mid - 1;
            }
        }

        let anchor = (left + right) / 2;
        let mut best: Option<(&LocationSample, f64)> = None;

        for idx in (anchor - 2)..=(anchor + 2) {
            if idx < 0 || idx >= len {
                continue;
            }
            let sample = &self.samples[idx as usize];
            let delta = (sample.timestamp - timestamp).abs();
            if best.is_none_or(|(_, min)| min > delta) {
                best = Some((sample, delta));
            }
        }

        best.map(|(sample, _)| sample)
    }
}
