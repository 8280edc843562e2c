//! Fuzzy header resolution for location tables
//!
//! GPS loggers name their columns loosely (`dataTime`, `date-time`, `lng`,
//! `Elevation`, ...). Headers are normalized (trimmed, lowercased, `-` and
//! `_` removed) and matched against per-field prefixes.

use super::LocationSample;
use crate::table::Row;

/// Logical columns of a location record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Timestamp,
    Longitude,
    Latitude,
    Altitude,
    Heading,
    Speed,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Timestamp,
        Field::Longitude,
        Field::Latitude,
        Field::Altitude,
        Field::Heading,
        Field::Speed,
    ];

    /// Normalized prefixes recognized for this field, in priority order
    pub fn prefixes(&self) -> &'static [&'static str] {
        match self {
            Field::Timestamp => &["dat", "tim", "time"],
            Field::Longitude => &["lon", "lng"],
            Field::Latitude => &["lat"],
            Field::Altitude => &["alt", "ele", "elevation"],
            Field::Heading => &["hea", "dir", "bearing", "course"],
            Field::Speed => &["spe", "vel"],
        }
    }

    /// Whether a raw header names this field
    pub fn matches(&self, header: &str) -> bool {
        let normalized = normalize_header(header);
        self.prefixes()
            .iter()
            .any(|prefix| normalized == *prefix || normalized.starts_with(prefix))
    }
}

/// Trim, lowercase and strip `-`/`_` separators
pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect()
}

/// Column index of each logical field within one table header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    indices: [usize; 6],
}

impl ColumnMap {
    /// Resolve all six fields against a header
    ///
    /// Columns are scanned left to right and the first match wins, so a
    /// table carrying both `lat` and `latitude` uses whichever comes first.
    /// Returns `None` when any field has no matching column.
    pub fn resolve(header: &[String]) -> Option<Self> {
        let mut indices = [0usize; 6];
        for (slot, field) in indices.iter_mut().zip(Field::ALL) {
            *slot = header.iter().position(|h| field.matches(h))?;
        }
        Some(Self { indices })
    }

    pub fn index_of(&self, field: Field) -> usize {
        self.indices[field as usize]
    }

    /// Convert a raw row into a typed sample, or `None` if any cell is not a number
    pub fn sample(&self, row: &Row<'_>) -> Option<LocationSample> {
        let value = |field: Field| -> Option<f64> {
            row.cell(self.index_of(field))?.trim().parse::<f64>().ok()
        };

        Some(LocationSample {
            timestamp: value(Field::Timestamp)?,
            longitude: value(Field::Longitude)?,
            latitude: value(Field::Latitude)?,
            altitude: value(Field::Altitude)?,
            heading: value(Field::Heading)?,
            speed: value(Field::Speed)?,
        })
    }
}
