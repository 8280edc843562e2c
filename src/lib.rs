//! GPS Fixer - Geotag photos from a GPS logger track
//!
//! This library matches photos against a time-stamped GPS track and writes
//! the nearest position into each photo's EXIF data:
//! - Delimited track parsing with delimiter detection and quoted fields
//! - Header-driven column detection for time, position, heading and speed
//! - Capture-time extraction from EXIF with file-system fallbacks
//! - GPS tag writing for JPEG and HEIF without re-encoding pixel data
//! - Batch processing over a directory or an asset store with a live log

pub mod cli;
pub mod config;
pub mod error;
pub mod geotag;
pub mod log;
pub mod process;
pub mod source;
pub mod table;
pub mod time;
pub mod track;

pub use cli::Cli;
pub use config::{Config, ConfigError, Delimiter};
pub use error::{Error, Result};
pub use geotag::GpsFix;
pub use log::{BatchLog, BatchResult};
pub use process::{Processor, spawn_batch};
pub use source::{AssetStore, MemoryStore};
pub use time::NaiveZone;
pub use track::{LocationSample, LocationTrack};
