//! Error types for the GPS fixer

use crate::table::ParseError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for GPS fixer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the GPS fixer
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse track file: {0}")]
    Parse(#[from] ParseError),

    #[error("No usable location records in {path}")]
    NoRecords { path: PathBuf },

    #[error("No candidate images found in {path}")]
    NoCandidates { path: PathBuf },

    #[error("Unable to determine capture time of {item}")]
    TimestampUnavailable { item: String },

    #[error("Unable to find a matching location for timestamp {timestamp}")]
    NoMatch { timestamp: f64 },

    #[error("Failed to load image metadata from {item}: {message}")]
    MetadataLoad { item: String, message: String },

    #[error("Failed to write image metadata for {item}: {message}")]
    MetadataWrite { item: String, message: String },

    #[error("Failed to finalize image data for {item}: {message}")]
    Finalize { item: String, message: String },

    #[error("Failed to replace {path}: {source}")]
    FileReplace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported image format: {item}")]
    UnsupportedFormat { item: String },

    #[error("Asset store error for {id}: {message}")]
    Asset { id: String, message: String },
}
