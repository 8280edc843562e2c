//! Configuration types for the GPS fixer

use crate::table::ParseOptions;
use crate::time::NaiveZone;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Field delimiter of the track file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    /// Guess from the header line
    #[default]
    Auto,
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// Tab character
    Tab,
}

impl Delimiter {
    /// The explicit delimiter character, or `None` to guess
    pub fn as_char(&self) -> Option<char> {
        match self {
            Delimiter::Auto => None,
            Delimiter::Comma => Some(','),
            Delimiter::Semicolon => Some(';'),
            Delimiter::Tab => Some('\t'),
        }
    }
}

/// Configuration for a geotagging run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Delimited text file with the GPS track
    pub track_file: PathBuf,

    /// Directory scanned recursively for photos
    pub photo_dir: PathBuf,

    /// Replace GPS tags that are already present
    #[serde(default)]
    pub overwrite: bool,

    /// Match photos and report coordinates without modifying any file
    #[serde(default)]
    pub dry_run: bool,

    /// Track file delimiter
    #[serde(default)]
    pub delimiter: Delimiter,

    /// Time zone for EXIF dates that carry no UTC offset
    #[serde(default)]
    pub naive_time_zone: NaiveZone,

    /// Photo extensions to consider (case-insensitive)
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Directories to exclude from scanning (can be absolute paths or folder names)
    #[serde(default)]
    pub exclude_dirs: Vec<PathBuf>,

    /// Follow symbolic links while scanning
    #[serde(default = "default_follow_links")]
    pub follow_links: bool,

    /// Verbose output
    #[serde(default)]
    pub verbose: bool,

    /// Directory for log files (defaults to `Log` next to the executable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

fn default_extensions() -> Vec<String> {
    vec!["jpg".into(), "jpeg".into(), "heic".into(), "heif".into()]
}

fn default_follow_links() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            track_file: PathBuf::new(),
            photo_dir: PathBuf::new(),
            overwrite: false,
            dry_run: false,
            delimiter: Delimiter::default(),
            naive_time_zone: NaiveZone::default(),
            extensions: default_extensions(),
            exclude_dirs: vec![],
            follow_links: default_follow_links(),
            verbose: false,
            log_dir: None,
        }
    }
}

impl Config {
    /// Check if a file extension is a supported photo format
    pub fn is_supported(&self, ext: &str) -> bool {
        let ext_lower = ext.to_lowercase();
        self.extensions
            .iter()
            .any(|e| e.trim_start_matches('.').to_lowercase() == ext_lower)
    }

    /// Options for reading the track file
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            delimiter: self.delimiter.as_char(),
            ..ParseOptions::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            source: e,
        })?;

        fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    /// Generate a sample configuration file content
    pub fn sample_config() -> String {
        r#"# GPS Fixer Configuration File
# This file uses TOML format (https://toml.io)

# GPS track exported from a logger: delimited text with a header row.
# Columns are found by name: time/date, lon/lng, lat, alt/ele,
# heading/dir/bearing/course and speed/vel.
track_file = "D:/Tracks/2024-05-01.csv"

# Directory scanned recursively for photos
photo_dir = "D:/Photos/2024-05-01"

# Replace GPS coordinates that photos already carry
overwrite = false

# Dry run mode - report matched coordinates without modifying photos
dry_run = false

# Track file delimiter: "auto", "comma", "semicolon" or "tab"
delimiter = "auto"

# Time zone for EXIF dates without a UTC offset: "local" or "utc"
# Cameras usually record local wall-clock time.
naive_time_zone = "local"

# Photo extensions to geotag (case-insensitive)
extensions = ["jpg", "jpeg", "heic", "heif"]

# Directories to exclude from scanning
# Can be absolute paths or folder names (will match any folder with that name)
exclude_dirs = [
    ".thumbnails",
    "@eaDir",
]

# Follow symbolic links while scanning
follow_links = true

# Verbose output - show detailed processing information
verbose = false

# Directory for log files (defaults to "Log" next to the executable)
# log_dir = "D:/Logs"
"#
        .to_string()
    }
}

/// Errors that can occur when loading or saving configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read configuration file
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse configuration file
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Failed to write configuration file
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to serialize configuration
    SerializeError {
        source: toml::ser::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError { path, source } => {
                write!(f, "Failed to read config file '{}': {}", path.display(), source)
            }
            ConfigError::ParseError { path, source } => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), source)
            }
            ConfigError::WriteError { path, source } => {
                write!(f, "Failed to write config file '{}': {}", path.display(), source)
            }
            ConfigError::SerializeError { source } => {
                write!(f, "Failed to serialize config: {}", source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            ConfigError::WriteError { source, .. } => Some(source),
            ConfigError::SerializeError { source } => Some(source),
        }
    }
}
