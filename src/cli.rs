//! CLI argument parsing with clap

use crate::config::{Config, Delimiter};
use crate::time::NaiveZone;
use clap::Parser;
use std::path::PathBuf;

/// GPS Fixer - Geotag photos from a GPS logger track
///
/// Reads a delimited GPS track, finds the sample closest to each photo's
/// capture time and writes its coordinates into the photo's EXIF data.
/// Pixel data is never re-encoded.
#[derive(Parser, Debug)]
#[command(name = "gps-fixer")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file (TOML format)
    ///
    /// When specified, settings from the config file are used as defaults.
    /// CLI arguments will override config file settings.
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,

    /// GPS track file (CSV, semicolon or tab separated)
    #[arg(short, long)]
    pub track: Option<PathBuf>,

    /// Directory scanned recursively for photos
    #[arg(short, long)]
    pub photos: Option<PathBuf>,

    /// Replace GPS data that photos already carry
    #[arg(short, long)]
    pub overwrite: bool,

    /// Track file delimiter
    #[arg(short, long, value_enum)]
    pub delimiter: Option<Delimiter>,

    /// Time zone for EXIF dates without a UTC offset
    #[arg(short = 'z', long, value_enum)]
    pub time_zone: Option<NaiveZone>,

    /// Directories to exclude from scanning (folder names or absolute paths)
    #[arg(short = 'x', long, num_args = 1..)]
    pub exclude: Option<Vec<PathBuf>>,

    /// Do not follow symbolic links while scanning
    #[arg(long)]
    pub no_follow_links: bool,

    /// Directory for log files
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Write the batch result (counters and log lines) as JSON to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Print a sample configuration file and exit
    #[arg(long)]
    pub print_sample_config: bool,

    /// Dry run mode - report matched coordinates without modifying photos
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Output log format as JSON
    #[arg(long)]
    pub json_log: bool,
}

impl Cli {
    /// Get config file name (without extension) for log naming
    pub fn config_name(&self) -> Option<String> {
        self.config.as_ref().and_then(|p| {
            p.file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.to_string())
        })
    }

    /// Merge CLI arguments with config from file
    /// CLI arguments take precedence over config file settings
    pub fn merge_with_config(&self, mut config: Config) -> Config {
        if let Some(ref track) = self.track {
            config.track_file = track.clone();
        }
        if let Some(ref photos) = self.photos {
            config.photo_dir = photos.clone();
        }
        if self.overwrite {
            config.overwrite = true;
        }
        if let Some(delimiter) = self.delimiter {
            config.delimiter = delimiter;
        }
        if let Some(zone) = self.time_zone {
            config.naive_time_zone = zone;
        }
        if let Some(ref exclude) = self.exclude {
            config.exclude_dirs = exclude.clone();
        }
        if self.no_follow_links {
            config.follow_links = false;
        }
        if let Some(ref log_dir) = self.log_dir {
            config.log_dir = Some(log_dir.clone());
        }
        if self.dry_run {
            config.dry_run = true;
        }
        if self.verbose {
            config.verbose = true;
        }

        config
    }

    /// Convert CLI arguments to Config (when no config file is used)
    pub fn to_config(&self) -> Config {
        self.merge_with_config(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_config() {
        let cli = Cli::parse_from([
            "gps-fixer",
            "--track",
            "track.csv",
            "--photos",
            "photos",
            "--overwrite",
            "--delimiter",
            "semicolon",
            "-z",
            "utc",
        ]);
        let config = cli.to_config();
        assert_eq!(config.track_file, PathBuf::from("track.csv"));
        assert_eq!(config.photo_dir, PathBuf::from("photos"));
        assert!(config.overwrite);
        assert_eq!(config.delimiter, Delimiter::Semicolon);
        assert_eq!(config.naive_time_zone, NaiveZone::Utc);
        assert!(config.follow_links);
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = Config {
            track_file: PathBuf::from("from-file.csv"),
            photo_dir: PathBuf::from("file-photos"),
            delimiter: Delimiter::Tab,
            ..Config::default()
        };
        let cli = Cli::parse_from([
            "gps-fixer",
            "-C",
            "configs/trip.toml",
            "-t",
            "cli.csv",
            "--no-follow-links",
        ]);

        let merged = cli.merge_with_config(file);
        assert_eq!(merged.track_file, PathBuf::from("cli.csv"));
        assert_eq!(merged.photo_dir, PathBuf::from("file-photos"));
        assert_eq!(merged.delimiter, Delimiter::Tab);
        assert!(!merged.follow_links);
        assert_eq!(cli.config_name().as_deref(), Some("trip"));
    }
}
