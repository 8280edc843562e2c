//! Batch orchestrator
//!
//! Drives one geotagging run:
//! - Loading the GPS track
//! - Scanning the photo source for candidates
//! - Matching each photo's capture time to the nearest track sample
//! - Writing the matched coordinates into the photo

use crate::config::Config;
use crate::error::{Error, Result};
use crate::geotag::{self, Geotagged, GpsFix, WriteOutcome};
use crate::log::{BatchLog, BatchResult};
use crate::source::{self, AssetStore};
use crate::time::{self, CaptureTime, TimeSource};
use crate::track::{LocationSample, LocationTrack};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{Level, debug, info, span, warn};

/// Lifecycle of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    /// Reading the track file
    Loading,
    /// Enumerating candidate photos
    Scanning,
    /// Working on item `current` (1-based) of `total`
    Processing { current: usize, total: usize },
    Completed,
}

/// Result of processing a single photo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    /// Coordinates written (or reported, in dry-run mode)
    Success,
    /// Photo already had coordinates and overwriting is disabled
    Skipped,
    /// Processing failed
    Failed,
}

/// Zero-padded 1-based position, as wide as the total count
fn padded_index(index: usize, total: usize) -> String {
    let width = total.to_string().len();
    format!("{:0width$}", index, width = width)
}

fn location_line(sample: &LocationSample) -> String {
    format!(
        "matched location: lat={}, lon={}, alt={}",
        sample.latitude, sample.longitude, sample.altitude
    )
}

/// Runs batches and reports through a shared [`BatchLog`]
pub struct Processor {
    config: Config,
    log: BatchLog,
    cancel: Arc<AtomicBool>,
    state: BatchState,
}

impl Processor {
    /// Create a new processor with the given configuration
    pub fn new(config: Config) -> Self {
        Self::with_log(config, BatchLog::new())
    }

    /// Create a processor that reports into an existing log
    pub fn with_log(config: Config, log: BatchLog) -> Self {
        Self {
            config,
            log,
            cancel: Arc::new(AtomicBool::new(false)),
            state: BatchState::Idle,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn log(&self) -> &BatchLog {
        &self.log
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Flag that stops the run before the next item when set
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn transition(&mut self, next: BatchState) {
        debug!(from = ?self.state, to = ?next, "Batch state change");
        self.state = next;
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Load the track, logging the failure when there is nothing to match against
    fn load_track(&mut self) -> Option<LocationTrack> {
        self.transition(BatchState::Loading);

        match LocationTrack::load(
            &self.config.track_file,
            &self.config.parse_options(),
            &self.log,
        ) {
            Ok(track) => {
                info!(count = track.len(), "Loaded GPS track");
                Some(track)
            }
            Err(e) => {
                warn!(error = %e, "Unable to load GPS track");
                match e {
                    Error::Parse(_) | Error::Io(_) => {
                        self.log.error(format!("unable to read from csv {}", e))
                    }
                    _ => self.log.error(format!("gps records empty, {}", e)),
                }
                None
            }
        }
    }

    /// Enter the final state and hand back the counters and log lines
    fn finish(&mut self) -> BatchResult {
        let result = self.log.snapshot();
        self.log.progress(format!("completed: {}", result.summary()));
        self.transition(BatchState::Completed);
        self.log.mark_completed();
        self.log.snapshot()
    }

    /// Run the batch over the configured photo directory
    pub fn run(&mut self) -> BatchResult {
        let _span = span!(Level::INFO, "batch_run", track = ?self.config.track_file).entered();

        let Some(track) = self.load_track() else {
            return self.finish();
        };

        self.transition(BatchState::Scanning);
        let root = self.config.photo_dir.clone();
        self.log
            .progress(format!("starting file walk inside {}", root.display()));
        let candidates = match source::enumerate(&root, &self.config) {
            Ok(files) => files,
            Err(e) => {
                self.log.error(e.to_string());
                return self.finish();
            }
        };
        self.log
            .progress(format!("found {} candidates", candidates.len()));

        if candidates.is_empty() {
            self.log
                .error(Error::NoCandidates { path: root }.to_string());
            return self.finish();
        }

        self.log.set_considered(candidates.len());
        let total = candidates.len();

        for (idx, path) in candidates.iter().enumerate() {
            if self.is_cancelled() {
                self.log
                    .info(format!("cancelled before item {}/{}", idx + 1, total));
                break;
            }

            self.transition(BatchState::Processing {
                current: idx + 1,
                total,
            });
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            self.log.progress(format!(
                "processing {}/{} <{}>",
                padded_index(idx + 1, total),
                total,
                name
            ));

            let _file_span = span!(Level::DEBUG, "process_file", ?path).entered();
            let status = match self.process_file(path, &track) {
                Ok(status) => status,
                Err(e) => {
                    self.log.error(e.to_string());
                    ItemStatus::Failed
                }
            };
            self.record(status);
        }

        self.finish()
    }

    fn record(&self, status: ItemStatus) {
        match status {
            ItemStatus::Success => self.log.record_success(),
            ItemStatus::Skipped => self.log.record_skip(),
            ItemStatus::Failed => self.log.record_failure(),
        }
    }

    /// Capture time, nearest sample, then write
    fn process_file(&self, path: &Path, track: &LocationTrack) -> Result<ItemStatus> {
        let capture = time::extract_from_file(path, self.config.naive_time_zone).ok_or_else(|| {
            Error::TimestampUnavailable {
                item: path.display().to_string(),
            }
        })?;
        if capture.source != TimeSource::Exif {
            self.log
                .info(format!("using {:?} time for {}", capture.source, path.display()));
        }

        let sample = self.match_location(&capture, track)?;
        let fix = GpsFix::from(sample);

        if self.config.dry_run {
            self.log.progress(format!(
                "dry run: would write lat={}, lon={}, alt={} to {}",
                fix.latitude,
                fix.longitude,
                fix.altitude,
                path.display()
            ));
            return Ok(ItemStatus::Success);
        }

        match geotag::geotag_file(path, &fix, self.config.overwrite)? {
            WriteOutcome::Written => {
                self.log.success("image meta data updated");
                Ok(ItemStatus::Success)
            }
            WriteOutcome::Skipped => {
                self.log.info("GPS data already exists");
                Ok(ItemStatus::Skipped)
            }
        }
    }

    fn match_location<'t>(
        &self,
        capture: &CaptureTime,
        track: &'t LocationTrack,
    ) -> Result<&'t LocationSample> {
        let sample = track.nearest(capture.timestamp).ok_or(Error::NoMatch {
            timestamp: capture.timestamp,
        })?;
        debug!(
            timestamp = capture.timestamp,
            sample = sample.timestamp,
            "Matched capture time"
        );
        self.log.progress(location_line(sample));
        Ok(sample)
    }

    /// Run the batch over the assets of a photo library
    pub fn run_with_store(&mut self, store: &mut dyn AssetStore) -> BatchResult {
        let _span = span!(Level::INFO, "batch_run_assets").entered();

        let Some(track) = self.load_track() else {
            return self.finish();
        };

        self.transition(BatchState::Scanning);
        let ids = match store.enumerate() {
            Ok(ids) => ids,
            Err(e) => {
                self.log.error(e.to_string());
                return self.finish();
            }
        };
        self.log.progress(format!("processing {} photos", ids.len()));

        if ids.is_empty() {
            self.log.error(
                Error::NoCandidates {
                    path: PathBuf::from("<asset store>"),
                }
                .to_string(),
            );
            return self.finish();
        }

        self.log.set_considered(ids.len());
        let total = ids.len();

        for (idx, id) in ids.iter().enumerate() {
            if self.is_cancelled() {
                self.log
                    .info(format!("cancelled before photo {}/{}", idx + 1, total));
                break;
            }

            let position = idx + 1;
            self.transition(BatchState::Processing {
                current: position,
                total,
            });
            self.log
                .progress(format!("processing photo {}/{}", position, total));

            let _asset_span = span!(Level::DEBUG, "process_asset", %id).entered();
            let status = match self.process_asset(store, id, &track) {
                Ok(status) => status,
                Err(e) => {
                    self.log.error(e.to_string());
                    ItemStatus::Failed
                }
            };

            match status {
                ItemStatus::Success => {
                    self.log
                        .success(format!("photo {} processed successfully", position))
                }
                ItemStatus::Failed => self
                    .log
                    .failure(format!("photo {} processing failed", position)),
                ItemStatus::Skipped => {}
            }
            self.record(status);
        }

        self.finish()
    }

    fn process_asset(
        &self,
        store: &mut dyn AssetStore,
        id: &str,
        track: &LocationTrack,
    ) -> Result<ItemStatus> {
        let bytes = store.load_bytes(id)?;

        if !self.config.overwrite && geotag::has_location(&bytes, id)? {
            self.log
                .info("photo already has location, skipping (overwrite=false)");
            return Ok(ItemStatus::Skipped);
        }

        let capture = time::extract_from_bytes(&bytes, self.config.naive_time_zone)
            .or_else(|| {
                store.creation_time(id).map(|timestamp| CaptureTime {
                    timestamp,
                    source: TimeSource::AssetStore,
                })
            })
            .ok_or_else(|| Error::TimestampUnavailable {
                item: id.to_string(),
            })?;
        self.log
            .progress(format!("photo timestamp: {}", capture.timestamp));

        let sample = self.match_location(&capture, track)?;
        let fix = GpsFix::from(sample);

        if self.config.dry_run {
            self.log.progress(format!(
                "dry run: would write lat={}, lon={}, alt={} to {}",
                fix.latitude, fix.longitude, fix.altitude, id
            ));
            return Ok(ItemStatus::Success);
        }

        match geotag::geotag_bytes(bytes, id, &fix, self.config.overwrite)? {
            Geotagged::Written(encoded) => {
                store.persist(id, encoded)?;
                self.log.success("photo location updated in library");
                Ok(ItemStatus::Success)
            }
            Geotagged::Skipped => {
                self.log
                    .info("photo already has location, skipping (overwrite=false)");
                Ok(ItemStatus::Skipped)
            }
        }
    }
}

/// Handle to a batch running on its own thread
pub struct BatchHandle {
    pub log: BatchLog,
    cancel: Arc<AtomicBool>,
    thread: JoinHandle<BatchResult>,
}

impl BatchHandle {
    /// Ask the worker to stop before its next item
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker and return its result
    pub fn join(self) -> BatchResult {
        match self.thread.join() {
            Ok(result) => result,
            Err(_) => {
                self.log.error("worker thread panicked");
                self.log.mark_completed();
                self.log.snapshot()
            }
        }
    }
}

/// Run the directory batch for `config` on a dedicated worker thread
pub fn spawn_batch(config: Config) -> Result<BatchHandle> {
    let mut processor = Processor::new(config);
    let log = processor.log().clone();
    let cancel = processor.cancel_flag();

    let thread = thread::Builder::new()
        .name("gps-fixer-batch".to_string())
        .spawn(move || processor.run())?;

    Ok(BatchHandle {
        log,
        cancel,
        thread,
    })
}
