//! Batch progress log
//!
//! The worker appends status lines and bumps counters; the CLI (or any other
//! observer) holds a clone and reads snapshots while the batch runs. Every
//! append takes the lock once, so readers never see a half-written line.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info, warn};

/// Severity marker that prefixes every log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Marker {
    /// `[E]` error
    Error,
    /// `[i]` informational
    Info,
    /// `[*]` progress
    Progress,
    /// `[+]` item succeeded
    Success,
    /// `[-]` item failed
    Failure,
}

impl Marker {
    pub fn prefix(&self) -> &'static str {
        match self {
            Marker::Error => "[E]",
            Marker::Info => "[i]",
            Marker::Progress => "[*]",
            Marker::Success => "[+]",
            Marker::Failure => "[-]",
        }
    }

    /// Recover the marker from a formatted line
    pub fn of_line(line: &str) -> Option<Self> {
        [
            Marker::Error,
            Marker::Info,
            Marker::Progress,
            Marker::Success,
            Marker::Failure,
        ]
        .into_iter()
        .find(|m| line.starts_with(m.prefix()))
    }
}

/// Aggregate outcome of a batch run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    /// Candidates the batch attempted
    pub considered: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items left untouched because they already carried GPS data
    pub skipped: usize,
    /// Status lines in the order they were appended
    pub lines: Vec<String>,
}

impl BatchResult {
    pub fn summary(&self) -> String {
        format!(
            "Considered: {}, Succeeded: {}, Skipped: {}, Failed: {}",
            self.considered, self.succeeded, self.skipped, self.failed
        )
    }
}

/// Shared, clonable handle to a batch's log and counters
#[derive(Debug, Clone, Default)]
pub struct BatchLog {
    result: Arc<Mutex<BatchResult>>,
    completed: Arc<AtomicBool>,
}

impl BatchLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BatchResult> {
        self.result.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a raw line
    pub fn append_line(&self, text: impl Into<String>) {
        let text = text.into();
        match Marker::of_line(&text) {
            Some(Marker::Error) => error!(target: "gps_fixer::batch", "{}", text),
            Some(Marker::Failure) => warn!(target: "gps_fixer::batch", "{}", text),
            _ => info!(target: "gps_fixer::batch", "{}", text),
        }
        self.lock().lines.push(text);
    }

    /// Append a line with a severity marker
    pub fn log(&self, marker: Marker, message: impl AsRef<str>) {
        self.append_line(format!("{} {}", marker.prefix(), message.as_ref()));
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(Marker::Error, message);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(Marker::Info, message);
    }

    pub fn progress(&self, message: impl AsRef<str>) {
        self.log(Marker::Progress, message);
    }

    pub fn success(&self, message: impl AsRef<str>) {
        self.log(Marker::Success, message);
    }

    pub fn failure(&self, message: impl AsRef<str>) {
        self.log(Marker::Failure, message);
    }

    pub(crate) fn set_considered(&self, count: usize) {
        self.lock().considered = count;
    }

    pub(crate) fn record_success(&self) {
        self.lock().succeeded += 1;
    }

    pub(crate) fn record_failure(&self) {
        self.lock().failed += 1;
    }

    pub(crate) fn record_skip(&self) {
        self.lock().skipped += 1;
    }

    pub(crate) fn mark_completed(&self) {
        self.completed.store(true, Ordering::Release);
    }

    /// Whether the batch has reached its final state
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// `(succeeded, failed)`
    pub fn summary(&self) -> (usize, usize) {
        let result = self.lock();
        (result.succeeded, result.failed)
    }

    /// Lines appended after the first `start` lines
    pub fn lines_since(&self, start: usize) -> Vec<String> {
        let result = self.lock();
        result.lines.iter().skip(start).cloned().collect()
    }

    /// Consistent copy of the counters and every line so far
    pub fn snapshot(&self) -> BatchResult {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_prefixes() {
        let log = BatchLog::new();
        log.error("boom");
        log.info("note");
        log.progress("step");
        log.success("done");
        log.failure("nope");

        let lines = log.snapshot().lines;
        assert_eq!(
            lines,
            vec!["[E] boom", "[i] note", "[*] step", "[+] done", "[-] nope"]
        );
        assert_eq!(Marker::of_line(&lines[0]), Some(Marker::Error));
        assert_eq!(Marker::of_line("no marker"), None);
    }

    #[test]
    fn test_counters_and_summary() {
        let log = BatchLog::new();
        log.set_considered(4);
        log.record_success();
        log.record_success();
        log.record_failure();
        log.record_skip();

        assert_eq!(log.summary(), (2, 1));
        let snapshot = log.snapshot();
        assert_eq!(snapshot.considered, 4);
        assert_eq!(snapshot.skipped, 1);
        assert!(snapshot.summary().contains("Succeeded: 2"));
        assert!(snapshot.summary().contains("Failed: 1"));
    }

    #[test]
    fn test_lines_since() {
        let log = BatchLog::new();
        log.progress("one");
        log.progress("two");
        log.progress("three");
        assert_eq!(log.lines_since(1), vec!["[*] two", "[*] three"]);
        assert!(log.lines_since(10).is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let writer = BatchLog::new();
        let reader = writer.clone();
        assert!(!reader.is_completed());

        let handle = std::thread::spawn(move || {
            for i in 0..100 {
                writer.progress(format!("line {}", i));
            }
            writer.mark_completed();
        });
        handle.join().unwrap();

        assert!(reader.is_completed());
        let lines = reader.snapshot().lines;
        assert_eq!(lines.len(), 100);
        assert_eq!(lines[99], "[*] line 99");
    }
}
