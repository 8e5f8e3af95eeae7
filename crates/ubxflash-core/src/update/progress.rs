//! Progress reporting

use std::time::{Duration, Instant};

use super::Phase;

/// Counters of an update session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressReport {
    /// Acknowledged bytes
    pub bytes_written: usize,
    /// Image size
    pub total_bytes: usize,
    /// Acknowledged chunks
    pub chunks_written: usize,
    /// Number of chunks
    pub total_chunks: usize,
    /// Acknowledged sector erases
    pub sectors_erased: usize,
    /// Sectors touched by the image
    pub total_sectors: usize,
    /// Phase of the last command
    pub phase: Phase,
}

/// Receiver of progress notifications
///
/// Calls happen on the protocol loop and must return quickly.
pub trait UpdateProgress {
    /// Session is about to send its first command
    fn starting(&mut self, report: &ProgressReport);

    /// Counters changed
    fn progress(&mut self, report: &ProgressReport);

    /// All chunks written, checksum poll follows
    fn verifying(&mut self, report: &ProgressReport);

    /// Session finished successfully
    fn complete(&mut self, report: &ProgressReport);
}

/// A no-op progress reporter
pub struct NoProgress;

impl UpdateProgress for NoProgress {
    fn starting(&mut self, _report: &ProgressReport) {}
    fn progress(&mut self, _report: &ProgressReport) {}
    fn verifying(&mut self, _report: &ProgressReport) {}
    fn complete(&mut self, _report: &ProgressReport) {}
}

/// Rate limit for progress notifications
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    /// Allow at most one report per `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Whether a report at `now` may go out; records it if so
    ///
    /// The first report and forced reports always pass.
    pub fn allow(&mut self, now: Instant, force: bool) -> bool {
        let due = match self.last {
            None => true,
            Some(last) => force || now.saturating_duration_since(last) >= self.interval,
        };
        if due {
            self.last = Some(now);
        }
        due
    }
}
