//! In-memory transparency log.
//!
//! Counts what the agent captured and submitted during the current run.
//! Nothing here is written to disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the current run.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Keyboard events buffered into a session
    keyboard_events: AtomicU64,
    /// Motion and orientation samples buffered into a session
    motion_events: AtomicU64,
    /// Pointer samples buffered into a session
    pointer_events: AtomicU64,
    /// Events rejected because the input queue was full
    dropped_events: AtomicU64,
    /// Capture sessions closed and reduced to features
    sessions_completed: AtomicU64,
    /// Feature vectors dispatched to the verdict service
    submissions: AtomicU64,
    /// Submissions that failed or were not scored
    submission_failures: AtomicU64,
    /// Step-up challenges raised
    step_ups: AtomicU64,
    started_at: DateTime<Utc>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self {
            keyboard_events: AtomicU64::new(0),
            motion_events: AtomicU64::new(0),
            pointer_events: AtomicU64::new(0),
            dropped_events: AtomicU64::new(0),
            sessions_completed: AtomicU64::new(0),
            submissions: AtomicU64::new(0),
            submission_failures: AtomicU64::new(0),
            step_ups: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn record_keyboard_event(&self) {
        self.keyboard_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_motion_event(&self) {
        self.motion_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pointer_event(&self) {
        self.pointer_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_event(&self) {
        self.dropped_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_completed(&self) {
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submission(&self) {
        self.submissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submission_failure(&self) {
        self.submission_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_step_up(&self) {
        self.step_ups.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            keyboard_events: self.keyboard_events.load(Ordering::Relaxed),
            motion_events: self.motion_events.load(Ordering::Relaxed),
            pointer_events: self.pointer_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            submissions: self.submissions.load(Ordering::Relaxed),
            submission_failures: self.submission_failures.load(Ordering::Relaxed),
            step_ups: self.step_ups.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Run Statistics:\n\
             - Keyboard events captured: {}\n\
             - Motion samples captured: {}\n\
             - Pointer samples captured: {}\n\
             - Events dropped (queue full): {}\n\
             - Capture sessions completed: {}\n\
             - Verdict submissions: {} ({} failed)\n\
             - Step-up challenges: {}\n\
             - Uptime: {} seconds\n\
             \n\
             Retention:\n\
             - Raw events are discarded when each capture session closes\n\
             - Typed text never leaves the device\n\
             - Nothing is written to disk",
            stats.keyboard_events,
            stats.motion_events,
            stats.pointer_events,
            stats.dropped_events,
            stats.sessions_completed,
            stats.submissions,
            stats.submission_failures,
            stats.step_ups,
            stats.uptime_secs
        )
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub keyboard_events: u64,
    pub motion_events: u64,
    pub pointer_events: u64,
    pub dropped_events: u64,
    pub sessions_completed: u64,
    pub submissions: u64,
    pub submission_failures: u64,
    pub step_ups: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}
