//! Offline replay of recorded input streams.
//!
//! A recording is JSON Lines of [`InputEvent`]. Replay feeds each event
//! through the same capture handlers as live input, on a clock that follows
//! the recorded timestamps, so the sealed session matches what a live run
//! would have produced.

use crate::collector::capture::{CaptureConfig, CaptureTarget, InputCapture};
use crate::collector::clock::ManualClock;
use crate::collector::session::SealedSession;
use crate::collector::types::InputEvent;
use crate::config::CaptureSources;
use crate::transparency::create_shared_log;
use std::io::BufRead;
use std::sync::Arc;

/// Replay errors.
#[derive(Debug)]
pub enum ReplayError {
    IoError(String),
    /// The recording holds no parseable event
    Empty,
}

impl std::fmt::Display for ReplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayError::IoError(e) => write!(f, "IO error: {e}"),
            ReplayError::Empty => write!(f, "Recording contains no events"),
        }
    }
}

impl std::error::Error for ReplayError {}

/// A parsed recording.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    pub events: Vec<InputEvent>,
    /// Line numbers (1-based) and parse errors of skipped lines
    pub skipped: Vec<(usize, String)>,
}

/// Result of replaying a recording.
#[derive(Debug, Clone)]
pub struct Replay {
    pub session: SealedSession,
    /// Events read from the recording
    pub total: usize,
    /// Events the capture handlers kept
    pub recorded: usize,
}

/// Parse JSON Lines, skipping blank and malformed lines.
pub fn read_recording(reader: impl BufRead) -> Result<Recording, ReplayError> {
    let mut recording = Recording::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| ReplayError::IoError(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<InputEvent>(&line) {
            Ok(event) => recording.events.push(event),
            Err(e) => recording.skipped.push((index + 1, e.to_string())),
        }
    }
    Ok(recording)
}

/// Replay events into one session spanning the first to the last timestamp.
pub fn replay_events(events: &[InputEvent], sources: CaptureSources) -> Result<Replay, ReplayError> {
    let first = events.first().ok_or(ReplayError::Empty)?.timestamp;
    let last = events.iter().map(|e| e.timestamp).fold(first, f64::max);

    let clock = Arc::new(ManualClock::new(first));
    let mut capture = InputCapture::new(
        CaptureConfig {
            sources,
            queue_capacity: 1,
        },
        clock.clone(),
        create_shared_log(),
    );
    capture.start(CaptureTarget::Global);

    let mut recorded = 0;
    for event in events {
        clock.set(event.timestamp);
        if capture.handle(event) {
            recorded += 1;
        }
    }
    clock.set(last);

    let session = capture.stop().ok_or(ReplayError::Empty)?;
    Ok(Replay {
        session,
        total: events.len(),
        recorded,
    })
}
