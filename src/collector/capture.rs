//! Queue-backed input capture.
//!
//! Sources push [`InputEvent`]s through a cloneable [`InputSink`]. The
//! [`InputCapture`] owns the receiving end and the open session, and drains
//! the queue in arrival order whenever it is pumped.

use crate::collector::clock::SharedClock;
use crate::collector::session::{CaptureSession, SealedSession};
use crate::collector::types::{InputEvent, InputKind, Modality};
use crate::config::CaptureSources;
use crate::transparency::SharedTransparencyLog;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::debug;

/// Default queue capacity between sources and the capture.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Configuration for the capture queue and accepted modalities.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub sources: CaptureSources,
    pub queue_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sources: CaptureSources::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Which surfaces a session listens to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CaptureTarget {
    /// Accept events from every surface.
    #[default]
    Global,
    /// Accept only events tagged with this target.
    Named(String),
}

impl CaptureTarget {
    fn accepts(&self, event: &InputEvent) -> bool {
        match self {
            CaptureTarget::Global => true,
            CaptureTarget::Named(name) => event.target.as_deref() == Some(name.as_str()),
        }
    }
}

/// Errors that can occur while queueing input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    QueueFull,
    Disconnected,
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::QueueFull => write!(f, "Input queue is full"),
            CaptureError::Disconnected => write!(f, "Input capture has shut down"),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Producer handle for input sources.
#[derive(Clone)]
pub struct InputSink {
    sender: Sender<InputEvent>,
    clock: SharedClock,
    stats: SharedTransparencyLog,
}

impl InputSink {
    /// Queue an already-timestamped event. Never blocks.
    pub fn send(&self, event: InputEvent) -> Result<(), CaptureError> {
        match self.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.stats.record_dropped_event();
                Err(CaptureError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(CaptureError::Disconnected),
        }
    }

    /// Queue an event stamped with the capture clock.
    pub fn emit(&self, kind: InputKind) -> Result<(), CaptureError> {
        self.send(InputEvent::new(self.now_ms(), kind))
    }

    /// Current reading of the capture clock.
    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }
}

/// Owns the input queue and the currently open capture session.
pub struct InputCapture {
    config: CaptureConfig,
    clock: SharedClock,
    sender: Sender<InputEvent>,
    receiver: Receiver<InputEvent>,
    session: Option<CaptureSession>,
    target: CaptureTarget,
    stats: SharedTransparencyLog,
}

impl InputCapture {
    /// Create a new capture with its own bounded queue.
    pub fn new(config: CaptureConfig, clock: SharedClock, stats: SharedTransparencyLog) -> Self {
        // Bounded to keep a stalled consumer from growing memory without limit
        let (sender, receiver) = bounded(config.queue_capacity.max(1));
        Self {
            config,
            clock,
            sender,
            receiver,
            session: None,
            target: CaptureTarget::Global,
            stats,
        }
    }

    /// A producer handle for sources.
    pub fn sink(&self) -> InputSink {
        InputSink {
            sender: self.sender.clone(),
            clock: self.clock.clone(),
            stats: self.stats.clone(),
        }
    }

    /// Open a fresh session. An already open session is discarded, not merged.
    pub fn start(&mut self, target: CaptureTarget) {
        if let Some(previous) = self.session.take() {
            debug!(
                events = previous.event_count(),
                "discarding open capture session on restart"
            );
        }

        // Anything queued while inactive belongs to no session.
        let stale = self.receiver.try_iter().count();
        if stale > 0 {
            debug!(stale, "discarded input queued while capture was inactive");
        }

        self.target = target;
        self.session = Some(CaptureSession::new(self.clock.now_ms()));
    }

    /// Close the open session and hand it to the caller.
    ///
    /// Events already queued are drained into the session first.
    pub fn stop(&mut self) -> Option<SealedSession> {
        self.pump();
        let session = self.session.take()?;
        Some(session.seal(self.clock.now_ms()))
    }

    /// Seal the open session and open the next one at the same instant.
    ///
    /// Unlike `stop` followed by `start`, nothing queued after the seal is
    /// discarded: it lands in the new session on the next pump.
    pub fn rotate(&mut self) -> Option<SealedSession> {
        self.pump();
        let session = self.session.take()?;
        let now = self.clock.now_ms();
        self.session = Some(CaptureSession::new(now));
        Some(session.seal(now))
    }

    /// Close the open session without keeping its contents.
    pub fn discard(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(events = session.event_count(), "capture session discarded");
        }
        self.receiver.try_iter().for_each(drop);
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Read access to the open session.
    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    /// Drain queued events into the open session. Returns how many were
    /// buffered.
    pub fn pump(&mut self) -> usize {
        let mut buffered = 0;
        while let Ok(event) = self.receiver.try_recv() {
            if self.handle(&event) {
                buffered += 1;
            }
        }
        buffered
    }

    /// Apply one event directly, bypassing the queue. Returns `false` when the
    /// event was discarded.
    pub fn handle(&mut self, event: &InputEvent) -> bool {
        let modality = event.modality();
        if !self.config.sources.accepts(modality) || !self.target.accepts(event) {
            return false;
        }

        let Some(session) = self.session.as_mut() else {
            return false;
        };

        let recorded = session.record(event);
        if recorded {
            match modality {
                Modality::Keyboard => self.stats.record_keyboard_event(),
                Modality::Motion => self.stats.record_motion_event(),
                Modality::Pointer => self.stats.record_pointer_event(),
            }
        }
        recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::clock::ManualClock;
    use crate::collector::types::{MouseAction, PointerInput, RawAxes, RawRotation};
    use crate::transparency::create_shared_log;
    use std::sync::Arc;

    fn capture_with_clock(config: CaptureConfig) -> (InputCapture, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0.0));
        let capture = InputCapture::new(config, clock.clone(), create_shared_log());
        (capture, clock)
    }

    #[test]
    fn test_events_while_inactive_are_discarded() {
        let (mut capture, _clock) = capture_with_clock(CaptureConfig::default());
        let sink = capture.sink();

        sink.send(InputEvent::key_down(1.0, "A")).unwrap();
        assert_eq!(capture.pump(), 0);

        sink.send(InputEvent::key_down(2.0, "A")).unwrap();
        capture.start(CaptureTarget::Global);
        sink.send(InputEvent::key_down(3.0, "B")).unwrap();
        assert_eq!(capture.pump(), 1);

        let sealed = capture.stop().unwrap();
        assert_eq!(sealed.key_events().len(), 1);
        assert_eq!(sealed.key_events()[0].key_code, "B");
    }

    #[test]
    fn test_stop_drains_queue_and_seals() {
        let (mut capture, clock) = capture_with_clock(CaptureConfig::default());
        let sink = capture.sink();

        clock.set(1_000.0);
        capture.start(CaptureTarget::Global);
        sink.send(InputEvent::key_down(1_010.0, "A")).unwrap();
        sink.send(InputEvent::key_up(1_090.0, "A")).unwrap();
        clock.set(3_000.0);

        let sealed = capture.stop().unwrap();
        assert!(!capture.is_active());
        assert_eq!(sealed.key_ups().count(), 1);
        assert_eq!(sealed.started_at(), 1_000.0);
        assert_eq!(sealed.ended_at(), 3_000.0);
        assert!(capture.stop().is_none());
    }

    #[test]
    fn test_rotate_keeps_input_queued_after_the_seal() {
        let (mut capture, clock) = capture_with_clock(CaptureConfig::default());
        let sink = capture.sink();
        capture.start(CaptureTarget::Global);

        sink.send(InputEvent::key_down(10.0, "A")).unwrap();
        sink.send(InputEvent::key_up(90.0, "A")).unwrap();
        clock.set(1_000.0);

        let first = capture.rotate().unwrap();
        assert_eq!(first.key_ups().count(), 1);
        assert_eq!(first.ended_at(), 1_000.0);
        assert!(capture.is_active());

        // Queued between two rotations: must reach the next session.
        sink.send(InputEvent::key_down(1_010.0, "B")).unwrap();
        sink.send(InputEvent::key_up(1_070.0, "B")).unwrap();
        clock.set(2_000.0);

        let second = capture.rotate().unwrap();
        assert_eq!(second.started_at(), 1_000.0);
        assert_eq!(second.key_ups().count(), 1);
        assert_eq!(second.key_ups().next().unwrap().dwell_time, Some(60.0));
    }

    #[test]
    fn test_rotate_while_inactive_does_nothing() {
        let (mut capture, _clock) = capture_with_clock(CaptureConfig::default());
        assert!(capture.rotate().is_none());
        assert!(!capture.is_active());
    }

    #[test]
    fn test_restart_discards_previous_buffers() {
        let (mut capture, _clock) = capture_with_clock(CaptureConfig::default());
        capture.start(CaptureTarget::Global);
        capture.handle(&InputEvent::key_down(1.0, "A"));
        capture.start(CaptureTarget::Global);

        let sealed = capture.stop().unwrap();
        assert!(sealed.is_empty());
    }

    #[test]
    fn test_named_target_filters_events() {
        let (mut capture, _clock) = capture_with_clock(CaptureConfig::default());
        capture.start(CaptureTarget::Named("password".to_string()));

        assert!(!capture.handle(&InputEvent::key_down(1.0, "A")));
        assert!(!capture.handle(&InputEvent::key_down(2.0, "B").with_target("search")));
        assert!(capture.handle(&InputEvent::key_down(3.0, "C").with_target("password")));

        let sealed = capture.stop().unwrap();
        assert_eq!(sealed.key_events().len(), 1);
    }

    #[test]
    fn test_disabled_sources_are_ignored() {
        let config = CaptureConfig {
            sources: CaptureSources::from_csv("keyboard"),
            ..CaptureConfig::default()
        };
        let (mut capture, _clock) = capture_with_clock(config);
        capture.start(CaptureTarget::Global);

        assert!(!capture.handle(&InputEvent::pointer(
            1.0,
            PointerInput::mouse(MouseAction::Press, 0.0, 0.0)
        )));
        assert!(!capture.handle(&InputEvent::new(
            2.0,
            InputKind::Motion {
                acceleration: RawAxes::default(),
                acceleration_including_gravity: RawAxes::default(),
                rotation_rate: RawRotation::new(1.0, 1.0, 1.0),
            }
        )));
        assert!(capture.handle(&InputEvent::key_down(3.0, "A")));
    }

    #[test]
    fn test_full_queue_rejects_and_counts() {
        let config = CaptureConfig {
            queue_capacity: 2,
            ..CaptureConfig::default()
        };
        let stats = create_shared_log();
        let capture = InputCapture::new(config, Arc::new(ManualClock::new(0.0)), stats.clone());
        let sink = capture.sink();

        sink.emit(InputKind::KeyUp { key_code: "A".into() }).unwrap();
        sink.emit(InputKind::KeyUp { key_code: "B".into() }).unwrap();
        assert_eq!(
            sink.emit(InputKind::KeyUp { key_code: "C".into() }),
            Err(CaptureError::QueueFull)
        );
        assert_eq!(stats.stats().dropped_events, 1);
    }

    #[test]
    fn test_recorded_events_are_counted_per_modality() {
        let stats = create_shared_log();
        let mut capture = InputCapture::new(
            CaptureConfig::default(),
            Arc::new(ManualClock::new(0.0)),
            stats.clone(),
        );
        capture.start(CaptureTarget::Global);
        capture.handle(&InputEvent::key_down(1.0, "A"));
        capture.handle(&InputEvent::key_up(2.0, "Z"));
        capture.handle(&InputEvent::pointer(
            3.0,
            PointerInput::mouse(MouseAction::Move, 1.0, 1.0),
        ));

        let snapshot = stats.stats();
        assert_eq!(snapshot.keyboard_events, 1);
        assert_eq!(snapshot.pointer_events, 1);
        assert_eq!(snapshot.motion_events, 0);
    }
}
