//! Capture session buffers.
//!
//! A [`CaptureSession`] accumulates raw events between `start` and `stop`.
//! Once closed it becomes a [`SealedSession`], which can only be read.

use crate::collector::types::{
    InputEvent, InputKind, PointerInput, PointerPhase, PointerSource, RawAxes, RawRotation,
};
use serde::Serialize;
use std::collections::HashMap;
use std::ops::Deref;

/// Key transition recorded in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPhase {
    Down,
    Up,
}

/// A buffered key event. Release events carry the derived timings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyEvent {
    pub phase: KeyPhase,
    pub key_code: String,
    pub timestamp: f64,
    /// 0 when the device does not report pressure
    pub pressure: f64,
    /// Hold duration in ms (release events only)
    pub dwell_time: Option<f64>,
    /// Time since the previous release in ms (release events after the first)
    pub flight_time: Option<f64>,
}

/// Three linear axes with missing values defaulted to 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<RawAxes> for Vector3 {
    fn from(raw: RawAxes) -> Self {
        Self {
            x: raw.x.unwrap_or(0.0),
            y: raw.y.unwrap_or(0.0),
            z: raw.z.unwrap_or(0.0),
        }
    }
}

/// Rotation rate with missing values defaulted to 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Rotation {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl From<RawRotation> for Rotation {
    fn from(raw: RawRotation) -> Self {
        Self {
            alpha: raw.alpha.unwrap_or(0.0),
            beta: raw.beta.unwrap_or(0.0),
            gamma: raw.gamma.unwrap_or(0.0),
        }
    }
}

/// A buffered motion snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotionEvent {
    pub timestamp: f64,
    pub acceleration: Vector3,
    pub acceleration_including_gravity: Vector3,
    pub rotation_rate: Rotation,
}

/// A buffered orientation snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrientationEvent {
    pub timestamp: f64,
    pub orientation: Rotation,
}

/// A buffered pointer contact snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointerEvent {
    pub phase: PointerPhase,
    pub source: PointerSource,
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
    pub pressure: f64,
    pub radius_x: f64,
    pub radius_y: f64,
    pub rotation_angle: f64,
    pub contact_id: u32,
}

impl PointerEvent {
    fn from_input(timestamp: f64, input: &PointerInput) -> Self {
        // Mouse input has a single implicit contact.
        let contact_id = match input.source {
            PointerSource::Mouse => 0,
            PointerSource::Touch => input.contact_id.unwrap_or(0),
        };

        Self {
            phase: input.phase,
            source: input.source,
            timestamp,
            x: input.x,
            y: input.y,
            pressure: input.pressure.unwrap_or(0.0),
            radius_x: input.radius_x.unwrap_or(0.0),
            radius_y: input.radius_y.unwrap_or(0.0),
            rotation_angle: input.rotation_angle.unwrap_or(0.0),
            contact_id,
        }
    }
}

/// Raw buffers for one open capture interval.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureSession {
    started_at: f64,
    key_events: Vec<KeyEvent>,
    motion_events: Vec<MotionEvent>,
    orientation_events: Vec<OrientationEvent>,
    pointer_events: Vec<PointerEvent>,
    text_buffer: String,
    #[serde(skip)]
    pending_presses: HashMap<String, f64>,
    #[serde(skip)]
    last_key_up: Option<f64>,
}

impl CaptureSession {
    /// Create an empty session starting at the given clock reading.
    pub fn new(started_at: f64) -> Self {
        Self {
            started_at,
            key_events: Vec::new(),
            motion_events: Vec::new(),
            orientation_events: Vec::new(),
            pointer_events: Vec::new(),
            text_buffer: String::new(),
            pending_presses: HashMap::new(),
            last_key_up: None,
        }
    }

    /// Buffer one event. Returns `false` if the event was dropped.
    pub(crate) fn record(&mut self, event: &InputEvent) -> bool {
        let now = event.timestamp;
        match &event.kind {
            InputKind::KeyDown { key_code, pressure } => {
                self.pending_presses.insert(key_code.clone(), now);
                self.key_events.push(KeyEvent {
                    phase: KeyPhase::Down,
                    key_code: key_code.clone(),
                    timestamp: now,
                    pressure: pressure.unwrap_or(0.0),
                    dwell_time: None,
                    flight_time: None,
                });
                true
            }
            InputKind::KeyUp { key_code } => self.record_key_up(key_code, now),
            InputKind::KeyPress { key } => {
                self.text_buffer
                    .extend(key.chars().filter(|c| *c != '\r' && *c != '\n'));
                true
            }
            InputKind::Motion {
                acceleration,
                acceleration_including_gravity,
                rotation_rate,
            } => {
                self.motion_events.push(MotionEvent {
                    timestamp: now,
                    acceleration: (*acceleration).into(),
                    acceleration_including_gravity: (*acceleration_including_gravity).into(),
                    rotation_rate: (*rotation_rate).into(),
                });
                true
            }
            InputKind::Orientation { alpha, beta, gamma } => {
                self.orientation_events.push(OrientationEvent {
                    timestamp: now,
                    orientation: RawRotation {
                        alpha: *alpha,
                        beta: *beta,
                        gamma: *gamma,
                    }
                    .into(),
                });
                true
            }
            InputKind::Pointer(input) => {
                self.pointer_events
                    .push(PointerEvent::from_input(now, input));
                true
            }
        }
    }

    fn record_key_up(&mut self, key_code: &str, now: f64) -> bool {
        // Pressed before capture started: no dwell can be measured.
        let Some(down_at) = self.pending_presses.remove(key_code) else {
            return false;
        };

        let flight_time = self.last_key_up.map(|last| now - last);
        self.key_events.push(KeyEvent {
            phase: KeyPhase::Up,
            key_code: key_code.to_string(),
            timestamp: now,
            pressure: 0.0,
            dwell_time: Some(now - down_at),
            flight_time,
        });
        self.last_key_up = Some(now);
        true
    }

    /// Close the session at the given clock reading.
    pub fn seal(self, ended_at: f64) -> SealedSession {
        SealedSession {
            session: self,
            ended_at,
        }
    }

    pub fn started_at(&self) -> f64 {
        self.started_at
    }

    pub fn key_events(&self) -> &[KeyEvent] {
        &self.key_events
    }

    /// Release events only, in arrival order.
    pub fn key_ups(&self) -> impl Iterator<Item = &KeyEvent> {
        self.key_events.iter().filter(|e| e.phase == KeyPhase::Up)
    }

    pub fn motion_events(&self) -> &[MotionEvent] {
        &self.motion_events
    }

    pub fn orientation_events(&self) -> &[OrientationEvent] {
        &self.orientation_events
    }

    pub fn pointer_events(&self) -> &[PointerEvent] {
        &self.pointer_events
    }

    pub fn text_buffer(&self) -> &str {
        &self.text_buffer
    }

    /// Total number of buffered events across all streams.
    pub fn event_count(&self) -> usize {
        self.key_events.len()
            + self.motion_events.len()
            + self.orientation_events.len()
            + self.pointer_events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.event_count() == 0 && self.text_buffer.is_empty()
    }
}

/// A closed, read-only capture session.
#[derive(Debug, Clone, Serialize)]
pub struct SealedSession {
    #[serde(flatten)]
    session: CaptureSession,
    ended_at: f64,
}

impl SealedSession {
    pub fn ended_at(&self) -> f64 {
        self.ended_at
    }

    /// Wall-clock length of the session in seconds.
    pub fn duration_secs(&self) -> f64 {
        ((self.ended_at - self.session.started_at) / 1000.0).max(0.0)
    }
}

impl Deref for SealedSession {
    type Target = CaptureSession;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::MouseAction;

    #[test]
    fn test_dwell_and_flight_times() {
        let mut session = CaptureSession::new(0.0);
        session.record(&InputEvent::key_down(0.0, "A"));
        session.record(&InputEvent::key_up(80.0, "A"));
        session.record(&InputEvent::key_down(200.0, "B"));
        session.record(&InputEvent::key_up(260.0, "B"));

        let ups: Vec<&KeyEvent> = session.key_ups().collect();
        assert_eq!(ups.len(), 2);
        assert_eq!(ups[0].dwell_time, Some(80.0));
        assert_eq!(ups[0].flight_time, None);
        assert_eq!(ups[1].dwell_time, Some(60.0));
        assert_eq!(ups[1].flight_time, Some(180.0));
    }

    #[test]
    fn test_orphan_key_up_is_dropped() {
        let mut session = CaptureSession::new(0.0);
        assert!(!session.record(&InputEvent::key_up(50.0, "Shift")));
        assert!(session.key_events().is_empty());
    }

    #[test]
    fn test_key_press_skips_line_breaks() {
        let mut session = CaptureSession::new(0.0);
        session.record(&InputEvent::key_press(1.0, "h"));
        session.record(&InputEvent::key_press(2.0, "\r"));
        session.record(&InputEvent::key_press(3.0, "\n"));
        session.record(&InputEvent::key_press(4.0, "i"));
        assert_eq!(session.text_buffer(), "hi");
    }

    #[test]
    fn test_key_down_pressure_defaults_to_zero() {
        let mut session = CaptureSession::new(0.0);
        session.record(&InputEvent::key_down(1.0, "A"));
        session.record(&InputEvent::new(
            2.0,
            InputKind::KeyDown {
                key_code: "B".to_string(),
                pressure: Some(0.4),
            },
        ));
        assert_eq!(session.key_events()[0].pressure, 0.0);
        assert_eq!(session.key_events()[1].pressure, 0.4);
    }

    #[test]
    fn test_motion_missing_axes_default_to_zero() {
        let mut session = CaptureSession::new(0.0);
        session.record(&InputEvent::new(
            10.0,
            InputKind::Motion {
                acceleration: RawAxes {
                    x: Some(1.0),
                    y: None,
                    z: None,
                },
                acceleration_including_gravity: RawAxes::default(),
                rotation_rate: RawRotation::new(1.0, 2.0, 3.0),
            },
        ));

        let motion = &session.motion_events()[0];
        assert_eq!(motion.acceleration, Vector3 { x: 1.0, y: 0.0, z: 0.0 });
        assert_eq!(motion.acceleration_including_gravity, Vector3::default());
        assert_eq!(motion.rotation_rate.gamma, 3.0);
    }

    #[test]
    fn test_mouse_contact_id_forced_to_zero() {
        let mut session = CaptureSession::new(0.0);
        let mut input = PointerInput::mouse(MouseAction::Move, 5.0, 5.0);
        input.contact_id = Some(9);
        session.record(&InputEvent::pointer(1.0, input));
        assert_eq!(session.pointer_events()[0].contact_id, 0);
        assert_eq!(session.pointer_events()[0].phase, PointerPhase::Move);
    }

    #[test]
    fn test_sealed_session_duration() {
        let sealed = CaptureSession::new(1_000.0).seal(4_000.0);
        assert_eq!(sealed.duration_secs(), 3.0);
        assert!(sealed.is_empty());
    }
}
