//! Raw input event types accepted by the capture queue.
//!
//! Platform sources (browser pages, OS hooks, recorded replays) describe what
//! happened with an [`InputEvent`]. Axes and pressures are optional because
//! not every device reports them; the capture handlers default missing values
//! to zero.

use serde::{Deserialize, Serialize};

/// A single timestamped input event as produced by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    /// Milliseconds on the capture clock
    pub timestamp: f64,
    /// Source element or surface the event was raised on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(flatten)]
    pub kind: InputKind,
}

impl InputEvent {
    pub fn new(timestamp: f64, kind: InputKind) -> Self {
        Self {
            timestamp,
            target: None,
            kind,
        }
    }

    /// Tag the event with the surface it came from.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn key_down(timestamp: f64, key_code: impl Into<String>) -> Self {
        Self::new(
            timestamp,
            InputKind::KeyDown {
                key_code: key_code.into(),
                pressure: None,
            },
        )
    }

    pub fn key_up(timestamp: f64, key_code: impl Into<String>) -> Self {
        Self::new(
            timestamp,
            InputKind::KeyUp {
                key_code: key_code.into(),
            },
        )
    }

    pub fn key_press(timestamp: f64, key: impl Into<String>) -> Self {
        Self::new(timestamp, InputKind::KeyPress { key: key.into() })
    }

    pub fn pointer(timestamp: f64, pointer: PointerInput) -> Self {
        Self::new(timestamp, InputKind::Pointer(pointer))
    }

    /// Which capture modality this event belongs to.
    pub fn modality(&self) -> Modality {
        match self.kind {
            InputKind::KeyDown { .. } | InputKind::KeyUp { .. } | InputKind::KeyPress { .. } => {
                Modality::Keyboard
            }
            InputKind::Motion { .. } | InputKind::Orientation { .. } => Modality::Motion,
            InputKind::Pointer(_) => Modality::Pointer,
        }
    }
}

/// Capture modality, used for source filtering and bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Keyboard,
    Motion,
    Pointer,
}

/// What kind of input occurred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputKind {
    /// A key went down. Pressure is only reported by force-sensitive devices.
    KeyDown {
        key_code: String,
        #[serde(default)]
        pressure: Option<f64>,
    },
    /// A key was released.
    KeyUp { key_code: String },
    /// A printable key produced text.
    KeyPress { key: String },
    /// Device motion sample.
    Motion {
        #[serde(default)]
        acceleration: RawAxes,
        #[serde(default)]
        acceleration_including_gravity: RawAxes,
        #[serde(default)]
        rotation_rate: RawRotation,
    },
    /// Device orientation sample.
    Orientation {
        #[serde(default)]
        alpha: Option<f64>,
        #[serde(default)]
        beta: Option<f64>,
        #[serde(default)]
        gamma: Option<f64>,
    },
    /// Touch or mouse contact.
    Pointer(PointerInput),
}

/// Linear axes as reported by a sensor; any axis may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAxes {
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub z: Option<f64>,
}

impl RawAxes {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
        }
    }
}

/// Rotation rate as reported by a gyroscope; any axis may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRotation {
    #[serde(default)]
    pub alpha: Option<f64>,
    #[serde(default)]
    pub beta: Option<f64>,
    #[serde(default)]
    pub gamma: Option<f64>,
}

impl RawRotation {
    pub fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self {
            alpha: Some(alpha),
            beta: Some(beta),
            gamma: Some(gamma),
        }
    }
}

/// Phase of a pointer contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerPhase {
    Start,
    Move,
    End,
}

/// Device that produced a pointer contact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerSource {
    #[default]
    Touch,
    Mouse,
}

/// Mouse button/motion actions, mapped onto the pointer phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseAction {
    Press,
    Move,
    Release,
}

impl From<MouseAction> for PointerPhase {
    fn from(action: MouseAction) -> Self {
        match action {
            MouseAction::Press => PointerPhase::Start,
            MouseAction::Move => PointerPhase::Move,
            MouseAction::Release => PointerPhase::End,
        }
    }
}

/// A touch or mouse contact sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerInput {
    pub phase: PointerPhase,
    #[serde(default)]
    pub source: PointerSource,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub pressure: Option<f64>,
    #[serde(default)]
    pub radius_x: Option<f64>,
    #[serde(default)]
    pub radius_y: Option<f64>,
    #[serde(default)]
    pub rotation_angle: Option<f64>,
    /// Stable per-contact identifier. Mouse input always uses 0.
    #[serde(default)]
    pub contact_id: Option<u32>,
}

impl PointerInput {
    /// A touch contact sample.
    pub fn touch(phase: PointerPhase, contact_id: u32, x: f64, y: f64) -> Self {
        Self {
            phase,
            source: PointerSource::Touch,
            x,
            y,
            pressure: None,
            radius_x: None,
            radius_y: None,
            rotation_angle: None,
            contact_id: Some(contact_id),
        }
    }

    /// A mouse sample normalized onto the pointer vocabulary.
    pub fn mouse(action: MouseAction, x: f64, y: f64) -> Self {
        Self {
            phase: action.into(),
            source: PointerSource::Mouse,
            x,
            y,
            pressure: None,
            radius_x: None,
            radius_y: None,
            rotation_angle: None,
            contact_id: Some(0),
        }
    }

    pub fn with_pressure(mut self, pressure: f64) -> Self {
        self.pressure = Some(pressure);
        self
    }
}
