//! Input capture for the behavioral authentication agent.
//!
//! Sources push raw keystroke, motion and pointer events into a queue; the
//! capture buffers them into a session while one is open.

pub mod capture;
pub mod clock;
pub mod replay;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use capture::{
    CaptureConfig, CaptureError, CaptureTarget, InputCapture, InputSink, DEFAULT_QUEUE_CAPACITY,
};
pub use clock::{Clock, ManualClock, MonotonicClock, SharedClock};
pub use replay::{read_recording, replay_events, Recording, Replay, ReplayError};
pub use session::{
    CaptureSession, KeyEvent, KeyPhase, MotionEvent, OrientationEvent, PointerEvent, Rotation,
    SealedSession, Vector3,
};
pub use types::{
    InputEvent, InputKind, Modality, MouseAction, PointerInput, PointerPhase, PointerSource,
    RawAxes, RawRotation,
};
