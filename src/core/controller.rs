//! Continuous authentication state machine.
//!
//! The controller owns the input capture and decides what happens on each
//! cycle: close the session, reduce it to features, build a submission and
//! reopen capture straight away. It performs no I/O and keeps no timers;
//! [`crate::core::runner`] drives it on a schedule and delivers responses.
//!
//! ```text
//!   Idle ──start──▶ Active ──impostor / step-up──▶ AwaitingStepUp
//!    ▲                │  ▲                              │
//!    │                │  └────────valid code────────────┘
//!    └──stop/logout───┴─────────────stop/logout─────────┘
//! ```

use crate::collector::capture::{CaptureTarget, InputCapture, InputSink};
use crate::core::device::DeviceInfo;
use crate::core::features::{extract_features, merge_features, FeatureMap, OutlierBounds};
use crate::transparency::SharedTransparencyLog;
use crate::verdict::{AuthCycleResult, VerdictError, VerdictRequest};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// No user bound, nothing scheduled
    Idle,
    /// Capturing and submitting on schedule
    Active,
    /// A verdict demanded extra verification; capture continues
    AwaitingStepUp,
}

/// Controller settings.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub interval: Duration,
    pub outlier_bounds: OutlierBounds,
    pub step_up_code_length: usize,
    pub target: CaptureTarget,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            outlier_bounds: OutlierBounds::default(),
            step_up_code_length: 6,
            target: CaptureTarget::Global,
        }
    }
}

impl From<&crate::config::Config> for ControllerConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            interval: config.interval,
            outlier_bounds: config.outlier_bounds,
            step_up_code_length: config.step_up_code_length,
            target: CaptureTarget::Global,
        }
    }
}

/// Output of a secondary capture source for one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecondaryCapture {
    /// Extra or overriding features
    pub features: FeatureMap,
    /// Opaque typing pattern forwarded to the verdict service
    pub typing_pattern: Option<String>,
}

/// A second capture pipeline whose results are merged into each submission.
pub trait SecondarySource: Send {
    /// Called whenever the primary session closes.
    fn end_session(&mut self) -> Option<SecondaryCapture>;
}

/// A submission ready to be dispatched.
#[derive(Debug, Clone)]
pub struct PendingSubmission {
    /// Controller generation the submission belongs to
    pub generation: u64,
    /// Cycle number within the generation, starting at 1
    pub cycle: u64,
    pub request: VerdictRequest,
}

/// Notifications for whoever embeds the controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuthEvent {
    /// A normal verdict arrived
    Verdict { cycle: u64, result: AuthCycleResult },
    /// A verdict demanded step-up verification
    StepUpRequired { cycle: u64, result: AuthCycleResult },
    /// A valid step-up code was supplied
    StepUpResolved,
    /// A submission failed; the next cycle is the retry
    SubmissionFailed { cycle: u64, error: String },
    /// The user logged out and the controller stopped
    SessionTerminated { user_id: String },
}

/// Step-up resolution errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepUpError {
    /// Wrong length or non-digit characters
    InvalidCode { expected_length: usize },
    /// No step-up is pending
    NotAwaiting,
}

impl std::fmt::Display for StepUpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepUpError::InvalidCode { expected_length } => {
                write!(f, "Verification code must be {expected_length} digits")
            }
            StepUpError::NotAwaiting => write!(f, "No step-up verification is pending"),
        }
    }
}

impl std::error::Error for StepUpError {}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerStatus {
    pub state: AuthState,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub cycles: u64,
    pub interval_ms: u64,
    pub capturing: bool,
    /// Events buffered in the open capture session
    pub buffered_events: usize,
}

/// The continuous authentication state machine.
pub struct ContinuousAuthController {
    config: ControllerConfig,
    capture: InputCapture,
    device_info: DeviceInfo,
    secondary: Option<Box<dyn SecondarySource>>,
    stats: SharedTransparencyLog,
    state: AuthState,
    user_id: Option<String>,
    session_id: Option<String>,
    generation: u64,
    cycles: u64,
    /// Last cycle sealed before the most recent accepted step-up
    resolved_through_cycle: u64,
}

impl ContinuousAuthController {
    pub fn new(
        config: ControllerConfig,
        capture: InputCapture,
        device_info: DeviceInfo,
        stats: SharedTransparencyLog,
    ) -> Self {
        Self {
            config,
            capture,
            device_info,
            secondary: None,
            stats,
            state: AuthState::Idle,
            user_id: None,
            session_id: None,
            generation: 0,
            cycles: 0,
            resolved_through_cycle: 0,
        }
    }

    /// Merge features from a second capture pipeline into each submission.
    pub fn with_secondary_source(mut self, source: Box<dyn SecondarySource>) -> Self {
        self.secondary = Some(source);
        self
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state != AuthState::Idle
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A producer handle for input sources.
    pub fn input_sink(&self) -> InputSink {
        self.capture.sink()
    }

    pub fn capture(&self) -> &InputCapture {
        &self.capture
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            state: self.state,
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            cycles: self.cycles,
            interval_ms: self.config.interval.as_millis() as u64,
            capturing: self.capture.is_active(),
            buffered_events: self.capture.session().map_or(0, |s| s.event_count()),
        }
    }

    /// Bind a user and start capturing. Returns `false` (and changes
    /// nothing) if the controller is already running for any user.
    pub fn start(&mut self, user_id: impl Into<String>) -> bool {
        if self.is_running() {
            debug!("start ignored: controller already running");
            return false;
        }

        let user_id = user_id.into();
        let session_id = uuid::Uuid::new_v4().to_string();
        info!(user_id = %user_id, session_id = %session_id, "continuous authentication started");

        self.generation += 1;
        self.cycles = 0;
        self.resolved_through_cycle = 0;
        self.user_id = Some(user_id);
        self.session_id = Some(session_id);
        self.state = AuthState::Active;
        self.capture.start(self.config.target.clone());
        true
    }

    /// Drain queued input into the open session.
    pub fn pump_input(&mut self) -> usize {
        self.capture.pump()
    }

    /// Close the current capture session, reduce it and reopen capture.
    ///
    /// Returns `None` when the controller is idle.
    pub fn tick(&mut self) -> Option<PendingSubmission> {
        if !self.is_running() {
            return None;
        }
        let user_id = self.user_id.clone()?;
        let session_id = self.session_id.clone()?;

        // Back-to-back sessions: capture resumes before anything is sent.
        let sealed = self.capture.rotate()?;

        let features = extract_features(&sealed, &self.config.outlier_bounds);
        self.stats.record_session_completed();

        let mut merged = features.to_map();
        let mut typing_pattern = None;
        if let Some(secondary) = self.secondary.as_mut() {
            if let Some(capture) = secondary.end_session() {
                merged = merge_features(merged, finite_only(capture.features));
                typing_pattern = capture.typing_pattern;
            }
        }

        self.cycles += 1;
        self.stats.record_submission();
        debug!(cycle = self.cycles, key_count = features.key_count, "cycle submission built");

        Some(PendingSubmission {
            generation: self.generation,
            cycle: self.cycles,
            request: VerdictRequest {
                user_id,
                features: merged,
                session_id,
                device_info: self.device_info.clone(),
                typing_pattern,
            },
        })
    }

    /// Apply a verdict for a submission of the given generation.
    ///
    /// Responses belonging to an earlier generation, or arriving while idle,
    /// are ignored and return `None`.
    pub fn apply_verdict(&mut self, generation: u64, cycle: u64, result: AuthCycleResult) -> Option<AuthEvent> {
        if self.is_stale(generation) {
            debug!(generation, cycle, "ignoring verdict for a finished run");
            return None;
        }

        if result.demands_step_up() && cycle <= self.resolved_through_cycle {
            // Sampled before the user passed step-up.
            debug!(cycle, verdict = ?result.verdict, "step-up already resolved for this cycle");
            return Some(AuthEvent::Verdict { cycle, result });
        }

        if result.demands_step_up() {
            info!(
                cycle,
                verdict = ?result.verdict,
                risk_level = %result.risk_level,
                "step-up verification required"
            );
            self.state = AuthState::AwaitingStepUp;
            self.stats.record_step_up();
            Some(AuthEvent::StepUpRequired { cycle, result })
        } else {
            debug!(cycle, verdict = ?result.verdict, confidence = result.confidence, "verdict received");
            Some(AuthEvent::Verdict { cycle, result })
        }
    }

    /// Record a failed submission. State is left untouched; the next
    /// scheduled cycle is the retry.
    pub fn submission_failed(&mut self, generation: u64, cycle: u64, error: &VerdictError) -> Option<AuthEvent> {
        if self.is_stale(generation) {
            return None;
        }

        warn!(cycle, error = %error, "verdict submission failed");
        self.stats.record_submission_failure();
        Some(AuthEvent::SubmissionFailed {
            cycle,
            error: error.to_string(),
        })
    }

    /// Check a step-up verification code and return to Active if it is well
    /// formed. The code itself is verified out of band.
    pub fn verify_step_up(&mut self, code: &str) -> Result<(), StepUpError> {
        if self.state != AuthState::AwaitingStepUp {
            return Err(StepUpError::NotAwaiting);
        }

        let code = code.trim();
        let expected_length = self.config.step_up_code_length;
        if code.chars().count() != expected_length || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(StepUpError::InvalidCode { expected_length });
        }

        info!("step-up verification accepted");
        self.state = AuthState::Active;
        self.resolved_through_cycle = self.cycles;
        Ok(())
    }

    /// Stop scheduling, discard the open session and return to Idle.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }

        info!(cycles = self.cycles, "continuous authentication stopped");
        self.capture.discard();
        // Anything still in flight now belongs to an old generation.
        self.generation += 1;
        self.state = AuthState::Idle;
        self.user_id = None;
        self.session_id = None;
    }

    /// Explicit user logout: stop and report termination.
    pub fn logout(&mut self) -> Option<AuthEvent> {
        let user_id = self.user_id.clone()?;
        self.stop();
        Some(AuthEvent::SessionTerminated { user_id })
    }

    fn is_stale(&self, generation: u64) -> bool {
        !self.is_running() || generation != self.generation
    }
}

/// Drop non-finite values so the submitted record stays numeric.
fn finite_only(features: FeatureMap) -> FeatureMap {
    features
        .into_iter()
        .filter(|(name, value)| {
            let keep = value.is_finite();
            if !keep {
                warn!(feature = %name, "dropping non-finite secondary feature");
            }
            keep
        })
        .collect()
}
