//! Behavioral Auth Agent - continuous authentication from interaction rhythm.
//!
//! This library captures keystroke timing, device motion and pointer
//! gestures, reduces each capture period to a fixed behavioral feature
//! vector and submits it to a remote verdict service. An impostor verdict
//! (or an explicit step-up request) moves the controller into a state that
//! waits for a one-time verification code.
//!
//! # Privacy Guarantees
//!
//! - **No key content leaves the device**: submissions carry aggregate timings only
//! - **No raw storage**: raw events live in memory until their period closes
//! - **Transparency**: all capture and submission activity is counted and auditable
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Behavioral Auth Agent                     │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │   Sources   │──▶│   Capture   │──▶│  Features   │         │
//! │  │ (ingest/CLI)│   │  (session)  │   │  (13 dims)  │         │
//! │  └─────────────┘   └─────────────┘   └─────────────┘         │
//! │         │                                    │                │
//! │         ▼                                    ▼                │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │Transparency │◀──│ Controller  │──▶│   Verdict   │         │
//! │  │    Log      │   │ (per cycle) │   │   Service   │         │
//! │  └─────────────┘   └─────────────┘   └─────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use behavioral_auth_agent::{collector, core, transparency, verdict};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let stats = transparency::create_shared_log();
//! let capture = collector::InputCapture::new(
//!     collector::CaptureConfig::default(),
//!     collector::MonotonicClock::shared(),
//!     stats.clone(),
//! );
//! let device = core::DeviceInfo::detect(&core::DeviceOverrides::default());
//! let controller = core::ContinuousAuthController::new(
//!     core::ControllerConfig::default(),
//!     capture,
//!     device,
//!     stats,
//! );
//! let sink = controller.input_sink();
//!
//! let service = verdict::HttpVerdictClient::new(verdict::VerdictConfig::default())?;
//! let (runner, handle, mut events) =
//!     core::AuthRunner::new(controller, Arc::new(service), std::time::Duration::from_millis(50));
//! tokio::spawn(runner.run());
//!
//! handle.start("alice").await?;
//! sink.send(collector::InputEvent::key_down(sink.now_ms(), "KeyA"))?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod transparency;
pub mod verdict;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use collector::{CaptureError, InputCapture, InputEvent, InputKind, InputSink};
pub use config::{CaptureSources, Config};
pub use core::{
    AuthEvent, AuthRunner, AuthState, ContinuousAuthController, ControllerHandle, FeatureVector,
};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};
pub use verdict::{
    AuthCycleResult, HttpVerdictClient, Verdict, VerdictConfig, VerdictError, VerdictService,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy declaration that can be displayed to users.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║          BEHAVIORAL AUTH AGENT - PRIVACY DECLARATION             ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent verifies that you are still the person who signed    ║
║  in, using how you type, hold and touch your device.             ║
║                                                                  ║
║  ✓ WHAT WE SEND TO THE VERDICT SERVICE:                          ║
║    • Aggregate key hold and gap timings                          ║
║    • Average typing speed and rhythm                             ║
║    • Average device rotation and swipe speed                     ║
║    • Basic device description (platform, timezone, language)     ║
║                                                                  ║
║  ✗ WHAT WE NEVER SEND:                                           ║
║    • Which keys you press or what you type                       ║
║    • Where on screen you touch or click                          ║
║    • Raw motion or pointer samples                               ║
║                                                                  ║
║  Raw events stay in memory only until their capture period       ║
║  ends and are then discarded.                                    ║
║                                                                  ║
║  Collection statistics are printed when the agent stops.         ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privacy_declaration_contents() {
        assert!(PRIVACY_DECLARATION.contains("PRIVACY"));
        assert!(PRIVACY_DECLARATION.contains("NEVER SEND"));
        assert!(PRIVACY_DECLARATION.contains("what you type"));
    }
}
