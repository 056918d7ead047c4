//! Transparency module for the behavioral authentication agent.
//!
//! Tracks how much input the agent captured and what it did with it, so the
//! user can see the collection footprint of a run.

pub mod log;

// Re-export commonly used types
pub use log::{create_shared_log, SharedTransparencyLog, TransparencyLog, TransparencyStats};
