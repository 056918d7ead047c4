//! Core functionality for the behavioral authentication agent.
//!
//! This module contains:
//! - Feature extraction from closed capture sessions
//! - Device description attached to submissions
//! - The continuous authentication controller and its async runner

pub mod controller;
pub mod device;
pub mod features;
pub mod runner;

// Re-export commonly used types
pub use controller::{
    AuthEvent, AuthState, ContinuousAuthController, ControllerConfig, ControllerStatus,
    PendingSubmission, SecondaryCapture, SecondarySource, StepUpError,
};
pub use device::{DeviceInfo, DeviceOverrides};
pub use features::{
    extract_features, merge_features, FeatureMap, FeatureVector, OutlierBounds, TimingRange,
    FEATURE_NAMES,
};
pub use runner::{AuthRunner, ControllerError, ControllerHandle};
