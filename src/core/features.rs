//! Feature extraction from sealed capture sessions.
//!
//! A session is reduced to a fixed 13-field [`FeatureVector`] using
//! outlier-filtered descriptive statistics. Every field is always present;
//! missing modalities produce zeros, never gaps.

use crate::collector::session::{PointerEvent, SealedSession};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

/// Field names in wire order.
pub const FEATURE_NAMES: [&str; 13] = [
    "dwell_mean",
    "dwell_std",
    "flight_mean",
    "flight_std",
    "key_count",
    "session_time",
    "pressure_mean",
    "typing_speed",
    "rhythm_consistency",
    "swipe_vel",
    "gyro_x",
    "gyro_y",
    "gyro_z",
];

/// Named feature values as submitted to the verdict service.
pub type FeatureMap = BTreeMap<String, f64>;

/// Open interval `(min, max)` of plausible timings in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingRange {
    pub min_ms: f64,
    pub max_ms: f64,
}

impl TimingRange {
    pub fn new(min_ms: f64, max_ms: f64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn contains(&self, value: f64) -> bool {
        value > self.min_ms && value < self.max_ms
    }
}

/// Outlier bounds applied to keystroke timings before aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierBounds {
    pub dwell: TimingRange,
    pub flight: TimingRange,
}

impl Default for OutlierBounds {
    fn default() -> Self {
        Self {
            dwell: TimingRange::new(0.0, 1000.0),
            flight: TimingRange::new(0.0, 2000.0),
        }
    }
}

/// The fixed feature schema for one capture session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub dwell_mean: f64,
    pub dwell_std: f64,
    pub flight_mean: f64,
    pub flight_std: f64,
    pub key_count: f64,
    /// Seconds between session start and extraction
    pub session_time: f64,
    pub pressure_mean: f64,
    /// Key releases per minute of session time
    pub typing_speed: f64,
    /// dwell_mean / dwell_std; unbounded
    pub rhythm_consistency: f64,
    /// Mean pointer speed in px/ms
    pub swipe_vel: f64,
    pub gyro_x: f64,
    pub gyro_y: f64,
    pub gyro_z: f64,
}

impl FeatureVector {
    /// Values in [`FEATURE_NAMES`] order.
    pub fn values(&self) -> [f64; 13] {
        [
            self.dwell_mean,
            self.dwell_std,
            self.flight_mean,
            self.flight_std,
            self.key_count,
            self.session_time,
            self.pressure_mean,
            self.typing_speed,
            self.rhythm_consistency,
            self.swipe_vel,
            self.gyro_x,
            self.gyro_y,
            self.gyro_z,
        ]
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values()[i])
    }

    pub fn to_map(&self) -> FeatureMap {
        FEATURE_NAMES
            .iter()
            .zip(self.values())
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    /// Replace any non-finite value with 0.
    fn sanitized(mut self) -> Self {
        for field in [
            &mut self.dwell_mean,
            &mut self.dwell_std,
            &mut self.flight_mean,
            &mut self.flight_std,
            &mut self.key_count,
            &mut self.session_time,
            &mut self.pressure_mean,
            &mut self.typing_speed,
            &mut self.rhythm_consistency,
            &mut self.swipe_vel,
            &mut self.gyro_x,
            &mut self.gyro_y,
            &mut self.gyro_z,
        ] {
            if !field.is_finite() {
                *field = 0.0;
            }
        }
        self
    }
}

/// Merge feature maps field by field; `overrides` wins on collisions.
pub fn merge_features(mut base: FeatureMap, overrides: FeatureMap) -> FeatureMap {
    base.extend(overrides);
    base
}

/// Reduce a sealed session to its feature vector.
///
/// Sessions without a single key release yield the all-zero vector.
pub fn extract_features(session: &SealedSession, bounds: &OutlierBounds) -> FeatureVector {
    let key_count = session.key_ups().count();
    if key_count == 0 {
        return FeatureVector::default();
    }

    let dwell_times: Vec<f64> = session
        .key_ups()
        .filter_map(|e| e.dwell_time)
        .filter(|&d| bounds.dwell.contains(d))
        .collect();
    let flight_times: Vec<f64> = session
        .key_ups()
        .filter_map(|e| e.flight_time)
        .filter(|&f| bounds.flight.contains(f))
        .collect();

    let (dwell_mean, dwell_std) = mean_and_std(&dwell_times);
    let (flight_mean, flight_std) = mean_and_std(&flight_times);

    let rhythm_consistency = if dwell_std > 0.0 {
        dwell_mean / dwell_std
    } else {
        0.0
    };

    let session_time = session.duration_secs();
    let typing_speed = if session_time > 0.0 {
        key_count as f64 / (session_time / 60.0)
    } else {
        0.0
    };

    // Zero pressure means the sensor is missing, not a real reading.
    let pressures: Vec<f64> = session
        .key_events()
        .iter()
        .map(|e| e.pressure)
        .chain(session.pointer_events().iter().map(|e| e.pressure))
        .filter(|&p| p > 0.0)
        .collect();
    let pressure_mean = mean_of(pressures.into_iter());

    let motion = session.motion_events();
    let gyro_x = mean_of(motion.iter().map(|m| m.rotation_rate.alpha));
    let gyro_y = mean_of(motion.iter().map(|m| m.rotation_rate.beta));
    let gyro_z = mean_of(motion.iter().map(|m| m.rotation_rate.gamma));

    let swipe_vel = mean_of(swipe_velocities(session.pointer_events()).into_iter());

    FeatureVector {
        dwell_mean,
        dwell_std,
        flight_mean,
        flight_std,
        key_count: key_count as f64,
        session_time,
        pressure_mean,
        typing_speed,
        rhythm_consistency,
        swipe_vel,
        gyro_x,
        gyro_y,
        gyro_z,
    }
    .sanitized()
}

/// Instantaneous speeds between consecutive samples of the same contact.
fn swipe_velocities(events: &[PointerEvent]) -> Vec<f64> {
    events
        .windows(2)
        .filter(|pair| pair[0].contact_id == pair[1].contact_id)
        .filter_map(|pair| {
            let elapsed = pair[1].timestamp - pair[0].timestamp;
            if elapsed <= 0.0 {
                return None;
            }
            let distance = (pair[1].x - pair[0].x).hypot(pair[1].y - pair[0].y);
            Some(distance / elapsed)
        })
        .collect()
}

fn mean_of(values: impl Iterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.collect();
    mean_and_std(&values).0
}

/// Population mean and standard deviation; both 0 for an empty set.
fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    (values.iter().mean(), values.iter().population_std_dev())
}
