//! Velocity and acceleration derivation from raw GPS fixes.
//!
//! The estimator is a pure function of the previous accepted point and the
//! new fix. All state that a location service would otherwise keep in
//! fields ("last location", "last velocity", "last timestamp") is carried by
//! the previous [`EnrichedPoint`].
//!
//! ## Velocity policy
//! 1. A device-reported speed in `[0, max_plausible_speed_ms]` is used as is.
//! 2. A reported speed of exactly zero while the fix moved more than
//!    `dropout_distance_m` is a sensor dropout: fall back to the manual value.
//! 3. Manual value: great-circle distance / elapsed fix time, 0 if the
//!    elapsed time is not positive.
//! 4. The first fix of a run uses the device speed (or 0).
//!
//! ## Acceleration
//! `|v - v_prev| / elapsed`, where elapsed runs from the previous point's
//! timestamp to the current wall-clock instant by default
//! ([`AccelerationClock::WallClock`]).

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::geo_utils::haversine_distance;
use crate::{ms_to_mph, EnrichedPoint, RawFix};

/// Reference instant used for the acceleration time base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccelerationClock {
    /// Previous fix timestamp to the wall-clock instant the fix is processed.
    #[default]
    WallClock,
    /// Previous fix timestamp to the current fix timestamp.
    FixTime,
}

/// Configuration for motion estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Upper bound for a believable device speed in m/s.
    /// Default: 300.0 (~670 mph, a guard against GNSS glitches)
    pub max_plausible_speed_ms: f64,

    /// Displacement above which a reported zero speed is treated as a dropout.
    /// Default: 5.0 meters
    pub dropout_distance_m: f64,

    /// Time base for acceleration.
    /// Default: wall clock
    pub acceleration_clock: AccelerationClock,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            max_plausible_speed_ms: 300.0,
            dropout_distance_m: 5.0,
            acceleration_clock: AccelerationClock::WallClock,
        }
    }
}

/// Motion derived for a single fix.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Motion {
    /// Velocity in m/s
    pub velocity_ms: f64,
    /// Velocity in mph
    pub velocity_mph: f64,
    /// Absolute acceleration in m/s²
    pub acceleration: f64,
}

impl Motion {
    /// Build a motion value, deriving mph from m/s.
    pub fn new(velocity_ms: f64, acceleration: f64) -> Self {
        Self {
            velocity_ms,
            velocity_mph: ms_to_mph(velocity_ms),
            acceleration,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// Turns raw fixes into cleaned velocity and acceleration.
#[derive(Debug, Clone, Default)]
pub struct MotionEstimator {
    config: EstimatorConfig,
}

impl MotionEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Estimate motion for `current` using the system clock as "now".
    pub fn estimate(&self, previous: Option<&EnrichedPoint>, current: &RawFix) -> Motion {
        self.estimate_at(previous, current, Utc::now())
    }

    /// Estimate motion for `current` given the previous accepted point and
    /// the wall-clock instant at which the fix is processed.
    pub fn estimate_at(
        &self,
        previous: Option<&EnrichedPoint>,
        current: &RawFix,
        now: DateTime<Utc>,
    ) -> Motion {
        let Some(prev) = previous else {
            let velocity = current
                .speed
                .filter(|s| self.is_plausible(*s))
                .unwrap_or(0.0);
            return Motion::new(velocity, 0.0);
        };

        if current.timestamp == prev.timestamp {
            debug!(
                "Repeated fix at {}, reporting zero motion",
                current.timestamp
            );
            return Motion::zero();
        }

        let velocity = self.velocity(prev, current);
        let acceleration = self.acceleration(prev, current, velocity, now);
        Motion::new(velocity, acceleration)
    }

    /// Whether a device-reported speed can be trusted.
    pub fn is_plausible(&self, speed: f64) -> bool {
        speed.is_finite() && speed >= 0.0 && speed <= self.config.max_plausible_speed_ms
    }

    fn velocity(&self, prev: &EnrichedPoint, current: &RawFix) -> f64 {
        let distance = haversine_distance(&prev.position(), &current.position());
        let elapsed = seconds_between(prev.timestamp, current.timestamp);
        let manual = if elapsed > 0.0 { distance / elapsed } else { 0.0 };

        match current.speed {
            Some(speed) if self.is_plausible(speed) => {
                if speed == 0.0 && distance > self.config.dropout_distance_m {
                    debug!(
                        "Zero speed after {:.1}m displacement, using manual {:.2} m/s",
                        distance, manual
                    );
                    manual
                } else {
                    speed
                }
            }
            _ => manual,
        }
    }

    fn acceleration(
        &self,
        prev: &EnrichedPoint,
        current: &RawFix,
        velocity: f64,
        now: DateTime<Utc>,
    ) -> f64 {
        let reference = match self.config.acceleration_clock {
            AccelerationClock::WallClock => now,
            AccelerationClock::FixTime => current.timestamp,
        };
        let elapsed = seconds_between(prev.timestamp, reference);
        if elapsed <= 0.0 {
            return 0.0;
        }
        ((velocity - prev.velocity_ms) / elapsed).abs()
    }
}

/// Signed elapsed time in seconds, millisecond resolution.
fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}
