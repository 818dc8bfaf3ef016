//! # FoilTrack
//!
//! Motion estimation, run statistics and run encoding for recording GPS
//! tracks during foiling and kitesurfing sessions.
//!
//! This library provides:
//! - Cleaned velocity and acceleration from a stream of noisy GPS fixes
//! - Run aggregates (distance, average/max speed), live or from storage
//! - The CSV run format plus flat-file and SQLite run stores
//! - Replay helpers (speed-coloured path, time-compressed playback)
//!
//! ## Features
//!
//! - **`parallel`** - Load many persisted runs in parallel with rayon
//! - **`persistence`** - SQLite run store
//! - **`ffi`** - FFI bindings for mobile platforms (iOS/Android)
//! - **`cli`** - `foiltrack-cli` debug tool
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use foiltrack::{RawFix, RunSummary, MotionEstimator, EnrichedPoint};
//!
//! let start = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap();
//! let estimator = MotionEstimator::default();
//! let mut run = RunSummary::start(start);
//!
//! for i in 0..3 {
//!     let fix = RawFix::new(start + Duration::seconds(i), 36.01 + i as f64 * 0.0001, -5.60)
//!         .with_speed(4.0 + i as f64);
//!     let motion = estimator.estimate_at(run.points.last(), &fix, fix.timestamp);
//!     run.push(EnrichedPoint::from_fix(&fix, motion));
//! }
//!
//! assert_eq!(run.point_count, 3);
//! assert!(run.max_speed_mph > run.avg_speed_mph);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{FoilTrackError, Result};

// Geographic utilities (distance, bounds)
pub mod geo_utils;

// Velocity/acceleration derivation from raw fixes
pub mod motion;
pub use motion::{AccelerationClock, EstimatorConfig, Motion, MotionEstimator};

// Run-level statistics
pub mod aggregate;
pub use aggregate::{aggregate, RunAccumulator, RunTotals};

// Run identity and lifecycle
pub mod run;
pub use run::{RunId, RunSummary};

// Tabular run encoding
pub mod codec;
pub use codec::{parse_run, write_points, ParsedRun, SkippedRow, CSV_HEADER};

// Run storage backends
pub mod store;
pub use store::{migrate_runs, CsvRunStore, MigrationReport, RunListing, RunStore};
#[cfg(feature = "persistence")]
pub use store::SqliteRunStore;

// Live recording session
pub mod recorder;
pub use recorder::{RecorderConfig, RunRecorder};

// Replay helpers
pub mod replay;
pub use replay::{
    colored_path, route_bounds, PathSegment, Replay, ReplayConfig, ReplayTick, SpeedBand,
    SpeedBandThresholds,
};

// FFI bindings for mobile platforms (iOS/Android)
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("FoilTrackRust"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
pub(crate) fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Unit Conversion
// ============================================================================

/// Meters per second to miles per hour.
pub const MS_TO_MPH: f64 = 2.23694;

/// Meters to miles.
pub const METERS_TO_MILES: f64 = 0.000621371;

/// Convert a velocity in m/s to mph.
#[inline]
pub fn ms_to_mph(velocity_ms: f64) -> f64 {
    velocity_ms * MS_TO_MPH
}

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box for a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// One positional reading as delivered by the platform location stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawFix {
    /// Fix time (monotonic within a run)
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    /// Device-reported speed in m/s; may be missing or unreliable
    pub speed: Option<f64>,
    /// Device-reported horizontal accuracy in meters
    pub accuracy: Option<f32>,
}

impl RawFix {
    /// Create a fix without speed or accuracy.
    pub fn new(timestamp: DateTime<Utc>, latitude: f64, longitude: f64) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            speed: None,
            accuracy: None,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_accuracy(mut self, accuracy: f32) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn position(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// A fix plus the motion derived from it and its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnrichedPoint {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    /// Device-reported speed (not persisted in the CSV format)
    pub speed: Option<f64>,
    /// Device-reported accuracy (not persisted in the CSV format)
    pub accuracy: Option<f32>,
    /// Cleaned velocity in m/s
    pub velocity_ms: f64,
    /// `velocity_ms * MS_TO_MPH`
    pub velocity_mph: f64,
    /// Absolute acceleration in m/s², never negative
    pub acceleration: f64,
}

impl EnrichedPoint {
    /// Combine a raw fix with the motion estimated for it.
    pub fn from_fix(fix: &RawFix, motion: Motion) -> Self {
        Self {
            timestamp: fix.timestamp,
            latitude: fix.latitude,
            longitude: fix.longitude,
            speed: fix.speed,
            accuracy: fix.accuracy,
            velocity_ms: motion.velocity_ms,
            velocity_mph: motion.velocity_mph,
            acceleration: motion.acceleration,
        }
    }

    pub fn position(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_gps_point_validation() {
        assert!(GpsPoint::new(36.0139, -5.6026).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_mph_conversion() {
        assert_eq!(ms_to_mph(10.0), 10.0 * 2.23694);
        assert_eq!(ms_to_mph(0.0), 0.0);
    }

    #[test]
    fn test_bounds_center() {
        let bounds = Bounds::from_points(&[GpsPoint::new(36.00, -5.62), GpsPoint::new(36.02, -5.60)])
            .unwrap();
        let center = bounds.center();
        assert!((center.latitude - 36.01).abs() < 1e-9);
        assert!((center.longitude + 5.61).abs() < 1e-9);
        assert!(Bounds::from_points(&[]).is_none());
    }

    #[test]
    fn test_enriched_point_keeps_fix_fields() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let fix = RawFix::new(ts, 36.0, -5.6).with_speed(3.0).with_accuracy(4.5);
        let point = EnrichedPoint::from_fix(
            &fix,
            Motion {
                velocity_ms: 3.0,
                velocity_mph: ms_to_mph(3.0),
                acceleration: 0.5,
            },
        );
        assert_eq!(point.timestamp, ts);
        assert_eq!(point.speed, Some(3.0));
        assert_eq!(point.accuracy, Some(4.5));
        assert_eq!(point.position(), fix.position());
    }
}
