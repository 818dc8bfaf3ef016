//! Run identity and the run summary lifecycle.
//!
//! A [`RunSummary`] is created when recording starts, grows as enriched
//! points are appended, and is finalized when recording stops or when a
//! persisted run is parsed. Its aggregates are always derived from the
//! point sequence.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{aggregate, RunAccumulator, RunTotals};
use crate::error::{FoilTrackError, Result};
use crate::EnrichedPoint;

/// `chrono` pattern for run ids (minute resolution).
pub const RUN_ID_FORMAT: &str = "%y%m%d%H%M";

/// Prefix shared by storage keys and file names.
pub const RUN_KEY_PREFIX: &str = "gps_data_";

/// Extension of flat-file runs.
pub const RUN_FILE_EXTENSION: &str = ".csv";

// ============================================================================
// Run Id
// ============================================================================

/// Identifier of a run: its start time formatted as `yyMMddHHmm` (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Derive the id from a recording start time.
    pub fn from_start_time(start_time: DateTime<Utc>) -> Self {
        Self(start_time.format(RUN_ID_FORMAT).to_string())
    }

    /// Validate and wrap an id string.
    pub fn parse(id: &str) -> Result<Self> {
        if id.len() != 10 || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FoilTrackError::InvalidRunId {
                id: id.to_string(),
                message: "expected 10 digits (yyMMddHHmm)".to_string(),
            });
        }
        NaiveDateTime::parse_from_str(id, RUN_ID_FORMAT).map_err(|e| {
            FoilTrackError::InvalidRunId {
                id: id.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(Self(id.to_string()))
    }

    /// Extract the id from a `gps_data_<id>.csv` file name.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let id = file_name
            .strip_prefix(RUN_KEY_PREFIX)?
            .strip_suffix(RUN_FILE_EXTENSION)?;
        Self::parse(id).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Start time encoded in the id, truncated to the minute.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.0, RUN_ID_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Storage key, `gps_data_<id>`.
    pub fn key(&self) -> String {
        format!("{}{}", RUN_KEY_PREFIX, self.0)
    }

    /// Flat-file name, `gps_data_<id>.csv`.
    pub fn file_name(&self) -> String {
        format!("{}{}", self.key(), RUN_FILE_EXTENSION)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RunId {
    type Err = FoilTrackError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// ============================================================================
// Run Summary
// ============================================================================

/// A recorded run with its points and derived aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: RunId,
    pub start_time: DateTime<Utc>,
    /// Timestamp of the last point, `None` while the run has no points
    pub end_time: Option<DateTime<Utc>>,
    pub points: Vec<EnrichedPoint>,
    /// Total distance in miles
    pub distance_miles: f64,
    /// Average speed in mph
    pub avg_speed_mph: f64,
    /// Max speed in mph
    pub max_speed_mph: f64,
    pub point_count: usize,
    #[serde(skip)]
    accumulator: RunAccumulator,
}

impl RunSummary {
    /// Start an empty run; the id is derived from `start_time`.
    pub fn start(start_time: DateTime<Utc>) -> Self {
        Self::with_id(RunId::from_start_time(start_time), start_time)
    }

    /// Empty run with an explicit id.
    pub fn with_id(id: RunId, start_time: DateTime<Utc>) -> Self {
        Self {
            id,
            start_time,
            end_time: None,
            points: Vec::new(),
            distance_miles: 0.0,
            avg_speed_mph: 0.0,
            max_speed_mph: 0.0,
            point_count: 0,
            accumulator: RunAccumulator::new(),
        }
    }

    /// Build a finalized run from a complete point sequence.
    pub fn from_points(id: RunId, start_time: DateTime<Utc>, points: Vec<EnrichedPoint>) -> Self {
        let mut run = Self::with_id(id, start_time);
        run.points = points;
        run.finalize();
        run
    }

    /// Append the next point and update the aggregates incrementally.
    pub fn push(&mut self, point: EnrichedPoint) {
        if self.accumulator.len() != self.points.len() {
            self.rebuild_accumulator();
        }
        self.accumulator.push(&point);
        self.points.push(point);
        self.apply(self.accumulator.totals());
    }

    /// Recompute the aggregates from the point sequence in one pass.
    pub fn finalize(&mut self) {
        self.rebuild_accumulator();
        self.apply(aggregate(&self.points));
    }

    /// Current aggregates.
    pub fn totals(&self) -> RunTotals {
        RunTotals {
            distance_miles: self.distance_miles,
            avg_speed_mph: self.avg_speed_mph,
            max_speed_mph: self.max_speed_mph,
            point_count: self.point_count,
            first_timestamp: self.points.first().map(|p| p.timestamp),
            last_timestamp: self.end_time,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Elapsed time from start to the last point.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }

    /// Serialize to JSON for the app shell.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    fn rebuild_accumulator(&mut self) {
        let mut acc = RunAccumulator::new();
        for point in &self.points {
            acc.push(point);
        }
        self.accumulator = acc;
    }

    fn apply(&mut self, totals: RunTotals) {
        self.end_time = totals.last_timestamp;
        self.distance_miles = totals.distance_miles;
        self.avg_speed_mph = totals.avg_speed_mph;
        self.max_speed_mph = totals.max_speed_mph;
        self.point_count = totals.point_count;
    }
}

impl PartialEq for RunSummary {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.start_time == other.start_time
            && self.end_time == other.end_time
            && self.points == other.points
            && self.distance_miles == other.distance_miles
            && self.avg_speed_mph == other.avg_speed_mph
            && self.max_speed_mph == other.max_speed_mph
            && self.point_count == other.point_count
    }
}
