//! FFI bindings for mobile platforms (iOS/Android).
//!
//! This module provides the UniFFI bindings that expose Rust functionality
//! to Kotlin and Swift. All FFI functions are prefixed with `ffi_` to avoid
//! naming conflicts with the internal API. Timestamps cross the boundary as
//! epoch milliseconds.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use once_cell::sync::Lazy;

use crate::codec::parse_run_str;
use crate::store::{CsvRunStore, RunListing, RunStore, SqliteRunStore};
use crate::{
    init_logging, EnrichedPoint, Motion, MotionEstimator, RawFix, RunId, RunRecorder, RunSummary,
    SpeedBand,
};

/// Database file used by the SQLite backend inside the storage directory.
pub const DB_FILE_NAME: &str = "foiltrack.db";

// ============================================================================
// Records
// ============================================================================

/// Storage backend for recorded runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiStorage {
    /// One `gps_data_<runId>.csv` file per run
    Csv,
    /// `foiltrack.db` in the storage directory
    Sqlite,
}

/// A raw location fix from the platform.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFix {
    pub timestamp_ms: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: Option<f64>,
    pub accuracy: Option<f32>,
}

/// An enriched point.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPoint {
    pub timestamp_ms: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: Option<f64>,
    pub accuracy: Option<f32>,
    pub velocity_ms: f64,
    pub velocity_mph: f64,
    pub acceleration: f64,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMotion {
    pub velocity_ms: f64,
    pub velocity_mph: f64,
    pub acceleration: f64,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiRunSummary {
    pub id: String,
    pub start_time_ms: i64,
    pub end_time_ms: Option<i64>,
    pub distance_miles: f64,
    pub avg_speed_mph: f64,
    pub max_speed_mph: f64,
    pub point_count: u32,
    pub points: Vec<FfiPoint>,
}

/// Listing entry; aggregates are only present for stores that cache them.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiRunListing {
    pub id: String,
    pub start_time_ms: Option<i64>,
    pub distance_miles: Option<f64>,
    pub avg_speed_mph: Option<f64>,
    pub max_speed_mph: Option<f64>,
    pub point_count: Option<u32>,
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_else(|| {
        warn!("[FoilTrack] Timestamp {} out of range, using epoch", ms);
        DateTime::<Utc>::default()
    })
}

impl From<FfiFix> for RawFix {
    fn from(fix: FfiFix) -> Self {
        RawFix {
            timestamp: from_millis(fix.timestamp_ms),
            latitude: fix.latitude,
            longitude: fix.longitude,
            speed: fix.speed,
            accuracy: fix.accuracy,
        }
    }
}

impl From<&EnrichedPoint> for FfiPoint {
    fn from(p: &EnrichedPoint) -> Self {
        FfiPoint {
            timestamp_ms: p.timestamp.timestamp_millis(),
            latitude: p.latitude,
            longitude: p.longitude,
            speed: p.speed,
            accuracy: p.accuracy,
            velocity_ms: p.velocity_ms,
            velocity_mph: p.velocity_mph,
            acceleration: p.acceleration,
        }
    }
}

impl From<FfiPoint> for EnrichedPoint {
    fn from(p: FfiPoint) -> Self {
        EnrichedPoint {
            timestamp: from_millis(p.timestamp_ms),
            latitude: p.latitude,
            longitude: p.longitude,
            speed: p.speed,
            accuracy: p.accuracy,
            velocity_ms: p.velocity_ms,
            velocity_mph: p.velocity_mph,
            acceleration: p.acceleration,
        }
    }
}

impl From<Motion> for FfiMotion {
    fn from(m: Motion) -> Self {
        FfiMotion {
            velocity_ms: m.velocity_ms,
            velocity_mph: m.velocity_mph,
            acceleration: m.acceleration,
        }
    }
}

impl From<&RunSummary> for FfiRunSummary {
    fn from(run: &RunSummary) -> Self {
        FfiRunSummary {
            id: run.id.to_string(),
            start_time_ms: run.start_time.timestamp_millis(),
            end_time_ms: run.end_time.map(|t| t.timestamp_millis()),
            distance_miles: run.distance_miles,
            avg_speed_mph: run.avg_speed_mph,
            max_speed_mph: run.max_speed_mph,
            point_count: run.point_count as u32,
            points: run.points.iter().map(FfiPoint::from).collect(),
        }
    }
}

impl From<RunListing> for FfiRunListing {
    fn from(listing: RunListing) -> Self {
        let totals = listing.totals;
        FfiRunListing {
            id: listing.id.to_string(),
            start_time_ms: listing.start_time.map(|t| t.timestamp_millis()),
            distance_miles: totals.as_ref().map(|t| t.distance_miles),
            avg_speed_mph: totals.as_ref().map(|t| t.avg_speed_mph),
            max_speed_mph: totals.as_ref().map(|t| t.max_speed_mph),
            point_count: totals.as_ref().map(|t| t.point_count as u32),
        }
    }
}

// ============================================================================
// Stateless Functions
// ============================================================================

/// Estimate motion for `current` given the previous accepted point.
#[uniffi::export]
pub fn ffi_estimate_motion(previous: Option<FfiPoint>, current: FfiFix, now_ms: i64) -> FfiMotion {
    init_logging();
    let previous = previous.map(EnrichedPoint::from);
    let current = RawFix::from(current);
    MotionEstimator::default()
        .estimate_at(previous.as_ref(), &current, from_millis(now_ms))
        .into()
}

/// Parse CSV run content; malformed rows are skipped.
#[uniffi::export]
pub fn ffi_parse_run_csv(content: String) -> Vec<FfiPoint> {
    init_logging();
    match parse_run_str(&content) {
        Ok(parsed) => {
            info!(
                "[FoilTrack] Parsed {} points ({} rows skipped)",
                parsed.points.len(),
                parsed.skipped.len()
            );
            parsed.points.iter().map(FfiPoint::from).collect()
        }
        Err(e) => {
            error!("[FoilTrack] Failed to parse run: {}", e);
            Vec::new()
        }
    }
}

/// Display colour (`0xRRGGBB`) for a speed with the default bands.
#[uniffi::export]
pub fn ffi_speed_color(speed_mph: f64) -> u32 {
    SpeedBand::from_mph(speed_mph).color()
}

// ============================================================================
// Global Recorder
// ============================================================================

type DynStore = Box<dyn RunStore + Send>;

/// Recording session shared across FFI calls.
pub static RECORDER: Lazy<Mutex<Option<RunRecorder<DynStore>>>> = Lazy::new(|| Mutex::new(None));

fn lock_recorder() -> MutexGuard<'static, Option<RunRecorder<DynStore>>> {
    RECORDER
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Get a lock on the global recorder slot.
pub fn with_recorder<F, R>(f: F) -> R
where
    F: FnOnce(&mut Option<RunRecorder<DynStore>>) -> R,
{
    let mut recorder = lock_recorder();
    f(&mut recorder)
}

fn open_store(dir: &str, storage: FfiStorage) -> crate::Result<DynStore> {
    let dir = PathBuf::from(dir);
    let store: DynStore = match storage {
        FfiStorage::Csv => Box::new(CsvRunStore::new(dir)?),
        FfiStorage::Sqlite => {
            std::fs::create_dir_all(&dir)?;
            let db_path = dir.join(DB_FILE_NAME);
            Box::new(SqliteRunStore::new(&db_path.to_string_lossy())?)
        }
    };
    Ok(store)
}

/// Start recording a run into `dir`. Returns the run id.
#[uniffi::export]
pub fn ffi_start_recording(dir: String, storage: FfiStorage, now_ms: i64) -> Option<String> {
    init_logging();
    with_recorder(|slot| {
        if slot.as_ref().is_some_and(|r| r.is_recording()) {
            warn!("[FoilTrack] start_recording called while a run is active");
            return None;
        }
        let store = match open_store(&dir, storage) {
            Ok(store) => store,
            Err(e) => {
                error!("[FoilTrack] Failed to open {:?} store at {}: {}", storage, dir, e);
                return None;
            }
        };
        let mut recorder = RunRecorder::new(store);
        match recorder.start(from_millis(now_ms)) {
            Ok(id) => {
                info!("[FoilTrack] Recording run {} ({:?})", id, storage);
                *slot = Some(recorder);
                Some(id.to_string())
            }
            Err(e) => {
                error!("[FoilTrack] Failed to start recording: {}", e);
                None
            }
        }
    })
}

/// Feed the next fix to the active run.
#[uniffi::export]
pub fn ffi_record_fix(fix: FfiFix, now_ms: i64) -> Option<FfiPoint> {
    with_recorder(|slot| {
        let recorder = slot.as_mut()?;
        match recorder.record_fix(fix.into(), from_millis(now_ms)) {
            Ok(point) => Some(FfiPoint::from(&point)),
            Err(e) => {
                error!("[FoilTrack] Failed to record fix: {}", e);
                None
            }
        }
    })
}

/// Live aggregates of the active run (without points).
#[uniffi::export]
pub fn ffi_current_run() -> Option<FfiRunSummary> {
    with_recorder(|slot| {
        let run = slot.as_ref()?.current()?;
        let mut summary = FfiRunSummary::from(run);
        summary.points.clear();
        Some(summary)
    })
}

/// Stop the active run and return it.
#[uniffi::export]
pub fn ffi_stop_recording() -> Option<FfiRunSummary> {
    init_logging();
    with_recorder(|slot| {
        let recorder = slot.as_mut()?;
        match recorder.stop() {
            Ok(run) => {
                info!(
                    "[FoilTrack] Stopped run {}: {} points, {:.2} mi",
                    run.id, run.point_count, run.distance_miles
                );
                *slot = None;
                Some(FfiRunSummary::from(&run))
            }
            Err(e) => {
                error!("[FoilTrack] Failed to stop recording: {}", e);
                None
            }
        }
    })
}

// ============================================================================
// Stored Runs
// ============================================================================

/// List stored runs, newest first.
#[uniffi::export]
pub fn ffi_list_runs(dir: String, storage: FfiStorage) -> Vec<FfiRunListing> {
    init_logging();
    let listings = open_store(&dir, storage).and_then(|store| store.list_runs());
    match listings {
        Ok(listings) => {
            info!("[FoilTrack] Listed {} runs in {}", listings.len(), dir);
            listings.into_iter().map(FfiRunListing::from).collect()
        }
        Err(e) => {
            error!("[FoilTrack] Failed to list runs in {}: {}", dir, e);
            Vec::new()
        }
    }
}

/// Load a stored run with its points and recomputed aggregates.
#[uniffi::export]
pub fn ffi_load_run(dir: String, storage: FfiStorage, run_id: String) -> Option<FfiRunSummary> {
    init_logging();
    let id = match RunId::parse(&run_id) {
        Ok(id) => id,
        Err(e) => {
            warn!("[FoilTrack] {}", e);
            return None;
        }
    };
    let store = match open_store(&dir, storage) {
        Ok(store) => store,
        Err(e) => {
            error!("[FoilTrack] Failed to open store at {}: {}", dir, e);
            return None;
        }
    };
    store.load_run(&id).map(|run| FfiRunSummary::from(&run))
}

/// Delete a stored run. Returns false if it did not exist or deletion failed.
#[uniffi::export]
pub fn ffi_delete_run(dir: String, storage: FfiStorage, run_id: String) -> bool {
    init_logging();
    let Ok(id) = RunId::parse(&run_id) else {
        warn!("[FoilTrack] Invalid run id for delete: {}", run_id);
        return false;
    };
    let result = open_store(&dir, storage).and_then(|mut store| store.delete_run(&id));
    match result {
        Ok(deleted) => deleted,
        Err(e) => {
            error!("[FoilTrack] Failed to delete run {}: {}", run_id, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const T0: i64 = 1_714_559_400_000; // 2024-05-01 10:30:00 UTC

    fn fix(i: i64) -> FfiFix {
        FfiFix {
            timestamp_ms: T0 + i * 1000,
            latitude: 36.0 + i as f64 * 0.0001,
            longitude: -5.6,
            speed: Some(4.0),
            accuracy: None,
        }
    }

    #[test]
    fn test_estimate_first_fix() {
        let motion = ffi_estimate_motion(None, fix(0), T0);
        assert_eq!(motion.velocity_ms, 4.0);
        assert_eq!(motion.acceleration, 0.0);
    }

    #[test]
    fn test_parse_csv_skips_bad_rows() {
        let csv = "Timestamp,Latitude,Longitude,Velocity(m/s),Velocity(mph),Acceleration(m/s²)\n\
                   2024-05-01T10:30:00.000Z,36.0,-5.6,2.0,4.47388,0.0\n\
                   garbage\n";
        let points = ffi_parse_run_csv(csv.to_string());
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].timestamp_ms, T0);
    }

    // Single test for the global recorder to avoid cross-test interference
    #[test]
    fn test_recording_lifecycle() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_string_lossy().to_string();

        assert!(ffi_record_fix(fix(0), T0).is_none());

        let id = ffi_start_recording(dir.clone(), FfiStorage::Sqlite, T0).unwrap();
        assert_eq!(id, "2405011030");
        assert!(ffi_start_recording(dir.clone(), FfiStorage::Sqlite, T0).is_none());

        for i in 0..5 {
            assert!(ffi_record_fix(fix(i), T0 + i * 1000).is_some());
        }
        assert_eq!(ffi_current_run().unwrap().point_count, 5);

        let run = ffi_stop_recording().unwrap();
        assert_eq!(run.point_count, 5);
        assert!(ffi_stop_recording().is_none());

        let listings = ffi_list_runs(dir.clone(), FfiStorage::Sqlite);
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].point_count, Some(5));

        let loaded = ffi_load_run(dir.clone(), FfiStorage::Sqlite, id.clone()).unwrap();
        assert_eq!(loaded.points.len(), 5);

        assert!(ffi_delete_run(dir.clone(), FfiStorage::Sqlite, id.clone()));
        assert!(!ffi_delete_run(dir, FfiStorage::Sqlite, id));
    }
}
