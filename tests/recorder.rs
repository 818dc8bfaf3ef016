//! End-to-end recording: fixes in, persisted run out.

use chrono::{DateTime, Duration, TimeZone, Utc};
use foiltrack::{
    aggregate, CsvRunStore, FoilTrackError, RawFix, RecorderConfig, RunRecorder, RunStore,
};
use tempfile::TempDir;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap()
}

fn fixes(n: i64) -> Vec<RawFix> {
    (0..n)
        .map(|i| {
            let fix = RawFix::new(t0() + Duration::seconds(i), 36.0 + i as f64 * 0.00006, -5.6)
                .with_accuracy(3.0);
            // Every fifth reading drops out
            if i % 5 == 4 {
                fix.with_speed(0.0)
            } else {
                fix.with_speed(3.0 + (i % 3) as f64)
            }
        })
        .collect()
}

#[test]
fn live_summary_matches_batch_aggregation() {
    init();
    let tmp = TempDir::new().unwrap();
    let mut recorder = RunRecorder::new(CsvRunStore::new(tmp.path()).unwrap());
    recorder.start(t0()).unwrap();

    for fix in fixes(47) {
        let now = fix.timestamp + Duration::milliseconds(150);
        recorder.record_fix(fix, now).unwrap();
    }

    let run = recorder.stop().unwrap();
    assert_eq!(run.point_count, 47);
    assert_eq!(run.totals().distance_miles, aggregate(&run.points).distance_miles);
    assert_eq!(run.totals().avg_speed_mph, aggregate(&run.points).avg_speed_mph);
    assert_eq!(run.totals().max_speed_mph, aggregate(&run.points).max_speed_mph);

    // Dropouts after the first point were replaced by the manual value
    assert!(run.points.iter().skip(1).all(|p| p.velocity_ms > 0.0));
}

#[test]
fn stopped_run_reloads_identically() {
    init();
    let tmp = TempDir::new().unwrap();
    let mut recorder = RunRecorder::new(CsvRunStore::new(tmp.path()).unwrap());
    let id = recorder.start(t0()).unwrap();
    for fix in fixes(33) {
        recorder.record_fix(fix, fix.timestamp).unwrap();
    }
    let run = recorder.stop().unwrap();

    let loaded = recorder.store().load_run(&id).unwrap();
    assert_eq!(loaded.totals(), run.totals());
    assert_eq!(loaded.points.len(), run.points.len());
    assert_eq!(recorder.store().list_runs().unwrap().len(), 1);
}

#[test]
fn recorder_can_run_again_after_stop() {
    init();
    let tmp = TempDir::new().unwrap();
    let config = RecorderConfig {
        buffer_size: 4,
        ..RecorderConfig::default()
    };
    let mut recorder = RunRecorder::with_config(CsvRunStore::new(tmp.path()).unwrap(), config).unwrap();

    recorder.start(t0()).unwrap();
    recorder.record_fix(fixes(1)[0], t0()).unwrap();
    recorder.stop().unwrap();
    assert!(matches!(recorder.stop(), Err(FoilTrackError::NotRecording)));

    let later = t0() + Duration::minutes(90);
    let id = recorder.start(later).unwrap();
    assert_eq!(id.as_str(), "2405011200");
    let run = recorder.stop().unwrap();
    assert!(run.is_empty());
    assert!(run.end_time.is_none());

    assert_eq!(recorder.into_store().list_runs().unwrap().len(), 2);
}

#[test]
fn missing_run_file_does_not_reject_fixes() {
    init();
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("runs");
    let config = RecorderConfig {
        buffer_size: 2,
        ..RecorderConfig::default()
    };
    let mut recorder = RunRecorder::with_config(CsvRunStore::new(&dir).unwrap(), config).unwrap();
    recorder.start(t0()).unwrap();
    std::fs::remove_dir_all(&dir).unwrap();

    for fix in fixes(5) {
        let point = recorder.record_fix(fix, fix.timestamp).unwrap();
        assert_eq!(point.timestamp, fix.timestamp);
    }
    assert_eq!(recorder.current().unwrap().point_count, 5);

    // The write failure surfaces on stop, with the session kept for a retry
    assert!(recorder.stop().is_err());
    assert!(recorder.is_recording());
}
