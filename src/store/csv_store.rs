//! Flat-file run store: one CSV file per run in a directory.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::{RunListing, RunStore};
use crate::codec::{parse_run, write_points, ParsedRun};
use crate::error::Result;
use crate::{EnrichedPoint, RunId, RunSummary};

/// Directory of `gps_data_<runId>.csv` files.
#[derive(Debug, Clone)]
pub struct CsvRunStore {
    dir: PathBuf,
}

impl CsvRunStore {
    /// Open (and create if needed) a run directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing a run.
    pub fn path_for(&self, id: &RunId) -> PathBuf {
        self.dir.join(id.file_name())
    }

    /// Parse a run file without building a summary.
    pub fn read_points(path: &Path) -> Result<ParsedRun> {
        let file = File::open(path)?;
        parse_run(BufReader::new(file))
    }

    /// Load a run from any CSV file.
    ///
    /// The id comes from a `gps_data_<runId>.csv` file name, or else from the
    /// first point's timestamp. Returns `None` if the file cannot be read or
    /// neither source yields an id.
    pub fn load_path(path: &Path) -> Option<RunSummary> {
        let parsed = match Self::read_points(path) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("Failed to read run file {}: {}", path.display(), e);
                return None;
            }
        };

        let file_id = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(RunId::from_file_name);
        let first_timestamp = parsed.points.first().map(|p| p.timestamp);

        let id = match (file_id, first_timestamp) {
            (Some(id), _) => id,
            (None, Some(ts)) => RunId::from_start_time(ts),
            (None, None) => {
                warn!("Run file {} has no id and no points", path.display());
                return None;
            }
        };

        let start_time = first_timestamp
            .or_else(|| id.start_time())
            .unwrap_or_else(Utc::now);

        if !parsed.skipped.is_empty() {
            info!(
                "Loaded run {} with {} skipped rows",
                id,
                parsed.skipped.len()
            );
        }
        Some(RunSummary::from_points(id, start_time, parsed.points))
    }

    /// Load every stored run.
    #[cfg(feature = "parallel")]
    pub fn load_all(&self) -> Result<Vec<RunSummary>> {
        let listings = self.list_runs()?;
        Ok(listings
            .par_iter()
            .filter_map(|listing| self.load_run(&listing.id))
            .collect())
    }

    /// Load every stored run.
    #[cfg(not(feature = "parallel"))]
    pub fn load_all(&self) -> Result<Vec<RunSummary>> {
        let listings = self.list_runs()?;
        Ok(listings
            .iter()
            .filter_map(|listing| self.load_run(&listing.id))
            .collect())
    }
}

impl RunStore for CsvRunStore {
    fn begin_run(&mut self, id: &RunId, start_time: DateTime<Utc>) -> Result<()> {
        let path = self.path_for(id);
        if path.exists() {
            warn!("Run file {} already exists, overwriting", path.display());
        }
        let file = File::create(&path)?;
        write_points(BufWriter::new(file), &[], true)?;
        info!("Started run {} at {} ({})", id, start_time, path.display());
        Ok(())
    }

    fn append_points(&mut self, id: &RunId, points: &[EnrichedPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let file = OpenOptions::new().append(true).open(self.path_for(id))?;
        write_points(BufWriter::new(file), points, false)?;
        debug!("Appended {} points to run {}", points.len(), id);
        Ok(())
    }

    fn finish_run(&mut self, summary: &RunSummary) -> Result<()> {
        // Aggregates are recomputed on load; the file already holds every point
        info!(
            "Finished run {}: {} points, {:.2} mi",
            summary.id, summary.point_count, summary.distance_miles
        );
        Ok(())
    }

    fn load_run(&self, id: &RunId) -> Option<RunSummary> {
        let path = self.path_for(id);
        if !path.exists() {
            debug!("No file for run {}", id);
            return None;
        }
        Self::load_path(&path)
    }

    fn list_runs(&self) -> Result<Vec<RunListing>> {
        let mut listings: Vec<RunListing> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str().and_then(RunId::from_file_name))
            .map(|id| RunListing {
                start_time: id.start_time(),
                id,
                totals: None,
            })
            .collect();

        listings.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(listings)
    }

    fn delete_run(&mut self, id: &RunId) -> Result<bool> {
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => {
                info!("Deleted run {}", id);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, id: &RunId) -> bool {
        self.path_for(id).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Motion, RawFix};
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap()
    }

    fn points(n: i64) -> Vec<EnrichedPoint> {
        (0..n)
            .map(|i| {
                let fix = RawFix::new(start() + Duration::seconds(i), 36.0 + i as f64 * 0.0001, -5.6);
                EnrichedPoint::from_fix(&fix, Motion::new(i as f64 * 0.7, 0.2))
            })
            .collect()
    }

    #[test]
    fn test_begin_writes_header() {
        let tmp = TempDir::new().unwrap();
        let mut store = CsvRunStore::new(tmp.path()).unwrap();
        let id = RunId::from_start_time(start());
        store.begin_run(&id, start()).unwrap();

        let content = fs::read_to_string(store.path_for(&id)).unwrap();
        assert!(content.starts_with("Timestamp,Latitude,Longitude"));
        assert!(store.contains(&id));
    }

    #[test]
    fn test_append_and_load() {
        let tmp = TempDir::new().unwrap();
        let mut store = CsvRunStore::new(tmp.path()).unwrap();
        let id = RunId::from_start_time(start());
        let pts = points(6);

        store.begin_run(&id, start()).unwrap();
        store.append_points(&id, &pts[..4]).unwrap();
        store.append_points(&id, &pts[4..]).unwrap();

        let run = store.load_run(&id).unwrap();
        assert_eq!(run.point_count, 6);
        assert_eq!(run.start_time, start());
        assert_eq!(run.end_time, Some(start() + Duration::seconds(5)));
    }

    #[test]
    fn test_missing_run_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = CsvRunStore::new(tmp.path()).unwrap();
        assert!(store.load_run(&RunId::parse("2401010000").unwrap()).is_none());
    }

    #[test]
    fn test_header_only_run_uses_id_time() {
        let tmp = TempDir::new().unwrap();
        let mut store = CsvRunStore::new(tmp.path()).unwrap();
        let id = RunId::parse("2405011030").unwrap();
        store.begin_run(&id, start()).unwrap();

        let run = store.load_run(&id).unwrap();
        assert!(run.is_empty());
        assert_eq!(run.start_time, start());
        assert_eq!(run.end_time, None);
    }
}
