//! # Run Storage
//!
//! One persistence capability with interchangeable backends:
//!
//! - [`CsvRunStore`] keeps one `gps_data_<runId>.csv` file per run
//! - [`SqliteRunStore`] keeps runs and points in SQLite (feature `persistence`)
//!
//! Aggregates are never authoritative in storage. `load_run` always
//! recomputes them from the stored points; cached aggregates only serve
//! listings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::RunTotals;
use crate::error::Result;
use crate::{EnrichedPoint, RunId, RunSummary};

pub mod csv_store;
pub use csv_store::CsvRunStore;

#[cfg(feature = "persistence")]
pub mod sqlite;
#[cfg(feature = "persistence")]
pub use sqlite::SqliteRunStore;

pub mod migration;
pub use migration::{migrate_runs, MigrationReport};

/// Lightweight entry for run lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunListing {
    pub id: RunId,
    pub start_time: Option<DateTime<Utc>>,
    /// Aggregates cached by the backend, if it keeps any
    pub totals: Option<RunTotals>,
}

/// Persistence for recorded runs.
pub trait RunStore {
    /// Create (or reset) the storage for a new run.
    fn begin_run(&mut self, id: &RunId, start_time: DateTime<Utc>) -> Result<()>;

    /// Append points to a run created with `begin_run`.
    fn append_points(&mut self, id: &RunId, points: &[EnrichedPoint]) -> Result<()>;

    /// Called once recording stops, with the finalized summary.
    fn finish_run(&mut self, summary: &RunSummary) -> Result<()>;

    /// Load a run with recomputed aggregates.
    ///
    /// Any failure is logged and reported as `None` ("no data").
    fn load_run(&self, id: &RunId) -> Option<RunSummary>;

    /// All stored runs, newest first.
    fn list_runs(&self) -> Result<Vec<RunListing>>;

    /// Delete a run. Returns `false` if it did not exist.
    fn delete_run(&mut self, id: &RunId) -> Result<bool>;

    /// Whether a run with this id is stored.
    fn contains(&self, id: &RunId) -> bool;

    /// Store a complete run in one go.
    fn save_run(&mut self, summary: &RunSummary) -> Result<()> {
        self.begin_run(&summary.id, summary.start_time)?;
        self.append_points(&summary.id, &summary.points)?;
        self.finish_run(summary)
    }
}

impl<S: RunStore + ?Sized> RunStore for Box<S> {
    fn begin_run(&mut self, id: &RunId, start_time: DateTime<Utc>) -> Result<()> {
        (**self).begin_run(id, start_time)
    }

    fn append_points(&mut self, id: &RunId, points: &[EnrichedPoint]) -> Result<()> {
        (**self).append_points(id, points)
    }

    fn finish_run(&mut self, summary: &RunSummary) -> Result<()> {
        (**self).finish_run(summary)
    }

    fn load_run(&self, id: &RunId) -> Option<RunSummary> {
        (**self).load_run(id)
    }

    fn list_runs(&self) -> Result<Vec<RunListing>> {
        (**self).list_runs()
    }

    fn delete_run(&mut self, id: &RunId) -> Result<bool> {
        (**self).delete_run(id)
    }

    fn contains(&self, id: &RunId) -> bool {
        (**self).contains(id)
    }
}
