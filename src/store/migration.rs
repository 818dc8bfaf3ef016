//! Copy runs between stores (e.g. legacy CSV files into SQLite).

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::RunStore;
use crate::error::Result;
use crate::RunId;

/// Outcome of a migration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub imported: Vec<RunId>,
    /// Already present in the target
    pub skipped: Vec<RunId>,
    /// Unreadable in the source or rejected by the target
    pub failed: Vec<RunId>,
}

/// Copy every run of `source` that `target` does not have yet.
///
/// Per-run failures are logged and recorded; only a failure to list the
/// source aborts the migration.
pub fn migrate_runs<S, T>(source: &S, target: &mut T) -> Result<MigrationReport>
where
    S: RunStore + ?Sized,
    T: RunStore + ?Sized,
{
    let listings = source.list_runs()?;
    info!("Running run migration: {} candidate runs", listings.len());

    let mut report = MigrationReport::default();
    for listing in listings {
        let id = listing.id;
        if target.contains(&id) {
            report.skipped.push(id);
            continue;
        }

        let Some(run) = source.load_run(&id) else {
            warn!("Migration: run {} could not be loaded", id);
            report.failed.push(id);
            continue;
        };

        match target.save_run(&run) {
            Ok(()) => report.imported.push(id),
            Err(e) => {
                warn!("Migration: failed to store run {}: {}", id, e);
                report.failed.push(id);
            }
        }
    }

    info!(
        "Run migration completed: {} imported, {} skipped, {} failed",
        report.imported.len(),
        report.skipped.len(),
        report.failed.len()
    );
    Ok(report)
}
