//! SQLite run store.
//!
//! Runs live in `runs` with cached aggregates for listings; points live in
//! `location_points`, ordered by a per-run sequence number. Timestamps are
//! stored as epoch milliseconds.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};

use super::{RunListing, RunStore};
use crate::aggregate::RunTotals;
use crate::error::Result;
use crate::{EnrichedPoint, RunId, RunSummary};

/// A `location_points` row before timestamp conversion.
#[derive(Debug, Clone, Copy)]
struct StoredPoint {
    seq: i64,
    timestamp_ms: i64,
    latitude: f64,
    longitude: f64,
    velocity_ms: f64,
    velocity_mph: f64,
    acceleration: f64,
    speed: Option<f64>,
    accuracy: Option<f32>,
}

impl StoredPoint {
    fn into_point(self) -> Option<EnrichedPoint> {
        Some(EnrichedPoint {
            timestamp: DateTime::<Utc>::from_timestamp_millis(self.timestamp_ms)?,
            latitude: self.latitude,
            longitude: self.longitude,
            speed: self.speed,
            accuracy: self.accuracy,
            velocity_ms: self.velocity_ms,
            velocity_mph: self.velocity_mph,
            acceleration: self.acceleration,
        })
    }
}

/// Structured run store backed by SQLite.
pub struct SqliteRunStore {
    db: Connection,
    db_path: String,
}

impl SqliteRunStore {
    /// Open (or create) a store at the given database path.
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;
        info!("Opened run database {}", db_path);
        Ok(Self {
            db,
            db_path: db_path.to_string(),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Initialize the database schema.
    fn init_schema(conn: &Connection) -> SqlResult<()> {
        conn.execute_batch(
            r#"
            -- One row per run; aggregates are a cache for listings
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                distance REAL NOT NULL DEFAULT 0,
                avg_speed REAL NOT NULL DEFAULT 0,
                max_speed REAL NOT NULL DEFAULT 0,
                point_count INTEGER NOT NULL DEFAULT 0
            );

            -- Enriched points, in recording order
            CREATE TABLE IF NOT EXISTS location_points (
                run_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                velocity REAL NOT NULL,
                velocity_mph REAL NOT NULL,
                acceleration REAL NOT NULL,
                speed REAL,
                accuracy REAL,
                PRIMARY KEY (run_id, seq),
                FOREIGN KEY (run_id) REFERENCES runs(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_runs_start ON runs(start_time);

            -- Enable foreign keys
            PRAGMA foreign_keys = ON;
        "#,
        )?;
        Ok(())
    }

    /// Number of stored runs.
    pub fn run_count(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    /// Remove every run and point.
    pub fn clear(&mut self) -> Result<()> {
        self.db.execute_batch(
            "DELETE FROM location_points;
             DELETE FROM runs;",
        )?;
        Ok(())
    }

    fn try_load_run(&self, id: &RunId) -> SqlResult<Option<RunSummary>> {
        let start_ms: Option<i64> = self
            .db
            .query_row(
                "SELECT start_time FROM runs WHERE id = ?",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(start_ms) = start_ms else {
            return Ok(None);
        };

        let mut stmt = self.db.prepare(
            "SELECT seq, timestamp, latitude, longitude, velocity, velocity_mph, acceleration, speed, accuracy
             FROM location_points WHERE run_id = ? ORDER BY seq",
        )?;

        let points: Vec<EnrichedPoint> = stmt
            .query_map(params![id.as_str()], |row| {
                let accuracy: Option<f64> = row.get(8)?;
                Ok(StoredPoint {
                    seq: row.get(0)?,
                    timestamp_ms: row.get(1)?,
                    latitude: row.get(2)?,
                    longitude: row.get(3)?,
                    velocity_ms: row.get(4)?,
                    velocity_mph: row.get(5)?,
                    acceleration: row.get(6)?,
                    speed: row.get(7)?,
                    accuracy: accuracy.map(|a| a as f32),
                })
            })?
            .filter_map(|r| match r {
                Ok(row) => Some(row),
                Err(e) => {
                    warn!("Skipping unreadable point of run {}: {}", id, e);
                    None
                }
            })
            .filter_map(|stored| {
                let point = stored.into_point();
                if point.is_none() {
                    warn!("Skipping point {} of run {}: bad timestamp {}", stored.seq, id, stored.timestamp_ms);
                }
                point
            })
            .collect();

        let start_time = DateTime::<Utc>::from_timestamp_millis(start_ms)
            .or_else(|| points.first().map(|p| p.timestamp))
            .or_else(|| id.start_time())
            .unwrap_or_else(Utc::now);

        Ok(Some(RunSummary::from_points(id.clone(), start_time, points)))
    }
}

impl RunStore for SqliteRunStore {
    fn begin_run(&mut self, id: &RunId, start_time: DateTime<Utc>) -> Result<()> {
        let removed = self
            .db
            .execute("DELETE FROM runs WHERE id = ?", params![id.as_str()])?;
        if removed > 0 {
            warn!("Run {} already stored, overwriting", id);
        }
        self.db.execute(
            "INSERT INTO runs (id, start_time) VALUES (?, ?)",
            params![id.as_str(), start_time.timestamp_millis()],
        )?;
        info!("Started run {} at {}", id, start_time);
        Ok(())
    }

    fn append_points(&mut self, id: &RunId, points: &[EnrichedPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let tx = self.db.transaction()?;
        let next_seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq) + 1, 0) FROM location_points WHERE run_id = ?",
            params![id.as_str()],
            |row| row.get(0),
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO location_points
                 (run_id, seq, timestamp, latitude, longitude, velocity, velocity_mph, acceleration, speed, accuracy)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for (i, p) in points.iter().enumerate() {
                stmt.execute(params![
                    id.as_str(),
                    next_seq + i as i64,
                    p.timestamp.timestamp_millis(),
                    p.latitude,
                    p.longitude,
                    p.velocity_ms,
                    p.velocity_mph,
                    p.acceleration,
                    p.speed,
                    p.accuracy.map(f64::from),
                ])?;
            }
        }

        tx.commit()?;
        debug!("Inserted {} points for run {}", points.len(), id);
        Ok(())
    }

    fn finish_run(&mut self, summary: &RunSummary) -> Result<()> {
        self.db.execute(
            "INSERT INTO runs (id, start_time, end_time, distance, avg_speed, max_speed, point_count)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                end_time = excluded.end_time,
                distance = excluded.distance,
                avg_speed = excluded.avg_speed,
                max_speed = excluded.max_speed,
                point_count = excluded.point_count",
            params![
                summary.id.as_str(),
                summary.start_time.timestamp_millis(),
                summary.end_time.map(|t| t.timestamp_millis()),
                summary.distance_miles,
                summary.avg_speed_mph,
                summary.max_speed_mph,
                summary.point_count as i64,
            ],
        )?;
        info!(
            "Finished run {}: {} points, {:.2} mi",
            summary.id, summary.point_count, summary.distance_miles
        );
        Ok(())
    }

    fn load_run(&self, id: &RunId) -> Option<RunSummary> {
        match self.try_load_run(id) {
            Ok(run) => run,
            Err(e) => {
                error!("Failed to load run {}: {}", id, e);
                None
            }
        }
    }

    fn list_runs(&self) -> Result<Vec<RunListing>> {
        let mut stmt = self.db.prepare(
            "SELECT id, start_time, end_time, distance, avg_speed, max_speed, point_count
             FROM runs ORDER BY id DESC",
        )?;

        let listings = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let start_ms: i64 = row.get(1)?;
                let end_ms: Option<i64> = row.get(2)?;
                let point_count: i64 = row.get(6)?;
                Ok((
                    id,
                    start_ms,
                    RunTotals {
                        distance_miles: row.get(3)?,
                        avg_speed_mph: row.get(4)?,
                        max_speed_mph: row.get(5)?,
                        point_count: point_count.max(0) as usize,
                        first_timestamp: None,
                        last_timestamp: end_ms.and_then(DateTime::<Utc>::from_timestamp_millis),
                    },
                ))
            })?
            .filter_map(|r| match r {
                Ok(row) => Some(row),
                Err(e) => {
                    warn!("Skipping unreadable run row: {}", e);
                    None
                }
            })
            .filter_map(|(id, start_ms, totals)| match RunId::parse(&id) {
                Ok(run_id) => Some(RunListing {
                    id: run_id,
                    start_time: DateTime::<Utc>::from_timestamp_millis(start_ms),
                    totals: Some(totals),
                }),
                Err(e) => {
                    warn!("Ignoring stored run with bad id: {}", e);
                    None
                }
            })
            .collect();

        Ok(listings)
    }

    fn delete_run(&mut self, id: &RunId) -> Result<bool> {
        // Points go with the run (ON DELETE CASCADE)
        let removed = self
            .db
            .execute("DELETE FROM runs WHERE id = ?", params![id.as_str()])?;
        if removed > 0 {
            info!("Deleted run {}", id);
        }
        Ok(removed > 0)
    }

    fn contains(&self, id: &RunId) -> bool {
        self.db
            .query_row(
                "SELECT COUNT(*) FROM runs WHERE id = ?",
                params![id.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n > 0)
            .unwrap_or_else(|e| {
                error!("Failed to look up run {}: {}", id, e);
                false
            })
    }
}
