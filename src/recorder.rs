//! Live recording session.
//!
//! Fixes for one run are processed strictly in arrival order: each fix is
//! estimated against the last accepted point, appended to the live
//! [`RunSummary`], and buffered for the store. The buffer is written every
//! `buffer_size` points and on stop.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{FoilTrackError, Result};
use crate::motion::{EstimatorConfig, MotionEstimator};
use crate::store::RunStore;
use crate::{EnrichedPoint, RawFix, RunId, RunSummary};

/// Configuration for a recording session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Points buffered before a batch write to the store.
    /// Default: 20
    pub buffer_size: usize,

    /// Motion estimation settings.
    pub estimator: EstimatorConfig,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            buffer_size: 20,
            estimator: EstimatorConfig::default(),
        }
    }
}

#[derive(Debug)]
struct ActiveRun {
    summary: RunSummary,
    pending: Vec<EnrichedPoint>,
}

/// Drives estimator, run summary and store for one run at a time.
pub struct RunRecorder<S: RunStore> {
    store: S,
    estimator: MotionEstimator,
    buffer_size: usize,
    active: Option<ActiveRun>,
}

impl<S: RunStore> RunRecorder<S> {
    /// Create a recorder with default configuration.
    pub fn new(store: S) -> Self {
        let config = RecorderConfig::default();
        Self {
            store,
            estimator: MotionEstimator::new(config.estimator),
            buffer_size: config.buffer_size,
            active: None,
        }
    }

    /// Create a recorder with custom configuration.
    pub fn with_config(store: S, config: RecorderConfig) -> Result<Self> {
        if config.buffer_size == 0 {
            return Err(FoilTrackError::Config {
                message: "buffer_size must be at least 1".to_string(),
            });
        }
        Ok(Self {
            store,
            estimator: MotionEstimator::new(config.estimator),
            buffer_size: config.buffer_size,
            active: None,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// The run being recorded, with live aggregates.
    pub fn current(&self) -> Option<&RunSummary> {
        self.active.as_ref().map(|a| &a.summary)
    }

    /// Start a new run at `now`.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<RunId> {
        if let Some(active) = &self.active {
            return Err(FoilTrackError::AlreadyRecording {
                run_id: active.summary.id.to_string(),
            });
        }

        let summary = RunSummary::start(now);
        self.store.begin_run(&summary.id, now)?;
        let id = summary.id.clone();
        info!("Recording started: run {}", id);

        self.active = Some(ActiveRun {
            summary,
            pending: Vec::with_capacity(self.buffer_size),
        });
        Ok(id)
    }

    /// Process the next fix, processed at wall-clock instant `now`.
    ///
    /// Only a missing session is an error. A failed buffered write is logged
    /// and the points stay pending; the write is retried each time another
    /// `buffer_size` points accumulate, and on [`flush`](Self::flush) or
    /// [`stop`](Self::stop).
    pub fn record_fix(&mut self, fix: RawFix, now: DateTime<Utc>) -> Result<EnrichedPoint> {
        let active = self.active.as_mut().ok_or(FoilTrackError::NotRecording)?;

        let motion = self
            .estimator
            .estimate_at(active.summary.points.last(), &fix, now);
        let point = EnrichedPoint::from_fix(&fix, motion);

        active.summary.push(point);
        active.pending.push(point);

        if active.pending.len() % self.buffer_size == 0 {
            if let Err(e) = flush_pending(&mut self.store, active) {
                warn!(
                    "Buffered write for run {} failed, {} points pending: {}",
                    active.summary.id,
                    active.pending.len(),
                    e
                );
            }
        }
        Ok(point)
    }

    /// Write buffered points to the store.
    pub fn flush(&mut self) -> Result<()> {
        let active = self.active.as_mut().ok_or(FoilTrackError::NotRecording)?;
        flush_pending(&mut self.store, active)
    }

    /// Stop recording: flush, finalize and hand back the run.
    ///
    /// On error the session stays active so the caller can retry.
    pub fn stop(&mut self) -> Result<RunSummary> {
        let active = self.active.as_mut().ok_or(FoilTrackError::NotRecording)?;

        flush_pending(&mut self.store, active)?;
        active.summary.finalize();
        self.store.finish_run(&active.summary)?;

        let summary = self
            .active
            .take()
            .map(|a| a.summary)
            .ok_or(FoilTrackError::NotRecording)?;
        info!(
            "Recording stopped: run {} with {} points",
            summary.id, summary.point_count
        );
        Ok(summary)
    }
}

fn flush_pending<S: RunStore + ?Sized>(store: &mut S, active: &mut ActiveRun) -> Result<()> {
    if active.pending.is_empty() {
        return Ok(());
    }
    store.append_points(&active.summary.id, &active.pending)?;
    debug!(
        "Flushed {} points for run {}",
        active.pending.len(),
        active.summary.id
    );
    active.pending.clear();
    Ok(())
}
