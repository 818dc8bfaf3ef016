//! Replay support for recorded runs.
//!
//! - Speed bands colour each path segment by the speed at its start point
//! - [`Replay`] plays a run back time-compressed: the whole run takes
//!   `animation_duration`, and the pause between ticks shrinks as speed
//!   grows (`base_frame_delay / max(1, mph / speed_divisor_mph)`)
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use foiltrack::{Replay, ReplayConfig};
//!
//! let points: Vec<foiltrack::EnrichedPoint> = Vec::new(); // points of a loaded run
//! let mut replay = Replay::new(&points, ReplayConfig::default());
//! let tick = replay.advance(Duration::from_millis(16));
//! assert!(tick.finished);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Bounds, EnrichedPoint, GpsPoint};

/// Upper bounds (inclusive) of the slow and moderate bands in mph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedBandThresholds {
    /// Default: 6.0 mph
    pub slow_max_mph: f64,
    /// Default: 9.0 mph
    pub moderate_max_mph: f64,
}

impl Default for SpeedBandThresholds {
    fn default() -> Self {
        Self {
            slow_max_mph: 6.0,
            moderate_max_mph: 9.0,
        }
    }
}

/// Speed category of a path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpeedBand {
    Slow,
    Moderate,
    Fast,
}

impl SpeedBand {
    /// Classify a speed with the given thresholds.
    pub fn classify(speed_mph: f64, thresholds: &SpeedBandThresholds) -> Self {
        if speed_mph <= thresholds.slow_max_mph {
            SpeedBand::Slow
        } else if speed_mph <= thresholds.moderate_max_mph {
            SpeedBand::Moderate
        } else {
            SpeedBand::Fast
        }
    }

    /// Classify a speed with the default 6 / 9 mph thresholds.
    pub fn from_mph(speed_mph: f64) -> Self {
        Self::classify(speed_mph, &SpeedBandThresholds::default())
    }

    /// Display colour as `0xRRGGBB`.
    pub fn color(&self) -> u32 {
        match self {
            SpeedBand::Slow => 0xFF0000,
            SpeedBand::Moderate => 0xFFFF00,
            SpeedBand::Fast => 0x00FF00,
        }
    }
}

/// A coloured line between two consecutive points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathSegment {
    pub start: GpsPoint,
    pub end: GpsPoint,
    /// Speed at the segment's start point
    pub speed_mph: f64,
    pub band: SpeedBand,
}

impl PathSegment {
    fn between(a: &EnrichedPoint, b: &EnrichedPoint, thresholds: &SpeedBandThresholds) -> Self {
        Self {
            start: a.position(),
            end: b.position(),
            speed_mph: a.velocity_mph,
            band: SpeedBand::classify(a.velocity_mph, thresholds),
        }
    }
}

/// The whole run as coloured segments.
pub fn colored_path(points: &[EnrichedPoint], thresholds: &SpeedBandThresholds) -> Vec<PathSegment> {
    points
        .windows(2)
        .map(|w| PathSegment::between(&w[0], &w[1], thresholds))
        .collect()
}

/// Bounding box to fit the run on screen.
pub fn route_bounds(points: &[EnrichedPoint]) -> Option<Bounds> {
    let positions: Vec<GpsPoint> = points.iter().map(|p| p.position()).collect();
    Bounds::from_points(&positions)
}

/// Configuration for time-compressed playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Wall time the whole run takes to play.
    /// Default: 30 seconds
    pub animation_duration: Duration,

    /// Pause between ticks at low speed.
    /// Default: 16 ms (~60 fps)
    pub base_frame_delay: Duration,

    /// Speed (mph) per unit of tick speed-up.
    /// Default: 5.0
    pub speed_divisor_mph: f64,

    pub thresholds: SpeedBandThresholds,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            animation_duration: Duration::from_secs(30),
            base_frame_delay: Duration::from_millis(16),
            speed_divisor_mph: 5.0,
            thresholds: SpeedBandThresholds::default(),
        }
    }
}

/// Result of advancing playback.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayTick {
    /// Segments revealed by this tick, in order
    pub new_segments: Vec<PathSegment>,
    /// Position of the moving marker
    pub marker: Option<GpsPoint>,
    pub finished: bool,
    /// Pause before the next tick
    pub next_delay: Duration,
}

/// Time-compressed playback over a run's points.
#[derive(Debug, Clone)]
pub struct Replay<'a> {
    points: &'a [EnrichedPoint],
    config: ReplayConfig,
    /// Run milliseconds per animation millisecond
    compression: f64,
    last_drawn: usize,
}

impl<'a> Replay<'a> {
    pub fn new(points: &'a [EnrichedPoint], config: ReplayConfig) -> Self {
        let run_ms = match (points.first(), points.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_milliseconds().max(0),
            _ => 0,
        };
        let animation_ms = config.animation_duration.as_millis().max(1) as f64;

        Self {
            points,
            config,
            compression: run_ms as f64 / animation_ms,
            last_drawn: 0,
        }
    }

    /// Index of the last revealed point.
    pub fn position(&self) -> usize {
        self.last_drawn
    }

    /// Fraction of points revealed, 0.0 to 1.0.
    pub fn progress(&self) -> f64 {
        if self.points.len() < 2 {
            return 1.0;
        }
        self.last_drawn as f64 / (self.points.len() - 1) as f64
    }

    pub fn is_finished(&self) -> bool {
        self.points.len() < 2 || self.last_drawn >= self.points.len() - 1
    }

    /// Restart from the first point.
    pub fn reset(&mut self) {
        self.last_drawn = 0;
    }

    /// Pause before the next tick at a given speed.
    pub fn frame_delay(&self, speed_mph: f64) -> Duration {
        let factor = (speed_mph / self.config.speed_divisor_mph).max(1.0);
        let base_ms = self.config.base_frame_delay.as_millis() as f64;
        Duration::from_millis((base_ms / factor) as u64)
    }

    /// Reveal every point whose run time has been reached after `elapsed`
    /// of animation time.
    pub fn advance(&mut self, elapsed: Duration) -> ReplayTick {
        let Some(first) = self.points.first() else {
            return ReplayTick {
                new_segments: Vec::new(),
                marker: None,
                finished: true,
                next_delay: Duration::ZERO,
            };
        };

        let simulated_ms = elapsed.as_millis() as f64 * self.compression;
        let mut new_segments = Vec::new();
        let mut index = self.last_drawn;

        while index < self.points.len() {
            let offset_ms = (self.points[index].timestamp - first.timestamp).num_milliseconds() as f64;
            if offset_ms > simulated_ms {
                break;
            }
            if index > self.last_drawn {
                new_segments.push(PathSegment::between(
                    &self.points[index - 1],
                    &self.points[index],
                    &self.config.thresholds,
                ));
            }
            self.last_drawn = index;
            index += 1;
        }

        let current = &self.points[self.last_drawn];
        ReplayTick {
            new_segments,
            marker: Some(current.position()),
            finished: self.is_finished(),
            next_delay: self.frame_delay(current.velocity_mph),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Motion, RawFix};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn run(mph: &[f64]) -> Vec<EnrichedPoint> {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        mph.iter()
            .enumerate()
            .map(|(i, &v)| {
                let fix = RawFix::new(start + ChronoDuration::seconds(i as i64 * 10), 36.0, -5.6 + i as f64 * 0.001);
                EnrichedPoint::from_fix(&fix, Motion::new(v / crate::MS_TO_MPH, 0.0))
            })
            .collect()
    }

    #[test]
    fn test_speed_bands() {
        assert_eq!(SpeedBand::from_mph(0.0), SpeedBand::Slow);
        assert_eq!(SpeedBand::from_mph(6.0), SpeedBand::Slow);
        assert_eq!(SpeedBand::from_mph(6.1), SpeedBand::Moderate);
        assert_eq!(SpeedBand::from_mph(9.0), SpeedBand::Moderate);
        assert_eq!(SpeedBand::from_mph(9.5), SpeedBand::Fast);
        assert_eq!(SpeedBand::Fast.color(), 0x00FF00);
    }

    #[test]
    fn test_colored_path_uses_start_speed() {
        let points = run(&[3.0, 12.0, 7.0]);
        let path = colored_path(&points, &SpeedBandThresholds::default());
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].band, SpeedBand::Slow);
        assert_eq!(path[1].band, SpeedBand::Fast);
        assert!(colored_path(&points[..1], &SpeedBandThresholds::default()).is_empty());
    }

    #[test]
    fn test_frame_delay() {
        let points = run(&[]);
        let replay = Replay::new(&points, ReplayConfig::default());
        assert_eq!(replay.frame_delay(0.0), Duration::from_millis(16));
        assert_eq!(replay.frame_delay(5.0), Duration::from_millis(16));
        assert_eq!(replay.frame_delay(20.0), Duration::from_millis(4));
    }

    #[test]
    fn test_replay_compresses_time() {
        // 4 points, 30 s of run time played in 30 s: 1 run ms per animation ms
        let points = run(&[2.0, 4.0, 8.0, 16.0]);
        let mut replay = Replay::new(&points, ReplayConfig::default());

        let tick = replay.advance(Duration::ZERO);
        assert!(tick.new_segments.is_empty());
        assert_eq!(tick.marker, Some(points[0].position()));
        assert!(!tick.finished);

        let tick = replay.advance(Duration::from_secs(20));
        assert_eq!(tick.new_segments.len(), 2);
        assert_eq!(replay.position(), 2);

        let tick = replay.advance(Duration::from_secs(30));
        assert_eq!(tick.new_segments.len(), 1);
        assert!(tick.finished);
        assert_eq!(replay.progress(), 1.0);
    }

    #[test]
    fn test_empty_and_bounds() {
        let mut replay = Replay::new(&[], ReplayConfig::default());
        let tick = replay.advance(Duration::from_secs(1));
        assert!(tick.finished);
        assert!(tick.marker.is_none());
        assert!(route_bounds(&[]).is_none());

        let points = run(&[1.0, 2.0]);
        let bounds = route_bounds(&points).unwrap();
        assert_eq!(bounds.min_lng, -5.6);
        assert_eq!(bounds.max_lng, -5.6 + 0.001);
    }
}
