//! Run-level statistics.
//!
//! A single forward pass accumulates great-circle distance between
//! consecutive points, the sum of mph values and the running maximum.
//! [`RunAccumulator`] is the only implementation: live recording pushes
//! points one at a time, and [`aggregate`] folds a whole slice through the
//! same `push`, so both paths produce bit-identical [`RunTotals`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo_utils::haversine_distance;
use crate::{EnrichedPoint, GpsPoint, METERS_TO_MILES};

/// Aggregates derived from a run's points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RunTotals {
    /// Total distance in miles
    pub distance_miles: f64,
    /// Mean of the points' mph values (0 for an empty run)
    pub avg_speed_mph: f64,
    /// Largest mph value (0 for an empty run)
    pub max_speed_mph: f64,
    pub point_count: usize,
    /// Timestamp of the first point
    pub first_timestamp: Option<DateTime<Utc>>,
    /// Timestamp of the last point
    pub last_timestamp: Option<DateTime<Utc>>,
}

/// Streaming accumulator for [`RunTotals`].
#[derive(Debug, Clone, Default)]
pub struct RunAccumulator {
    distance_meters: f64,
    speed_sum_mph: f64,
    max_speed_mph: f64,
    count: usize,
    last_position: Option<GpsPoint>,
    first_timestamp: Option<DateTime<Utc>>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl RunAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the next point of the run.
    pub fn push(&mut self, point: &EnrichedPoint) {
        let position = point.position();
        if let Some(last) = self.last_position {
            self.distance_meters += haversine_distance(&last, &position);
        }
        self.last_position = Some(position);

        self.speed_sum_mph += point.velocity_mph;
        if point.velocity_mph > self.max_speed_mph {
            self.max_speed_mph = point.velocity_mph;
        }
        self.count += 1;

        if self.first_timestamp.is_none() {
            self.first_timestamp = Some(point.timestamp);
        }
        self.last_timestamp = Some(point.timestamp);
    }

    /// Accumulated distance in meters.
    pub fn distance_meters(&self) -> f64 {
        self.distance_meters
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Snapshot of the aggregates so far.
    pub fn totals(&self) -> RunTotals {
        let avg_speed_mph = if self.count > 0 {
            self.speed_sum_mph / self.count as f64
        } else {
            0.0
        };

        RunTotals {
            distance_miles: self.distance_meters * METERS_TO_MILES,
            avg_speed_mph,
            max_speed_mph: self.max_speed_mph,
            point_count: self.count,
            first_timestamp: self.first_timestamp,
            last_timestamp: self.last_timestamp,
        }
    }
}

/// Aggregate a complete point sequence in one pass.
pub fn aggregate(points: &[EnrichedPoint]) -> RunTotals {
    let mut acc = RunAccumulator::new();
    for point in points {
        acc.push(point);
    }
    acc.totals()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn point_at(secs: i64, lat: f64, lng: f64, mph: f64) -> EnrichedPoint {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + Duration::seconds(secs);
        EnrichedPoint {
            timestamp: ts,
            latitude: lat,
            longitude: lng,
            speed: None,
            accuracy: None,
            velocity_ms: mph / crate::MS_TO_MPH,
            velocity_mph: mph,
            acceleration: 0.0,
        }
    }

    #[test]
    fn test_empty_run() {
        let totals = aggregate(&[]);
        assert_eq!(totals.distance_miles, 0.0);
        assert_eq!(totals.avg_speed_mph, 0.0);
        assert_eq!(totals.max_speed_mph, 0.0);
        assert_eq!(totals.point_count, 0);
        assert!(totals.last_timestamp.is_none());
    }

    #[test]
    fn test_average_and_max() {
        let points = vec![
            point_at(0, 0.0, 0.0, 5.0),
            point_at(1, 0.0001, 0.0, 10.0),
            point_at(2, 0.0002, 0.0, 15.0),
        ];
        let totals = aggregate(&points);
        assert_eq!(totals.avg_speed_mph, 10.0);
        assert_eq!(totals.max_speed_mph, 15.0);
        assert_eq!(totals.point_count, 3);
    }

    #[test]
    fn test_distance_in_miles() {
        let points = vec![point_at(0, 0.0, 0.0, 0.0), point_at(10, 0.01, 0.0, 0.0)];
        let meters = haversine_distance(&points[0].position(), &points[1].position());
        let totals = aggregate(&points);
        assert_eq!(totals.distance_miles, meters * METERS_TO_MILES);
    }

    #[test]
    fn test_single_point_has_no_distance() {
        let totals = aggregate(&[point_at(0, 36.0, -5.6, 12.0)]);
        assert_eq!(totals.distance_miles, 0.0);
        assert_eq!(totals.first_timestamp, totals.last_timestamp);
    }

    #[test]
    fn test_incremental_matches_batch() {
        let points: Vec<EnrichedPoint> = (0..50)
            .map(|i| point_at(i, 36.0 + i as f64 * 0.00013, -5.6 + i as f64 * 0.00007, (i % 17) as f64 * 1.3))
            .collect();

        let mut acc = RunAccumulator::new();
        for p in &points {
            acc.push(p);
        }
        assert_eq!(acc.totals(), aggregate(&points));
    }
}
