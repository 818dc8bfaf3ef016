//! Geographic utilities shared by the estimator, aggregator and replay.

use geo::{Distance, Haversine, Point};

use crate::GpsPoint;

/// Great-circle distance between two coordinates in meters.
///
/// Deterministic and symmetric: `haversine_distance(a, b) == haversine_distance(b, a)`.
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Great-circle distance for raw latitude/longitude pairs in meters.
pub fn distance_between(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    haversine_distance(&GpsPoint::new(lat1, lng1), &GpsPoint::new(lat2, lng2))
}

/// Total length of a polyline in meters.
pub fn track_length(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}
