//! # Geographic Utilities
//!
//! Shared geographic calculation functions used across the overlap engine.
//!
//! ## Functions
//!
//! | Function | Purpose |
//! |----------|---------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points in meters |
//! | [`latitude_at_distance`] | Latitude reached by moving N meters due north/south |
//! | [`longitude_at_distance`] | Longitude reached by moving N meters due east/west |
//! | [`nearest_point`] | Brute-force nearest-neighbor scan over a point cloud |
//! | [`polyline_length`] | Total length of a point sequence in meters |
//! | [`bounds_overlap`] | Axis-aligned bounding box intersection test |
//!
//! All distance math uses a fixed spherical Earth model (12742 km diameter).
//! The destination-point functions are the exact inverses of
//! [`haversine_distance`] along a single axis, which keeps grid ladders built
//! from them spaced at the requested width when measured with it.

use crate::{Bounds, GpsPoint};

/// Spherical Earth diameter in meters, shared by all haversine forms here.
const EARTH_DIAMETER_M: f64 = 12_742_000.0;

const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;

/// Calculate the haversine distance between two points in meters.
///
/// Symmetric, and zero (within float precision) iff the points coincide.
///
/// # Example
/// ```
/// use track_overlap::{GpsPoint, geo_utils::haversine_distance};
///
/// let london = GpsPoint::new(51.5073, -0.1276);
/// let paris = GpsPoint::new(48.8589, 2.3200);
/// let d = haversine_distance(&london, &paris);
/// assert!((d / 1000.0 - 342.0).abs() < 1.0);
/// ```
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let a = 0.5 - ((p2.latitude - p1.latitude) * DEG_TO_RAD).cos() / 2.0
        + (p1.latitude * DEG_TO_RAD).cos()
            * (p2.latitude * DEG_TO_RAD).cos()
            * (1.0 - ((p2.longitude - p1.longitude) * DEG_TO_RAD).cos())
            / 2.0;
    EARTH_DIAMETER_M * a.sqrt().asin()
}

/// Latitude reached by travelling `distance` meters due north (or south)
/// from `origin`. Longitude is unchanged by construction.
pub fn latitude_at_distance(origin: &GpsPoint, distance: f64, to_north: bool) -> f64 {
    let a = (distance / EARTH_DIAMETER_M).sin().powi(2);
    let offset = (1.0 - 2.0 * a).acos() / DEG_TO_RAD;
    if to_north {
        origin.latitude + offset
    } else {
        origin.latitude - offset
    }
}

/// Longitude reached by travelling `distance` meters due east (or west)
/// from `origin`. Latitude is unchanged by construction.
///
/// The degrees-per-meter ratio depends on the origin's latitude, so ladders
/// built from this function must chain from the previous rung rather than
/// recompute from a distant anchor.
pub fn longitude_at_distance(origin: &GpsPoint, distance: f64, to_east: bool) -> f64 {
    let a = (distance / EARTH_DIAMETER_M).sin().powi(2);
    let b = (origin.latitude * DEG_TO_RAD).cos().powi(2) / 2.0;
    let offset = (1.0 - a / b).acos() / DEG_TO_RAD;
    if to_east {
        origin.longitude + offset
    } else {
        origin.longitude - offset
    }
}

/// Find the point in `points` closest to `target`.
///
/// Returns the index of the minimum and its distance in meters, or `None`
/// for an empty slice. Ties resolve to the earliest index. This is a plain
/// O(n) scan; GPS tracks top out at a few tens of thousands of points, so a
/// spatial index buys nothing here.
pub fn nearest_point(points: &[GpsPoint], target: &GpsPoint) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, point) in points.iter().enumerate() {
        let d = haversine_distance(point, target);
        match best {
            Some((_, best_d)) if best_d <= d => {}
            _ => best = Some((idx, d)),
        }
    }
    best
}

/// Total length of a point sequence in meters.
///
/// # Example
/// ```
/// use track_overlap::{GpsPoint, geo_utils::polyline_length};
///
/// let points = vec![
///     GpsPoint::new(47.99, 7.85),
///     GpsPoint::new(47.99, 7.86),
///     GpsPoint::new(48.00, 7.86),
/// ];
/// assert!(polyline_length(&points) > 0.0);
/// assert_eq!(polyline_length(&points[..1]), 0.0);
/// ```
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| haversine_distance(&pair[0], &pair[1]))
        .sum()
}

/// Check whether two bounding boxes intersect (shared edges count).
pub fn bounds_overlap(a: &Bounds, b: &Bounds) -> bool {
    a.min_lat <= b.max_lat
        && b.min_lat <= a.max_lat
        && a.min_lng <= b.max_lng
        && b.min_lng <= a.max_lng
}

// ============================================================================
// Tests
// ============================================================================
