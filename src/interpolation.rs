//! # Point Interpolation
//!
//! Linear resampling of track segments. The overlap engine needs point
//! spacing below the grid width: a sparse segment jumps over grid cells and
//! its plate underestimates occupancy, which drags the overlap ratio down.
//! The driver resamples segments to half the grid width before rasterizing.
//!
//! Interpolated points get latitude, longitude, elevation and time by linear
//! interpolation (elevation/time only when both endpoints carry them);
//! extension values are filled per [`ExtensionStrategy`].

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::geo_utils::haversine_distance;
use crate::track::{TrackPoint, TrackSegment};

/// How interpolated points fill their named extension values
/// (heart rate, cadence, power, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtensionStrategy {
    /// Every interpolated point carries the leading endpoint's values.
    CopyForward,
    /// Points in the first half carry the leading endpoint's values, points
    /// in the second half the trailing endpoint's. Keys must be present on
    /// both endpoints.
    MeetCenter,
    /// Values interpolate linearly between the endpoints. Keys must be
    /// present on both endpoints.
    Linear,
}

/// Interpolate between two points so that no gap exceeds `spacing` meters.
///
/// Produces `floor(distance / spacing) + 1` evenly spaced points including
/// both endpoints (the endpoints are kept verbatim). Returns `None` when the
/// points are closer than `2 * spacing` — there is no room for an
/// intermediate point, and the caller keeps the original pair.
pub fn interpolate_points(
    start: &TrackPoint,
    end: &TrackPoint,
    spacing: f64,
    strategy: ExtensionStrategy,
) -> Option<Vec<TrackPoint>> {
    let gap = haversine_distance(&start.position(), &end.position());
    if gap < 2.0 * spacing {
        return None;
    }

    // floor(gap / spacing) steps of equal fractional length
    let steps = (gap / spacing).floor() as usize;
    debug!("Interpolating {} points over a {:.1} m gap", steps + 1, gap);

    let mut points = Vec::with_capacity(steps + 1);
    points.push(start.clone());
    for step in 1..steps {
        let ratio = step as f64 / steps as f64;
        points.push(TrackPoint {
            latitude: start.latitude + ratio * (end.latitude - start.latitude),
            longitude: start.longitude + ratio * (end.longitude - start.longitude),
            elevation: match (start.elevation, end.elevation) {
                (Some(a), Some(b)) => Some(a + ratio * (b - a)),
                _ => None,
            },
            time: match (start.time, end.time) {
                (Some(a), Some(b)) => Some(a + ((b - a) as f64 * ratio).round() as i64),
                _ => None,
            },
            extensions: interpolate_extensions(start, end, ratio, strategy),
        });
    }
    points.push(end.clone());

    Some(points)
}

fn interpolate_extensions(
    start: &TrackPoint,
    end: &TrackPoint,
    ratio: f64,
    strategy: ExtensionStrategy,
) -> HashMap<String, f64> {
    match strategy {
        ExtensionStrategy::CopyForward => start.extensions.clone(),
        ExtensionStrategy::MeetCenter => start
            .extensions
            .iter()
            .filter(|(key, _)| end.extensions.contains_key(*key))
            .map(|(key, value)| {
                let picked = if ratio < 0.5 {
                    *value
                } else {
                    end.extensions[key]
                };
                (key.clone(), picked)
            })
            .collect(),
        ExtensionStrategy::Linear => start
            .extensions
            .iter()
            .filter_map(|(key, value)| {
                end.extensions
                    .get(key)
                    .map(|other| (key.clone(), value + ratio * (other - value)))
            })
            .collect(),
    }
}

/// Resample a segment so consecutive points sit at most `spacing` apart.
///
/// Pairs already closer than `2 * spacing` are kept as recorded; wider pairs
/// are filled via [`interpolate_points`]. Point order is preserved and the
/// segment's endpoints always survive unchanged. Returns a new segment.
pub fn resample_segment(
    segment: &TrackSegment,
    spacing: f64,
    strategy: ExtensionStrategy,
) -> TrackSegment {
    if segment.len() < 2 {
        return segment.clone();
    }

    let mut resampled: Vec<TrackPoint> = Vec::with_capacity(segment.len());
    for (idx, pair) in segment.points.windows(2).enumerate() {
        match interpolate_points(&pair[0], &pair[1], spacing, strategy) {
            Some(filled) => {
                if idx == 0 {
                    resampled.extend(filled);
                } else {
                    // The pair's first point is already in place
                    resampled.extend(filled.into_iter().skip(1));
                }
            }
            None => {
                if idx == 0 {
                    resampled.push(pair[0].clone());
                }
                resampled.push(pair[1].clone());
            }
        }
    }

    debug!(
        "Resampled segment from {} to {} points at {:.1} m spacing",
        segment.len(),
        resampled.len(),
        spacing
    );
    TrackSegment::new(resampled)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::latitude_at_distance;
    use crate::GpsPoint;

    /// Two points `meters` apart on the same meridian.
    fn point_pair(meters: f64) -> (TrackPoint, TrackPoint) {
        let start = TrackPoint::new(48.0, 7.85);
        let end_lat = latitude_at_distance(&start.position(), meters, true);
        (start, TrackPoint::new(end_lat, 7.85))
    }

    #[test]
    fn test_interpolation_fills_wide_gap() {
        let (start, end) = point_pair(350.0);
        let points =
            interpolate_points(&start, &end, 100.0, ExtensionStrategy::CopyForward).unwrap();

        // floor(350 / 100) + 1 endpoints-inclusive points
        assert_eq!(points.len(), 4);
        assert_eq!(points[0], start);
        assert_eq!(points.last().unwrap(), &end);

        for pair in points.windows(2) {
            let step = haversine_distance(&pair[0].position(), &pair[1].position());
            assert!((step - 350.0 / 3.0).abs() < 1.0, "step was {}", step);
        }
    }

    #[test]
    fn test_interpolation_noop_below_twice_spacing() {
        let (start, end) = point_pair(150.0);
        assert!(interpolate_points(&start, &end, 100.0, ExtensionStrategy::CopyForward).is_none());
    }

    #[test]
    fn test_interpolates_elevation_and_time() {
        let (mut start, mut end) = point_pair(250.0);
        start.elevation = Some(100.0);
        start.time = Some(1_000);
        end.elevation = Some(200.0);
        end.time = Some(1_100);

        let points =
            interpolate_points(&start, &end, 100.0, ExtensionStrategy::CopyForward).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[1].elevation, Some(150.0));
        assert_eq!(points[1].time, Some(1_050));
    }

    #[test]
    fn test_missing_elevation_stays_missing() {
        let (mut start, end) = point_pair(250.0);
        start.elevation = Some(100.0);

        let points =
            interpolate_points(&start, &end, 100.0, ExtensionStrategy::CopyForward).unwrap();
        assert_eq!(points[1].elevation, None);
        assert_eq!(points[1].time, None);
    }

    #[test]
    fn test_extension_strategies() {
        let (mut start, mut end) = point_pair(450.0);
        start.extensions.insert("heartrate".to_string(), 100.0);
        end.extensions.insert("heartrate".to_string(), 200.0);
        start.extensions.insert("cadence".to_string(), 80.0);

        // floor(450 / 100) = 4 steps; intermediates at ratios 0.25, 0.5, 0.75
        let copied =
            interpolate_points(&start, &end, 100.0, ExtensionStrategy::CopyForward).unwrap();
        assert_eq!(copied.len(), 5);
        assert_eq!(copied[1].extensions["heartrate"], 100.0);
        assert_eq!(copied[3].extensions["heartrate"], 100.0);
        // Copy-forward carries keys the trailing endpoint lacks
        assert_eq!(copied[1].extensions["cadence"], 80.0);

        let met = interpolate_points(&start, &end, 100.0, ExtensionStrategy::MeetCenter).unwrap();
        assert_eq!(met[1].extensions["heartrate"], 100.0);
        assert_eq!(met[3].extensions["heartrate"], 200.0);
        assert!(!met[1].extensions.contains_key("cadence"));

        let linear = interpolate_points(&start, &end, 100.0, ExtensionStrategy::Linear).unwrap();
        assert_eq!(linear[1].extensions["heartrate"], 125.0);
        assert_eq!(linear[3].extensions["heartrate"], 175.0);
    }

    #[test]
    fn test_resample_segment_tightens_spacing() {
        let origin = GpsPoint::new(48.0, 7.85);
        let mid = latitude_at_distance(&origin, 530.0, true);
        let far = latitude_at_distance(&GpsPoint::new(mid, 7.85), 40.0, true);
        let segment = TrackSegment::from_coordinates(&[(48.0, 7.85), (mid, 7.85), (far, 7.85)]);

        let resampled = resample_segment(&segment, 50.0, ExtensionStrategy::CopyForward);

        // First pair gets floor(530 / 50) = 10 steps of 53 m, second pair
        // (40 m < 2 * 50 m) is kept as-is
        assert_eq!(resampled.len(), 12);
        assert!(resampled.max_point_spacing() < 54.0);
        assert_eq!(resampled.points[0], segment.points[0]);
        assert_eq!(resampled.points.last(), segment.points.last());
    }

    #[test]
    fn test_resample_keeps_dense_segment_points() {
        let segment = TrackSegment::from_coordinates(&[(48.0, 7.85), (48.0001, 7.85)]);
        let resampled = resample_segment(&segment, 50.0, ExtensionStrategy::CopyForward);
        assert_eq!(resampled, segment);
    }

    #[test]
    fn test_resample_short_segments_untouched() {
        let single = TrackSegment::from_coordinates(&[(48.0, 7.85)]);
        assert_eq!(
            resample_segment(&single, 50.0, ExtensionStrategy::CopyForward),
            single
        );
        assert!(
            resample_segment(&TrackSegment::default(), 50.0, ExtensionStrategy::CopyForward)
                .is_empty()
        );
    }
}
