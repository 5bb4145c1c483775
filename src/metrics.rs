//! # Track Metrics
//!
//! Per-segment summary computations the overlap engine itself never needs
//! but its callers almost always do: cumulated climb and descent with
//! per-point slopes, and a moving/stopped split of time and distance with
//! outlier-capped speed figures.
//!
//! Speeds use the stopped-speed threshold in km/h familiar from recording
//! devices; everything else is meters and seconds. Segments without
//! timestamps still get distance figures, just no times or speeds.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackOverlapError};
use crate::geo_utils::haversine_distance;
use crate::track::{TrackPoint, TrackSegment};

// ============================================================================
// Elevation
// ============================================================================

/// Climb, descent and per-point slopes of a point sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevationMetrics {
    /// Sum of positive elevation changes in meters
    pub uphill: f64,
    /// Sum of negative elevation changes in meters, as a positive number
    pub downhill: f64,
    /// Slope at each point in degrees, one entry per input point. The first
    /// entry is always 0.0; a physically impossible step (elevation change
    /// larger than the point distance) yields NaN
    pub slopes: Vec<f64>,
}

/// Compute climb, descent and slopes over a point sequence.
///
/// Every point must carry an elevation; incomplete data is a typed error
/// rather than a silent gap, so callers can decide whether to drop the
/// offending points first (see [`summarize_segment`]).
pub fn elevation_metrics(points: &[TrackPoint]) -> Result<ElevationMetrics> {
    let missing = points.iter().filter(|p| p.elevation.is_none()).count();
    if missing > 0 {
        return Err(TrackOverlapError::MissingElevation {
            point_count: points.len(),
            missing,
        });
    }

    let mut uphill = 0.0;
    let mut downhill = 0.0;
    let mut slopes = Vec::with_capacity(points.len());
    if !points.is_empty() {
        slopes.push(0.0);
    }

    for pair in points.windows(2) {
        let (Some(start), Some(end)) = (pair[0].elevation, pair[1].elevation) else {
            continue;
        };
        let delta = end - start;
        if delta > 0.0 {
            uphill += delta;
        } else {
            downhill += delta;
        }

        let distance = haversine_distance(&pair[0].position(), &pair[1].position());
        if distance == 0.0 {
            slopes.push(0.0);
            continue;
        }
        let ratio = delta / distance;
        if ratio.abs() > 1.0 {
            slopes.push(f64::NAN);
        } else {
            slopes.push(ratio.asin().to_degrees());
        }
    }

    Ok(ElevationMetrics {
        uphill,
        downhill: downhill.abs(),
        slopes,
    })
}

// ============================================================================
// Moving/stopped summary
// ============================================================================

/// Parameters for [`summarize_segment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Speeds at or below this threshold, in km/h, count as stopped
    pub stopped_speed_threshold: f64,
    /// Speeds above this percentile of all moving speeds are treated as
    /// recording outliers and excluded from the max/avg figures
    pub max_speed_percentile: f64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            stopped_speed_threshold: 1.0,
            max_speed_percentile: 95.0,
        }
    }
}

impl SummaryConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.stopped_speed_threshold.is_finite() || self.stopped_speed_threshold < 0.0 {
            return Err(TrackOverlapError::ConfigError {
                message: "stopped speed threshold must be a non-negative number of km/h"
                    .to_string(),
            });
        }
        if !self.max_speed_percentile.is_finite()
            || !(0.0..=100.0).contains(&self.max_speed_percentile)
        {
            return Err(TrackOverlapError::ConfigError {
                message: "max speed percentile must lie in [0, 100]".to_string(),
            });
        }
        Ok(())
    }
}

/// Moving/stopped split of a segment with speed and elevation figures.
///
/// Speed fields are `None` when the segment carries no usable timestamps,
/// elevation fields when no point carries an elevation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub moving_time_s: f64,
    pub total_time_s: f64,
    /// Distance covered while moving, in meters
    pub moving_distance: f64,
    pub total_distance: f64,
    /// Fastest moving speed below the percentile cap, in m/s
    pub max_speed: Option<f64>,
    /// Mean moving speed below the percentile cap, in m/s
    pub avg_speed: Option<f64>,
    pub min_elevation: Option<f64>,
    pub max_elevation: Option<f64>,
    pub uphill: Option<f64>,
    pub downhill: Option<f64>,
}

/// Summarize a segment into moving/stopped figures.
///
/// Point pairs are classified as stopped when their speed is at or below
/// the threshold; speeds are collected for moving pairs only, and the
/// max/avg figures ignore speeds above the configured percentile of the
/// collected values (GPS spikes otherwise dominate the maximum). Distances
/// use the elevation delta when both ends of a pair carry one.
///
/// Pairs without timestamps, with non-increasing timestamps or with zero
/// distance contribute nothing. A segment with no timed pair at all yields
/// a distance-only summary: all of it counts as moving, times are zero and
/// speeds are `None`.
pub fn summarize_segment(segment: &TrackSegment, config: &SummaryConfig) -> Result<SegmentSummary> {
    config.validate()?;

    let timed = segment
        .points
        .windows(2)
        .any(|pair| pair[0].time.is_some() && pair[1].time.is_some());

    let mut moving_time = 0.0;
    let mut stopped_time = 0.0;
    let mut moving_distance = 0.0;
    let mut stopped_distance = 0.0;
    let mut speeds: Vec<f64> = Vec::new();

    if timed {
        let threshold_ms = config.stopped_speed_threshold / 3.6;
        for pair in segment.points.windows(2) {
            let (Some(start), Some(end)) = (pair[0].time, pair[1].time) else {
                continue;
            };
            let seconds = (end - start) as f64;
            if seconds <= 0.0 {
                continue;
            }
            let distance = pair_distance(&pair[0], &pair[1]);
            if distance <= 0.0 {
                continue;
            }

            let speed = distance / seconds;
            if speed <= threshold_ms {
                stopped_time += seconds;
                stopped_distance += distance;
            } else {
                moving_time += seconds;
                moving_distance += distance;
                speeds.push(speed);
            }
        }
    } else {
        for pair in segment.points.windows(2) {
            moving_distance += pair_distance(&pair[0], &pair[1]);
        }
    }

    let (max_speed, avg_speed) = if speeds.is_empty() {
        (None, None)
    } else {
        speeds.sort_by(f64::total_cmp);
        let cap = percentile(&speeds, config.max_speed_percentile);
        debug!(
            "Speed cap {:.2} m/s at the {}th percentile of {} sample(s)",
            cap,
            config.max_speed_percentile,
            speeds.len()
        );
        let retained: Vec<f64> = speeds.iter().copied().filter(|s| *s <= cap).collect();
        let max = retained.iter().copied().fold(f64::MIN, f64::max);
        let avg = retained.iter().sum::<f64>() / retained.len() as f64;
        (Some(max), Some(avg))
    };

    let elevated: Vec<TrackPoint> = segment
        .points
        .iter()
        .filter(|p| p.elevation.is_some())
        .cloned()
        .collect();
    let (min_elevation, max_elevation, uphill, downhill) = if elevated.is_empty() {
        (None, None, None, None)
    } else {
        let elevations = elevated.iter().filter_map(|p| p.elevation);
        let min = elevations.clone().fold(f64::MAX, f64::min);
        let max = elevations.fold(f64::MIN, f64::max);
        let metrics = elevation_metrics(&elevated)?;
        (
            Some(min),
            Some(max),
            Some(metrics.uphill),
            Some(metrics.downhill),
        )
    };

    Ok(SegmentSummary {
        moving_time_s: moving_time,
        total_time_s: moving_time + stopped_time,
        moving_distance,
        total_distance: moving_distance + stopped_distance,
        max_speed,
        avg_speed,
        min_elevation,
        max_elevation,
        uphill,
        downhill,
    })
}

/// 2D point distance, or 3D when both points carry an elevation.
fn pair_distance(a: &TrackPoint, b: &TrackPoint) -> f64 {
    let flat = haversine_distance(&a.position(), &b.position());
    match (a.elevation, b.elevation) {
        (Some(start), Some(end)) => {
            let delta = end - start;
            (flat * flat + delta * delta).sqrt()
        }
        _ => flat,
    }
}

/// Linear-interpolated percentile of an ascending-sorted, non-empty slice.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = (pct / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (rank - lo as f64) * (sorted[hi] - sorted[lo])
    }
}

// ============================================================================
// Tests
// ============================================================================
