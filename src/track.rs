//! # Track Model
//!
//! Concrete data model for recorded GPS tracks: points with optional
//! elevation, timestamps and named extension values, grouped into segments,
//! grouped into tracks. Sources as different as parsed files, in-memory
//! coordinate lists and single wrapped segments all funnel into the same
//! types through factory constructors; the overlap engine only ever reads
//! the point sequences.

use std::collections::HashMap;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{OptionExt, Result, TrackOverlapError};
use crate::geo_utils::{haversine_distance, nearest_point, polyline_length};
use crate::grid::BinCache;
use crate::overlap::find_track_overlap;
use crate::{Bounds, GpsPoint, OverlapConfig};

// ============================================================================
// Points
// ============================================================================

/// A single recorded GPS point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Elevation in meters
    pub elevation: Option<f64>,
    /// Unix timestamp in seconds
    pub time: Option<i64>,
    /// Named extension values (heart rate, cadence, power, ...)
    pub extensions: HashMap<String, f64>,
}

impl TrackPoint {
    /// Create a bare point from coordinates in degrees.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation: None,
            time: None,
            extensions: HashMap::new(),
        }
    }

    /// Create a point with an elevation in meters.
    pub fn with_elevation(latitude: f64, longitude: f64, elevation: f64) -> Self {
        Self {
            elevation: Some(elevation),
            ..Self::new(latitude, longitude)
        }
    }

    /// The point's 2D position.
    pub fn position(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }

    /// Check that coordinates are within valid GPS ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Nearest point of a track to a query position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointDistance {
    pub point: TrackPoint,
    /// Distance from the query position in meters
    pub distance: f64,
    /// Index counting across all segments of the track
    pub point_idx_abs: usize,
    pub segment_idx: usize,
    pub segment_point_idx: usize,
}

// ============================================================================
// Segments
// ============================================================================

/// An ordered sequence of track points.
///
/// The overlap engine treats segments as read-only input and produces new
/// segments as output; nothing here mutates a segment in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackSegment {
    pub points: Vec<TrackPoint>,
}

impl TrackSegment {
    pub fn new(points: Vec<TrackPoint>) -> Self {
        Self { points }
    }

    /// Build a segment from bare (latitude, longitude) pairs.
    pub fn from_coordinates(coords: &[(f64, f64)]) -> Self {
        Self::new(
            coords
                .iter()
                .map(|(lat, lng)| TrackPoint::new(*lat, *lng))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The 2D positions of all points.
    pub fn positions(&self) -> Vec<GpsPoint> {
        self.points.iter().map(TrackPoint::position).collect()
    }

    /// Bounding box of the segment.
    ///
    /// Errors when the segment is empty or the box degenerates to a line
    /// (all points share one latitude or one longitude) — a degenerate box
    /// cannot carry a grid and must not be confused with "no overlap".
    pub fn bounds(&self) -> Result<Bounds> {
        validated_bounds(&self.positions())
    }

    /// Total length of the segment in meters.
    pub fn total_distance(&self) -> f64 {
        polyline_length(&self.positions())
    }

    /// Largest gap between consecutive points in meters. Zero for segments
    /// with fewer than two points.
    pub fn max_point_spacing(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| haversine_distance(&pair[0].position(), &pair[1].position()))
            .fold(0.0, f64::max)
    }

    /// New segment keeping only points inside `bounds` (inclusive on both
    /// axes). Point order is preserved.
    pub fn crop_to_bounds(&self, bounds: &Bounds) -> TrackSegment {
        TrackSegment::new(
            self.points
                .iter()
                .filter(|point| bounds.contains(&point.position()))
                .cloned()
                .collect(),
        )
    }

    /// Inside-the-box flag for every point, in point order.
    pub fn points_inside_bounds(&self, bounds: &Bounds) -> Vec<bool> {
        self.points
            .iter()
            .map(|point| bounds.contains(&point.position()))
            .collect()
    }

    /// New segment holding the inclusive index range `[start, end]`.
    /// Ranges outside the segment yield an empty segment.
    pub fn slice(&self, start: usize, end: usize) -> TrackSegment {
        TrackSegment::new(
            self.points
                .get(start..=end)
                .map(<[TrackPoint]>::to_vec)
                .unwrap_or_default(),
        )
    }
}

fn validated_bounds(positions: &[GpsPoint]) -> Result<Bounds> {
    let bounds =
        Bounds::from_points(positions).ok_or_invalid_bounds(0, "point sequence is empty")?;
    if bounds.min_lat == bounds.max_lat {
        return Err(TrackOverlapError::InvalidBounds {
            point_count: positions.len(),
            message: "all points share one latitude, box has no north-south extent".to_string(),
        });
    }
    if bounds.min_lng == bounds.max_lng {
        return Err(TrackOverlapError::InvalidBounds {
            point_count: positions.len(),
            message: "all points share one longitude, box has no east-west extent".to_string(),
        });
    }
    Ok(bounds)
}

// ============================================================================
// Tracks
// ============================================================================

/// A recorded GPS track: one or more segments, optionally named.
///
/// Construction paths cover the common sources: pre-built segments,
/// a single segment, a flat point list, or bare coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub name: Option<String>,
    pub segments: Vec<TrackSegment>,
}

impl Track {
    pub fn new(segments: Vec<TrackSegment>) -> Self {
        Self {
            name: None,
            segments,
        }
    }

    /// Wrap a single segment.
    pub fn from_segment(segment: TrackSegment) -> Self {
        Self::new(vec![segment])
    }

    /// Wrap a flat point list as a single-segment track.
    pub fn from_points(points: Vec<TrackPoint>) -> Self {
        Self::from_segment(TrackSegment::new(points))
    }

    /// Build a single-segment track from bare (latitude, longitude) pairs.
    pub fn from_coordinates(coords: &[(f64, f64)]) -> Self {
        Self::from_segment(TrackSegment::from_coordinates(coords))
    }

    /// Attach a display name.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn segment(&self, index: usize) -> Option<&TrackSegment> {
        self.segments.get(index)
    }

    /// Total length across all segments in meters.
    pub fn total_distance(&self) -> f64 {
        self.segments.iter().map(TrackSegment::total_distance).sum()
    }

    /// Bounding box across all segments, with the same validity rules as
    /// [`TrackSegment::bounds`].
    pub fn bounds(&self) -> Result<Bounds> {
        let positions: Vec<GpsPoint> = self
            .segments
            .iter()
            .flat_map(TrackSegment::positions)
            .collect();
        validated_bounds(&positions)
    }

    /// Point of this track closest to `target`, across all segments.
    pub fn nearest_point(&self, target: &GpsPoint) -> Result<PointDistance> {
        let mut best: Option<PointDistance> = None;
        let mut offset = 0usize;
        for (segment_idx, segment) in self.segments.iter().enumerate() {
            if let Some((idx, distance)) = nearest_point(&segment.positions(), target) {
                if best.as_ref().map_or(true, |b| distance < b.distance) {
                    best = Some(PointDistance {
                        point: segment.points[idx].clone(),
                        distance,
                        point_idx_abs: offset + idx,
                        segment_idx,
                        segment_point_idx: idx,
                    });
                }
            }
            offset += segment.len();
        }
        best.ok_or_invalid_bounds(0, "track has no points")
    }

    /// Find where a segment of `other` recurs inside a segment of this
    /// track.
    ///
    /// Both segments are resampled to half the grid width when their point
    /// spacing exceeds the grid width (sparse tracks skip grid cells and
    /// underestimate overlap otherwise). Returns one materialized
    /// single-segment track per accepted match with its overlap ratio and
    /// direction flag, best ratio first. No overlap found is an empty
    /// vector, not an error.
    pub fn find_overlap_with(
        &self,
        segment_index: usize,
        other: &Track,
        other_segment_index: usize,
        config: &OverlapConfig,
        cache: &BinCache,
    ) -> Result<Vec<(Track, f64, bool)>> {
        let base = self
            .segment(segment_index)
            .ok_or_else(|| TrackOverlapError::ConfigError {
                message: format!("track has no segment {}", segment_index),
            })?;
        let candidate =
            other
                .segment(other_segment_index)
                .ok_or_else(|| TrackOverlapError::ConfigError {
                    message: format!("match track has no segment {}", other_segment_index),
                })?;

        let spacing = config.grid_width / 2.0;
        let base = resample_if_sparse(base, config.grid_width, spacing);
        let candidate = resample_if_sparse(candidate, config.grid_width, spacing);

        let overlaps = find_track_overlap(&base, &candidate, config, cache)?;
        info!(
            "Track '{}': {} overlapping sub-segment(s) accepted",
            self.name.as_deref().unwrap_or("unnamed"),
            overlaps.len()
        );

        Ok(overlaps
            .into_iter()
            .map(|overlap| {
                let matched = base.slice(overlap.start_idx, overlap.end_idx);
                (Track::from_segment(matched), overlap.overlap, overlap.inverse)
            })
            .collect())
    }
}

fn resample_if_sparse(segment: &TrackSegment, grid_width: f64, spacing: f64) -> TrackSegment {
    if segment.max_point_spacing() > grid_width {
        crate::interpolation::resample_segment(
            segment,
            spacing,
            crate::interpolation::ExtensionStrategy::CopyForward,
        )
    } else {
        segment.clone()
    }
}

// ============================================================================
// Tests
// ============================================================================
