//! # Track Overlap
//!
//! Grid-based detection of shared paths between GPS track segments.
//!
//! This library provides:
//! - Segment-vs-segment overlap detection on a discretized ground grid
//! - Location and direction of each match relative to the base segment
//! - Track summary metrics (climb/descent, moving/stopped split)
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel batch comparison with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use track_overlap::{find_track_overlap, OverlapConfig, TrackSegment, SHARED_BIN_CACHE};
//!
//! // A short ride, and its middle part as recorded by someone else
//! let base = TrackSegment::from_coordinates(&[
//!     (48.0000, 7.8500),
//!     (48.0005, 7.8507),
//!     (48.0010, 7.8514),
//!     (48.0015, 7.8521),
//!     (48.0020, 7.8528),
//!     (48.0025, 7.8535),
//! ]);
//! let candidate = base.slice(1, 4);
//!
//! let overlaps =
//!     find_track_overlap(&base, &candidate, &OverlapConfig::default(), &SHARED_BIN_CACHE)
//!         .unwrap();
//!
//! assert_eq!(overlaps.len(), 1);
//! assert!(!overlaps[0].inverse);
//! println!("{}", overlaps[0]);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TrackOverlapError};

// Geographic primitives (distance, destination points, nearest point)
pub mod geo_utils;
pub use geo_utils::{
    bounds_overlap, haversine_distance, latitude_at_distance, longitude_at_distance, nearest_point,
};

// LRU cache for efficient memory management
pub mod lru_cache;

// Grid binner (bin-edge ladders, memoized in a shared cache)
pub mod grid;
pub use grid::{derive_plate_bins, BinCache, PlateBins, SHARED_BIN_CACHE};

// Occupancy plates (rasterization with sliding-window de-duplication)
pub mod plate;
pub use plate::{rasterize, Plate};

// Track data model (points, segments, tracks)
pub mod track;
pub use track::{PointDistance, Track, TrackPoint, TrackSegment};

// Gap resampling for sparse recordings
pub mod interpolation;
pub use interpolation::{resample_segment, ExtensionStrategy};

// Overlap scoring, location and orientation
pub mod overlap;
#[cfg(feature = "parallel")]
pub use overlap::find_overlaps_batch;
pub use overlap::{
    check_bound_overlap, find_segment_overlap, find_track_overlap, score_plates, SegmentOverlap,
};

// Segment summary metrics (elevation, moving/stopped)
pub mod metrics;
pub use metrics::{
    elevation_metrics, summarize_segment, ElevationMetrics, SegmentSummary, SummaryConfig,
};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use track_overlap::GpsPoint;
/// let point = GpsPoint::new(48.0, 7.85); // Freiburg
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box of a point sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Check whether a point lies inside the box, borders included.
    pub fn contains(&self, point: &GpsPoint) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lng
            && point.longitude <= self.max_lng
    }

    /// Grow the box by a ground distance in meters on every side.
    ///
    /// The margin is converted to degrees at the box corners, so a 50 m
    /// margin is 50 m on the ground regardless of latitude.
    pub fn expanded(&self, margin_m: f64) -> Bounds {
        let min_corner = GpsPoint::new(self.min_lat, self.min_lng);
        let max_corner = GpsPoint::new(self.max_lat, self.max_lng);
        Bounds {
            min_lat: latitude_at_distance(&min_corner, margin_m, false),
            max_lat: latitude_at_distance(&max_corner, margin_m, true),
            min_lng: longitude_at_distance(&min_corner, margin_m, false),
            max_lng: longitude_at_distance(&max_corner, margin_m, true),
        }
    }
}

/// Configuration for the overlap pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapConfig {
    /// Edge length of a grid cell in meters. Smaller cells are stricter
    /// about what counts as the same path.
    /// Default: 50.0 meters
    pub grid_width: f64,

    /// Minimum fraction of the candidate's occupied cells the base must
    /// share for a match to be accepted.
    /// Default: 0.75
    pub overlap_threshold: f64,

    /// Length of the sliding window, in cells, used to suppress repeated
    /// hits on a recently-seen cell during rasterization.
    /// Default: 5
    pub dedupe_window: usize,

    /// Two inside-runs of the base separated by at most this many outside
    /// points are treated as one sub-segment.
    /// Default: 5
    pub merge_gap: usize,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            grid_width: 50.0,
            overlap_threshold: 0.75,
            dedupe_window: 5,
            merge_gap: 5,
        }
    }
}

impl OverlapConfig {
    /// Reject parameter combinations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.grid_width.is_finite() || self.grid_width <= 0.0 {
            return Err(TrackOverlapError::ConfigError {
                message: "grid width must be a positive number of meters".to_string(),
            });
        }
        if !self.overlap_threshold.is_finite() || !(0.0..=1.0).contains(&self.overlap_threshold) {
            return Err(TrackOverlapError::ConfigError {
                message: "overlap threshold must lie in [0, 1]".to_string(),
            });
        }
        if self.dedupe_window == 0 {
            return Err(TrackOverlapError::ConfigError {
                message: "de-duplication window must hold at least one cell".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_points() -> Vec<GpsPoint> {
        vec![
            GpsPoint::new(48.0, 7.85),
            GpsPoint::new(48.001, 7.851),
            GpsPoint::new(48.002, 7.853),
            GpsPoint::new(48.003, 7.856),
        ]
    }

    #[test]
    fn test_gps_point_validation() {
        assert!(GpsPoint::new(48.0, 7.85).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_bounds_from_points() {
        let bounds = Bounds::from_points(&sample_points()).unwrap();
        assert_eq!(bounds.min_lat, 48.0);
        assert_eq!(bounds.max_lat, 48.003);
        assert_eq!(bounds.min_lng, 7.85);
        assert_eq!(bounds.max_lng, 7.856);

        let center = bounds.center();
        assert!((center.latitude - 48.0015).abs() < 1e-12);
        assert!((center.longitude - 7.853).abs() < 1e-12);

        assert!(Bounds::from_points(&[]).is_none());
    }

    #[test]
    fn test_bounds_contains_is_inclusive() {
        let bounds = Bounds::from_points(&sample_points()).unwrap();
        assert!(bounds.contains(&GpsPoint::new(48.0015, 7.853)));
        assert!(bounds.contains(&GpsPoint::new(48.0, 7.85)));
        assert!(bounds.contains(&GpsPoint::new(48.003, 7.856)));
        assert!(!bounds.contains(&GpsPoint::new(48.0035, 7.853)));
        assert!(!bounds.contains(&GpsPoint::new(48.0015, 7.8499)));
    }

    #[test]
    fn test_bounds_expanded_by_ground_distance() {
        let bounds = Bounds::from_points(&sample_points()).unwrap();
        let expanded = bounds.expanded(50.0);

        let south = haversine_distance(
            &GpsPoint::new(bounds.min_lat, bounds.min_lng),
            &GpsPoint::new(expanded.min_lat, bounds.min_lng),
        );
        let north = haversine_distance(
            &GpsPoint::new(bounds.max_lat, bounds.max_lng),
            &GpsPoint::new(expanded.max_lat, bounds.max_lng),
        );
        let west = haversine_distance(
            &GpsPoint::new(bounds.min_lat, bounds.min_lng),
            &GpsPoint::new(bounds.min_lat, expanded.min_lng),
        );
        assert!((south - 50.0).abs() < 0.1, "south margin was {}", south);
        assert!((north - 50.0).abs() < 0.1, "north margin was {}", north);
        assert!((west - 50.0).abs() < 0.1, "west margin was {}", west);

        // A point 30 m outside the original box falls inside the margin
        let outside = GpsPoint::new(
            latitude_at_distance(&GpsPoint::new(bounds.max_lat, 7.853), 30.0, true),
            7.853,
        );
        assert!(!bounds.contains(&outside));
        assert!(expanded.contains(&outside));
    }

    #[test]
    fn test_overlap_config_validation() {
        assert!(OverlapConfig::default().validate().is_ok());

        let zero_width = OverlapConfig {
            grid_width: 0.0,
            ..OverlapConfig::default()
        };
        assert!(zero_width.validate().is_err());

        let bad_threshold = OverlapConfig {
            overlap_threshold: 1.5,
            ..OverlapConfig::default()
        };
        assert!(bad_threshold.validate().is_err());

        let zero_window = OverlapConfig {
            dedupe_window: 0,
            ..OverlapConfig::default()
        };
        assert!(zero_window.validate().is_err());
    }
}
