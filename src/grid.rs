//! # Grid Binner
//!
//! Converts a bounding box and a target cell width into discrete bin-edge
//! ladders, one per axis. Two segments rasterized against the same ladders
//! produce plates of identical shape, which is what makes plates addable
//! cell by cell.
//!
//! Ladder derivation is a pure function of five scalars (width + box), so
//! results are memoized in a bounded, thread-safe [`BinCache`]. A process
//! wide [`SHARED_BIN_CACHE`] is provided for callers that do not manage
//! their own; tests and long-running services can construct and reset a
//! private one.

use std::sync::{Arc, Mutex, PoisonError};

use log::debug;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackOverlapError};
use crate::geo_utils::{haversine_distance, latitude_at_distance, longitude_at_distance};
use crate::lru_cache::LruCache;
use crate::GpsPoint;

// ============================================================================
// Bin-edge ladders
// ============================================================================

/// Bin-edge ladders spanning a bounding box.
///
/// Each edge is a full coordinate: the latitude ladder varies latitude and
/// pins longitude at the anchor, the longitude ladder does the opposite.
/// Both ladders share the anchor placed half a cell south-west of the box
/// minimum, so the box's corner point lands centered in the first cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateBins {
    /// South-to-north edge anchors, ascending latitude
    pub lat_edges: Vec<GpsPoint>,
    /// West-to-east edge anchors, ascending longitude
    pub lng_edges: Vec<GpsPoint>,
}

impl PlateBins {
    /// Plate dimensions produced by these ladders, as (rows, cols).
    pub fn shape(&self) -> (usize, usize) {
        (self.lat_edges.len(), self.lng_edges.len())
    }
}

/// Derive bin-edge ladders for a bounding box at the given cell width.
///
/// The covered extent per axis is the box extent plus one cell width, and
/// the number of cells is that extent divided by the width, rounded to the
/// nearest integer (never truncated). Edges chain cumulatively from the
/// anchor: each rung is one `grid_width` step from the previous rung via
/// the destination-point primitives, so per-step rounding accumulates over
/// the ladder rather than being recomputed from the origin. Callers must
/// pass an ordered box (`min <= max` on both axes).
///
/// # Example
/// ```
/// use track_overlap::grid::derive_plate_bins;
///
/// let bins = derive_plate_bins(100.0, 47.99, 7.85, 48.0, 7.87).unwrap();
/// assert!(bins.lat_edges[0].latitude < 47.99);
/// assert!(bins.lat_edges.last().unwrap().latitude > 48.0);
/// ```
pub fn derive_plate_bins(
    grid_width: f64,
    min_lat: f64,
    min_lng: f64,
    max_lat: f64,
    max_lng: f64,
) -> Result<PlateBins> {
    if !grid_width.is_finite() || grid_width <= 0.0 {
        return Err(TrackOverlapError::ConfigError {
            message: format!("grid width must be positive meters, got {}", grid_width),
        });
    }

    let min_corner = GpsPoint::new(min_lat, min_lng);
    let span_lat =
        grid_width + haversine_distance(&min_corner, &GpsPoint::new(max_lat, min_lng));
    let span_lng =
        grid_width + haversine_distance(&min_corner, &GpsPoint::new(min_lat, max_lng));
    let cells_lat = (span_lat / grid_width).round() as usize;
    let cells_lng = (span_lng / grid_width).round() as usize;

    // Anchor half a cell south-west of the box minimum
    let anchor = GpsPoint::new(
        latitude_at_distance(&min_corner, grid_width / 2.0, false),
        longitude_at_distance(&min_corner, grid_width / 2.0, false),
    );

    let mut lat_edges = Vec::with_capacity(cells_lat + 1);
    let mut rung = anchor;
    lat_edges.push(rung);
    for _ in 0..cells_lat {
        rung = GpsPoint::new(latitude_at_distance(&rung, grid_width, true), rung.longitude);
        lat_edges.push(rung);
    }

    let mut lng_edges = Vec::with_capacity(cells_lng + 1);
    let mut rung = anchor;
    lng_edges.push(rung);
    for _ in 0..cells_lng {
        rung = GpsPoint::new(rung.latitude, longitude_at_distance(&rung, grid_width, true));
        lng_edges.push(rung);
    }

    debug!(
        "Derived {}x{} bin ladders at {} m for box ({}, {}) - ({}, {})",
        lat_edges.len(),
        lng_edges.len(),
        grid_width,
        min_lat,
        min_lng,
        max_lat,
        max_lng
    );

    Ok(PlateBins {
        lat_edges,
        lng_edges,
    })
}

/// Cell index of `value` along an ascending edge ladder.
///
/// Binary search, 0-indexed: a value in `[edges[i], edges[i+1])` belongs to
/// cell `i`, and a value at or past the last edge belongs to the last cell.
/// Values below the first edge clamp to cell 0; pipeline callers crop their
/// input to the covered box first, so the clamps never fire there.
pub(crate) fn digitize(value: f64, edges: &[f64]) -> usize {
    let rank = edges.partition_point(|edge| *edge <= value);
    rank.saturating_sub(1).min(edges.len().saturating_sub(1))
}

// ============================================================================
// Memoization cache
// ============================================================================

/// Cache key: the five scalar inputs of [`derive_plate_bins`], compared by
/// exact bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BinKey([u64; 5]);

impl BinKey {
    fn new(grid_width: f64, min_lat: f64, min_lng: f64, max_lat: f64, max_lng: f64) -> Self {
        Self([
            grid_width.to_bits(),
            min_lat.to_bits(),
            min_lng.to_bits(),
            max_lat.to_bits(),
            max_lng.to_bits(),
        ])
    }
}

/// Thread-safe, bounded memoization cache for derived bin ladders.
///
/// Overlap checks against the same candidate track repeat the same ladder
/// derivation; the cache turns those repeats into a map lookup. The input
/// domain (all bounding boxes) is unbounded, hence LRU eviction.
#[derive(Debug)]
pub struct BinCache {
    inner: Mutex<LruCache<BinKey, Arc<PlateBins>>>,
}

impl BinCache {
    /// Create a cache holding at most `capacity` ladder pairs.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Derive (or fetch) the ladders for a box at the given cell width.
    pub fn derive(
        &self,
        grid_width: f64,
        min_lat: f64,
        min_lng: f64,
        max_lat: f64,
        max_lng: f64,
    ) -> Result<Arc<PlateBins>> {
        let key = BinKey::new(grid_width, min_lat, min_lng, max_lat, max_lng);
        {
            let mut cache = self.lock();
            if let Some(bins) = cache.get_cloned(&key) {
                debug!("Bin ladder cache hit");
                return Ok(bins);
            }
        }

        let bins = Arc::new(derive_plate_bins(
            grid_width, min_lat, min_lng, max_lat, max_lng,
        )?);
        self.lock().insert(key, Arc::clone(&bins));
        Ok(bins)
    }

    /// Number of cached ladder pairs.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop all cached ladders.
    pub fn clear(&self) {
        self.lock().clear()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<BinKey, Arc<PlateBins>>> {
        // Cached ladders are immutable once inserted, so a poisoned lock
        // still guards consistent data
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for BinCache {
    fn default() -> Self {
        Self::new(128)
    }
}

/// Process-wide bin cache for callers that do not manage their own.
pub static SHARED_BIN_CACHE: Lazy<BinCache> = Lazy::new(BinCache::default);

// ============================================================================
// Tests
// ============================================================================
