//! # Overlap Detection
//!
//! Finds where one track segment's geometry recurs inside another. The
//! candidate segment defines a grid over its (expanded) bounding box; both
//! segments are rasterized onto that grid as normalized plates, and the
//! fraction of candidate cells also occupied by the base decides the match.
//! Accepted matches are located back in the base segment's point indices
//! with a forward/reverse direction flag.
//!
//! Two entry points:
//! - [`find_segment_overlap`] checks one base/candidate pair and assumes the
//!   base enters the candidate's region at most once.
//! - [`find_track_overlap`] is the driver for whole segments: it splits the
//!   base into sub-segments wherever it leaves the candidate's region, runs
//!   the core check per sub-segment, and reports every accepted match in
//!   absolute base indices.
//!
//! A base sub-segment that re-enters grid cells it already left (an
//! out-and-back within one sub-segment) is ambiguous: which occurrence is
//! meant cannot be decided here, so it is surfaced as a typed error rather
//! than resolved by picking one.

use std::fmt;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{OptionExt, Result, TrackOverlapError};
use crate::geo_utils::{bounds_overlap, nearest_point};
use crate::grid::BinCache;
use crate::plate::{rasterize, Plate};
use crate::track::{TrackPoint, TrackSegment};
use crate::OverlapConfig;

// ============================================================================
// Result type
// ============================================================================

/// An accepted overlap between a base and a candidate segment.
///
/// Indices address the base segment's points. `plate` is the summed
/// base + candidate plate, kept for diagnostics and visualization only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentOverlap {
    /// Fraction of the candidate's occupied cells also occupied by the base
    pub overlap: f64,
    /// Candidate runs opposite to the base's point order
    pub inverse: bool,
    /// Combined occupancy plate of both segments
    pub plate: Plate,
    /// First base point of the matched range
    pub start_point: TrackPoint,
    pub start_idx: usize,
    /// Last base point of the matched range
    pub end_point: TrackPoint,
    pub end_idx: usize,
}

impl fmt::Display for SegmentOverlap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Overlap {:.2}%, Inverse: {}, Plate: {:?}, Points: ({},{}) at id {} to ({},{}) at id {}",
            self.overlap * 100.0,
            self.inverse,
            self.plate.shape(),
            self.start_point.latitude,
            self.start_point.longitude,
            self.start_idx,
            self.end_point.latitude,
            self.end_point.longitude,
            self.end_idx,
        )
    }
}

// ============================================================================
// Scorer
// ============================================================================

/// Fraction of the candidate plate's occupied cells that the base plate
/// also occupies.
///
/// Both plates must be normalized (cell values in {0, 1}) and built over the
/// same bin ladders; the ladders are the caller's contract and cannot be
/// checked here. A cell of the elementwise sum equals 2 exactly when both
/// segments visited it.
///
/// # Example
/// ```
/// use track_overlap::{Plate, score_plates};
///
/// let plate = Plate::from_rows(vec![vec![1, 0], vec![0, 1]]).unwrap();
/// assert_eq!(score_plates(&plate, &plate).unwrap(), 1.0);
/// ```
pub fn score_plates(base: &Plate, candidate: &Plate) -> Result<f64> {
    debug_assert_eq!(
        base.shape(),
        candidate.shape(),
        "scored plates must share bin ladders"
    );

    let candidate_cells = candidate.occupied_cells();
    if candidate_cells == 0 {
        return Err(TrackOverlapError::EmptyCandidate);
    }

    let combined = base.combine(candidate);
    let overlap_cells = combined.values().iter().filter(|v| **v == 2).count();
    Ok(overlap_cells as f64 / candidate_cells as f64)
}

// ============================================================================
// Core engine: one base/candidate pair
// ============================================================================

/// Check a single base/candidate pair for overlap.
///
/// The candidate's bounding box, expanded by one grid width per side, fixes
/// the grid. The base is cropped to that box before rasterizing; orientation
/// is inferred from where the candidate's endpoints sit in the uncropped
/// base. A ratio below the acceptance threshold is a normal no-match
/// (`Ok(None)`), not an error.
///
/// The base must enter the candidate's region at most once. If its plate
/// holds any cell visited more than once after de-duplication, the match is
/// ambiguous and a [`TrackOverlapError::AmbiguousMatch`] is returned —
/// callers with multi-pass bases split them first (see
/// [`find_track_overlap`]).
pub fn find_segment_overlap(
    base: &TrackSegment,
    candidate: &TrackSegment,
    config: &OverlapConfig,
    cache: &BinCache,
) -> Result<Option<SegmentOverlap>> {
    config.validate()?;
    if candidate.is_empty() {
        return Err(TrackOverlapError::EmptyCandidate);
    }

    let bounds = candidate.bounds()?.expanded(config.grid_width);
    let cropped = base.crop_to_bounds(&bounds);
    if cropped.is_empty() {
        debug!("No base points inside the candidate's region");
        return Ok(None);
    }

    let plate_base = rasterize(
        &cropped,
        config.grid_width,
        &bounds,
        true,
        config.dedupe_window,
        cache,
    )?;
    let revisited = plate_base.revisited_cells();
    if revisited > 0 {
        return Err(TrackOverlapError::AmbiguousMatch {
            revisited_cells: revisited,
        });
    }

    let plate_candidate = rasterize(
        candidate,
        config.grid_width,
        &bounds,
        true,
        config.dedupe_window,
        cache,
    )?;

    let overlap = score_plates(&plate_base, &plate_candidate)?;
    debug!(
        "Overlap ratio {:.3} against threshold {:.3}",
        overlap, config.overlap_threshold
    );
    if overlap < config.overlap_threshold {
        return Ok(None);
    }

    // Candidate endpoints located in the uncropped base decide direction
    let positions = base.positions();
    let first = &candidate.points[0];
    let last = &candidate.points[candidate.len() - 1];
    let (first_idx, _) = nearest_point(&positions, &first.position())
        .ok_or_invalid_bounds(0, "base segment has no points")?;
    let (last_idx, _) = nearest_point(&positions, &last.position())
        .ok_or_invalid_bounds(0, "base segment has no points")?;

    let (inverse, start_idx, end_idx) = if last_idx > first_idx {
        (false, first_idx, last_idx)
    } else {
        (true, last_idx, first_idx)
    };

    Ok(Some(SegmentOverlap {
        overlap,
        inverse,
        plate: plate_base.combine(&plate_candidate),
        start_point: base.points[start_idx].clone(),
        start_idx,
        end_point: base.points[end_idx].clone(),
        end_idx,
    }))
}

// ============================================================================
// Driver: whole segments, multiple passes
// ============================================================================

/// Find every place a candidate segment recurs inside a base segment.
///
/// Base points are classified against the candidate's expanded bounding
/// box; consecutive inside-runs (bridging gaps of up to `merge_gap`
/// outside points) become independent sub-segments, each checked with
/// [`find_segment_overlap`]. Result indices are absolute in `base`.
///
/// Returns accepted overlaps sorted by ratio, best first. An empty vector
/// means no overlap was found; that is a normal outcome, not an error.
pub fn find_track_overlap(
    base: &TrackSegment,
    candidate: &TrackSegment,
    config: &OverlapConfig,
    cache: &BinCache,
) -> Result<Vec<SegmentOverlap>> {
    config.validate()?;
    if candidate.is_empty() {
        return Err(TrackOverlapError::EmptyCandidate);
    }

    let bounds = candidate.bounds()?.expanded(config.grid_width);
    let runs = inside_runs(&base.points_inside_bounds(&bounds), config.merge_gap);
    info!(
        "Base enters the candidate's region {} time(s)",
        runs.len()
    );

    let mut overlaps = Vec::new();
    for (run_start, run_end) in runs {
        let sub_base = base.slice(run_start, run_end);
        if let Some(mut overlap) = find_segment_overlap(&sub_base, candidate, config, cache)? {
            overlap.start_idx += run_start;
            overlap.end_idx += run_start;
            info!("Found: {}", overlap);
            overlaps.push(overlap);
        }
    }

    overlaps.sort_by(|a, b| b.overlap.total_cmp(&a.overlap));
    Ok(overlaps)
}

/// Indices of consecutive `true` runs, bridging gaps of up to `merge_gap`
/// falses between them. Ranges are inclusive.
fn inside_runs(flags: &[bool], merge_gap: usize) -> Vec<(usize, usize)> {
    let mut runs: Vec<(usize, usize)> = Vec::new();
    for (idx, flag) in flags.iter().enumerate() {
        if !flag {
            continue;
        }
        match runs.last_mut() {
            Some((_, end)) if idx - *end <= merge_gap + 1 => *end = idx,
            _ => runs.push((idx, idx)),
        }
    }
    runs
}

// ============================================================================
// Batch helpers
// ============================================================================

/// Cheap bounding-box prefilter: which candidates could overlap the
/// reference at all. Segments whose boxes do not even intersect cannot
/// share grid cells, so the full pipeline can skip them.
pub fn check_bound_overlap(
    reference: &TrackSegment,
    candidates: &[TrackSegment],
) -> Result<Vec<bool>> {
    let reference_bounds = reference.bounds()?;
    candidates
        .iter()
        .map(|candidate| Ok(bounds_overlap(&reference_bounds, &candidate.bounds()?)))
        .collect()
}

/// Run [`find_track_overlap`] for one base against many candidates in
/// parallel. Results are in candidate order; the shared bin cache makes
/// repeated grids cheap across workers.
#[cfg(feature = "parallel")]
pub fn find_overlaps_batch(
    base: &TrackSegment,
    candidates: &[TrackSegment],
    config: &OverlapConfig,
    cache: &BinCache,
) -> Result<Vec<Vec<SegmentOverlap>>> {
    use rayon::prelude::*;

    candidates
        .par_iter()
        .map(|candidate| find_track_overlap(base, candidate, config, cache))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::{haversine_distance, latitude_at_distance, longitude_at_distance};

    fn diagonal_plate() -> Plate {
        Plate::from_rows(vec![
            vec![0, 0, 0, 1],
            vec![0, 0, 1, 0],
            vec![0, 1, 0, 0],
            vec![0, 0, 0, 0],
        ])
        .unwrap()
    }

    /// A diagonal segment of `count` points spaced `step` meters apart,
    /// heading north-east from (48.0, 7.85).
    fn diagonal_segment(count: usize, step: f64) -> TrackSegment {
        let mut points = vec![TrackPoint::new(48.0, 7.85)];
        for _ in 1..count {
            let previous = points.last().unwrap().position();
            let component = step / 2.0_f64.sqrt();
            points.push(TrackPoint::new(
                latitude_at_distance(&previous, component, true),
                longitude_at_distance(&previous, component, true),
            ));
        }
        TrackSegment::new(points)
    }

    fn test_cache() -> BinCache {
        BinCache::new(16)
    }

    #[test]
    fn test_score_identical_plates() {
        let plate = diagonal_plate();
        assert_eq!(score_plates(&plate, &plate).unwrap(), 1.0);
    }

    #[test]
    fn test_score_one_cell_off() {
        let base = diagonal_plate();
        let candidate = Plate::from_rows(vec![
            vec![1, 0, 0, 0],
            vec![0, 0, 1, 0],
            vec![0, 1, 0, 0],
            vec![0, 0, 0, 0],
        ])
        .unwrap();
        let score = score_plates(&base, &candidate).unwrap();
        assert!((score - 2.0 / 3.0).abs() < 1e-12, "got {}", score);
    }

    #[test]
    fn test_score_disjoint_plates() {
        let base = diagonal_plate();
        let candidate = Plate::from_rows(vec![
            vec![1, 0, 0, 0],
            vec![1, 0, 0, 0],
            vec![0, 0, 0, 0],
            vec![0, 0, 0, 0],
        ])
        .unwrap();
        assert_eq!(score_plates(&base, &candidate).unwrap(), 0.0);
    }

    #[test]
    fn test_score_empty_candidate_rejected() {
        let base = diagonal_plate();
        let empty = Plate::zeros(4, 4);
        assert_eq!(
            score_plates(&base, &empty),
            Err(TrackOverlapError::EmptyCandidate)
        );
    }

    #[test]
    fn test_orientation_forward_and_reverse() {
        let base = diagonal_segment(4, 80.0);
        let candidate = base.slice(1, 3);
        let config = OverlapConfig::default();
        let cache = test_cache();

        let forward = find_segment_overlap(&base, &candidate, &config, &cache)
            .unwrap()
            .expect("forward candidate should match");
        assert!(!forward.inverse);
        assert_eq!(forward.start_idx, 1);
        assert_eq!(forward.end_idx, 3);
        assert!(forward.overlap >= config.overlap_threshold);
        assert_eq!(forward.start_point, base.points[1]);
        assert_eq!(forward.end_point, base.points[3]);

        let mut reversed_points = candidate.points.clone();
        reversed_points.reverse();
        let reversed = TrackSegment::new(reversed_points);
        let inverse = find_segment_overlap(&base, &reversed, &config, &cache)
            .unwrap()
            .expect("reversed candidate should match");
        assert!(inverse.inverse);
        assert_eq!(inverse.start_idx, 1);
        assert_eq!(inverse.end_idx, 3);
    }

    #[test]
    fn test_empty_candidate_segment_rejected() {
        let base = diagonal_segment(4, 80.0);
        let cache = test_cache();
        assert_eq!(
            find_segment_overlap(&base, &TrackSegment::default(), &OverlapConfig::default(), &cache),
            Err(TrackOverlapError::EmptyCandidate)
        );
    }

    #[test]
    fn test_disjoint_segments_do_not_match() {
        let base = diagonal_segment(6, 40.0);
        let mut candidate = diagonal_segment(6, 40.0);
        for point in &mut candidate.points {
            point.latitude += 1.0;
        }
        let cache = test_cache();

        let result =
            find_segment_overlap(&base, &candidate, &OverlapConfig::default(), &cache).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_out_and_back_base_is_ambiguous() {
        // Out along 8 cells and straight back: the return re-enters cells
        // that already aged out of the de-duplication window
        let out = diagonal_segment(8, 60.0);
        let mut points = out.points.clone();
        points.extend(out.points.iter().rev().skip(1).cloned());
        let base = TrackSegment::new(points);
        let candidate = out.clone();
        let cache = test_cache();

        let result = find_track_overlap(&base, &candidate, &OverlapConfig::default(), &cache);
        assert!(matches!(
            result,
            Err(TrackOverlapError::AmbiguousMatch { revisited_cells }) if revisited_cells > 0
        ));
    }

    #[test]
    fn test_driver_offsets_indices_by_run_start() {
        // Base: a far-away prefix, then the candidate's path
        let candidate = diagonal_segment(8, 30.0);
        let mut prefix = diagonal_segment(5, 30.0);
        for point in &mut prefix.points {
            point.latitude -= 0.5;
        }
        let mut base_points = prefix.points.clone();
        base_points.extend(candidate.points.clone());
        let base = TrackSegment::new(base_points);
        let cache = test_cache();

        let overlaps =
            find_track_overlap(&base, &candidate, &OverlapConfig::default(), &cache).unwrap();
        assert_eq!(overlaps.len(), 1);
        let overlap = &overlaps[0];
        assert!(!overlap.inverse);
        assert_eq!(overlap.start_idx, prefix.len());
        assert_eq!(overlap.end_idx, prefix.len() + candidate.len() - 1);
        assert!(overlap.overlap > 0.99);
    }

    #[test]
    fn test_driver_below_threshold_is_empty() {
        // Base covers only the first quarter of the candidate's path
        let candidate = diagonal_segment(16, 30.0);
        let base = candidate.slice(0, 3);
        let cache = test_cache();

        let overlaps =
            find_track_overlap(&candidate, &base, &OverlapConfig::default(), &cache).unwrap();
        assert_eq!(overlaps.len(), 1);

        // Swapped: the candidate asks for far more cells than the base has
        let overlaps =
            find_track_overlap(&base, &candidate, &OverlapConfig::default(), &cache).unwrap();
        assert!(overlaps.is_empty());
    }

    #[test]
    fn test_inside_runs_bridges_short_gaps() {
        let flags = [true, true, false, false, true, true];
        assert_eq!(inside_runs(&flags, 2), vec![(0, 5)]);
        assert_eq!(inside_runs(&flags, 1), vec![(0, 1), (4, 5)]);
        assert_eq!(inside_runs(&flags, 0), vec![(0, 1), (4, 5)]);

        let sparse = [false, true, false, false, false, true, false];
        assert_eq!(inside_runs(&sparse, 1), vec![(1, 1), (5, 5)]);
        assert_eq!(inside_runs(&sparse, 3), vec![(1, 5)]);
        assert!(inside_runs(&[false, false], 5).is_empty());
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        let base = diagonal_segment(12, 30.0);
        let candidate = base.slice(2, 9);
        let config = OverlapConfig::default();
        let cache = test_cache();

        let first = find_track_overlap(&base, &candidate, &config, &cache).unwrap();
        let second = find_track_overlap(&base, &candidate, &config, &cache).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_check_bound_overlap() {
        let reference = diagonal_segment(6, 50.0);
        let near = reference.slice(2, 4);
        let mut far = diagonal_segment(6, 50.0);
        for point in &mut far.points {
            point.longitude += 1.0;
        }

        assert_eq!(
            check_bound_overlap(&reference, &[near, far]).unwrap(),
            vec![true, false]
        );
    }

    #[test]
    fn test_check_bound_overlap_propagates_invalid_bounds() {
        let reference = diagonal_segment(6, 50.0);
        let degenerate = TrackSegment::from_coordinates(&[(48.0, 7.85), (48.0, 7.86)]);
        assert!(matches!(
            check_bound_overlap(&reference, &[degenerate]),
            Err(TrackOverlapError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn test_segment_overlap_display() {
        let overlap = SegmentOverlap {
            overlap: 0.975,
            inverse: false,
            plate: Plate::zeros(3, 4),
            start_point: TrackPoint::new(48.0, 7.85),
            start_idx: 2,
            end_point: TrackPoint::new(48.01, 7.86),
            end_idx: 7,
        };
        let rendered = overlap.to_string();
        assert!(rendered.contains("Overlap 97.50%"));
        assert!(rendered.contains("(3, 4)"));
        assert!(rendered.contains("at id 2"));
        assert!(rendered.contains("at id 7"));
    }

    #[test]
    fn test_diagonal_segment_helper_spacing() {
        let segment = diagonal_segment(4, 80.0);
        for pair in segment.points.windows(2) {
            let step = haversine_distance(&pair[0].position(), &pair[1].position());
            assert!((step - 80.0).abs() < 1.0, "step was {}", step);
        }
    }
}
