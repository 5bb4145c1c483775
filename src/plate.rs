//! # Plate Builder
//!
//! Rasterizes a track segment into a dense occupancy matrix (a "plate")
//! over a derived grid. Cell values count the points that fell into each
//! cell; with the `normalize` option, repeated hits on the same cell within
//! a sliding window are suppressed, so a stationary or slow-moving recorder
//! cannot inflate occupancy. Plates built over the same bin ladders always
//! share dimensions and can be summed cell by cell.
//!
//! Returned plates are vertically flipped: row 0 is the northernmost bin,
//! so printing a plate top-to-bottom reads north-to-south.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackOverlapError};
use crate::grid::{digitize, BinCache, PlateBins};
use crate::track::TrackSegment;
use crate::{Bounds, GpsPoint};

// ============================================================================
// Plate
// ============================================================================

/// Dense 2D occupancy matrix indexed `[latitude bin][longitude bin]`.
///
/// Row 0 is the northernmost bin. Built fresh for each (segment, grid)
/// pair and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plate {
    rows: usize,
    cols: usize,
    cells: Vec<u32>,
}

impl Plate {
    /// All-zero plate with the given dimensions.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![0; rows * cols],
        }
    }

    /// Build a plate from explicit rows. All rows must share one length.
    pub fn from_rows(rows: Vec<Vec<u32>>) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != cols) {
            return Err(TrackOverlapError::ConfigError {
                message: "plate rows must all have the same length".to_string(),
            });
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            cells: rows.into_iter().flatten().collect(),
        })
    }

    /// Number of latitude bins.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of longitude bins.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Dimensions as (rows, cols).
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Cell value at (row, col). Indices must be within [`Plate::shape`].
    pub fn get(&self, row: usize, col: usize) -> u32 {
        self.cells[row * self.cols + col]
    }

    /// Cell values in row-major order, row 0 (northernmost) first.
    pub fn values(&self) -> &[u32] {
        &self.cells
    }

    /// Number of cells holding at least one point.
    pub fn occupied_cells(&self) -> usize {
        self.cells.iter().filter(|v| **v > 0).count()
    }

    /// Number of cells hit more than once — after de-duplication these mark
    /// a track re-entering a cell it already left.
    pub fn revisited_cells(&self) -> usize {
        self.cells.iter().filter(|v| **v > 1).count()
    }

    /// Elementwise sum of two plates.
    ///
    /// Both plates must come from the same bin ladders; this is a caller
    /// contract, not runtime-checked. Mismatched plates yield meaningless
    /// sums.
    pub fn combine(&self, other: &Plate) -> Plate {
        debug_assert_eq!(
            self.shape(),
            other.shape(),
            "combined plates must share bin ladders"
        );
        Plate {
            rows: self.rows,
            cols: self.cols,
            cells: self
                .cells
                .iter()
                .zip(&other.cells)
                .map(|(a, b)| a + b)
                .collect(),
        }
    }

    fn increment(&mut self, row: usize, col: usize) {
        self.cells[row * self.cols + col] += 1;
    }

    /// Mirror rows so row 0 becomes the max-latitude bin.
    fn flip_vertical(&mut self) {
        for row in 0..self.rows / 2 {
            let opposite = self.rows - 1 - row;
            for col in 0..self.cols {
                self.cells
                    .swap(row * self.cols + col, opposite * self.cols + col);
            }
        }
    }
}

impl fmt::Display for Plate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.rows {
            for col in 0..self.cols {
                if col > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{}", self.get(row, col))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// ============================================================================
// Rasterization
// ============================================================================

/// Fixed-capacity ring buffer of recently visited cells.
///
/// A repeated cell is skipped without refreshing its slot; it ages out only
/// as other cells are pushed past it.
#[derive(Debug)]
struct RecentCells {
    slots: Vec<(usize, usize)>,
    capacity: usize,
    next: usize,
}

impl RecentCells {
    fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        }
    }

    fn contains(&self, cell: (usize, usize)) -> bool {
        self.slots.contains(&cell)
    }

    fn push(&mut self, cell: (usize, usize)) {
        if self.slots.len() < self.capacity {
            self.slots.push(cell);
        } else {
            self.slots[self.next] = cell;
        }
        self.next = (self.next + 1) % self.capacity;
    }
}

/// Rasterize a segment onto the grid derived from `bounds` at `grid_width`.
///
/// Bin ladders come from `cache` (derived on miss). With `normalize` set,
/// repeated same-cell hits within the last `dedupe_window` visited cells
/// are suppressed; the window capacity must be at least 1.
pub fn rasterize(
    segment: &TrackSegment,
    grid_width: f64,
    bounds: &Bounds,
    normalize: bool,
    dedupe_window: usize,
    cache: &BinCache,
) -> Result<Plate> {
    let bins = cache.derive(
        grid_width,
        bounds.min_lat,
        bounds.min_lng,
        bounds.max_lat,
        bounds.max_lng,
    )?;
    rasterize_on_bins(&segment.positions(), &bins, normalize, dedupe_window)
}

/// Rasterize points onto explicit bin ladders.
///
/// Points outside the ladders clamp to the border cells; callers crop
/// their input to the covered box first.
pub fn rasterize_on_bins(
    points: &[GpsPoint],
    bins: &PlateBins,
    normalize: bool,
    dedupe_window: usize,
) -> Result<Plate> {
    if normalize && dedupe_window == 0 {
        return Err(TrackOverlapError::ConfigError {
            message: "de-duplication window must hold at least one cell".to_string(),
        });
    }

    let lat_values: Vec<f64> = bins.lat_edges.iter().map(|e| e.latitude).collect();
    let lng_values: Vec<f64> = bins.lng_edges.iter().map(|e| e.longitude).collect();
    let (rows, cols) = bins.shape();
    let mut plate = Plate::zeros(rows, cols);
    let mut recent = normalize.then(|| RecentCells::new(dedupe_window));

    for point in points {
        let row = digitize(point.latitude, &lat_values);
        let col = digitize(point.longitude, &lng_values);
        if let Some(recent) = recent.as_mut() {
            if recent.contains((row, col)) {
                continue;
            }
            recent.push((row, col));
        }
        plate.increment(row, col);
    }

    plate.flip_vertical();
    debug!(
        "Rasterized {} points onto a {}x{} plate ({} occupied cells)",
        points.len(),
        rows,
        cols,
        plate.occupied_cells()
    );
    Ok(plate)
}

// ============================================================================
// Tests
// ============================================================================
