//! Unified error handling for the track-overlap library.
//!
//! This module provides a consistent error type for all overlap operations.
//! A rejected match (overlap ratio below the acceptance threshold) is *not*
//! an error; it is reported as an empty result by the pipeline functions.

use std::fmt;

/// Unified error type for track-overlap operations.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackOverlapError {
    /// A segment's bounding box could not be derived (no points, or all
    /// points identical along one axis)
    InvalidBounds {
        point_count: usize,
        message: String,
    },
    /// Candidate segment occupies no grid cells, so an overlap ratio is
    /// undefined
    EmptyCandidate,
    /// The base track passes through the candidate's region more than once;
    /// resolving which occurrence is meant is unsupported
    AmbiguousMatch { revisited_cells: usize },
    /// A computation required elevation data that is missing on some points
    MissingElevation {
        point_count: usize,
        missing: usize,
    },
    /// Configuration error
    ConfigError { message: String },
}

impl fmt::Display for TrackOverlapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackOverlapError::InvalidBounds {
                point_count,
                message,
            } => {
                write!(
                    f,
                    "Invalid bounds for segment with {} points: {}",
                    point_count, message
                )
            }
            TrackOverlapError::EmptyCandidate => {
                write!(f, "Candidate segment occupies no grid cells")
            }
            TrackOverlapError::AmbiguousMatch { revisited_cells } => {
                write!(
                    f,
                    "Base segment enters the match region more than once ({} cells revisited); \
                     multiple occurrences are not supported",
                    revisited_cells
                )
            }
            TrackOverlapError::MissingElevation {
                point_count,
                missing,
            } => {
                write!(
                    f,
                    "Elevation missing on {} of {} points",
                    missing, point_count
                )
            }
            TrackOverlapError::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
        }
    }
}

impl std::error::Error for TrackOverlapError {}

/// Result type alias for track-overlap operations.
pub type Result<T> = std::result::Result<T, TrackOverlapError>;

/// Extension trait for converting Option to TrackOverlapError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an invalid bounds error.
    fn ok_or_invalid_bounds(self, point_count: usize, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_invalid_bounds(self, point_count: usize, message: &str) -> Result<T> {
        self.ok_or_else(|| TrackOverlapError::InvalidBounds {
            point_count,
            message: message.to_string(),
        })
    }
}
