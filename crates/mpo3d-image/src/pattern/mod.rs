//! Planar calibration target detection.

mod chessboard;
mod circles;
mod grid;
mod subpix;

use std::fmt;

use mpo3d_core::Vec2;
use serde::{Deserialize, Serialize};

use crate::{ImageBuffer, ImageError};

/// Kind of planar calibration target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Inner corners of a chessboard.
    #[default]
    Chessboard,
    /// Centres of a symmetric grid of dark circles.
    CircleGrid,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternKind::Chessboard => write!(f, "chessboard"),
            PatternKind::CircleGrid => write!(f, "circle grid"),
        }
    }
}

fn check_size(rows: usize, cols: usize) -> Result<(), ImageError> {
    if rows < 2 || cols < 2 {
        return Err(ImageError::InvalidPatternSize { rows, cols });
    }
    Ok(())
}

impl ImageBuffer {
    /// Inner corners of a chessboard with `rows x cols` corners, row-major,
    /// refined to sub-pixel precision.
    ///
    /// Point `r * cols + c` corresponds to board coordinates `(c, r)`.
    pub fn detect_chessboard_corners(
        &self,
        rows: usize,
        cols: usize,
    ) -> Result<Vec<Vec2>, ImageError> {
        check_size(rows, cols)?;
        if self.is_empty() {
            return Err(ImageError::Empty);
        }
        chessboard::find_chessboard_corners(self, rows, cols).ok_or(ImageError::PatternNotFound {
            kind: PatternKind::Chessboard,
            rows,
            cols,
        })
    }

    /// Centres of a symmetric `rows x cols` circle grid, row-major.
    pub fn detect_circle_grid_centers(
        &self,
        rows: usize,
        cols: usize,
    ) -> Result<Vec<Vec2>, ImageError> {
        check_size(rows, cols)?;
        if self.is_empty() {
            return Err(ImageError::Empty);
        }
        circles::find_circle_grid_centers(self, rows, cols).ok_or(ImageError::PatternNotFound {
            kind: PatternKind::CircleGrid,
            rows,
            cols,
        })
    }

    pub fn detect_pattern(
        &self,
        kind: PatternKind,
        rows: usize,
        cols: usize,
    ) -> Result<Vec<Vec2>, ImageError> {
        match kind {
            PatternKind::Chessboard => self.detect_chessboard_corners(rows, cols),
            PatternKind::CircleGrid => self.detect_circle_grid_centers(rows, cols),
        }
    }
}
