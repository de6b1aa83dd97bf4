use thiserror::Error;

use crate::{PatternKind, PixelFormat};

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image is empty")]
    Empty,
    #[error("{len} bytes cannot hold a {width}x{height} {format:?} image")]
    BufferSize {
        width: usize,
        height: usize,
        format: PixelFormat,
        len: usize,
    },
    #[error("concatenation requires a non-empty image list")]
    NothingToConcatenate,
    #[error("image {index} is {got_height} rows tall ({got_format:?}), expected {height} ({format:?})")]
    ShapeMismatch {
        index: usize,
        height: usize,
        format: PixelFormat,
        got_height: usize,
        got_format: PixelFormat,
    },
    #[error("stereo pair differs in size or format: {left:?} vs {right:?}")]
    PairMismatch {
        left: (usize, usize, PixelFormat),
        right: (usize, usize, PixelFormat),
    },
    #[error("remap tables hold {len} entries, expected {width}x{height}")]
    MapSize {
        width: usize,
        height: usize,
        len: usize,
    },
    #[error("pattern size must be at least 2x2, got {rows}x{cols}")]
    InvalidPatternSize { rows: usize, cols: usize },
    #[error("{kind} pattern of {rows}x{cols} points not found")]
    PatternNotFound {
        kind: PatternKind,
        rows: usize,
        cols: usize,
    },
}
