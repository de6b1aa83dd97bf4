//! Pixel buffers and the image-space stages of stereo reconstruction.
//!
//! [`ImageBuffer`] is an owned, interleaved 8-bit pixel grid. Every operation
//! that produces a new picture (conversion, concatenation, remap) yields a
//! whole new buffer; nothing is patched in place pixel by pixel.
//!
//! The crate also hosts the image-space algorithms the camera model needs:
//! - chessboard and symmetric circle-grid detection ([`pattern`]),
//! - dense semi-global block matching ([`disparity`]),
//! - bilinear remapping through per-pixel lookup tables ([`remap`]).

mod buffer;
pub mod disparity;
mod draw;
mod error;
mod float;
pub mod pattern;
pub mod remap;

pub use buffer::{ImageBuffer, PixelFormat};
pub use disparity::{compute_disparity_sgbm, DisparityMap, SgbmMode, SgbmParams};
pub use error::ImageError;
pub use pattern::PatternKind;
pub use remap::RemapMaps;
