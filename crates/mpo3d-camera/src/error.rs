use std::path::PathBuf;

use mpo3d_image::ImageError;
use thiserror::Error;

/// Which camera of the rig an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot access parameter store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parameter store {path} is malformed: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("parameter store {path} holds an invalid {key} block")]
    InvalidBlock { path: PathBuf, key: &'static str },
}

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("calibration needs at least {required} image pairs, got {got}")]
    InsufficientSamples { required: usize, got: usize },
    #[error("{left} left images but {right} right images")]
    PairCountMismatch { left: usize, right: usize },
    #[error("{side} image {index} is {got:?}, expected {expected:?}")]
    ImageSizeMismatch {
        side: Side,
        index: usize,
        expected: (usize, usize),
        got: (usize, usize),
    },
    #[error("pattern not found in {side} image {index}: {source}")]
    PatternNotFound {
        side: Side,
        index: usize,
        #[source]
        source: ImageError,
    },
    #[error("{side} camera calibration failed: {source}")]
    Camera {
        side: Side,
        #[source]
        source: anyhow::Error,
    },
    #[error("stereo calibration failed: {0}")]
    Solver(#[from] anyhow::Error),
    #[error("calibrated intrinsics are singular")]
    Singular,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("stereo camera is not calibrated")]
    NotCalibrated,
    #[error("stereo pair differs in size: {left:?} vs {right:?}")]
    PairMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
    #[error("rectification is degenerate: {0}")]
    Rectification(&'static str),
    #[error("point cloud is empty")]
    PointCloudEmpty,
    #[error(transparent)]
    Image(#[from] ImageError),
}
