//! Stereo camera model for `mpo3d`.
//!
//! [`StereoCamera`] owns the calibration of a two-camera rig and implements
//! the geometric half of reconstruction:
//! - calibration from planar-target image pairs (Zhang seed + LM refinement),
//! - zero-disparity rectification and its lookup tables,
//! - SGBM matching and reprojection of the disparity into a filtered cloud.
//!
//! Calibrations are persisted in a JSON [`ParameterStore`].

mod calibrate;
mod config;
mod error;
mod model;
mod params;
pub mod rectify;
mod reproject;
mod store;

pub use calibrate::{calibrate_single_camera, calibrate_stereo};
pub use config::StereoCameraConfig;
pub use error::{CalibrationError, GeometryError, Side, StoreError};
pub use model::{
    CalibrationReport, CameraState, Reconstruction, StereoCamera, MIN_CALIBRATION_PAIRS,
};
pub use params::CalibrationParameters;
pub use rectify::{init_undistort_rectify_map, stereo_rectify, Rect, StereoRectification};
pub use reproject::disparity_to_vertices;
pub use store::ParameterStore;
