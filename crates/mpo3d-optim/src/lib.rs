//! Non-linear least-squares refinement for camera calibration.
//!
//! Problems implement [`NllsProblem`]; [`LmBackend`] drives them with the
//! `levenberg-marquardt` crate. Two problems are provided: single-camera
//! intrinsics with per-view board poses, and stereo extrinsics with both
//! intrinsics held fixed.

mod backend_lm;
mod jacobian;
pub mod planar_intrinsics;
mod pose_params;
pub mod stereo_extrinsics;
mod traits;

pub use backend_lm::LmBackend;
pub use jacobian::numeric_jacobian;
pub use traits::*;
