//! Linear initialisation for planar calibration.
//!
//! Everything here is closed form: a normalised DLT homography, intrinsics from
//! a set of plane homographies and the pose of a plane given `K` and `H`. The
//! results seed the non-linear refinement in `mpo3d-optim`.

mod homography;
pub mod math;
mod planar_pose;
mod zhang_intrinsics;

pub use homography::*;
pub use planar_pose::*;
pub use zhang_intrinsics::*;
