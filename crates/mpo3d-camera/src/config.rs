use std::path::PathBuf;

use mpo3d_core::Real;
use mpo3d_optim::SolveOptions;
use serde::{Deserialize, Serialize};

/// Settings of a [`StereoCamera`](crate::StereoCamera).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoCameraConfig {
    /// Location of the JSON parameter store.
    pub param_path: PathBuf,
    /// Points deeper than this are dropped during reconstruction; also the
    /// reference depth for the inverted z of reconstructed vertices.
    pub max_depth: Real,
    /// Termination policy of the single-camera and stereo solves.
    pub solve: SolveOptions,
}

impl Default for StereoCameraConfig {
    fn default() -> Self {
        Self {
            param_path: PathBuf::from("stereo_camera.json"),
            max_depth: 1000.0,
            solve: SolveOptions::default(),
        }
    }
}
