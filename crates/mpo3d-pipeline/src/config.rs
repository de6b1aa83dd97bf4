use mpo3d_camera::StereoCameraConfig;
use mpo3d_image::SgbmParams;
use mpo3d_surface::SurfaceParams;
use serde::{Deserialize, Serialize};

/// Settings of every pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub camera: StereoCameraConfig,
    pub sgbm: SgbmParams,
    pub surface: SurfaceParams,
}
