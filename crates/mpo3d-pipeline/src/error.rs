use mpo3d_camera::{CalibrationError, GeometryError};
use mpo3d_container::ContainerError;
use mpo3d_image::ImageError;
use mpo3d_surface::SurfaceError;
use thiserror::Error;

/// Failure of a pipeline entry point. The orchestrator state is unchanged
/// when one of these is returned.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error(transparent)]
    Image(#[from] ImageError),
}
