//! Reconstruction pipeline for `mpo3d`.
//!
//! [`Reconstructor`] owns the current display image, stereo camera and mesh,
//! and exposes the two mutating entry points of the system:
//! - [`Reconstructor::open`]: decode a container and, with a calibrated
//!   camera, reconstruct and triangulate it;
//! - [`Reconstructor::calibrate`]: calibrate the camera from containers
//!   showing a planar target.
//!
//! Both replace state only once every stage has succeeded and then notify
//! the registered [`Observer`]s through the [`NotificationBus`].

mod bus;
mod config;
mod error;
mod orchestrator;

pub use bus::{NotificationBus, Observer, StateView};
pub use config::ReconstructionConfig;
pub use error::PipelineError;
pub use orchestrator::Reconstructor;
