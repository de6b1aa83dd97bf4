//! Core math and geometry primitives for `mpo3d`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...) and rotation helpers,
//! - the pinhole camera with Brown–Conrady distortion shared by calibration
//!   and rectification,
//! - the [`Vertex`] and [`PointCloud`] value types produced by reconstruction.
//!
//! Camera pipeline:
//! `pixel = K ∘ distortion ∘ (x / z, y / z)`

/// Pinhole intrinsics, distortion and the combined camera.
pub mod camera;
/// Point sets with axis-aligned bounds.
pub mod cloud;
/// Linear algebra type aliases and helpers.
pub mod math;
/// Synthetic planar targets for tests across the workspace.
pub mod synthetic;
/// Reconstructed surface samples.
pub mod vertex;

pub use camera::*;
pub use cloud::*;
pub use math::*;
pub use vertex::*;
