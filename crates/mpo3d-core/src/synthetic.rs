//! Synthetic planar target helpers.
//!
//! The functions here build planar point grids (Z = 0), generate a spread of
//! board poses and project the board into a camera. They are public so the
//! calibration and camera crates can share them in their test suites.

use nalgebra::{Translation3, UnitQuaternion, Vector3};

use crate::{Iso3, PinholeCamera, Pt3, Real, Vec2};

/// Planar grid of `cols * rows` points on Z = 0 in row-major order:
/// point `r * cols + c` sits at `(c * spacing, r * spacing, 0)`.
pub fn grid_points(rows: usize, cols: usize, spacing: Real) -> Vec<Pt3> {
    let mut points = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            points.push(Pt3::new(c as Real * spacing, r as Real * spacing, 0.0));
        }
    }
    points
}

/// Board-to-camera poses with varied tilt, all looking at a board centred
/// near `center` (board coordinates) from roughly `distance` away.
pub fn board_poses(count: usize, center: Vec2, distance: Real) -> Vec<Iso3> {
    (0..count)
        .map(|i| {
            let t = i as Real;
            let roll = 0.15 * (t * 1.7).sin();
            let pitch = 0.25 * (t * 0.9 + 0.4).sin();
            let yaw = 0.3 * (t * 1.3 + 1.1).cos();
            let rot = UnitQuaternion::from_euler_angles(roll + 0.05, pitch, yaw);
            // Keep the board centre on the optical axis.
            let board_center = rot * Vector3::new(center.x, center.y, 0.0);
            let shift = Vector3::new(
                0.05 * distance * (t * 2.3).sin(),
                0.04 * distance * (t * 1.1).cos(),
                distance * (1.0 + 0.1 * (t * 0.7).sin()),
            );
            Iso3::from_parts(Translation3::from(shift - board_center), rot)
        })
        .collect()
}

/// Project board points through `pose` (board → camera) into `camera`.
pub fn project_board(camera: &PinholeCamera, pose: &Iso3, points: &[Pt3]) -> Vec<Vec2> {
    points
        .iter()
        .map(|p| camera.project(&(pose * p)))
        .collect()
}
