//! Planar-target calibration of a single camera and of the stereo rig.
//!
//! Each camera is seeded in closed form (plane homographies, Zhang intrinsics,
//! poses from `K⁻¹ H`) and then refined with distortion by Levenberg–Marquardt.
//! The rig is seeded from the per-view relative poses and refined with both
//! intrinsics held fixed.

use anyhow::{ensure, Context, Result};
use mpo3d_core::{BrownConrady5, Intrinsics, Iso3, Mat3, PinholeCamera, Pt2, Pt3, Real, Vec2};
use mpo3d_linear::{
    dlt_homography, estimate_focal_with_fixed_center, estimate_intrinsics_from_homographies,
    estimate_planar_pose_from_h,
};
use mpo3d_optim::planar_intrinsics::{
    refine_planar_intrinsics, PlanarIntrinsicsEstimate, PlanarIntrinsicsProblem,
    PlanarViewObservations,
};
use mpo3d_optim::stereo_extrinsics::{
    refine_stereo_extrinsics, StereoExtrinsicsEstimate, StereoExtrinsicsProblem,
    StereoViewObservations,
};
use mpo3d_optim::{LmBackend, SolveOptions};

fn planar_homographies(board: &[Pt3], detections: &[Vec<Vec2>]) -> Result<Vec<Mat3>> {
    let board_2d: Vec<Pt2> = board.iter().map(|p| Pt2::new(p.x, p.y)).collect();
    detections
        .iter()
        .enumerate()
        .map(|(idx, points)| {
            let pixels: Vec<Pt2> = points.iter().map(|v| Pt2::new(v.x, v.y)).collect();
            dlt_homography(&board_2d, &pixels)
                .with_context(|| format!("failed to compute homography for view {idx}"))
        })
        .collect()
}

fn plausible(k: &Intrinsics, width: usize, height: usize) -> bool {
    let (w, h) = (width as Real, height as Real);
    k.fx.is_finite()
        && k.fy.is_finite()
        && k.fx > 0.0
        && k.fy > 0.0
        && (0.0..=w).contains(&k.cx)
        && (0.0..=h).contains(&k.cy)
}

/// Closed-form intrinsics: Zhang's method, or focal lengths about the image
/// centre when Zhang's system is degenerate or yields an implausible camera.
fn initial_intrinsics(homographies: &[Mat3], width: usize, height: usize) -> Result<Intrinsics> {
    match estimate_intrinsics_from_homographies(homographies) {
        Ok(k) if plausible(&k, width, height) => return Ok(k),
        Ok(k) => log::debug!("zhang intrinsics rejected: {k:?}"),
        Err(e) => log::debug!("zhang intrinsics failed: {e}"),
    }
    let cx = (width as Real - 1.0) / 2.0;
    let cy = (height as Real - 1.0) / 2.0;
    let k = estimate_focal_with_fixed_center(homographies, cx, cy)
        .context("intrinsics initialization failed")?;
    ensure!(plausible(&k, width, height), "no plausible initial intrinsics");
    Ok(k)
}

/// Calibrate one camera from detections of `board` in `width x height`
/// images.
pub fn calibrate_single_camera(
    board: &[Pt3],
    detections: &[Vec<Vec2>],
    width: usize,
    height: usize,
    opts: &SolveOptions,
) -> Result<PlanarIntrinsicsEstimate> {
    ensure!(
        detections.len() >= 3,
        "need at least 3 views for planar initialization (got {})",
        detections.len()
    );

    let homographies = planar_homographies(board, detections)?;
    let intrinsics = initial_intrinsics(&homographies, width, height)?;
    let kmtx = intrinsics.k_matrix();
    let poses = homographies
        .iter()
        .enumerate()
        .map(|(idx, h)| {
            estimate_planar_pose_from_h(&kmtx, h)
                .with_context(|| format!("failed to recover pose for view {idx}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let views = detections
        .iter()
        .map(|points| PlanarViewObservations::new(board.to_vec(), points.clone()))
        .collect::<Result<Vec<_>>>()?;
    let problem = PlanarIntrinsicsProblem::new(views)?;
    let camera = PinholeCamera::new(intrinsics, BrownConrady5::default());
    refine_planar_intrinsics(&LmBackend, &problem, &camera, &poses, opts)
}

/// Left→right transform agreeing best with all views: the per-view relative
/// pose with the smallest summed distance to the others.
fn initial_relative_pose(left: &[Iso3], right: &[Iso3]) -> Option<Iso3> {
    let relative: Vec<Iso3> = left
        .iter()
        .zip(right)
        .map(|(l, r)| r * l.inverse())
        .collect();
    let scale = relative
        .iter()
        .map(|p| p.translation.vector.norm())
        .fold(0.0, Real::max)
        .max(Real::EPSILON);

    relative
        .iter()
        .map(|a| {
            let spread: Real = relative
                .iter()
                .map(|b| {
                    (a.translation.vector - b.translation.vector).norm() / scale
                        + a.rotation.angle_to(&b.rotation)
                })
                .sum();
            (spread, *a)
        })
        .min_by(|x, y| x.0.total_cmp(&y.0))
        .map(|(_, pose)| pose)
}

/// Estimate the left→right transform of the rig with both cameras fixed.
pub fn calibrate_stereo(
    board: &[Pt3],
    left: &PlanarIntrinsicsEstimate,
    right: &PlanarIntrinsicsEstimate,
    left_detections: &[Vec<Vec2>],
    right_detections: &[Vec<Vec2>],
    opts: &SolveOptions,
) -> Result<StereoExtrinsicsEstimate> {
    ensure!(
        left_detections.len() == right_detections.len()
            && left.poses.len() == left_detections.len()
            && right.poses.len() == right_detections.len(),
        "stereo calibration needs one pose and one detection set per view"
    );

    let init = initial_relative_pose(&left.poses, &right.poses)
        .context("no views to seed the stereo transform")?;
    let views = left_detections
        .iter()
        .zip(right_detections)
        .map(|(l, r)| StereoViewObservations::new(board.to_vec(), l.clone(), r.clone()))
        .collect::<Result<Vec<_>>>()?;
    let problem = StereoExtrinsicsProblem::new(left.camera, right.camera, views)?;
    refine_stereo_extrinsics(&LmBackend, &problem, &init, &left.poses, opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpo3d_core::synthetic::{board_poses, grid_points, project_board};
    use nalgebra::{Translation3, UnitQuaternion};

    fn left_camera() -> PinholeCamera {
        PinholeCamera::new(
            Intrinsics::new(820.0, 810.0, 322.0, 238.0),
            BrownConrady5 {
                k1: -0.12,
                k2: 0.03,
                ..BrownConrady5::default()
            },
        )
    }

    #[test]
    fn single_camera_from_synthetic_views() {
        let cam = left_camera();
        let board = grid_points(6, 9, 20.0);
        let detections: Vec<Vec<Vec2>> = board_poses(6, Vec2::new(80.0, 50.0), 500.0)
            .iter()
            .map(|pose| project_board(&cam, pose, &board))
            .collect();

        let est =
            calibrate_single_camera(&board, &detections, 640, 480, &SolveOptions::default())
                .unwrap();
        assert!((est.camera.k.fx - 820.0).abs() < 0.5, "fx {}", est.camera.k.fx);
        assert!((est.camera.k.cy - 238.0).abs() < 0.5, "cy {}", est.camera.k.cy);
        assert!((est.camera.dist.k1 + 0.12).abs() < 1e-3);
        assert!(est.rms < 1e-3, "rms {}", est.rms);
    }

    #[test]
    fn too_few_views_are_rejected() {
        let board = grid_points(3, 3, 1.0);
        assert!(calibrate_single_camera(&board, &[], 10, 10, &SolveOptions::default()).is_err());
    }

    #[test]
    fn relative_pose_seed_ignores_an_outlier() {
        let gt = Iso3::from_parts(
            Translation3::new(-60.0, 0.0, 0.0),
            UnitQuaternion::from_euler_angles(0.0, 0.02, 0.0),
        );
        let left = board_poses(5, Vec2::new(50.0, 50.0), 500.0);
        let mut right: Vec<Iso3> = left.iter().map(|p| gt * p).collect();
        right[2] = Iso3::translation(0.0, 100.0, 0.0) * right[2];

        let seed = initial_relative_pose(&left, &right).unwrap();
        assert!((seed.translation.vector - gt.translation.vector).norm() < 1e-9);
    }
}
