use anyhow::{ensure, Result};
use mpo3d_core::{Iso3, PinholeCamera, Pt3, Real, Vec2};
use nalgebra::DVector;

use crate::pose_params::{read_pose, write_pose, POSE_DIM};
use crate::{rms_from_residuals, NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};

/// One board observation seen by both cameras.
#[derive(Debug, Clone)]
pub struct StereoViewObservations {
    /// Board points (z = 0).
    pub points_3d: Vec<Pt3>,
    pub left: Vec<Vec2>,
    pub right: Vec<Vec2>,
}

impl StereoViewObservations {
    pub fn new(points_3d: Vec<Pt3>, left: Vec<Vec2>, right: Vec<Vec2>) -> Result<Self> {
        ensure!(
            points_3d.len() == left.len() && left.len() == right.len(),
            "stereo view point counts differ ({} / {} / {})",
            points_3d.len(),
            left.len(),
            right.len()
        );
        ensure!(points_3d.len() >= 4, "stereo view has too few points");
        Ok(Self {
            points_3d,
            left,
            right,
        })
    }

    pub fn len(&self) -> usize {
        self.points_3d.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points_3d.is_empty()
    }
}

/// Relative pose of two cameras with fixed intrinsics.
///
/// Parameters: the left→right transform (6) followed by the board→left pose
/// of every view (6 each). Residuals: left then right reprojection errors.
#[derive(Debug, Clone)]
pub struct StereoExtrinsicsProblem {
    left_camera: PinholeCamera,
    right_camera: PinholeCamera,
    views: Vec<StereoViewObservations>,
}

impl StereoExtrinsicsProblem {
    pub fn new(
        left_camera: PinholeCamera,
        right_camera: PinholeCamera,
        views: Vec<StereoViewObservations>,
    ) -> Result<Self> {
        ensure!(!views.is_empty(), "need at least one stereo view");
        Ok(Self {
            left_camera,
            right_camera,
            views,
        })
    }

    pub fn num_views(&self) -> usize {
        self.views.len()
    }
}

impl NllsProblem for StereoExtrinsicsProblem {
    fn num_params(&self) -> usize {
        POSE_DIM * (1 + self.num_views())
    }

    fn num_residuals(&self) -> usize {
        self.views.iter().map(|v| 4 * v.len()).sum()
    }

    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let left_to_right = read_pose(x, 0);
        let mut r = DVector::zeros(self.num_residuals());
        let mut offset = 0;

        for (i, view) in self.views.iter().enumerate() {
            let board_to_left = read_pose(x, POSE_DIM * (1 + i));
            for ((pw, ml), mr) in view.points_3d.iter().zip(&view.left).zip(&view.right) {
                let p_left = board_to_left.transform_point(pw);
                let pl = self.left_camera.project(&p_left);
                let pr = self
                    .right_camera
                    .project(&left_to_right.transform_point(&p_left));
                r[offset] = ml.x - pl.x;
                r[offset + 1] = ml.y - pl.y;
                r[offset + 2] = mr.x - pr.x;
                r[offset + 3] = mr.y - pr.y;
                offset += 4;
            }
        }
        r
    }
}

/// Refined stereo extrinsics.
#[derive(Debug, Clone)]
pub struct StereoExtrinsicsEstimate {
    /// Maps left-camera coordinates into right-camera coordinates.
    pub left_to_right: Iso3,
    pub board_to_left: Vec<Iso3>,
    /// RMS reprojection error in pixels over both images.
    pub rms: Real,
    pub report: SolveReport,
}

/// Refine the left→right transform and per-view board poses.
pub fn refine_stereo_extrinsics<B: NllsSolverBackend>(
    backend: &B,
    problem: &StereoExtrinsicsProblem,
    left_to_right: &Iso3,
    board_to_left: &[Iso3],
    opts: &SolveOptions,
) -> Result<StereoExtrinsicsEstimate> {
    ensure!(
        board_to_left.len() == problem.num_views(),
        "need one initial pose per stereo view"
    );

    let mut x0 = DVector::zeros(problem.num_params());
    write_pose(&mut x0, 0, left_to_right);
    for (i, pose) in board_to_left.iter().enumerate() {
        write_pose(&mut x0, POSE_DIM * (1 + i), pose);
    }

    let (x_opt, report) = backend.solve(problem, x0, opts);
    let rms = rms_from_residuals(&problem.residuals(&x_opt));
    ensure!(rms.is_finite(), "stereo refinement diverged");

    let left_to_right = read_pose(&x_opt, 0);
    let board_to_left = (0..problem.num_views())
        .map(|i| read_pose(&x_opt, POSE_DIM * (1 + i)))
        .collect();
    log::debug!(
        "stereo extrinsics: |T| {:.4}, angle {:.5} rad, rms {:.4} px",
        left_to_right.translation.vector.norm(),
        left_to_right.rotation.angle(),
        rms
    );

    Ok(StereoExtrinsicsEstimate {
        left_to_right,
        board_to_left,
        rms,
        report,
    })
}
