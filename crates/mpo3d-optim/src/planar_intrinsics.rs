use anyhow::{ensure, Result};
use mpo3d_core::{BrownConrady5, Intrinsics, Iso3, PinholeCamera, Pt3, Real, Vec2};
use nalgebra::DVector;

use crate::pose_params::{read_pose, write_pose, POSE_DIM};
use crate::{rms_from_residuals, NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};

/// fx, fy, cx, cy followed by k1, k2, p1, p2, k3.
const CAMERA_DIM: usize = 9;

/// Observations for a single image/view of the planar target.
#[derive(Debug, Clone)]
pub struct PlanarViewObservations {
    /// 3D points in board coordinates (z = 0).
    pub points_3d: Vec<Pt3>,
    /// Corresponding detected image points (pixels).
    pub points_2d: Vec<Vec2>,
}

impl PlanarViewObservations {
    pub fn new(points_3d: Vec<Pt3>, points_2d: Vec<Vec2>) -> Result<Self> {
        ensure!(
            points_3d.len() == points_2d.len(),
            "3D / 2D point counts must match ({} vs {})",
            points_3d.len(),
            points_2d.len()
        );
        ensure!(
            points_3d.len() >= 4,
            "view has too few points (need >= 4, got {})",
            points_3d.len()
        );
        Ok(Self {
            points_3d,
            points_2d,
        })
    }

    pub fn len(&self) -> usize {
        self.points_3d.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points_3d.is_empty()
    }
}

/// Non-linear refinement problem for planar intrinsics (and per-view poses).
///
/// Skew is held at zero.
#[derive(Debug, Clone)]
pub struct PlanarIntrinsicsProblem {
    views: Vec<PlanarViewObservations>,
}

impl PlanarIntrinsicsProblem {
    pub fn new(views: Vec<PlanarViewObservations>) -> Result<Self> {
        ensure!(!views.is_empty(), "need at least one view for calibration");
        Ok(Self { views })
    }

    pub fn views(&self) -> &[PlanarViewObservations] {
        &self.views
    }

    pub fn num_views(&self) -> usize {
        self.views.len()
    }
}

/// Pack initial intrinsics, distortion and poses into parameter vector.
pub fn pack_initial_params(camera: &PinholeCamera, poses_board_to_cam: &[Iso3]) -> DVector<Real> {
    let mut x = DVector::zeros(CAMERA_DIM + POSE_DIM * poses_board_to_cam.len());

    let k = &camera.k;
    x[0] = k.fx;
    x[1] = k.fy;
    x[2] = k.cx;
    x[3] = k.cy;
    for (i, c) in camera.dist.to_array().iter().enumerate() {
        x[4 + i] = *c;
    }

    for (i, pose) in poses_board_to_cam.iter().enumerate() {
        write_pose(&mut x, CAMERA_DIM + POSE_DIM * i, pose);
    }
    x
}

fn decode_camera(x: &DVector<Real>) -> PinholeCamera {
    PinholeCamera::new(
        Intrinsics::new(x[0], x[1], x[2], x[3]),
        BrownConrady5::from_array([x[4], x[5], x[6], x[7], x[8]]),
    )
}

/// Decode parameter vector into camera + per-view poses.
pub fn decode_params(num_views: usize, x: &DVector<Real>) -> (PinholeCamera, Vec<Iso3>) {
    let poses = (0..num_views)
        .map(|i| read_pose(x, CAMERA_DIM + POSE_DIM * i))
        .collect();
    (decode_camera(x), poses)
}

impl NllsProblem for PlanarIntrinsicsProblem {
    fn num_params(&self) -> usize {
        CAMERA_DIM + POSE_DIM * self.num_views()
    }

    fn num_residuals(&self) -> usize {
        self.views.iter().map(|v| 2 * v.len()).sum()
    }

    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let camera = decode_camera(x);
        let mut r = DVector::zeros(self.num_residuals());
        let mut offset = 0;

        for (view_idx, view) in self.views.iter().enumerate() {
            let pose = read_pose(x, CAMERA_DIM + POSE_DIM * view_idx);
            for (pw, meas) in view.points_3d.iter().zip(&view.points_2d) {
                // board → camera
                let proj = camera.project(&pose.transform_point(pw));
                r[offset] = meas.x - proj.x;
                r[offset + 1] = meas.y - proj.y;
                offset += 2;
            }
        }
        r
    }
}

/// Refined single-camera calibration.
#[derive(Debug, Clone)]
pub struct PlanarIntrinsicsEstimate {
    pub camera: PinholeCamera,
    /// Board-to-camera pose per view.
    pub poses: Vec<Iso3>,
    /// RMS reprojection error in pixels.
    pub rms: Real,
    pub report: SolveReport,
}

/// Refine camera intrinsics, distortion and per-view poses.
pub fn refine_planar_intrinsics<B: NllsSolverBackend>(
    backend: &B,
    problem: &PlanarIntrinsicsProblem,
    camera: &PinholeCamera,
    poses: &[Iso3],
    opts: &SolveOptions,
) -> Result<PlanarIntrinsicsEstimate> {
    ensure!(
        poses.len() == problem.num_views(),
        "need one initial pose per view ({} poses, {} views)",
        poses.len(),
        problem.num_views()
    );

    let x0 = pack_initial_params(camera, poses);
    let (x_opt, report) = backend.solve(problem, x0, opts);
    let rms = rms_from_residuals(&problem.residuals(&x_opt));
    ensure!(rms.is_finite(), "intrinsics refinement diverged");

    let (camera, poses) = decode_params(problem.num_views(), &x_opt);
    ensure!(
        camera.k.fx > 0.0 && camera.k.fy > 0.0,
        "intrinsics refinement produced a non-positive focal length"
    );
    log::debug!(
        "planar intrinsics: fx {:.2} fy {:.2} cx {:.2} cy {:.2}, rms {:.4} px",
        camera.k.fx,
        camera.k.fy,
        camera.k.cx,
        camera.k.cy,
        rms
    );

    Ok(PlanarIntrinsicsEstimate {
        camera,
        poses,
        rms,
        report,
    })
}
