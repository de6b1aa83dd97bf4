use mpo3d_core::synthetic::grid_points;
use mpo3d_core::{PointCloud, Real, Vec2};
use mpo3d_image::{compute_disparity_sgbm, DisparityMap, ImageBuffer, PatternKind, SgbmParams};

use crate::calibrate::{calibrate_single_camera, calibrate_stereo};
use crate::rectify::{init_undistort_rectify_map, stereo_rectify, Rect};
use crate::reproject::disparity_to_vertices;
use crate::{
    CalibrationError, CalibrationParameters, GeometryError, ParameterStore, Side,
    StereoCameraConfig, StoreError,
};

/// Smallest number of stereo pairs accepted by [`StereoCamera::calibrate`].
pub const MIN_CALIBRATION_PAIRS: usize = 3;

/// Where the parameters of a [`StereoCamera`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    Uninitialized,
    /// Read from the parameter store.
    Loaded,
    /// Produced by [`StereoCamera::calibrate`].
    Calibrated,
}

/// Outcome of a successful calibration.
#[derive(Debug, Clone)]
pub struct CalibrationReport {
    /// RMS reprojection error of the left camera solve, in pixels.
    pub left_rms: Real,
    pub right_rms: Real,
    /// RMS reprojection error of the stereo solve over both images.
    pub stereo_rms: Real,
    /// Detected pattern points per left image, row-major.
    pub left_points: Vec<Vec<Vec2>>,
    pub right_points: Vec<Vec<Vec2>>,
}

/// Products of one reconstruction.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub cloud: PointCloud,
    pub left_rectified: ImageBuffer,
    pub right_rectified: ImageBuffer,
    pub disparity: DisparityMap,
}

/// Intrinsic and extrinsic state of a stereo rig.
#[derive(Debug, Clone)]
pub struct StereoCamera {
    config: StereoCameraConfig,
    sgbm: SgbmParams,
    params: Option<CalibrationParameters>,
    state: CameraState,
    valid_rois: Option<(Rect, Rect)>,
}

impl StereoCamera {
    /// Uncalibrated camera; nothing is read from disk.
    pub fn new(config: StereoCameraConfig, sgbm: SgbmParams) -> Self {
        Self {
            config,
            sgbm,
            params: None,
            state: CameraState::Uninitialized,
            valid_rois: None,
        }
    }

    /// Camera loaded from the parameter store named in `config`.
    ///
    /// A missing or unreadable store is not fatal: the camera stays
    /// uninitialized and a warning is logged.
    pub fn open(config: StereoCameraConfig, sgbm: SgbmParams) -> Self {
        let mut camera = Self::new(config, sgbm);
        if let Err(e) = camera.load() {
            log::warn!("{e}; continuing without a calibrated camera");
        }
        camera
    }

    /// Replace the parameters with the contents of the store.
    ///
    /// On failure the camera is left unchanged.
    pub fn load(&mut self) -> Result<(), StoreError> {
        let params = self.store().load()?;
        log::info!("loaded stereo calibration from {}", self.config.param_path.display());
        self.params = Some(params);
        self.state = CameraState::Loaded;
        self.valid_rois = None;
        Ok(())
    }

    pub fn store(&self) -> ParameterStore {
        ParameterStore::new(&self.config.param_path)
    }

    pub fn config(&self) -> &StereoCameraConfig {
        &self.config
    }

    pub fn sgbm_params(&self) -> &SgbmParams {
        &self.sgbm
    }

    /// True once the fundamental matrix is known.
    pub fn is_valid(&self) -> bool {
        self.params.is_some()
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    pub fn parameters(&self) -> Option<&CalibrationParameters> {
        self.params.as_ref()
    }

    /// Valid-pixel rectangles of the last rectified pair (left, right).
    pub fn valid_rois(&self) -> Option<(Rect, Rect)> {
        self.valid_rois
    }

    /// Calibrate the rig from images of a planar target and persist the
    /// result.
    ///
    /// `left[i]` and `right[i]` must show the same target placement. Board
    /// point `r * cols + c` sits at `(c * spacing, r * spacing, 0)`. The camera
    /// is only modified once every stage, including the store write, has
    /// succeeded.
    pub fn calibrate(
        &mut self,
        left: &[ImageBuffer],
        right: &[ImageBuffer],
        pattern: PatternKind,
        rows: usize,
        cols: usize,
        spacing: Real,
    ) -> Result<CalibrationReport, CalibrationError> {
        if left.len() != right.len() {
            return Err(CalibrationError::PairCountMismatch {
                left: left.len(),
                right: right.len(),
            });
        }
        if left.len() < MIN_CALIBRATION_PAIRS {
            return Err(CalibrationError::InsufficientSamples {
                required: MIN_CALIBRATION_PAIRS,
                got: left.len(),
            });
        }
        let size = (left[0].width(), left[0].height());
        for (side, images) in [(Side::Left, left), (Side::Right, right)] {
            for (index, img) in images.iter().enumerate() {
                let got = (img.width(), img.height());
                if got != size {
                    return Err(CalibrationError::ImageSizeMismatch {
                        side,
                        index,
                        expected: size,
                        got,
                    });
                }
            }
        }

        let detect = |side: Side, images: &[ImageBuffer]| {
            images
                .iter()
                .enumerate()
                .map(|(index, img)| {
                    img.detect_pattern(pattern, rows, cols)
                        .map_err(|source| CalibrationError::PatternNotFound {
                            side,
                            index,
                            source,
                        })
                })
                .collect::<Result<Vec<_>, _>>()
        };
        let left_points = detect(Side::Left, left)?;
        let right_points = detect(Side::Right, right)?;
        log::debug!(
            "{} pattern {}x{} found in {} pairs",
            pattern,
            rows,
            cols,
            left.len()
        );

        let board = grid_points(rows, cols, spacing);
        let opts = &self.config.solve;
        let (w, h) = size;
        let left_est = calibrate_single_camera(&board, &left_points, w, h, opts)
            .map_err(|source| CalibrationError::Camera {
                side: Side::Left,
                source,
            })?;
        let right_est = calibrate_single_camera(&board, &right_points, w, h, opts)
            .map_err(|source| CalibrationError::Camera {
                side: Side::Right,
                source,
            })?;
        let stereo = calibrate_stereo(
            &board,
            &left_est,
            &right_est,
            &left_points,
            &right_points,
            opts,
        )?;

        let params = CalibrationParameters::from_extrinsics(
            left_est.camera,
            right_est.camera,
            &stereo.left_to_right,
        )?;
        self.store().save(&params)?;

        log::info!(
            "stereo calibration: rms left {:.4} px, right {:.4} px, stereo {:.4} px, baseline {:.4}",
            left_est.rms,
            right_est.rms,
            stereo.rms,
            params.translation.norm()
        );
        self.params = Some(params);
        self.state = CameraState::Calibrated;
        self.valid_rois = None;

        Ok(CalibrationReport {
            left_rms: left_est.rms,
            right_rms: right_est.rms,
            stereo_rms: stereo.rms,
            left_points,
            right_points,
        })
    }

    /// Reconstruct a coloured point cloud from a raw stereo pair.
    ///
    /// The pair is rectified, matched with SGBM and reprojected; see
    /// [`disparity_to_vertices`] for the depth filter and vertex convention.
    pub fn reconstruct(
        &mut self,
        left: &ImageBuffer,
        right: &ImageBuffer,
    ) -> Result<Reconstruction, GeometryError> {
        let params = self.params.as_ref().ok_or(GeometryError::NotCalibrated)?;
        let (w, h) = (left.width(), left.height());
        if (right.width(), right.height()) != (w, h) {
            return Err(GeometryError::PairMismatch {
                left: (w, h),
                right: (right.width(), right.height()),
            });
        }
        if left.is_empty() {
            return Err(GeometryError::Image(mpo3d_image::ImageError::Empty));
        }

        let rect = stereo_rectify(params, w, h)?;
        let left_maps = init_undistort_rectify_map(&params.left, &rect.r1, &rect.p1, w, h)?;
        let right_maps = init_undistort_rectify_map(&params.right, &rect.r2, &rect.p2, w, h)?;
        let mut left_rectified = left.clone();
        left_rectified.remap(&left_maps)?;
        let mut right_rectified = right.clone();
        right_rectified.remap(&right_maps)?;

        let disparity = compute_disparity_sgbm(&left_rectified, &right_rectified, &self.sgbm)?;
        let max_depth = self.config.max_depth;
        let vertices = disparity_to_vertices(&disparity, &rect.q, &left_rectified, max_depth);
        if vertices.is_empty() {
            return Err(GeometryError::PointCloudEmpty);
        }
        log::info!("reconstructed {} points", vertices.len());

        self.valid_rois = Some((rect.roi1, rect.roi2));
        Ok(Reconstruction {
            cloud: PointCloud::new(vertices),
            left_rectified,
            right_rectified,
            disparity,
        })
    }
}
