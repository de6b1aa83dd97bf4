//! Stereo camera scenarios on synthetic rigs.

use mpo3d_camera::{
    CalibrationError, CalibrationParameters, CameraState, GeometryError, ParameterStore, Side,
    StereoCamera, StereoCameraConfig,
};
use mpo3d_core::synthetic::board_poses;
use mpo3d_core::{BrownConrady5, Intrinsics, Iso3, PinholeCamera, Vec2, Vec3};
use mpo3d_image::{ImageBuffer, PatternKind, PixelFormat, SgbmParams};
use nalgebra::{Translation3, UnitQuaternion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SUPERSAMPLE: usize = 4;

fn config_in(dir: &std::path::Path) -> StereoCameraConfig {
    StereoCameraConfig {
        param_path: dir.join("stereo.json"),
        ..StereoCameraConfig::default()
    }
}

/// Render a chessboard with `rows x cols` inner corners seen by `camera`
/// from `pose` (board → camera). Inner corner `(c, r)` sits at
/// `(c * square, r * square)` on the board.
fn render_chessboard(
    camera: &PinholeCamera,
    pose: &Iso3,
    (w, h): (usize, usize),
    rows: usize,
    cols: usize,
    square: f64,
) -> ImageBuffer {
    let normal = pose.rotation * Vec3::z();
    let origin = pose.translation.vector;
    let inv = pose.inverse();
    let dark_at = |px: f64, py: f64| -> bool {
        let ray = camera.unproject_ray(&Vec2::new(px, py));
        let denom = normal.dot(&ray);
        if denom.abs() < 1e-12 {
            return false;
        }
        let s = normal.dot(&origin) / denom;
        if s <= 0.0 {
            return false;
        }
        let b = inv * nalgebra::Point3::from(ray * s);
        let (u, v) = (b.x + square, b.y + square);
        let (bw, bh) = ((cols + 1) as f64 * square, (rows + 1) as f64 * square);
        if u < 0.0 || v < 0.0 || u >= bw || v >= bh {
            return false;
        }
        ((u / square).floor() as i64 + (v / square).floor() as i64) % 2 == 0
    };

    let n = (SUPERSAMPLE * SUPERSAMPLE) as f64;
    ImageBuffer::from_fn(w, h, PixelFormat::Rgb, |x, y| {
        let mut dark = 0.0;
        for sy in 0..SUPERSAMPLE {
            for sx in 0..SUPERSAMPLE {
                let px = x as f64 + (sx as f64 + 0.5) / SUPERSAMPLE as f64 - 0.5;
                let py = y as f64 + (sy as f64 + 0.5) / SUPERSAMPLE as f64 - 0.5;
                if dark_at(px, py) {
                    dark += 1.0;
                }
            }
        }
        let v = (255.0 * (1.0 - dark / n)).round() as u8;
        [v, v, v]
    })
}

/// Rectified-by-construction rig: identical pinholes, pure x baseline.
fn parallel_rig(f: f64, w: usize, h: usize, baseline: f64) -> CalibrationParameters {
    let k = Intrinsics::new(f, f, (w as f64 - 1.0) / 2.0, (h as f64 - 1.0) / 2.0);
    let cam = PinholeCamera::new(k, BrownConrady5::default());
    let l2r = Iso3::translation(-baseline, 0.0, 0.0);
    CalibrationParameters::from_extrinsics(cam, cam, &l2r).unwrap()
}

fn textured_pair(w: usize, h: usize, shift: usize) -> (ImageBuffer, ImageBuffer) {
    let mut rng = StdRng::seed_from_u64(11);
    let tex: Vec<u8> = (0..(w + shift) * h).map(|_| rng.gen()).collect();
    let at = |x: usize, y: usize| tex[y * (w + shift) + x];
    let left = ImageBuffer::from_fn(w, h, PixelFormat::Rgb, |x, y| [at(x, y); 3]);
    let right = ImageBuffer::from_fn(w, h, PixelFormat::Rgb, |x, y| [at(x + shift, y); 3]);
    (left, right)
}

#[test]
fn calibration_requires_three_pairs() {
    let dir = tempfile::tempdir().unwrap();
    let mut camera = StereoCamera::new(config_in(dir.path()), SgbmParams::default());
    let img = ImageBuffer::new(32, 32, PixelFormat::Rgb);
    let pairs = vec![img.clone(), img];

    let err = camera
        .calibrate(&pairs, &pairs, PatternKind::Chessboard, 5, 7, 25.0)
        .unwrap_err();
    assert!(matches!(
        err,
        CalibrationError::InsufficientSamples {
            required: 3,
            got: 2
        }
    ));
    assert_eq!(camera.state(), CameraState::Uninitialized);
    assert!(!dir.path().join("stereo.json").exists());
}

#[test]
fn calibration_rejects_blank_images() {
    let dir = tempfile::tempdir().unwrap();
    let mut camera = StereoCamera::new(config_in(dir.path()), SgbmParams::default());
    let blank = vec![ImageBuffer::from_fn(64, 48, PixelFormat::Rgb, |_, _| [200; 3]); 3];

    let err = camera
        .calibrate(&blank, &blank, PatternKind::CircleGrid, 4, 5, 10.0)
        .unwrap_err();
    assert!(matches!(
        err,
        CalibrationError::PatternNotFound {
            side: Side::Left,
            index: 0,
            ..
        }
    ));

    let mut mixed = blank.clone();
    mixed[2] = ImageBuffer::new(60, 48, PixelFormat::Rgb);
    assert!(matches!(
        camera.calibrate(&blank, &mixed, PatternKind::Chessboard, 4, 5, 10.0),
        Err(CalibrationError::ImageSizeMismatch {
            side: Side::Right,
            index: 2,
            ..
        })
    ));
    assert!(!camera.is_valid());
}

#[test]
fn reconstruct_requires_calibration() {
    let dir = tempfile::tempdir().unwrap();
    let mut camera = StereoCamera::open(config_in(dir.path()), SgbmParams::default());
    assert_eq!(camera.state(), CameraState::Uninitialized);

    let (left, right) = textured_pair(48, 32, 4);
    assert!(matches!(
        camera.reconstruct(&left, &right),
        Err(GeometryError::NotCalibrated)
    ));
}

#[test]
fn open_loads_a_stored_calibration() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let params = parallel_rig(200.0, 96, 64, 15.0);
    ParameterStore::new(&config.param_path).save(&params).unwrap();

    let camera = StereoCamera::open(config, SgbmParams::default());
    assert_eq!(camera.state(), CameraState::Loaded);
    assert!(camera.is_valid());
    assert_eq!(camera.parameters(), Some(&params));
}

#[test]
fn reconstructs_a_fronto_parallel_plane() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    // depth = f * baseline / d = 200 * 15 / 6 = 500
    ParameterStore::new(&config.param_path)
        .save(&parallel_rig(200.0, 96, 64, 15.0))
        .unwrap();
    let mut camera = StereoCamera::open(config, SgbmParams::default());

    let (left, right) = textured_pair(96, 64, 6);
    let rec = camera.reconstruct(&left, &right).unwrap();
    assert_eq!(rec.left_rectified, left);
    assert_eq!(rec.disparity.num_disparities(), 16);

    let vertices = rec.cloud.vertices();
    assert!(vertices.len() > 96 * 64 / 2, "only {} points", vertices.len());
    let near_plane = vertices
        .iter()
        .filter(|v| (v.position().z - 500.0).abs() < 20.0)
        .count();
    assert!(near_plane * 4 >= vertices.len() * 3, "{near_plane} of {}", vertices.len());
    for v in vertices {
        assert!(v.position().coords.iter().all(|c| c.is_finite()));
        assert!((0.0..1000.0).contains(&v.position().z));
    }

    let (roi_left, roi_right) = camera.valid_rois().unwrap();
    assert!(!roi_left.is_empty() && !roi_right.is_empty());
}

#[test]
fn featureless_pair_yields_empty_cloud() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    ParameterStore::new(&config.param_path)
        .save(&parallel_rig(200.0, 64, 32, 15.0))
        .unwrap();
    let mut camera = StereoCamera::open(config, SgbmParams::default());

    let flat = ImageBuffer::from_fn(64, 32, PixelFormat::Rgb, |_, _| [90; 3]);
    assert!(matches!(
        camera.reconstruct(&flat, &flat),
        Err(GeometryError::PointCloudEmpty)
    ));
    assert!(camera.valid_rois().is_none());
}

#[test]
fn calibrates_a_rendered_rig_and_persists_it() {
    let size = (480, 360);
    let (rows, cols, square) = (5, 7, 30.0);
    let left_cam = PinholeCamera::new(
        Intrinsics::new(520.0, 520.0, 241.0, 178.0),
        BrownConrady5 {
            k1: -0.05,
            ..BrownConrady5::default()
        },
    );
    let right_cam = PinholeCamera::new(
        Intrinsics::new(525.0, 524.0, 237.0, 182.0),
        BrownConrady5::default(),
    );
    let l2r = Iso3::from_parts(
        Translation3::new(-60.0, 0.5, 1.0),
        UnitQuaternion::from_euler_angles(0.003, -0.01, 0.002),
    );

    let poses = board_poses(4, Vec2::new(90.0, 60.0), 560.0);
    let left: Vec<ImageBuffer> = poses
        .iter()
        .map(|p| render_chessboard(&left_cam, p, size, rows, cols, square))
        .collect();
    let right: Vec<ImageBuffer> = poses
        .iter()
        .map(|p| render_chessboard(&right_cam, &(l2r * p), size, rows, cols, square))
        .collect();

    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let mut camera = StereoCamera::new(config.clone(), SgbmParams::default());
    let report = camera
        .calibrate(&left, &right, PatternKind::Chessboard, rows, cols, square)
        .unwrap();

    assert_eq!(camera.state(), CameraState::Calibrated);
    assert!(report.left_rms < 0.5, "left rms {}", report.left_rms);
    assert!(report.stereo_rms < 0.5, "stereo rms {}", report.stereo_rms);
    assert_eq!(report.left_points.len(), 4);
    assert_eq!(report.left_points[0].len(), rows * cols);

    let params = camera.parameters().unwrap().clone();
    assert!((params.left.k.fx - 520.0).abs() < 15.0, "fx {}", params.left.k.fx);
    assert!((params.translation.norm() - l2r.translation.vector.norm()).abs() < 3.0);
    assert!(params.translation.x < 0.0);

    // The stored document reproduces the calibration exactly.
    let reopened = StereoCamera::open(config, SgbmParams::default());
    assert_eq!(reopened.parameters(), Some(&params));
}
