//! Stereo rectification.
//!
//! Both cameras are rotated half-way towards each other and then about the
//! optical axis so the baseline lies along the rectified x axis. The two
//! rectified cameras share one focal length and, with zero-disparity
//! alignment, one principal point. Points at infinity therefore have zero
//! disparity and [`StereoRectification::q`] maps `(x, y, d, 1)` to a
//! homogeneous 3D point in the rectified left frame.

use mpo3d_core::{
    rodrigues_from_rotation, rotation_from_rodrigues, Mat3, Mat34, Mat4, PinholeCamera, Pt3, Real,
    Vec2, Vec3,
};
use mpo3d_image::RemapMaps;
use serde::{Deserialize, Serialize};

use crate::{CalibrationParameters, GeometryError};

/// Samples per image side when tracing the rectified image border.
const BORDER_SAMPLES: usize = 9;

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Overlap with `other`; empty rectangles collapse to all zeros.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width).min(other.x + other.width);
        let y1 = (self.y + self.height).min(other.y + other.height);
        if x1 <= x0 || y1 <= y0 {
            return Rect::default();
        }
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            i64::from(self.width) * i64::from(self.height)
        }
    }
}

/// Rectifying rotations, projections and the reprojection matrix of a rig.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoRectification {
    /// Rotation from the unrectified to the rectified left camera frame.
    pub r1: Mat3,
    pub r2: Mat3,
    /// Projection of the rectified left camera.
    pub p1: Mat34,
    /// Projection of the rectified right camera; `p2[(0, 3)]` is `Tx * f`.
    pub p2: Mat34,
    /// Disparity-to-depth mapping.
    pub q: Mat4,
    /// Region of the rectified left image holding only valid pixels.
    pub roi1: Rect,
    pub roi2: Rect,
}

/// Inner rectangle of the rectified image, traced through a grid of border
/// samples mapped into the rectified view.
fn valid_rect(camera: &PinholeCamera, r: &Mat3, p: &Mat34, width: usize, height: usize) -> Rect {
    let n = BORDER_SAMPLES;
    let (mut x0, mut x1) = (Real::MIN, Real::MAX);
    let (mut y0, mut y1) = (Real::MIN, Real::MAX);
    for j in 0..n {
        for i in 0..n {
            let px = Vec2::new(
                i as Real * (width as Real - 1.0) / (n - 1) as Real,
                j as Real * (height as Real - 1.0) / (n - 1) as Real,
            );
            let und = camera.undistort_pixel(&px);
            let ray = r * Vec3::new(und.x, und.y, 1.0);
            let u = p[(0, 0)] * ray.x / ray.z + p[(0, 2)];
            let v = p[(1, 1)] * ray.y / ray.z + p[(1, 2)];
            if i == 0 {
                x0 = x0.max(u);
            }
            if i == n - 1 {
                x1 = x1.min(u);
            }
            if j == 0 {
                y0 = y0.max(v);
            }
            if j == n - 1 {
                y1 = y1.min(v);
            }
        }
    }
    let inner = Rect::new(
        x0.ceil() as i32,
        y0.ceil() as i32,
        (x1 - x0).floor() as i32,
        (y1 - y0).floor() as i32,
    );
    inner.intersect(&Rect::new(0, 0, width as i32, height as i32))
}

/// Principal point that centres the rotated, undistorted image corners in a
/// `width x height` frame with focal length `f`.
fn principal_point(
    camera: &PinholeCamera,
    r: &Mat3,
    f: Real,
    width: usize,
    height: usize,
) -> Vec2 {
    let (w, h) = (width as Real - 1.0, height as Real - 1.0);
    let mut sum = Vec2::zeros();
    for corner in [
        Vec2::new(0.0, 0.0),
        Vec2::new(w, 0.0),
        Vec2::new(0.0, h),
        Vec2::new(w, h),
    ] {
        let und = camera.undistort_pixel(&corner);
        let ray = r * Vec3::new(und.x, und.y, 1.0);
        sum += Vec2::new(f * ray.x / ray.z, f * ray.y / ray.z);
    }
    Vec2::new(w / 2.0, h / 2.0) - sum / 4.0
}

/// Zero-disparity rectification of a calibrated rig for `width x height`
/// images.
pub fn stereo_rectify(
    params: &CalibrationParameters,
    width: usize,
    height: usize,
) -> Result<StereoRectification, GeometryError> {
    if width < 2 || height < 2 {
        return Err(GeometryError::Rectification("image too small"));
    }

    // Split the relative rotation evenly between the cameras.
    let half = rotation_from_rodrigues(&(rodrigues_from_rotation(&params.rotation) * -0.5));
    let t = half * params.translation;

    // Horizontal rig: bring the baseline onto the x axis.
    let horizontal = t.x.abs() >= t.y.abs();
    let (axis, c) = if horizontal { (0, t.x) } else { (1, t.y) };
    let mut target = Vec3::zeros();
    target[axis] = if c > 0.0 { 1.0 } else { -1.0 };
    let nt = t.norm();
    if nt <= Real::EPSILON {
        return Err(GeometryError::Rectification("zero baseline"));
    }
    let mut w = t.cross(&target);
    let nw = w.norm();
    if nw > 0.0 {
        w *= (c.abs() / nt).clamp(-1.0, 1.0).acos() / nw;
    }
    let wr = rotation_from_rodrigues(&w);

    let r1 = wr * half.transpose();
    let r2 = wr * half;
    let t_rect = r2 * params.translation;
    let tx = t_rect[axis];
    if tx.abs() <= Real::EPSILON {
        return Err(GeometryError::Rectification("baseline vanishes after rotation"));
    }

    // Shared focal length: mean of the focal lengths across the baseline.
    let f = if horizontal {
        0.5 * (params.left.k.fy + params.right.k.fy)
    } else {
        0.5 * (params.left.k.fx + params.right.k.fx)
    };

    let c1 = principal_point(&params.left, &r1, f, width, height);
    let c2 = principal_point(&params.right, &r2, f, width, height);
    let cc = (c1 + c2) / 2.0;

    let mut p1 = Mat34::zeros();
    p1[(0, 0)] = f;
    p1[(1, 1)] = f;
    p1[(0, 2)] = cc.x;
    p1[(1, 2)] = cc.y;
    p1[(2, 2)] = 1.0;
    let mut p2 = p1;
    p2[(axis, 3)] = tx * f;

    let q = Mat4::new(
        1.0, 0.0, 0.0, -cc.x, //
        0.0, 1.0, 0.0, -cc.y, //
        0.0, 0.0, 0.0, f, //
        0.0, 0.0, -1.0 / tx, 0.0,
    );

    let roi1 = valid_rect(&params.left, &r1, &p1, width, height);
    let roi2 = valid_rect(&params.right, &r2, &p2, width, height);
    log::debug!(
        "rectified: f {:.2}, c ({:.2}, {:.2}), tx {:.4}, roi {:?} / {:?}",
        f,
        cc.x,
        cc.y,
        tx,
        roi1,
        roi2
    );

    Ok(StereoRectification {
        r1,
        r2,
        p1,
        p2,
        q,
        roi1,
        roi2,
    })
}

/// Lookup tables that warp a raw image of `camera` into the rectified view
/// described by rotation `r` and projection `p`.
pub fn init_undistort_rectify_map(
    camera: &PinholeCamera,
    r: &Mat3,
    p: &Mat34,
    width: usize,
    height: usize,
) -> Result<RemapMaps, GeometryError> {
    let ar: Mat3 = p.fixed_view::<3, 3>(0, 0).into_owned();
    let inv = (ar * r)
        .try_inverse()
        .ok_or(GeometryError::Rectification("singular rectified projection"))?;

    Ok(RemapMaps::from_fn(width, height, |x, y| {
        let ray = inv * Vec3::new(x as Real, y as Real, 1.0);
        if ray.z.abs() <= Real::EPSILON {
            return (f32::NAN, f32::NAN);
        }
        let src = camera.project(&Pt3::from(ray));
        (src.x as f32, src.y as f32)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mpo3d_core::{BrownConrady5, Intrinsics, Iso3};
    use nalgebra::{Translation3, UnitQuaternion};

    fn rig() -> CalibrationParameters {
        let left = PinholeCamera::new(
            Intrinsics::new(700.0, 700.0, 320.0, 240.0),
            BrownConrady5 {
                k1: -0.05,
                ..BrownConrady5::default()
            },
        );
        let right = PinholeCamera::new(
            Intrinsics::new(710.0, 706.0, 315.0, 244.0),
            BrownConrady5::default(),
        );
        let l2r = Iso3::from_parts(
            Translation3::new(-60.0, 1.0, 0.5),
            UnitQuaternion::from_euler_angles(0.004, -0.02, 0.003),
        );
        CalibrationParameters::from_extrinsics(left, right, &l2r).unwrap()
    }

    #[test]
    fn rectified_rows_align() {
        let params = rig();
        let rect = stereo_rectify(&params, 640, 480).unwrap();
        let l2r = params.left_to_right();

        for p in [Pt3::new(30.0, -25.0, 600.0), Pt3::new(-50.0, 40.0, 900.0)] {
            let a = rect.r1 * p.coords;
            let b = rect.r2 * (l2r * p).coords;
            let va = rect.p1[(1, 1)] * a.y / a.z + rect.p1[(1, 2)];
            let vb = rect.p2[(1, 1)] * b.y / b.z + rect.p2[(1, 2)];
            assert_relative_eq!(va, vb, epsilon = 1e-8);
        }
    }

    #[test]
    fn q_recovers_depth_from_disparity() {
        let params = rig();
        let rect = stereo_rectify(&params, 640, 480).unwrap();
        let l2r = params.left_to_right();
        let p = Pt3::new(20.0, 10.0, 750.0);

        let a = rect.r1 * p.coords;
        let ul = rect.p1[(0, 0)] * a.x / a.z + rect.p1[(0, 2)];
        let vl = rect.p1[(1, 1)] * a.y / a.z + rect.p1[(1, 2)];
        let b = rect.r2 * (l2r * p).coords;
        let ur = rect.p2[(0, 0)] * b.x / b.z + rect.p2[(0, 2)];
        // The rectified right camera sees the point at the same depth.
        assert_relative_eq!(a.z, b.z, epsilon = 1e-6);

        let d = ul - ur;
        assert!(d > 0.0);
        let h = rect.q * nalgebra::Vector4::new(ul, vl, d, 1.0);
        let rec = Vec3::new(h.x / h.w, h.y / h.w, h.z / h.w);
        assert_relative_eq!(rec, a, epsilon = 1e-6);
    }

    #[test]
    fn maps_invert_the_rectification() {
        let params = rig();
        let rect = stereo_rectify(&params, 64, 48).unwrap();
        let maps = init_undistort_rectify_map(&params.left, &rect.r1, &rect.p1, 64, 48).unwrap();
        assert_eq!((maps.width(), maps.height()), (64, 48));

        // The source pixel of a rectified pixel maps forward onto it again.
        let (sx, sy) = maps.source(30, 20);
        let und = params.left.undistort_pixel(&Vec2::new(f64::from(sx), f64::from(sy)));
        let ray = rect.r1 * Vec3::new(und.x, und.y, 1.0);
        let u = rect.p1[(0, 0)] * ray.x / ray.z + rect.p1[(0, 2)];
        let v = rect.p1[(1, 1)] * ray.y / ray.z + rect.p1[(1, 2)];
        assert_relative_eq!(u, 30.0, epsilon = 1e-2);
        assert_relative_eq!(v, 20.0, epsilon = 1e-2);
    }

    #[test]
    fn valid_regions_lie_inside_the_image() {
        let rect = stereo_rectify(&rig(), 640, 480).unwrap();
        for roi in [rect.roi1, rect.roi2] {
            assert!(!roi.is_empty());
            assert!(roi.x >= 0 && roi.y >= 0);
            assert!(roi.x + roi.width <= 640 && roi.y + roi.height <= 480);
            assert!(roi.area() > 640 * 480 / 2);
        }
    }

    #[test]
    fn rect_intersection() {
        let a = Rect::new(0, 0, 10, 10);
        assert_eq!(a.intersect(&Rect::new(5, 6, 10, 10)), Rect::new(5, 6, 5, 4));
        assert!(a.intersect(&Rect::new(20, 0, 5, 5)).is_empty());
    }
}
