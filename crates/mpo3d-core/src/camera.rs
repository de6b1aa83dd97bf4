use serde::{Deserialize, Serialize};

use crate::{Mat3, Pt3, Real, Vec2, Vec3};

/// Number of fixed-point iterations used when inverting the distortion.
const UNDISTORT_ITERS: usize = 20;

/// Pinhole intrinsics with optional skew.
///
/// The corresponding calibration matrix `K` has the form:
///
/// ```text
/// [ fx  skew  cx ]
/// [  0   fy   cy ]
/// [  0    0    1 ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: Real,
    pub fy: Real,
    pub cx: Real,
    pub cy: Real,
    pub skew: Real,
}

impl Intrinsics {
    pub fn new(fx: Real, fy: Real, cx: Real, cy: Real) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            skew: 0.0,
        }
    }

    /// Build the 3×3 calibration matrix `K`.
    pub fn k_matrix(&self) -> Mat3 {
        Mat3::new(
            self.fx, self.skew, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0,
        )
    }

    /// Attempt to construct intrinsics from a 3×3 calibration matrix `K`.
    ///
    /// The matrix is first normalised so that `K[2, 2] == 1`. If the lower
    /// triangle is not zero within a small tolerance, `None` is returned.
    pub fn try_from_k_matrix(k: &Mat3) -> Option<Self> {
        let eps = 1e-9;
        let k33 = k[(2, 2)];
        if k33.abs() < eps {
            return None;
        }
        let k_norm = k / k33;
        if k_norm[(1, 0)].abs() > eps || k_norm[(2, 0)].abs() > eps || k_norm[(2, 1)].abs() > eps
        {
            return None;
        }

        Some(Self {
            fx: k_norm[(0, 0)],
            skew: k_norm[(0, 1)],
            cx: k_norm[(0, 2)],
            fy: k_norm[(1, 1)],
            cy: k_norm[(1, 2)],
        })
    }

    /// Map normalised (z = 1) coordinates to pixels.
    pub fn to_pixel(&self, n: &Vec2) -> Vec2 {
        Vec2::new(
            self.fx * n.x + self.skew * n.y + self.cx,
            self.fy * n.y + self.cy,
        )
    }

    /// Map pixels to normalised (z = 1) coordinates.
    pub fn to_normalized(&self, px: &Vec2) -> Vec2 {
        let y = (px.y - self.cy) / self.fy;
        let x = (px.x - self.cx - self.skew * y) / self.fx;
        Vec2::new(x, y)
    }
}

/// Brown–Conrady radial–tangential distortion with five coefficients.
///
/// Coefficients are stored in the conventional `[k1, k2, p1, p2, k3]` order
/// when flattened with [`BrownConrady5::to_array`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BrownConrady5 {
    pub k1: Real,
    pub k2: Real,
    pub p1: Real,
    pub p2: Real,
    pub k3: Real,
}

impl BrownConrady5 {
    pub fn from_array(c: [Real; 5]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
        }
    }

    pub fn to_array(&self) -> [Real; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    /// Apply distortion to undistorted normalised coordinates.
    pub fn distort(&self, n: &Vec2) -> Vec2 {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let x_t = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_t = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Vec2::new(x * radial + x_t, y * radial + y_t)
    }

    /// Invert [`distort`](Self::distort) by fixed-point iteration.
    pub fn undistort(&self, d: &Vec2) -> Vec2 {
        let mut x = d.x;
        let mut y = d.y;
        for _ in 0..UNDISTORT_ITERS {
            let r2 = x * x + y * y;
            let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
            if radial.abs() < Real::EPSILON {
                break;
            }
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            x = (d.x - dx) / radial;
            y = (d.y - dy) / radial;
        }
        Vec2::new(x, y)
    }
}

/// Pinhole camera with Brown–Conrady distortion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinholeCamera {
    pub k: Intrinsics,
    pub dist: BrownConrady5,
}

impl PinholeCamera {
    pub fn new(k: Intrinsics, dist: BrownConrady5) -> Self {
        Self { k, dist }
    }

    /// Project a point in camera coordinates to distorted pixel coordinates.
    ///
    /// The `z` component must be non-zero; the result is not finite otherwise.
    pub fn project(&self, p_c: &Pt3) -> Vec2 {
        let n = Vec2::new(p_c.x / p_c.z, p_c.y / p_c.z);
        self.k.to_pixel(&self.dist.distort(&n))
    }

    /// Undistorted normalised coordinates of a distorted pixel.
    pub fn undistort_pixel(&self, px: &Vec2) -> Vec2 {
        self.dist.undistort(&self.k.to_normalized(px))
    }

    /// Unit ray in camera coordinates through a distorted pixel.
    pub fn unproject_ray(&self, px: &Vec2) -> Vec3 {
        let n = self.undistort_pixel(px);
        Vec3::new(n.x, n.y, 1.0).normalize()
    }
}
