//! Iterative sub-pixel refinement of saddle points.

use mpo3d_core::Vec2;

use crate::float::{sample_bilinear, GrayF32};

/// Termination for [`refine_corners`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubPixCriteria {
    /// Half size of the search window; the window is `2 * half_window + 1` wide.
    pub half_window: usize,
    pub max_iters: usize,
    /// Stop once the squared update falls below `epsilon²`.
    pub epsilon: f64,
}

impl Default for SubPixCriteria {
    fn default() -> Self {
        Self {
            half_window: 5,
            max_iters: 1000,
            epsilon: 1e-8,
        }
    }
}

/// Move every corner to the point where the image gradients in its window are
/// orthogonal to the offsets from it.
///
/// A corner that drifts further than the window from its start is reset.
pub(crate) fn refine_corners(img: &GrayF32, corners: &mut [Vec2], criteria: &SubPixCriteria) {
    let win = criteria.half_window as i64;
    let side = (2 * win + 1) as usize;
    let eps = criteria.epsilon * criteria.epsilon;

    let mut mask = vec![0.0f64; side * side];
    for i in 0..side {
        let y = (i as f64 - win as f64) / win as f64;
        let vy = (-y * y).exp();
        for j in 0..side {
            let x = (j as f64 - win as f64) / win as f64;
            mask[i * side + j] = vy * (-x * x).exp();
        }
    }

    for corner in corners.iter_mut() {
        let start = *corner;
        let mut c = start;
        for _ in 0..criteria.max_iters {
            let (mut a, mut b, mut cc, mut bb1, mut bb2) = (0.0, 0.0, 0.0, 0.0, 0.0);
            for i in 0..side {
                let py = i as f64 - win as f64;
                for j in 0..side {
                    let px = j as f64 - win as f64;
                    let (sx, sy) = (c.x + px, c.y + py);
                    let gx = f64::from(
                        sample_bilinear(img, sx + 1.0, sy) - sample_bilinear(img, sx - 1.0, sy),
                    );
                    let gy = f64::from(
                        sample_bilinear(img, sx, sy + 1.0) - sample_bilinear(img, sx, sy - 1.0),
                    );
                    let m = mask[i * side + j];
                    let gxx = gx * gx * m;
                    let gxy = gx * gy * m;
                    let gyy = gy * gy * m;
                    a += gxx;
                    b += gxy;
                    cc += gyy;
                    bb1 += gxx * px + gxy * py;
                    bb2 += gxy * px + gyy * py;
                }
            }

            let det = a * cc - b * b;
            if det.abs() <= f64::EPSILON {
                break;
            }
            let scale = 1.0 / det;
            let step = Vec2::new(
                cc * scale * bb1 - b * scale * bb2,
                -b * scale * bb1 + a * scale * bb2,
            );
            c += step;
            if step.norm_squared() <= eps {
                break;
            }
        }

        let drift = c - start;
        *corner = if drift.x.abs() > win as f64 || drift.y.abs() > win as f64 {
            start
        } else {
            c
        };
    }
}
