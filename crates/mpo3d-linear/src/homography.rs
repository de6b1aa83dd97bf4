use mpo3d_core::{Mat3, Pt2};
use nalgebra::DMatrix;
use thiserror::Error;

use crate::math::normalize_points_2d;

#[derive(Debug, Error)]
pub enum HomographyError {
    #[error("need at least 4 point correspondences, got {0}")]
    NotEnoughPoints(usize),
    #[error("point sets differ in length: {0} vs {1}")]
    LengthMismatch(usize, usize),
    #[error("degenerate point configuration")]
    Degenerate,
    #[error("svd failed")]
    SvdFailed,
    #[error("matrix is singular")]
    Singular,
}

/// Estimate H such that x' ~ H x using the normalised DLT.
///
/// Both point sets are Hartley-normalised before the SVD and the result is
/// denormalised and scaled so that `H[2,2] = 1`.
pub fn dlt_homography(world: &[Pt2], image: &[Pt2]) -> Result<Mat3, HomographyError> {
    let n = world.len();
    if image.len() != n {
        return Err(HomographyError::LengthMismatch(n, image.len()));
    }
    if n < 4 {
        return Err(HomographyError::NotEnoughPoints(n));
    }

    let (wn, tw) = normalize_points_2d(world).ok_or(HomographyError::Degenerate)?;
    let (im, ti) = normalize_points_2d(image).ok_or(HomographyError::Degenerate)?;

    // A square (or tall) system keeps the null vector in V^T.
    let rows = (2 * n).max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);

    for (i, (pw, pi)) in wn.iter().zip(im.iter()).enumerate() {
        let (x, y) = (pw.x, pw.y);
        let (u, v) = (pi.x, pi.y);

        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    // Solve A h = 0 via SVD (smallest singular value)
    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(HomographyError::SvdFailed)?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |best, (i, &s)| {
            if s < best.1 {
                (i, s)
            } else {
                best
            }
        });
    let h = v_t.row(min_idx);

    let mut hn = Mat3::zeros();
    for r in 0..3 {
        for c in 0..3 {
            hn[(r, c)] = h[3 * r + c];
        }
    }

    let ti_inv = ti.try_inverse().ok_or(HomographyError::Singular)?;
    let mut h_mat = ti_inv * hn * tw;

    // normalise such that H[2,2] = 1
    let scale = h_mat[(2, 2)];
    if scale.abs() <= f64::EPSILON {
        return Err(HomographyError::Degenerate);
    }
    h_mat /= scale;

    Ok(h_mat)
}

/// Apply a homography to a point.
pub fn apply_homography(h: &Mat3, p: &Pt2) -> Pt2 {
    let v = h * nalgebra::Vector3::new(p.x, p.y, 1.0);
    Pt2::new(v.x / v.z, v.y / v.z)
}
