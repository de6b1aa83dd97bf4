use mpo3d_core::{Intrinsics, Mat3, Real};
use nalgebra::{DMatrix, DVector, SVector};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntrinsicsInitError {
    #[error("need at least {required} homographies, got {got}")]
    NotEnoughViews { required: usize, got: usize },
    #[error("degenerate configuration in intrinsics estimation")]
    Degenerate,
    #[error("svd failed")]
    SvdFailed,
}

/// Build the 6-vector v_ij(H) as in Zhang's method.
fn v_ij(hmtx: &Mat3, i: usize, j: usize) -> SVector<Real, 6> {
    let hi = hmtx.column(i);
    let hj = hmtx.column(j);

    SVector::<Real, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Estimate camera intrinsics K from a set of plane homographies H_k using
/// Zhang's closed-form solution (no distortion).
///
/// Requires at least 3 homographies.
pub fn estimate_intrinsics_from_homographies(
    hmtxs: &[Mat3],
) -> Result<Intrinsics, IntrinsicsInitError> {
    if hmtxs.len() < 3 {
        return Err(IntrinsicsInitError::NotEnoughViews {
            required: 3,
            got: hmtxs.len(),
        });
    }

    let m = hmtxs.len();
    let mut vmtx = DMatrix::<Real>::zeros(2 * m, 6);

    for (k, hmtx) in hmtxs.iter().enumerate() {
        let hn = hmtx / hmtx.norm();
        let v11 = v_ij(&hn, 0, 0);
        let v22 = v_ij(&hn, 1, 1);
        let v12 = v_ij(&hn, 0, 1);

        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    let svd = vmtx.svd(false, true);
    let v_t = svd.v_t.ok_or(IntrinsicsInitError::SvdFailed)?;
    let min_idx = svd.singular_values.imin();
    let b = v_t.row(min_idx);

    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    // v0 = (B12 B13 - B11 B23) / (B11 B22 - B12^2)
    // λ = B33 - (B13^2 + v0 (B12 B13 - B11 B23)) / B11
    // α = sqrt(λ / B11), β = sqrt(λ B11 / (B11 B22 - B12^2))
    // γ = -B12 α^2 β / λ, u0 = γ v0 / β - B13 α^2 / λ
    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    let denom_rel = if denom_norm > 0.0 {
        denom.abs() / denom_norm
    } else {
        0.0
    };
    if denom_rel <= 1e-9 || b11.abs() <= Real::EPSILON {
        return Err(IntrinsicsInitError::Degenerate);
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda.signum() != b11.signum() || denom <= 0.0 {
        return Err(IntrinsicsInitError::Degenerate);
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    let k = Intrinsics {
        fx: alpha,
        fy: beta,
        cx: u0,
        cy: v0,
        skew: gamma,
    };
    if [k.fx, k.fy, k.cx, k.cy].iter().all(|v| v.is_finite()) && k.fx > 0.0 && k.fy > 0.0 {
        Ok(k)
    } else {
        Err(IntrinsicsInitError::Degenerate)
    }
}

/// Estimate the focal lengths from plane homographies with the principal
/// point held at `(cx, cy)` and zero skew.
///
/// This needs only two views and survives configurations where the full
/// Zhang system is ill-conditioned (e.g. nearly fronto-parallel boards).
pub fn estimate_focal_with_fixed_center(
    hmtxs: &[Mat3],
    cx: Real,
    cy: Real,
) -> Result<Intrinsics, IntrinsicsInitError> {
    if hmtxs.len() < 2 {
        return Err(IntrinsicsInitError::NotEnoughViews {
            required: 2,
            got: hmtxs.len(),
        });
    }

    let shift = Mat3::new(1.0, 0.0, -cx, 0.0, 1.0, -cy, 0.0, 0.0, 1.0);
    let mut a = DMatrix::<Real>::zeros(2 * hmtxs.len(), 2);
    let mut rhs = DVector::<Real>::zeros(2 * hmtxs.len());

    for (k, hmtx) in hmtxs.iter().enumerate() {
        let h = shift * hmtx;
        let c1 = h.column(0).into_owned();
        let c2 = h.column(1).into_owned();
        let d1 = (c1 + c2).normalize();
        let d2 = (c1 - c2).normalize();
        let h1 = c1.normalize();
        let h2 = c2.normalize();

        // Orthogonality of the two in-plane axes, for both the columns and
        // their diagonals.
        a[(2 * k, 0)] = h1[0] * h2[0];
        a[(2 * k, 1)] = h1[1] * h2[1];
        rhs[2 * k] = -h1[2] * h2[2];
        a[(2 * k + 1, 0)] = d1[0] * d2[0];
        a[(2 * k + 1, 1)] = d1[1] * d2[1];
        rhs[2 * k + 1] = -d1[2] * d2[2];
    }

    let svd = a.svd(true, true);
    let f = svd
        .solve(&rhs, 1e-12)
        .map_err(|_| IntrinsicsInitError::SvdFailed)?;

    if f[0].abs() <= Real::EPSILON || f[1].abs() <= Real::EPSILON {
        return Err(IntrinsicsInitError::Degenerate);
    }
    let fx = (1.0 / f[0].abs()).sqrt();
    let fy = (1.0 / f[1].abs()).sqrt();
    if !fx.is_finite() || !fy.is_finite() {
        return Err(IntrinsicsInitError::Degenerate);
    }

    Ok(Intrinsics::new(fx, fy, cx, cy))
}
