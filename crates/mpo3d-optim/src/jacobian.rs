use mpo3d_core::Real;
use nalgebra::{DMatrix, DVector};

/// Central-difference Jacobian of `f` at `x`.
///
/// The step for parameter `k` is `1e-6 * max(1, |x_k|)`.
pub fn numeric_jacobian<F>(f: F, x: &DVector<Real>) -> DMatrix<Real>
where
    F: Fn(&DVector<Real>) -> DVector<Real>,
{
    let n = x.len();
    let mut x_pert = x.clone();
    let mut j: Option<DMatrix<Real>> = None;

    for k in 0..n {
        let step = 1e-6 * x[k].abs().max(1.0);
        x_pert[k] = x[k] + step;
        let r_plus = f(&x_pert);
        x_pert[k] = x[k] - step;
        let r_minus = f(&x_pert);
        x_pert[k] = x[k];

        let jac = j.get_or_insert_with(|| DMatrix::zeros(r_plus.len(), n));
        jac.set_column(k, &((r_plus - r_minus) / (2.0 * step)));
    }

    j.unwrap_or_else(|| DMatrix::zeros(f(x).len(), 0))
}
