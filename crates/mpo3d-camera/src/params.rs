use mpo3d_core::{skew, Iso3, Mat3, PinholeCamera, Vec3};
use nalgebra::{Rotation3, Translation3, UnitQuaternion};

use crate::CalibrationError;

/// Calibrated state of a stereo rig.
///
/// `rotation` and `translation` map left-camera coordinates into the right
/// camera: `X_r = R X_l + T`.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationParameters {
    pub left: PinholeCamera,
    pub right: PinholeCamera,
    pub rotation: Mat3,
    pub translation: Vec3,
    pub essential: Mat3,
    pub fundamental: Mat3,
}

impl CalibrationParameters {
    /// Parameters for a rig with the given cameras and left→right transform.
    ///
    /// The essential matrix is `[T]× R`; the fundamental matrix is
    /// `K2⁻ᵀ E K1⁻¹`, scaled so that `F[2, 2] == 1` when that entry is not
    /// vanishingly small.
    pub fn from_extrinsics(
        left: PinholeCamera,
        right: PinholeCamera,
        left_to_right: &Iso3,
    ) -> Result<Self, CalibrationError> {
        let rotation = left_to_right.rotation.to_rotation_matrix().into_inner();
        let translation = left_to_right.translation.vector;
        let essential = skew(&translation) * rotation;

        let k1_inv = left
            .k
            .k_matrix()
            .try_inverse()
            .ok_or(CalibrationError::Singular)?;
        let k2_inv = right
            .k
            .k_matrix()
            .try_inverse()
            .ok_or(CalibrationError::Singular)?;
        let mut fundamental = k2_inv.transpose() * essential * k1_inv;
        let f22 = fundamental[(2, 2)];
        if f22.abs() > f64::EPSILON {
            fundamental /= f22;
        }

        Ok(Self {
            left,
            right,
            rotation,
            translation,
            essential,
            fundamental,
        })
    }

    pub fn left_to_right(&self) -> Iso3 {
        let rot = Rotation3::from_matrix(&self.rotation);
        Iso3::from_parts(
            Translation3::from(self.translation),
            UnitQuaternion::from_rotation_matrix(&rot),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mpo3d_core::{BrownConrady5, Intrinsics, Pt3};

    #[test]
    fn epipolar_constraint_holds() {
        let left = PinholeCamera::new(
            Intrinsics::new(700.0, 690.0, 320.0, 240.0),
            BrownConrady5::default(),
        );
        let right = PinholeCamera::new(
            Intrinsics::new(705.0, 700.0, 330.0, 235.0),
            BrownConrady5::default(),
        );
        let l2r = Iso3::from_parts(
            Translation3::new(-60.0, 2.0, 1.0),
            UnitQuaternion::from_euler_angles(0.01, 0.02, -0.01),
        );
        let params = CalibrationParameters::from_extrinsics(left, right, &l2r).unwrap();
        assert_relative_eq!(params.fundamental[(2, 2)], 1.0);

        for p in [Pt3::new(10.0, -20.0, 500.0), Pt3::new(-80.0, 35.0, 900.0)] {
            let xl = left.project(&p);
            let xr = right.project(&(l2r * p));
            let a = Vec3::new(xl.x, xl.y, 1.0);
            let b = Vec3::new(xr.x, xr.y, 1.0);
            let e = b.dot(&(params.fundamental * a));
            assert!(e.abs() < 1e-6, "epipolar residual {e}");
        }
        assert_relative_eq!(
            params.left_to_right().translation.vector,
            l2r.translation.vector
        );
    }
}
