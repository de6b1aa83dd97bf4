use nalgebra::{
    Isometry3, Matrix3, Matrix3x4, Matrix4, Point2, Point3, Rotation3, Vector2, Vector3,
};

pub type Real = f64;

pub type Vec2 = Vector2<Real>;
pub type Vec3 = Vector3<Real>;
pub type Pt2 = Point2<Real>;
pub type Pt3 = Point3<Real>;
pub type Mat3 = Matrix3<Real>;
pub type Mat34 = Matrix3x4<Real>;
pub type Mat4 = Matrix4<Real>;
pub type Iso3 = Isometry3<Real>;

pub fn to_homogeneous(p: &Pt2) -> Vec3 {
    Vec3::new(p.x, p.y, 1.0)
}

pub fn from_homogeneous(v: &Vec3) -> Pt2 {
    Pt2::new(v.x / v.z, v.y / v.z)
}

/// Rotation matrix for a Rodrigues vector (unit axis scaled by the angle).
pub fn rotation_from_rodrigues(r: &Vec3) -> Mat3 {
    Rotation3::from_scaled_axis(*r).into_inner()
}

/// Rodrigues vector of a rotation matrix.
///
/// The input is projected onto SO(3) first, so slightly non-orthonormal
/// matrices (e.g. read back from text) are accepted.
pub fn rodrigues_from_rotation(m: &Mat3) -> Vec3 {
    Rotation3::from_matrix(m).scaled_axis()
}

/// Cross-product matrix `[v]×` such that `[v]× w = v × w`.
pub fn skew(v: &Vec3) -> Mat3 {
    Mat3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Row-major nested array view of a 3×3 matrix.
pub fn mat3_to_rows(m: &Mat3) -> [[Real; 3]; 3] {
    [
        [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
        [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
        [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
    ]
}

pub fn mat3_from_rows(a: &[[Real; 3]; 3]) -> Mat3 {
    Mat3::new(
        a[0][0], a[0][1], a[0][2], a[1][0], a[1][1], a[1][2], a[2][0], a[2][1], a[2][2],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rodrigues_round_trip() {
        let r = Vec3::new(0.1, -0.2, 0.05);
        let m = rotation_from_rodrigues(&r);
        let back = rodrigues_from_rotation(&m);
        assert_relative_eq!(back, r, epsilon = 1e-12);
        assert_relative_eq!(m.determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn skew_matches_cross_product() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        let w = Vec3::new(-0.5, 0.25, 4.0);
        assert_relative_eq!(skew(&v) * w, v.cross(&w), epsilon = 1e-12);
    }

    #[test]
    fn row_arrays_are_row_major() {
        let m = Mat3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0);
        let rows = mat3_to_rows(&m);
        assert_eq!(rows[0], [1.0, 2.0, 3.0]);
        assert_eq!(rows[2], [7.0, 8.0, 9.0]);
        assert_eq!(mat3_from_rows(&rows), m);
    }
}
