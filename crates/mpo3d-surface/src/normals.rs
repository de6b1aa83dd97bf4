use mpo3d_core::{Mat3, Pt3, Real, Vec3};
use nalgebra::SymmetricEigen;

use crate::KdIndex;

/// Fit a normal to the `k` nearest neighbours of every point.
///
/// Each normal is the eigenvector of the smallest eigenvalue of the
/// neighbourhood covariance, flipped to face `viewpoint`. Coincident points
/// count once. Points with fewer than three distinct neighbours get a zero
/// normal.
pub fn estimate_normals(points: &[Pt3], index: &KdIndex, k: usize, viewpoint: &Pt3) -> Vec<Vec3> {
    let normals: Vec<Vec3> = points
        .iter()
        .map(|p| {
            let normal = point_normal(p, points, index, k);
            if normal.dot(&(viewpoint - p)) < 0.0 {
                -normal
            } else {
                normal
            }
        })
        .collect();
    log::debug!(
        "estimated {} normals from {} neighbours each",
        normals.len(),
        k
    );
    normals
}

fn point_normal(p: &Pt3, points: &[Pt3], index: &KdIndex, k: usize) -> Vec3 {
    let neighbors = index.nearest_distinct(p, k);
    if neighbors.len() < 3 {
        return Vec3::zeros();
    }

    let centroid = neighbors
        .iter()
        .map(|n| points[n.index].coords)
        .sum::<Vec3>()
        / neighbors.len() as Real;
    let mut cov = Mat3::zeros();
    for n in &neighbors {
        let d = points[n.index].coords - centroid;
        cov += d * d.transpose();
    }

    let eigen = SymmetricEigen::new(cov);
    let min_idx = eigen.eigenvalues.imin();
    let normal: Vec3 = eigen.eigenvectors.column(min_idx).into_owned();
    let len = normal.norm();
    if len.is_finite() && len > 1e-12 {
        normal / len
    } else {
        Vec3::zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn plane_normals_face_the_viewpoint() {
        let points: Vec<Pt3> = (0..12)
            .flat_map(|r| (0..12).map(move |c| Pt3::new(c as Real, r as Real, -40.0)))
            .collect();
        let index = KdIndex::new(&points);
        let normals = estimate_normals(&points, &index, 20, &Pt3::origin());
        for n in &normals {
            assert_relative_eq!(n.z, 1.0, epsilon = 1e-9);
        }

        let below = estimate_normals(&points, &index, 20, &Pt3::new(0.0, 0.0, -100.0));
        assert!(below.iter().all(|n| n.z < -0.999));
    }

    #[test]
    fn sphere_normals_are_radial() {
        // Fibonacci lattice on a sphere of radius 10.
        let golden = std::f64::consts::PI * (3.0 - (5.0 as Real).sqrt());
        let points: Vec<Pt3> = (0..1500)
            .map(|i| {
                let z = 1.0 - 2.0 * (i as Real + 0.5) / 1500.0;
                let r = (1.0 - z * z).sqrt();
                let phi = golden * i as Real;
                Pt3::new(10.0 * r * phi.cos(), 10.0 * r * phi.sin(), 10.0 * z)
            })
            .collect();
        let index = KdIndex::new(&points);
        // Viewed from the centre every normal points inward.
        let normals = estimate_normals(&points, &index, 12, &Pt3::origin());
        for (p, n) in points.iter().zip(&normals) {
            let radial = -p.coords.normalize();
            assert!(n.dot(&radial) > 0.98, "{n:?} at {p:?}");
        }
    }

    #[test]
    fn repeated_positions_count_once() {
        let mut points: Vec<Pt3> = (0..5)
            .flat_map(|r| (0..5).map(move |c| Pt3::new(c as Real, r as Real, 10.0)))
            .collect();
        points.extend(std::iter::repeat(Pt3::new(2.0, 2.0, 10.0)).take(30));
        let index = KdIndex::new(&points);
        let normals = estimate_normals(&points, &index, 20, &Pt3::origin());
        for n in &normals {
            assert_relative_eq!(n.z, -1.0, epsilon = 1e-9);
        }

        let stacked = vec![Pt3::new(1.0, 1.0, 1.0); 50];
        let index = KdIndex::new(&stacked);
        let normals = estimate_normals(&stacked, &index, 20, &Pt3::origin());
        assert!(normals.iter().all(|n| *n == Vec3::zeros()));
    }

    #[test]
    fn isolated_points_get_zero_normals() {
        let points = vec![Pt3::new(0.0, 0.0, 1.0), Pt3::new(1.0, 0.0, 1.0)];
        let index = KdIndex::new(&points);
        let normals = estimate_normals(&points, &index, 20, &Pt3::origin());
        assert!(normals.iter().all(|n| *n == Vec3::zeros()));
    }
}
