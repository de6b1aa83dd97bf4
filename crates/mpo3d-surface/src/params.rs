use std::f64::consts::PI;

use mpo3d_core::{Pt3, Real};
use serde::{Deserialize, Serialize};

use crate::SurfaceError;

/// Settings of normal estimation and greedy projection triangulation.
///
/// Angles are in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceParams {
    /// Neighbours used to fit the local plane of each normal.
    pub normal_neighbors: usize,
    /// Upper bound on the length of any mesh edge.
    pub search_radius: Real,
    /// Neighbours farther than `mu` times the nearest-neighbour distance of a
    /// point are not connected to it.
    pub mu: Real,
    /// Neighbours considered per point.
    pub max_nearest_neighbors: usize,
    /// Largest angle between the normals of two connected points.
    pub max_surface_angle: Real,
    /// Smallest interior angle of an accepted triangle.
    pub min_angle: Real,
    /// Largest interior angle of an accepted triangle.
    pub max_angle: Real,
    /// Compare normals as oriented vectors. When false, a normal and its
    /// opposite are equivalent.
    pub normal_consistency: bool,
    /// Normals are flipped to face this point.
    pub viewpoint: Pt3,
}

impl Default for SurfaceParams {
    fn default() -> Self {
        Self {
            normal_neighbors: 20,
            search_radius: 5.0,
            mu: 2.5,
            max_nearest_neighbors: 100,
            max_surface_angle: PI / 4.0,
            min_angle: PI / 18.0,
            max_angle: 2.0 * PI / 3.0,
            normal_consistency: false,
            viewpoint: Pt3::origin(),
        }
    }
}

impl SurfaceParams {
    pub(crate) fn validate(&self) -> Result<(), SurfaceError> {
        if self.normal_neighbors < 3 {
            return Err(SurfaceError::InvalidParameter(
                "normal_neighbors must be at least 3",
            ));
        }
        if self.max_nearest_neighbors < 2 {
            return Err(SurfaceError::InvalidParameter(
                "max_nearest_neighbors must be at least 2",
            ));
        }
        if !(self.search_radius > 0.0 && self.mu > 0.0) {
            return Err(SurfaceError::InvalidParameter(
                "search_radius and mu must be positive",
            ));
        }
        if !(0.0 <= self.min_angle && self.min_angle < self.max_angle && self.max_angle <= PI) {
            return Err(SurfaceError::InvalidParameter(
                "triangle angles must satisfy 0 <= min < max <= pi",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let p = SurfaceParams::default();
        assert!(p.validate().is_ok());
        assert_eq!(p.normal_neighbors, 20);
        assert!((p.max_angle.to_degrees() - 120.0).abs() < 1e-9);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let p: SurfaceParams = serde_json::from_str(r#"{"search_radius": 2.0}"#).unwrap();
        assert_eq!(p.search_radius, 2.0);
        assert_eq!(p.max_nearest_neighbors, 100);
    }

    #[test]
    fn inverted_angles_are_rejected() {
        let p = SurfaceParams {
            min_angle: 2.0,
            max_angle: 1.0,
            ..SurfaceParams::default()
        };
        assert!(matches!(
            p.validate(),
            Err(SurfaceError::InvalidParameter(_))
        ));
    }
}
