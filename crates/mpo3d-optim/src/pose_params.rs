//! Six-parameter pose blocks: Rodrigues vector followed by translation.

use mpo3d_core::{Iso3, Real, Vec3};
use nalgebra::{DVector, Translation3, UnitQuaternion};

pub(crate) const POSE_DIM: usize = 6;

pub(crate) fn write_pose(x: &mut DVector<Real>, offset: usize, pose: &Iso3) {
    let r = pose.rotation.scaled_axis();
    let t = pose.translation.vector;
    x[offset] = r.x;
    x[offset + 1] = r.y;
    x[offset + 2] = r.z;
    x[offset + 3] = t.x;
    x[offset + 4] = t.y;
    x[offset + 5] = t.z;
}

pub(crate) fn read_pose(x: &DVector<Real>, offset: usize) -> Iso3 {
    let r = Vec3::new(x[offset], x[offset + 1], x[offset + 2]);
    let t = Vec3::new(x[offset + 3], x[offset + 4], x[offset + 5]);
    Iso3::from_parts(Translation3::from(t), UnitQuaternion::from_scaled_axis(r))
}
