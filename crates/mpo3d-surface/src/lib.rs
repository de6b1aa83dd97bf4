//! Surface reconstruction for `mpo3d`.
//!
//! [`SurfaceBuilder`] turns an unordered list of coloured vertices into a
//! triangle [`Mesh`]:
//! 1. a k-d tree ([`KdIndex`]) is built over the distinct positions,
//! 2. a normal is fitted to the `k` nearest distinct neighbours of every point,
//! 3. points are connected by greedy projection triangulation, growing the
//!    mesh outward from seed points through each point's local tangent plane.

mod error;
mod index;
mod mesh;
mod normals;
mod params;
mod triangulate;

pub use error::SurfaceError;
pub use index::{KdIndex, Neighbor};
pub use mesh::{Mesh, SurfaceBuilder};
pub use normals::estimate_normals;
pub use params::SurfaceParams;
pub use triangulate::greedy_projection;
