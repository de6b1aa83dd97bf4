//! Greedy projection triangulation.
//!
//! Every point is visited once, breadth first from a seed and outward along
//! the faces it creates. At a visited point the admissible neighbours are
//! projected onto its tangent plane, and the point is connected to each pair
//! of angularly adjacent neighbours of its local Delaunay ring. A candidate
//! face is kept only if its angles are in range and it does not reuse a
//! directed edge, which keeps the mesh manifold and consistently wound.
//! Of several points at one position only the lowest index takes part.

use std::collections::{HashSet, VecDeque};
use std::f64::consts::{PI, TAU};

use mpo3d_core::{Pt3, Real, Vec2, Vec3};

use crate::{KdIndex, SurfaceParams};

#[derive(Debug, Clone, Copy)]
struct Projected {
    index: usize,
    uv: Vec2,
    angle: Real,
}

/// Triangulate `points` with their `normals`; faces are wound
/// counter-clockwise when seen from the side the normals point to.
pub fn greedy_projection(
    points: &[Pt3],
    normals: &[Vec3],
    index: &KdIndex,
    params: &SurfaceParams,
) -> Vec<[usize; 3]> {
    let n = points.len().min(normals.len());
    let mut topology = Topology::default();
    let mut faces = Vec::new();
    let mut visited = vec![false; n];
    let mut queue = VecDeque::new();

    for seed in 0..n {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        queue.push_back(seed);

        while let Some(i) = queue.pop_front() {
            if index.representative(i) != Some(i) {
                continue;
            }
            let ring = delaunay_ring(&project_neighbors(i, points, normals, index, params));
            for face in fan(i, &ring) {
                if !angles_in_range(points, &face, params) || !edges_in_range(points, &face, params)
                {
                    continue;
                }
                if !topology.insert(face) {
                    continue;
                }
                faces.push(face);
                for &v in &face[1..] {
                    if !visited[v] {
                        visited[v] = true;
                        queue.push_back(v);
                    }
                }
            }
        }
    }

    log::debug!("greedy projection: {} faces over {} points", faces.len(), n);
    faces
}

/// Orthonormal `(u, v)` with `u x v = normal`.
fn tangent_basis(normal: &Vec3) -> (Vec3, Vec3) {
    let helper = if normal.x.abs() < 0.9 {
        Vec3::x()
    } else {
        Vec3::y()
    };
    let u = normal.cross(&helper).normalize();
    let v = normal.cross(&u);
    (u, v)
}

fn normals_compatible(a: &Vec3, b: &Vec3, params: &SurfaceParams) -> bool {
    let cos = a.dot(b);
    let cos = if params.normal_consistency {
        cos
    } else {
        cos.abs()
    };
    cos >= params.max_surface_angle.cos()
}

/// Neighbours of point `i` that may share an edge with it, in tangent-plane
/// coordinates.
fn project_neighbors(
    i: usize,
    points: &[Pt3],
    normals: &[Vec3],
    index: &KdIndex,
    params: &SurfaceParams,
) -> Vec<Projected> {
    let normal = normals[i];
    if normal == Vec3::zeros() {
        return Vec::new();
    }
    let origin = points[i];
    let neighbors: Vec<_> = index
        .nearest_distinct(&origin, params.max_nearest_neighbors + 1)
        .into_iter()
        .filter(|nb| nb.distance > 0.0 && nb.index < normals.len())
        .collect();
    let Some(nearest) = neighbors.first().map(|nb| nb.distance) else {
        return Vec::new();
    };
    let cutoff = params.search_radius.min(params.mu * nearest);
    let (u, v) = tangent_basis(&normal);

    neighbors
        .into_iter()
        .filter(|nb| nb.distance <= cutoff)
        .filter(|nb| {
            let other = &normals[nb.index];
            *other != Vec3::zeros() && normals_compatible(&normal, other, params)
        })
        .filter_map(|nb| {
            let d = points[nb.index] - origin;
            let uv = Vec2::new(d.dot(&u), d.dot(&v));
            (uv.norm() > 1e-9 * cutoff).then(|| Projected {
                index: nb.index,
                uv,
                angle: uv.y.atan2(uv.x),
            })
        })
        .collect()
}

/// The candidates whose bisector bounds the Voronoi cell of the origin,
/// sorted by angle. Neighbours that only touch the cell at a vertex are left
/// out, so four cocircular points yield a single diagonal.
fn delaunay_ring(candidates: &[Projected]) -> Vec<Projected> {
    let mut ring: Vec<Projected> = candidates
        .iter()
        .filter(|p| bounds_cell(p, candidates))
        .copied()
        .collect();
    ring.sort_by(|a, b| a.angle.total_cmp(&b.angle).then(a.index.cmp(&b.index)));
    ring
}

/// Clip the bisector of `p` by every other half-plane; `p` is a Delaunay
/// neighbour of the origin when a segment of positive length remains.
fn bounds_cell(p: &Projected, candidates: &[Projected]) -> bool {
    let perp = Vec2::new(-p.uv.y, p.uv.x);
    let (mut lo, mut hi) = (Real::NEG_INFINITY, Real::INFINITY);
    for q in candidates {
        if q.index == p.index {
            continue;
        }
        // Bisector point p/2 + t * perp is on the origin's side of q's
        // bisector iff a * t <= b.
        let a = perp.dot(&q.uv);
        let b = 0.5 * (q.uv.norm_squared() - p.uv.dot(&q.uv));
        if a.abs() <= 1e-12 * p.uv.norm() * q.uv.norm() {
            if b < 0.0 {
                return false;
            }
        } else if a > 0.0 {
            hi = hi.min(b / a);
        } else {
            lo = lo.max(b / a);
        }
        if hi - lo <= 1e-9 {
            return false;
        }
    }
    true
}

/// Faces between angularly adjacent ring members that subtend less than a
/// half turn at the centre.
fn fan(center: usize, ring: &[Projected]) -> Vec<[usize; 3]> {
    if ring.len() < 2 {
        return Vec::new();
    }
    (0..ring.len())
        .filter_map(|k| {
            let a = &ring[k];
            let b = &ring[(k + 1) % ring.len()];
            let gap = (b.angle - a.angle).rem_euclid(TAU);
            (gap > 0.0 && gap < PI).then_some([center, a.index, b.index])
        })
        .collect()
}

fn angles_in_range(points: &[Pt3], face: &[usize; 3], params: &SurfaceParams) -> bool {
    (0..3).all(|k| {
        let p = points[face[k]];
        let a = points[face[(k + 1) % 3]] - p;
        let b = points[face[(k + 2) % 3]] - p;
        let angle = a.cross(&b).norm().atan2(a.dot(&b));
        (params.min_angle..=params.max_angle).contains(&angle)
    })
}

fn edges_in_range(points: &[Pt3], face: &[usize; 3], params: &SurfaceParams) -> bool {
    (points[face[1]] - points[face[2]]).norm() <= params.search_radius
}

#[derive(Default)]
struct Topology {
    directed: HashSet<(usize, usize)>,
    faces: HashSet<[usize; 3]>,
}

impl Topology {
    /// Record `face` unless it repeats a face or a directed edge.
    fn insert(&mut self, face: [usize; 3]) -> bool {
        let edges = [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])];
        if edges.iter().any(|e| self.directed.contains(e)) {
            return false;
        }
        let mut key = face;
        key.sort_unstable();
        if !self.faces.insert(key) {
            return false;
        }
        self.directed.extend(edges);
        true
    }
}
