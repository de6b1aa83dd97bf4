//! Triangulation of synthetic point sets.

use std::collections::HashMap;

use mpo3d_core::{Pt3, Real, Vec3, Vertex};
use mpo3d_surface::{Mesh, SurfaceBuilder, SurfaceError, SurfaceParams};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// `n x n` grid with unit spacing in the plane z = -50, jittered in all axes.
fn jittered_plane(n: usize, seed: u64) -> Vec<Vertex> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .flat_map(|r| (0..n).map(move |c| (r, c)))
        .map(|(r, c)| {
            let p = Pt3::new(
                c as Real + rng.gen_range(-0.15..0.15),
                r as Real + rng.gen_range(-0.15..0.15),
                -50.0 + rng.gen_range(-0.01..0.01),
            );
            Vertex::new(p, [(r * 10) as u8, (c * 10) as u8, 128])
        })
        .collect()
}

fn grid(n: usize, spacing: Real, z: Real) -> Vec<Pt3> {
    (0..n)
        .flat_map(|r| (0..n).map(move |c| Pt3::new(spacing * c as Real, spacing * r as Real, z)))
        .collect()
}

fn edge_counts(mesh: &Mesh) -> HashMap<(usize, usize), usize> {
    let mut counts = HashMap::new();
    for f in mesh.face_vertex_indexes() {
        for k in 0..3 {
            let (a, b) = (f[k], f[(k + 1) % 3]);
            *counts.entry((a.min(b), a.max(b))).or_insert(0) += 1;
        }
    }
    counts
}

#[test]
fn empty_input_is_rejected() {
    let err = SurfaceBuilder::default().set_vertices(Vec::new()).unwrap_err();
    assert!(matches!(err, SurfaceError::EmptyInput));
}

#[test]
fn triangulates_a_jittered_plane() {
    let n = 20;
    let mesh = SurfaceBuilder::default()
        .set_vertices(jittered_plane(n, 5))
        .unwrap();
    let full = 2 * (n - 1) * (n - 1);
    assert!(
        mesh.num_faces() * 10 >= full * 7,
        "{} of {full} faces",
        mesh.num_faces()
    );

    let params = SurfaceParams::default();
    let vertices = mesh.vertices();
    for f in mesh.face_vertex_indexes() {
        assert!(f.iter().all(|&i| i < vertices.len()));
        assert!(f[0] != f[1] && f[1] != f[2] && f[0] != f[2]);
        let p: Vec<&Pt3> = f.iter().map(|&i| vertices[i].position()).collect();
        for k in 0..3 {
            let a = p[(k + 1) % 3] - p[k];
            let b = p[(k + 2) % 3] - p[k];
            let angle = a.cross(&b).norm().atan2(a.dot(&b));
            assert!(angle >= params.min_angle - 1e-12 && angle <= params.max_angle + 1e-12);
        }
        // Wound counter-clockwise as seen from the viewpoint above.
        let normal = (p[1] - p[0]).cross(&(p[2] - p[0]));
        assert!(normal.z > 0.0);
    }
    assert!(edge_counts(&mesh).values().all(|&c| c <= 2));
    for v in vertices {
        assert!(v.normal().z > 0.99, "{:?}", v.normal());
    }
}

#[test]
fn triangulation_is_deterministic() {
    let builder = SurfaceBuilder::default();
    let a = builder.set_vertices(jittered_plane(12, 9)).unwrap();
    let b = builder.set_vertices(jittered_plane(12, 9)).unwrap();
    assert_eq!(a.face_vertex_indexes(), b.face_vertex_indexes());
    assert_eq!(a, b);
}

#[test]
fn sparse_points_form_no_surface() {
    // Neighbours are farther apart than the search radius.
    let vertices: Vec<Vertex> = (0..16)
        .map(|i| {
            let p = Pt3::new(10.0 * (i % 4) as Real, 10.0 * (i / 4) as Real, -30.0);
            Vertex::new(p, [0, 0, 0])
        })
        .collect();
    let err = SurfaceBuilder::default().set_vertices(vertices).unwrap_err();
    assert!(matches!(err, SurfaceError::SurfaceEmpty));
}

#[test]
fn regular_grids_are_triangulated() {
    // Exactly cocircular quads, as produced by a constant disparity.
    let vertices: Vec<Vertex> = grid(16, 2.5, 500.0)
        .into_iter()
        .map(|p| Vertex::new(p, [9; 3]))
        .collect();
    let mesh = SurfaceBuilder::default().set_vertices(vertices).unwrap();
    assert!(mesh.num_faces() > 15 * 15);
    assert!(edge_counts(&mesh).values().all(|&c| c <= 2));
}

#[test]
fn stacked_copies_of_one_point_form_no_surface() {
    let vertices = vec![Vertex::new(Pt3::new(1.0, 2.0, 3.0), [40; 3]); 40];
    let err = SurfaceBuilder::default().set_vertices(vertices).unwrap_err();
    assert!(matches!(err, SurfaceError::SurfaceEmpty));
}

#[test]
fn repeated_grid_layers_are_meshed_once() {
    let layer: Vec<Vertex> = grid(16, 2.5, 500.0)
        .into_iter()
        .map(|p| Vertex::new(p, [70; 3]))
        .collect();
    let single = SurfaceBuilder::default().set_vertices(layer.clone()).unwrap();

    let stacked: Vec<Vertex> = (0..40).flat_map(|_| layer.iter().copied()).collect();
    let mesh = SurfaceBuilder::default().set_vertices(stacked).unwrap();
    assert_eq!(mesh.vertices().len(), 40 * layer.len());
    // Only the first copy of each position is referenced.
    assert_eq!(mesh.face_vertex_indexes(), single.face_vertex_indexes());
    assert!(edge_counts(&mesh).values().all(|&c| c <= 2));
}

#[test]
fn dense_cluster_inside_a_grid() {
    let mut rng = StdRng::seed_from_u64(23);
    let mut points = grid(16, 2.5, 500.0);
    let centre = points[7 * 16 + 7];
    points.extend((0..60).map(|_| {
        centre
            + Vec3::new(
                rng.gen_range(-1e-6..1e-6),
                rng.gen_range(-1e-6..1e-6),
                rng.gen_range(-1e-6..1e-6),
            )
    }));
    let vertices: Vec<Vertex> = points.iter().map(|p| Vertex::new(*p, [5; 3])).collect();

    let mesh = SurfaceBuilder::default().set_vertices(vertices).unwrap();
    assert!(mesh.num_faces() > 150, "{} faces", mesh.num_faces());
    for f in mesh.face_vertex_indexes() {
        assert!(f.iter().all(|&i| i < points.len()));
        assert!(f[0] != f[1] && f[1] != f[2] && f[0] != f[2]);
    }
}

#[test]
fn display_normalisation_leaves_positions_alone() {
    let vertices = jittered_plane(10, 1);
    let mesh = SurfaceBuilder::default()
        .set_vertices(vertices.clone())
        .unwrap();
    let bounds = *mesh.bounds().unwrap();
    assert_eq!(mesh.scale(), bounds.max_extent());

    let normalized = mesh.normalized_vertices();
    assert_eq!(normalized.len(), vertices.len());
    for (orig, (kept, norm)) in vertices.iter().zip(mesh.vertices().iter().zip(&normalized)) {
        assert_eq!(orig.position(), kept.position());
        assert_eq!(orig.color_bytes(), norm.color_bytes());
        assert!(norm.position().coords.iter().all(|c| c.abs() <= 0.5 + 1e-12));
    }
}

#[test]
fn writes_ply_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plane.ply");
    let mesh = SurfaceBuilder::default()
        .set_vertices(jittered_plane(6, 2))
        .unwrap();
    mesh.write_ply(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("ply\nformat ascii 1.0\n"));
    assert!(text.contains("element vertex 36\n"));
    assert!(text.contains(&format!("element face {}\n", mesh.num_faces())));

    let missing = dir.path().join("no/such/dir/plane.ply");
    assert!(matches!(
        mesh.write_ply(&missing),
        Err(SurfaceError::Io { .. })
    ));
}
