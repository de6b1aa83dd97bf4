use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use mpo3d_core::{Bounds, PointCloud, Pt3, Real, Vertex};

use crate::{estimate_normals, greedy_projection, KdIndex, SurfaceError, SurfaceParams};

/// A triangulated point cloud.
///
/// Vertices carry the normals estimated during triangulation. Faces index
/// into [`vertices`](Self::vertices).
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    cloud: PointCloud,
    faces: Vec<[usize; 3]>,
}

impl Mesh {
    pub fn vertices(&self) -> &[Vertex] {
        self.cloud.vertices()
    }

    pub fn cloud(&self) -> &PointCloud {
        &self.cloud
    }

    pub fn bounds(&self) -> Option<&Bounds> {
        self.cloud.bounds()
    }

    /// Largest per-axis extent of the vertices.
    pub fn scale(&self) -> Real {
        self.cloud.scale()
    }

    /// Vertices centred on the bounding box and divided by
    /// [`scale`](Self::scale), for display.
    pub fn normalized_vertices(&self) -> Vec<Vertex> {
        self.cloud.normalized_vertices()
    }

    /// Per face, the indices of its three vertices in winding order.
    pub fn face_vertex_indexes(&self) -> &[[usize; 3]] {
        &self.faces
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Write the mesh as ASCII PLY with position, colour and normal per
    /// vertex.
    pub fn write_ply(&self, path: impl AsRef<Path>) -> Result<(), SurfaceError> {
        let path = path.as_ref();
        let io_err = |source| SurfaceError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        self.write_ply_to(&mut writer).map_err(io_err)?;
        writer.flush().map_err(io_err)
    }

    pub fn write_ply_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writeln!(writer, "ply")?;
        writeln!(writer, "format ascii 1.0")?;
        writeln!(writer, "comment mpo3d surface")?;
        writeln!(writer, "element vertex {}", self.vertices().len())?;
        for name in ["x", "y", "z"] {
            writeln!(writer, "property double {name}")?;
        }
        for name in ["red", "green", "blue"] {
            writeln!(writer, "property uchar {name}")?;
        }
        for name in ["nx", "ny", "nz"] {
            writeln!(writer, "property double {name}")?;
        }
        writeln!(writer, "element face {}", self.faces.len())?;
        writeln!(writer, "property list uchar int vertex_indices")?;
        writeln!(writer, "end_header")?;

        for v in self.vertices() {
            let p = v.position();
            let [r, g, b] = v.color_bytes();
            let n = v.normal();
            writeln!(
                writer,
                "{} {} {} {r} {g} {b} {} {} {}",
                p.x, p.y, p.z, n.x, n.y, n.z
            )?;
        }
        for [a, b, c] in &self.faces {
            writeln!(writer, "3 {a} {b} {c}")?;
        }
        Ok(())
    }
}

/// Builds a [`Mesh`] from reconstructed vertices.
#[derive(Debug, Clone, Default)]
pub struct SurfaceBuilder {
    params: SurfaceParams,
}

impl SurfaceBuilder {
    pub fn new(params: SurfaceParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SurfaceParams {
        &self.params
    }

    /// Estimate normals for `vertices` and triangulate them.
    ///
    /// Fails with [`SurfaceError::EmptyInput`] before any other work when
    /// `vertices` is empty, and with [`SurfaceError::SurfaceEmpty`] when no
    /// face could be formed.
    pub fn set_vertices(&self, vertices: Vec<Vertex>) -> Result<Mesh, SurfaceError> {
        if vertices.is_empty() {
            return Err(SurfaceError::EmptyInput);
        }
        self.build(PointCloud::new(vertices))
    }

    pub fn build(&self, cloud: PointCloud) -> Result<Mesh, SurfaceError> {
        if cloud.is_empty() {
            return Err(SurfaceError::EmptyInput);
        }
        self.params.validate()?;

        let positions: Vec<Pt3> = cloud.vertices().iter().map(|v| *v.position()).collect();
        let index = KdIndex::new(&positions);
        let normals = estimate_normals(
            &positions,
            &index,
            self.params.normal_neighbors,
            &self.params.viewpoint,
        );
        let faces = greedy_projection(&positions, &normals, &index, &self.params);
        if faces.is_empty() {
            return Err(SurfaceError::SurfaceEmpty);
        }
        log::info!(
            "triangulated {} points into {} faces",
            positions.len(),
            faces.len()
        );

        let vertices = cloud
            .into_vertices()
            .into_iter()
            .zip(normals)
            .map(|(v, n)| v.with_normal(n))
            .collect();
        Ok(Mesh {
            cloud: PointCloud::new(vertices),
            faces,
        })
    }
}
