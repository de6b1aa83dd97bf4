use serde::{Deserialize, Serialize};

use crate::{Pt3, Real, Vec3, Vertex};

/// Axis-aligned bounding box of a point set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Pt3,
    pub max: Pt3,
}

impl Bounds {
    /// Bounds of the given points, `None` when the iterator is empty.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Pt3>,
    {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut bounds = Self {
            min: first,
            max: first,
        };
        for p in iter {
            bounds.min = bounds.min.inf(p);
            bounds.max = bounds.max.sup(p);
        }
        Some(bounds)
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Pt3 {
        nalgebra::center(&self.min, &self.max)
    }

    /// Largest per-axis extent.
    pub fn max_extent(&self) -> Real {
        self.extent().max()
    }
}

/// An unordered set of vertices together with its bounds.
///
/// The bounds and the derived scale are used only to normalise the cloud
/// for display; they never alter the stored positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    vertices: Vec<Vertex>,
    bounds: Option<Bounds>,
}

impl PointCloud {
    pub fn new(vertices: Vec<Vertex>) -> Self {
        let bounds = Bounds::from_points(vertices.iter().map(Vertex::position));
        Self { vertices, bounds }
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn into_vertices(self) -> Vec<Vertex> {
        self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn bounds(&self) -> Option<&Bounds> {
        self.bounds.as_ref()
    }

    /// Display scale: the largest per-axis extent, or 1 for a degenerate cloud.
    pub fn scale(&self) -> Real {
        match self.bounds {
            Some(b) if b.max_extent() > 0.0 => b.max_extent(),
            _ => 1.0,
        }
    }

    /// Vertices re-centred on the bounding-box midpoint and divided by
    /// [`scale`](Self::scale). Colour and normal are carried over.
    pub fn normalized_vertices(&self) -> Vec<Vertex> {
        let Some(bounds) = self.bounds else {
            return Vec::new();
        };
        let center = bounds.center();
        let scale = self.scale();
        self.vertices
            .iter()
            .map(|v| {
                let p = Pt3::from((v.position() - center) / scale);
                v.with_position(p)
            })
            .collect()
    }
}
