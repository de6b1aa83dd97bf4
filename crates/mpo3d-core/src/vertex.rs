use serde::{Deserialize, Serialize};

use crate::{Pt3, Real, Vec3};

/// A reconstructed surface sample: position, colour and unit normal.
///
/// The colour is held both as bytes in `[0, 255]` and as normalised values in
/// `[0, 1]`. Both representations are derived from one input at construction,
/// so they always agree. A vertex is immutable once built; the `with_*`
/// methods return a new value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    position: Pt3,
    color: [u8; 3],
    color_unit: [Real; 3],
    normal: Vec3,
}

impl Vertex {
    /// Vertex with a byte RGB colour and a zero normal.
    pub fn new(position: Pt3, rgb: [u8; 3]) -> Self {
        Self {
            position,
            color: rgb,
            color_unit: rgb.map(|c| Real::from(c) / 255.0),
            normal: Vec3::zeros(),
        }
    }

    /// Vertex with a normalised RGB colour.
    ///
    /// Components are clamped to `[0, 1]`; the byte colour is derived by
    /// truncation.
    pub fn from_unit_color(position: Pt3, rgb: [Real; 3]) -> Self {
        let color_unit = rgb.map(|c| if c.is_nan() { 0.0 } else { c.clamp(0.0, 1.0) });
        Self {
            position,
            color: color_unit.map(|c| (c * 255.0) as u8),
            color_unit,
            normal: Vec3::zeros(),
        }
    }

    /// Same vertex with a new normal, scaled to unit length.
    ///
    /// A zero vector stays zero.
    pub fn with_normal(self, normal: Vec3) -> Self {
        let len = normal.norm();
        let normal = if len > 0.0 { normal / len } else { normal };
        Self { normal, ..self }
    }

    /// Same vertex moved to `position`; colour and normal are kept.
    pub fn with_position(self, position: Pt3) -> Self {
        Self { position, ..self }
    }

    pub fn position(&self) -> &Pt3 {
        &self.position
    }

    /// Colour in the `[0, 255]` range.
    pub fn color_bytes(&self) -> [u8; 3] {
        self.color
    }

    /// Colour in the `[0, 1]` range.
    pub fn color(&self) -> [Real; 3] {
        self.color_unit
    }

    pub fn normal(&self) -> &Vec3 {
        &self.normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn byte_colour_derives_unit_colour() {
        let v = Vertex::new(Pt3::origin(), [255, 0, 51]);
        assert_eq!(v.color(), [1.0, 0.0, 0.2]);
        assert_eq!(v.color_bytes(), [255, 0, 51]);
    }

    #[test]
    fn unit_colour_is_clamped_and_truncated() {
        let v = Vertex::from_unit_color(Pt3::origin(), [1.5, -0.2, 0.5]);
        assert_eq!(v.color(), [1.0, 0.0, 0.5]);
        assert_eq!(v.color_bytes(), [255, 0, 127]);
    }

    #[test]
    fn normal_is_normalised() {
        let v = Vertex::new(Pt3::origin(), [0, 0, 0]).with_normal(Vec3::new(0.0, 3.0, 4.0));
        assert_relative_eq!(v.normal().norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(v.normal().z, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn zero_normal_stays_zero() {
        let v = Vertex::new(Pt3::origin(), [0, 0, 0]).with_normal(Vec3::zeros());
        assert_eq!(*v.normal(), Vec3::zeros());
    }
}
