use mpo3d_core::{Mat4, Pt3, Real, Vertex};
use mpo3d_image::{DisparityMap, ImageBuffer};
use nalgebra::Vector4;

/// 3D position of pixel `(x, y)` with disparity `d` through `q`, `None` when
/// the homogeneous scale vanishes.
fn reproject_pixel(q: &Mat4, x: usize, y: usize, d: f32) -> Option<Pt3> {
    let h = q * Vector4::new(x as Real, y as Real, Real::from(d), 1.0);
    if h.w == 0.0 {
        return None;
    }
    Some(Pt3::new(h.x / h.w, h.y / h.w, h.z / h.w))
}

fn usable(p: &Pt3, max_depth: Real) -> bool {
    p.coords.iter().all(|c| c.is_finite()) && p.z > 0.0 && p.z <= max_depth
}

/// Turn a disparity map into coloured vertices.
///
/// Two passes over the map: the first finds the nearest depth among points
/// with a finite position and depth in `(0, max_depth]`, the second keeps
/// every point whose depth lies in `[nearest, max_depth]`. Kept points become
/// `(x, -y, max_depth - z)` coloured from `color` at the same pixel.
pub fn disparity_to_vertices(
    disparity: &DisparityMap,
    q: &Mat4,
    color: &ImageBuffer,
    max_depth: Real,
) -> Vec<Vertex> {
    let (w, h) = (disparity.width(), disparity.height());
    let project = |x, y| {
        if !disparity.is_valid(x, y) {
            return None;
        }
        reproject_pixel(q, x, y, disparity.get(x, y)).filter(|p| usable(p, max_depth))
    };

    let mut nearest = Real::INFINITY;
    for y in 0..h {
        for x in 0..w {
            if let Some(p) = project(x, y) {
                nearest = nearest.min(p.z);
            }
        }
    }
    if !nearest.is_finite() {
        return Vec::new();
    }

    let mut vertices = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let Some(p) = project(x, y) else {
                continue;
            };
            if p.z < nearest {
                continue;
            }
            let rgb = if x < color.width() && y < color.height() {
                color.rgb_at(x, y)
            } else {
                [0, 0, 0]
            };
            vertices.push(Vertex::new(Pt3::new(p.x, -p.y, max_depth - p.z), rgb));
        }
    }
    log::debug!(
        "reprojected {} of {} pixels, nearest depth {:.3}",
        vertices.len(),
        w * h,
        nearest
    );
    vertices
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mpo3d_image::PixelFormat;

    /// f = 100, c = (2, 1), baseline 10.
    fn q() -> Mat4 {
        Mat4::new(
            1.0, 0.0, 0.0, -2.0, //
            0.0, 1.0, 0.0, -1.0, //
            0.0, 0.0, 0.0, 100.0, //
            0.0, 0.0, 0.1, 0.0,
        )
    }

    fn color() -> ImageBuffer {
        ImageBuffer::from_fn(4, 2, PixelFormat::Bgr, |x, y| [x as u8, y as u8, 200])
    }

    #[test]
    fn keeps_depths_between_nearest_and_max() {
        // depth = 1000 / d: 10 -> 100, 4 -> 250, 2 -> 500, 1 -> 1000, 0.5 -> 2000
        let disp = DisparityMap::from_raw(
            4,
            2,
            0,
            16,
            vec![10.0, 4.0, 2.0, -1.0, 1.0, 0.5, 0.0, 4.0],
        )
        .unwrap();
        let vertices = disparity_to_vertices(&disp, &q(), &color(), 1000.0);
        let depths: Vec<Real> = vertices.iter().map(|v| 1000.0 - v.position().z).collect();
        assert_eq!(vertices.len(), 5);
        assert_relative_eq!(depths[0], 100.0, epsilon = 1e-9);
        assert_relative_eq!(depths[3], 1000.0, epsilon = 1e-9);
        assert!(depths.iter().all(|z| (100.0..=1000.0).contains(z)));
    }

    #[test]
    fn vertices_flip_y_and_take_left_colour() {
        let mut data = vec![-1.0; 8];
        data[5] = 5.0;
        let disp = DisparityMap::from_raw(4, 2, 0, 16, data).unwrap();
        let vertices = disparity_to_vertices(&disp, &q(), &color(), 1000.0);
        assert_eq!(vertices.len(), 1);
        let v = vertices[0];
        // pixel (1, 1): X = (1 - 2) * 200 / 100, Y = 0, Z = 200
        assert_relative_eq!(v.position().x, -2.0, epsilon = 1e-9);
        assert_relative_eq!(v.position().y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(v.position().z, 800.0, epsilon = 1e-9);
        // Stored as BGR, reported as RGB.
        assert_eq!(v.color_bytes(), [200, 1, 1]);
    }

    #[test]
    fn nothing_survives_without_valid_disparity() {
        let disp = DisparityMap::from_raw(4, 2, 0, 16, vec![-1.0; 8]).unwrap();
        assert!(disparity_to_vertices(&disp, &q(), &color(), 1000.0).is_empty());
    }
}
