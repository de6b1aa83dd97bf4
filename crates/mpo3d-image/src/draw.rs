//! Detection overlays.

use image::Rgb;
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};
use mpo3d_core::Vec2;

use crate::{ImageBuffer, ImageError};

/// Marker colours, cycled per grid row.
const ROW_COLORS: [[u8; 3]; 7] = [
    [255, 0, 0],
    [255, 128, 0],
    [200, 200, 0],
    [0, 255, 0],
    [0, 200, 200],
    [0, 0, 255],
    [255, 0, 255],
];
const MARKER_RADIUS: i32 = 4;

impl ImageBuffer {
    /// Copy of the image with detected grid points drawn on it: a circle per
    /// point, coloured by row, and a polyline through the points in order.
    ///
    /// The result keeps the source format unless it is grayscale, which is
    /// promoted to RGB.
    pub fn draw_pattern(&self, points: &[Vec2], cols: usize) -> Result<ImageBuffer, ImageError> {
        let mut canvas = self.to_rgb_image()?;
        let cols = cols.max(1);
        let color_of = |i: usize| Rgb(ROW_COLORS[(i / cols) % ROW_COLORS.len()]);

        for (i, pair) in points.windows(2).enumerate() {
            let (a, b) = (pair[0], pair[1]);
            draw_line_segment_mut(
                &mut canvas,
                (a.x as f32, a.y as f32),
                (b.x as f32, b.y as f32),
                color_of(i + 1),
            );
        }
        for (i, p) in points.iter().enumerate() {
            let c = (p.x.round() as i32, p.y.round() as i32);
            draw_hollow_circle_mut(&mut canvas, c, MARKER_RADIUS, color_of(i));
        }

        let out = ImageBuffer::from(canvas);
        match self.format() {
            crate::PixelFormat::Gray => Ok(out),
            other => out.convert(other),
        }
    }
}
