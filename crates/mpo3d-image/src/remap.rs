//! Geometric warps through per-pixel lookup tables.

use crate::{ImageBuffer, ImageError};

/// Source coordinates for every destination pixel.
///
/// `map_x[y * width + x]` and `map_y[y * width + x]` give the sub-pixel source
/// location sampled for destination pixel `(x, y)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemapMaps {
    width: usize,
    height: usize,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl RemapMaps {
    pub fn new(
        width: usize,
        height: usize,
        map_x: Vec<f32>,
        map_y: Vec<f32>,
    ) -> Result<Self, ImageError> {
        let n = width * height;
        for len in [map_x.len(), map_y.len()] {
            if len != n {
                return Err(ImageError::MapSize { width, height, len });
            }
        }
        Ok(Self {
            width,
            height,
            map_x,
            map_y,
        })
    }

    /// Tables filled from a per-pixel function returning the source location.
    pub fn from_fn<F>(width: usize, height: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> (f32, f32),
    {
        let n = width * height;
        let mut map_x = Vec::with_capacity(n);
        let mut map_y = Vec::with_capacity(n);
        for y in 0..height {
            for x in 0..width {
                let (sx, sy) = f(x, y);
                map_x.push(sx);
                map_y.push(sy);
            }
        }
        Self {
            width,
            height,
            map_x,
            map_y,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Source location for destination pixel `(x, y)`.
    pub fn source(&self, x: usize, y: usize) -> (f32, f32) {
        let i = y * self.width + x;
        (self.map_x[i], self.map_y[i])
    }
}

impl ImageBuffer {
    /// Warp the image through `maps` with bilinear interpolation.
    ///
    /// The result takes the size of the maps and replaces `self`. Source
    /// samples falling outside the image read as zero.
    pub fn remap(&mut self, maps: &RemapMaps) -> Result<(), ImageError> {
        if self.is_empty() {
            return Err(ImageError::Empty);
        }
        let (w, h, ch) = (self.width() as i64, self.height() as i64, self.channels());
        let src = self.data();

        let mut out = Vec::with_capacity(maps.width * maps.height * ch);
        let mut acc = [0.0f32; 3];
        for (&mx, &my) in maps.map_x.iter().zip(&maps.map_y) {
            acc[..ch].fill(0.0);
            if mx.is_finite() && my.is_finite() {
                let x0 = mx.floor();
                let y0 = my.floor();
                let fx = mx - x0;
                let fy = my - y0;
                let (xi, yi) = (x0 as i64, y0 as i64);
                let taps = [
                    (xi, yi, (1.0 - fx) * (1.0 - fy)),
                    (xi + 1, yi, fx * (1.0 - fy)),
                    (xi, yi + 1, (1.0 - fx) * fy),
                    (xi + 1, yi + 1, fx * fy),
                ];
                for (tx, ty, wgt) in taps {
                    if tx < 0 || ty < 0 || tx >= w || ty >= h || wgt == 0.0 {
                        continue;
                    }
                    let base = ((ty * w + tx) as usize) * ch;
                    for c in 0..ch {
                        acc[c] += wgt * f32::from(src[base + c]);
                    }
                }
            }
            out.extend(acc[..ch].iter().map(|v| v.round().clamp(0.0, 255.0) as u8));
        }

        *self = ImageBuffer::from_raw(maps.width, maps.height, self.format(), out)?;
        Ok(())
    }
}
