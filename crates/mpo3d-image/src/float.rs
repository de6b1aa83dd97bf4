//! Single-channel float planes used by the detectors.

use image::Luma;

use crate::{ImageBuffer, ImageError, PixelFormat};

pub(crate) type GrayF32 = image::ImageBuffer<Luma<f32>, Vec<f32>>;

/// Grayscale copy of `img` with intensities in `[0, 255]`.
pub(crate) fn gray_f32(img: &ImageBuffer) -> Result<GrayF32, ImageError> {
    let gray = img.convert(PixelFormat::Gray)?;
    let (w, h) = (gray.width() as u32, gray.height() as u32);
    let data = gray.data().iter().map(|&v| f32::from(v)).collect();
    GrayF32::from_raw(w, h, data).ok_or(ImageError::Empty)
}

/// Stretch intensities linearly onto `[0, 255]`.
pub(crate) fn normalize(img: &mut GrayF32) {
    let (lo, hi) = img
        .as_raw()
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = hi - lo;
    if range <= f32::EPSILON {
        return;
    }
    for v in img.iter_mut() {
        *v = (*v - lo) * 255.0 / range;
    }
}

/// Pixel value with coordinates clamped to the image.
#[inline]
pub(crate) fn at_clamped(img: &GrayF32, x: i64, y: i64) -> f32 {
    let w = img.width() as i64;
    let h = img.height() as i64;
    let xc = x.clamp(0, w - 1) as usize;
    let yc = y.clamp(0, h - 1) as usize;
    img.as_raw()[yc * w as usize + xc]
}

/// Bilinear sample with border replication.
#[inline]
pub(crate) fn sample_bilinear(img: &GrayF32, x: f64, y: f64) -> f32 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = (x - x0) as f32;
    let fy = (y - y0) as f32;
    let (xi, yi) = (x0 as i64, y0 as i64);
    let p00 = at_clamped(img, xi, yi);
    let p10 = at_clamped(img, xi + 1, yi);
    let p01 = at_clamped(img, xi, yi + 1);
    let p11 = at_clamped(img, xi + 1, yi + 1);
    (1.0 - fx) * (1.0 - fy) * p00 + fx * (1.0 - fy) * p10 + (1.0 - fx) * fy * p01 + fx * fy * p11
}
