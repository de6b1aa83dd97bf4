use image::{DynamicImage, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::ImageError;

/// Channel layout of an [`ImageBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Gray,
    Rgb,
    Bgr,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray => 1,
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
        }
    }
}

/// Owned, row-major, interleaved 8-bit image.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    width: usize,
    height: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

impl std::fmt::Debug for ImageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Luma from RGB with the BT.601 weights in 14-bit fixed point.
fn luma(r: u8, g: u8, b: u8) -> u8 {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    ((u32::from(r) * R + u32::from(g) * G + u32::from(b) * B + (1 << 13)) >> 14) as u8
}

impl ImageBuffer {
    /// Zero-filled image.
    pub fn new(width: usize, height: usize, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            data: vec![0; width * height * format.channels()],
        }
    }

    pub fn from_raw(
        width: usize,
        height: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, ImageError> {
        if data.len() != width * height * format.channels() {
            return Err(ImageError::BufferSize {
                width,
                height,
                format,
                len: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Build an image of `format` from a per-pixel function returning the
    /// channel values in storage order (only the first `channels()` are used).
    pub fn from_fn<F>(width: usize, height: usize, format: PixelFormat, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> [u8; 3],
    {
        let ch = format.channels();
        let mut data = Vec::with_capacity(width * height * ch);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y)[..ch]);
            }
        }
        Self {
            width,
            height,
            format,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Channel values of the pixel at `(x, y)` in storage order.
    ///
    /// Panics when the coordinates are outside the image.
    pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
        let ch = self.channels();
        let i = (y * self.width + x) * ch;
        &self.data[i..i + ch]
    }

    /// The pixel at `(x, y)` as an RGB triple, whatever the storage format.
    pub fn rgb_at(&self, x: usize, y: usize) -> [u8; 3] {
        let p = self.pixel(x, y);
        match self.format {
            PixelFormat::Gray => [p[0]; 3],
            PixelFormat::Rgb => [p[0], p[1], p[2]],
            PixelFormat::Bgr => [p[2], p[1], p[0]],
        }
    }

    /// Convert to another channel layout.
    pub fn convert(&self, to: PixelFormat) -> Result<ImageBuffer, ImageError> {
        if self.is_empty() {
            return Err(ImageError::Empty);
        }
        if to == self.format {
            return Ok(self.clone());
        }

        let n = self.width * self.height;
        let mut data = Vec::with_capacity(n * to.channels());
        for px in self.data.chunks_exact(self.channels()) {
            let rgb = match self.format {
                PixelFormat::Gray => [px[0]; 3],
                PixelFormat::Rgb => [px[0], px[1], px[2]],
                PixelFormat::Bgr => [px[2], px[1], px[0]],
            };
            match to {
                PixelFormat::Gray => data.push(luma(rgb[0], rgb[1], rgb[2])),
                PixelFormat::Rgb => data.extend_from_slice(&rgb),
                PixelFormat::Bgr => data.extend_from_slice(&[rgb[2], rgb[1], rgb[0]]),
            }
        }
        Ok(ImageBuffer {
            width: self.width,
            height: self.height,
            format: to,
            data,
        })
    }

    /// Place `images` side by side, left to right in input order.
    ///
    /// All inputs must share the first image's height and format.
    pub fn concatenate_horizontally(images: &[ImageBuffer]) -> Result<ImageBuffer, ImageError> {
        let first = images.first().ok_or(ImageError::NothingToConcatenate)?;
        let (height, format) = (first.height, first.format);
        for (index, img) in images.iter().enumerate() {
            if img.height != height || img.format != format {
                return Err(ImageError::ShapeMismatch {
                    index,
                    height,
                    format,
                    got_height: img.height,
                    got_format: img.format,
                });
            }
        }

        let width: usize = images.iter().map(|i| i.width).sum();
        let ch = format.channels();
        let mut data = Vec::with_capacity(width * height * ch);
        for y in 0..height {
            for img in images {
                let row = img.width * ch;
                data.extend_from_slice(&img.data[y * row..(y + 1) * row]);
            }
        }
        Ok(ImageBuffer {
            width,
            height,
            format,
            data,
        })
    }

    /// Copy as an `image` crate RGB image.
    pub fn to_rgb_image(&self) -> Result<RgbImage, ImageError> {
        let rgb = self.convert(PixelFormat::Rgb)?;
        let (w, h) = (rgb.width, rgb.height);
        RgbImage::from_raw(w as u32, h as u32, rgb.data).ok_or(ImageError::BufferSize {
            width: w,
            height: h,
            format: PixelFormat::Rgb,
            len: 0,
        })
    }

    /// Copy as an `image` crate grayscale image.
    pub fn to_gray_image(&self) -> Result<GrayImage, ImageError> {
        let gray = self.convert(PixelFormat::Gray)?;
        let (w, h) = (gray.width, gray.height);
        GrayImage::from_raw(w as u32, h as u32, gray.data).ok_or(ImageError::BufferSize {
            width: w,
            height: h,
            format: PixelFormat::Gray,
            len: 0,
        })
    }
}

impl From<RgbImage> for ImageBuffer {
    fn from(img: RgbImage) -> Self {
        let (w, h) = img.dimensions();
        Self {
            width: w as usize,
            height: h as usize,
            format: PixelFormat::Rgb,
            data: img.into_raw(),
        }
    }
}

impl From<GrayImage> for ImageBuffer {
    fn from(img: GrayImage) -> Self {
        let (w, h) = img.dimensions();
        Self {
            width: w as usize,
            height: h as usize,
            format: PixelFormat::Gray,
            data: img.into_raw(),
        }
    }
}

impl From<DynamicImage> for ImageBuffer {
    fn from(img: DynamicImage) -> Self {
        match img {
            DynamicImage::ImageLuma8(g) => g.into(),
            other => other.to_rgb8().into(),
        }
    }
}
