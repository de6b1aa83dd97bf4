//! In-memory MPO construction for tests and fixtures.
//!
//! [`ContainerBuilder`] lays out a minimal but well-formed container: the
//! first JPEG gets an Exif APP1 and an MPF APP2 inserted after its SOI, the
//! remaining JPEGs are appended unchanged. Individual fields can be
//! overridden to produce malformed variants.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use mpo3d_image::ImageBuffer;

use crate::{ContainerError, Endian};

/// Attribute of the representative (first) image: baseline MP primary.
pub const PRIMARY_ATTRIBUTE: u32 = 0x2003_0000;
/// Attribute of a following view: multi-frame disparity image.
pub const DISPARITY_ATTRIBUTE: u32 = 0x0002_0002;

/// Encode an image as a baseline JPEG.
pub fn encode_jpeg(image: &ImageBuffer, quality: u8) -> Result<Vec<u8>, ContainerError> {
    let rgb = image
        .to_rgb_image()
        .map_err(|_| ContainerError::InvalidContainer("image cannot be encoded"))?;
    encode_rgb(&rgb, quality)
}

fn encode_rgb(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>, ContainerError> {
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(rgb)
        .map_err(|source| ContainerError::Jpeg { index: 0, source })?;
    Ok(out.into_inner())
}

#[derive(Debug, Clone)]
pub struct ContainerBuilder {
    endian: Endian,
    images: Vec<Vec<u8>>,
    attributes: Vec<Option<u32>>,
    declared_count: Option<u32>,
    mpf_id: [u8; 4],
    exif_id: [u8; 6],
}

impl ContainerBuilder {
    pub fn new(endian: Endian) -> Self {
        Self {
            endian,
            images: Vec::new(),
            attributes: Vec::new(),
            declared_count: None,
            mpf_id: *b"MPF\0",
            exif_id: *b"Exif\0\0",
        }
    }

    /// Append an already encoded JPEG.
    pub fn jpeg(mut self, bytes: Vec<u8>) -> Self {
        self.images.push(bytes);
        self.attributes.push(None);
        self
    }

    /// Append an image, encoding it at quality 95.
    pub fn image(self, image: &ImageBuffer) -> Result<Self, ContainerError> {
        Ok(self.jpeg(encode_jpeg(image, 95)?))
    }

    /// Append a single-colour RGB image of the given size.
    pub fn solid_image(self, width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let img = RgbImage::from_pixel(width, height, image::Rgb(rgb));
        // Encoding an in-memory RGB image of non-zero size does not fail.
        match encode_rgb(&img, 95) {
            Ok(bytes) => self.jpeg(bytes),
            Err(_) => self,
        }
    }

    /// Override the attribute of image `index`.
    pub fn attribute(mut self, index: usize, attribute: u32) -> Self {
        if let Some(slot) = self.attributes.get_mut(index) {
            *slot = Some(attribute);
        }
        self
    }

    /// Declare a different image count than the number of images appended.
    pub fn declared_count(mut self, count: u32) -> Self {
        self.declared_count = Some(count);
        self
    }

    pub fn mpf_identifier(mut self, id: [u8; 4]) -> Self {
        self.mpf_id = id;
        self
    }

    pub fn exif_identifier(mut self, id: [u8; 6]) -> Self {
        self.exif_id = id;
        self
    }

    fn put_u16(&self, out: &mut Vec<u8>, v: u16) {
        match self.endian {
            Endian::Big => out.extend_from_slice(&v.to_be_bytes()),
            Endian::Little => out.extend_from_slice(&v.to_le_bytes()),
        }
    }

    fn put_u32(&self, out: &mut Vec<u8>, v: u32) {
        match self.endian {
            Endian::Big => out.extend_from_slice(&v.to_be_bytes()),
            Endian::Little => out.extend_from_slice(&v.to_le_bytes()),
        }
    }

    fn put_field(&self, out: &mut Vec<u8>, tag: u16, kind: u16, count: u32, value: u32) {
        self.put_u16(out, tag);
        self.put_u16(out, kind);
        self.put_u32(out, count);
        self.put_u32(out, value);
    }

    /// Lay out the container.
    pub fn build(&self) -> Result<Vec<u8>, ContainerError> {
        let first = self
            .images
            .first()
            .ok_or(ContainerError::InvalidContainer("no images to pack"))?;
        if first.get(..2) != Some(&[0xff, 0xd8][..]) {
            return Err(ContainerError::InvalidContainer("image 0 lacks SOI"));
        }
        let n = self.images.len();
        let declared = self.declared_count.unwrap_or(n as u32);

        // APP1: Exif identifier followed by an empty big-endian TIFF header.
        let mut app1 = Vec::new();
        app1.extend_from_slice(&self.exif_id);
        app1.extend_from_slice(b"MM\0*\0\0\0\x08\0\0\0\0\0\0");

        // MP header: byte order, IFD offset, IFD with three fields, entry table.
        const FIELDS: u16 = 3;
        let ifd_offset = 8u32;
        let table_offset = ifd_offset + 2 + u32::from(FIELDS) * 12 + 4;
        let header_len = table_offset as usize + n * 16;
        let app2_len = 2 + 4 + header_len;

        // SOI, APP1 marker + length + payload, APP2 marker + length, "MPF\0".
        let header_pos = 2 + 4 + app1.len() + 4 + 4;
        let first_len = header_pos + header_len + first.len() - 2;

        let mut header = Vec::with_capacity(header_len);
        match self.endian {
            Endian::Big => header.extend_from_slice(b"MM\0*"),
            Endian::Little => header.extend_from_slice(b"II*\0"),
        }
        self.put_u32(&mut header, ifd_offset);
        self.put_u16(&mut header, FIELDS);
        self.put_field(&mut header, 0xb000, 7, 4, u32::from_be_bytes(*b"0100"));
        self.put_field(&mut header, 0xb001, 4, 1, declared);
        self.put_field(&mut header, 0xb002, 7, 16 * n as u32, table_offset);
        self.put_u32(&mut header, 0);

        let mut position = first_len;
        for (i, img) in self.images.iter().enumerate() {
            let default_attr = if i == 0 {
                PRIMARY_ATTRIBUTE
            } else {
                DISPARITY_ATTRIBUTE
            };
            let (size, offset) = if i == 0 {
                (first_len, 0)
            } else {
                let offset = position - header_pos;
                position += img.len();
                (img.len(), offset)
            };
            self.put_u32(&mut header, self.attributes[i].unwrap_or(default_attr));
            self.put_u32(&mut header, size as u32);
            self.put_u32(&mut header, offset as u32);
            self.put_u16(&mut header, 0);
            self.put_u16(&mut header, 0);
        }

        let mut out = Vec::with_capacity(position);
        out.extend_from_slice(&[0xff, 0xd8, 0xff, 0xe1]);
        out.extend_from_slice(&((app1.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(&app1);
        out.extend_from_slice(&[0xff, 0xe2]);
        out.extend_from_slice(&(app2_len as u16).to_be_bytes());
        out.extend_from_slice(&self.mpf_id);
        debug_assert_eq!(out.len(), header_pos);
        out.extend_from_slice(&header);
        out.extend_from_slice(&first[2..]);
        for img in &self.images[1..] {
            out.extend_from_slice(img);
        }
        Ok(out)
    }
}
