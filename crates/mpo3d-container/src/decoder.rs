use std::path::Path;

use image::ImageFormat;
use log::debug;
use mpo3d_image::ImageBuffer;

use crate::{ByteReader, ContainerError, Endian};

const SOI: [u8; 2] = [0xff, 0xd8];
const APP1: [u8; 2] = [0xff, 0xe1];
const APP2: [u8; 2] = [0xff, 0xe2];
const EXIF_ID: &[u8] = b"Exif\0\0";
const MPF_ID: &[u8] = b"MPF\0";
const BIG_ENDIAN_TAG: &[u8] = b"MM\0*";

const FIELD_SIZE: usize = 12;
const ENTRY_SIZE: usize = 16;

const TAG_IMAGE_COUNT: u16 = 0xb001;
const TAG_ENTRY_TABLE: u16 = 0xb002;

/// Bits 24..27 of the attribute hold the image data format; 0 is JPEG.
const FORMAT_MASK: u32 = 0x0700_0000;

/// One image record of the MP entry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpEntry {
    pub attribute: u32,
    pub size: u32,
    /// Offset relative to the MP header; 0 for the first image.
    pub offset: u32,
}

impl MpEntry {
    pub fn is_jpeg(&self) -> bool {
        self.attribute & FORMAT_MASK == 0
    }
}

/// Parsed MP index of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpIndex {
    pub endian: Endian,
    /// Absolute position of the MP header (the byte-order tag).
    pub header_offset: usize,
    pub entries: Vec<MpEntry>,
}

impl MpIndex {
    /// Absolute byte range of image `index`.
    pub fn image_range(&self, index: usize) -> Option<(usize, usize)> {
        let entry = self.entries.get(index)?;
        let start = if index == 0 {
            0
        } else {
            self.header_offset.checked_add(entry.offset as usize)?
        };
        Some((start, entry.size as usize))
    }
}

/// Read the MP header and entry table without decoding any image.
pub fn parse_index(bytes: &[u8]) -> Result<MpIndex, ContainerError> {
    if bytes.is_empty() {
        return Err(ContainerError::InvalidContainer("container is empty"));
    }
    let mut r = ByteReader::new(bytes, Endian::Big);
    r.expect_bytes(&SOI, "missing JPEG start of image")?;
    r.expect_bytes(&APP1, "missing APP1 segment")?;
    let app1_len = r.read_u16()? as usize;
    r.expect_bytes(EXIF_ID, "missing Exif identifier")?;

    // The APP1 length counts itself but not the marker.
    let app2 = 2 + 2 + app1_len;
    r.seek(app2)
        .map_err(|_| ContainerError::InvalidContainer("APP1 segment runs past the end"))?;
    r.expect_bytes(&APP2, "missing APP2 segment")?;
    let _app2_len = r.read_u16()?;
    r.expect_bytes(MPF_ID, "missing MPF identifier")?;

    let header = r.position();
    let endian = if r.slice_at(header, 4)? == BIG_ENDIAN_TAG {
        Endian::Big
    } else {
        Endian::Little
    };
    r.set_endian(endian);
    r.seek(header + 4)?;
    let ifd = header + r.read_u32()? as usize;

    let mut r = ByteReader::at(bytes, ifd, endian)?;
    let field_count = r.read_u16()? as usize;
    let mut image_count = 0u32;
    let mut entry_table = None;
    for i in 0..field_count {
        let mut field = ByteReader::at(bytes, ifd + 2 + i * FIELD_SIZE, endian)?;
        let tag = field.read_u16()?;
        field.seek(field.position() + 6)?;
        let value = field.read_u32()?;
        match tag {
            TAG_IMAGE_COUNT => image_count = value,
            TAG_ENTRY_TABLE => entry_table = Some(value as usize),
            _ => {}
        }
    }
    debug!(
        "MP index: {:?} endian, header at {header}, {image_count} images",
        endian
    );

    if image_count != 2 {
        return Err(ContainerError::WrongImageCount(image_count));
    }
    let table = entry_table.ok_or(ContainerError::InvalidContainer("missing MP entry table"))?;

    let mut entries = Vec::with_capacity(image_count as usize);
    for i in 0..image_count as usize {
        let mut e = ByteReader::at(bytes, header + table + i * ENTRY_SIZE, endian)?;
        let attribute = e.read_u32()?;
        let size = e.read_u32()?;
        let offset = e.read_u32()?;
        let entry = MpEntry {
            attribute,
            size,
            offset,
        };
        if !entry.is_jpeg() {
            return Err(ContainerError::NotJpeg {
                index: i,
                attribute,
            });
        }
        entries.push(entry);
    }

    Ok(MpIndex {
        endian,
        header_offset: header,
        entries,
    })
}

/// Decode the left and right views of a stereo MPO container.
///
/// The first indexed image is the left view. Both are returned as RGB.
pub fn decode(bytes: &[u8]) -> Result<(ImageBuffer, ImageBuffer), ContainerError> {
    let index = parse_index(bytes)?;
    let reader = ByteReader::new(bytes, index.endian);

    let mut views = Vec::with_capacity(2);
    for i in 0..index.entries.len() {
        let (start, len) = index
            .image_range(i)
            .ok_or(ContainerError::InvalidContainer("image offset overflows"))?;
        let jpeg = reader.slice_at(start, len)?;
        let img = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)
            .map_err(|source| ContainerError::Jpeg { index: i, source })?;
        views.push(ImageBuffer::from(img.to_rgb8()));
    }

    let right = views.pop();
    let left = views.pop();
    match (left, right) {
        (Some(left), Some(right)) => Ok((left, right)),
        _ => Err(ContainerError::WrongImageCount(index.entries.len() as u32)),
    }
}

/// Read `path` and [`decode`] it.
pub fn decode_file(path: impl AsRef<Path>) -> Result<(ImageBuffer, ImageBuffer), ContainerError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| ContainerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("decoding {} ({} bytes)", path.display(), bytes.len());
    decode(&bytes)
}
