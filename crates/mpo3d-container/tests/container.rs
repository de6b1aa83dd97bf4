use mpo3d_container::synthetic::ContainerBuilder;
use mpo3d_container::{decode, decode_file, parse_index, ContainerError, Endian};
use mpo3d_image::{ImageBuffer, PixelFormat};

fn stereo_pair(endian: Endian, width: u32, height: u32) -> Vec<u8> {
    ContainerBuilder::new(endian)
        .solid_image(width, height, [180, 60, 30])
        .solid_image(width, height, [30, 60, 180])
        .build()
        .unwrap()
}

fn close(a: [u8; 3], b: [u8; 3]) -> bool {
    a.iter().zip(b).all(|(&x, y)| x.abs_diff(y) <= 4)
}

#[test]
fn decodes_vga_pair_in_both_byte_orders() {
    for endian in [Endian::Big, Endian::Little] {
        let bytes = stereo_pair(endian, 640, 480);
        let (left, right) = decode(&bytes).unwrap();
        for img in [&left, &right] {
            assert_eq!(img.width(), 640);
            assert_eq!(img.height(), 480);
            assert_eq!(img.format(), PixelFormat::Rgb);
        }
        assert!(close(left.rgb_at(320, 240), [180, 60, 30]));
        assert!(close(right.rgb_at(10, 10), [30, 60, 180]));
    }
}

#[test]
fn textured_views_keep_their_order() {
    let left = ImageBuffer::from_fn(64, 48, PixelFormat::Rgb, |x, _| {
        if x < 32 { [0, 0, 0] } else { [255, 255, 255] }
    });
    let right = ImageBuffer::from_fn(64, 48, PixelFormat::Rgb, |x, _| {
        if x < 32 { [255, 255, 255] } else { [0, 0, 0] }
    });
    let bytes = ContainerBuilder::new(Endian::Big)
        .image(&left)
        .unwrap()
        .image(&right)
        .unwrap()
        .build()
        .unwrap();
    let (l, r) = decode(&bytes).unwrap();
    assert!(l.rgb_at(4, 24)[0] < 20 && l.rgb_at(60, 24)[0] > 235);
    assert!(r.rgb_at(4, 24)[0] > 235 && r.rgb_at(60, 24)[0] < 20);
}

#[test]
fn missing_mpf_identifier_is_rejected() {
    let bytes = ContainerBuilder::new(Endian::Big)
        .solid_image(16, 16, [0, 0, 0])
        .solid_image(16, 16, [0, 0, 0])
        .mpf_identifier(*b"XYZ\0")
        .build()
        .unwrap();
    assert!(matches!(
        decode(&bytes),
        Err(ContainerError::InvalidContainer(_))
    ));
}

#[test]
fn broken_markers_are_rejected() {
    let good = stereo_pair(Endian::Little, 16, 16);

    let mut no_soi = good.clone();
    no_soi[1] = 0x00;
    assert!(matches!(decode(&no_soi), Err(ContainerError::InvalidContainer(_))));

    let mut no_app1 = good.clone();
    no_app1[3] = 0xe0;
    assert!(matches!(decode(&no_app1), Err(ContainerError::InvalidContainer(_))));

    let no_exif = ContainerBuilder::new(Endian::Little)
        .solid_image(16, 16, [0, 0, 0])
        .solid_image(16, 16, [0, 0, 0])
        .exif_identifier(*b"JFIF\0\0")
        .build()
        .unwrap();
    assert!(matches!(decode(&no_exif), Err(ContainerError::InvalidContainer(_))));

    assert!(matches!(decode(&[]), Err(ContainerError::InvalidContainer(_))));
}

#[test]
fn image_count_must_be_two() {
    let single = ContainerBuilder::new(Endian::Big)
        .solid_image(16, 16, [0, 0, 0])
        .build()
        .unwrap();
    assert!(matches!(decode(&single), Err(ContainerError::WrongImageCount(1))));

    let three = ContainerBuilder::new(Endian::Little)
        .solid_image(16, 16, [0, 0, 0])
        .solid_image(16, 16, [0, 0, 0])
        .solid_image(16, 16, [0, 0, 0])
        .build()
        .unwrap();
    assert!(matches!(decode(&three), Err(ContainerError::WrongImageCount(3))));

    let lying = ContainerBuilder::new(Endian::Big)
        .solid_image(16, 16, [0, 0, 0])
        .solid_image(16, 16, [0, 0, 0])
        .declared_count(0)
        .build()
        .unwrap();
    assert!(matches!(decode(&lying), Err(ContainerError::WrongImageCount(0))));
}

#[test]
fn non_jpeg_entry_is_rejected() {
    for endian in [Endian::Big, Endian::Little] {
        let bytes = ContainerBuilder::new(endian)
            .solid_image(16, 16, [0, 0, 0])
            .solid_image(16, 16, [0, 0, 0])
            .attribute(1, 0x0302_0002)
            .build()
            .unwrap();
        assert!(matches!(
            decode(&bytes),
            Err(ContainerError::NotJpeg { index: 1, .. })
        ));
    }
}

#[test]
fn little_endian_attribute_format_comes_from_the_last_stored_byte() {
    let with_attribute = |attribute| {
        ContainerBuilder::new(Endian::Little)
            .solid_image(16, 16, [0, 0, 0])
            .solid_image(16, 16, [0, 0, 0])
            .attribute(1, attribute)
            .build()
            .unwrap()
    };

    // Stored as 02 00 02 00: a non-zero leading byte is the type code only.
    let jpeg = with_attribute(0x0002_0002);
    let index = parse_index(&jpeg).unwrap();
    assert_eq!(index.entries[1].attribute, 0x0002_0002);
    assert!(index.entries[1].is_jpeg());
    assert!(decode(&jpeg).is_ok());

    // Stored as 02 00 02 01: format 1 in the last byte.
    assert!(matches!(
        decode(&with_attribute(0x0102_0002)),
        Err(ContainerError::NotJpeg {
            index: 1,
            attribute: 0x0102_0002
        })
    ));
}

#[test]
fn truncated_container_is_rejected() {
    let bytes = stereo_pair(Endian::Big, 32, 32);
    let cut = &bytes[..bytes.len() - 10];
    assert!(matches!(decode(cut), Err(ContainerError::Truncated { .. })));

    // Cut inside the MP header.
    assert!(matches!(decode(&bytes[..40]), Err(ContainerError::Truncated { .. })));
}

#[test]
fn corrupt_payload_reports_jpeg_error() {
    let mut bytes = stereo_pair(Endian::Little, 32, 32);
    let index = parse_index(&bytes).unwrap();
    let (start, len) = index.image_range(1).unwrap();
    // Overwrite the second image, SOI included, with filler.
    bytes[start..start + len].fill(0x11);
    assert!(matches!(
        decode(&bytes),
        Err(ContainerError::Jpeg { index: 1, .. })
    ));
}

#[test]
fn decode_file_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pair.mpo");
    std::fs::write(&path, stereo_pair(Endian::Big, 48, 32)).unwrap();
    let (left, right) = decode_file(&path).unwrap();
    assert_eq!((left.width(), right.height()), (48, 32));

    assert!(matches!(
        decode_file(dir.path().join("missing.mpo")),
        Err(ContainerError::Io { .. })
    ));
}
