use avif_block_encoder::{
    encode, read_container, AlphaColorMode, ColorModel, EncodeConfig, EncodeError, Encoder, Image,
};
use image::{ImageBuffer, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use std::io::Read;

/// Textured RGBA picture with a transparent band on the left.
fn rgba_scene(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let r = ((x * 7 + y * 3) % 256) as u8;
        let g = ((x * x + y) % 256) as u8;
        let b = (((x ^ y) * 5) % 256) as u8;
        let a = if x < width / 4 {
            0
        } else if x < width / 2 {
            ((y * 255) / height.max(1)) as u8
        } else {
            255
        };
        Rgba([r, g, b, a])
    })
}

fn rgb_scene(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            ((x * 3 + y) % 256) as u8,
            (((x / 4) * 40 + y * 2) % 256) as u8,
            ((x * y) % 256) as u8,
        ])
    })
}

fn to_image(img: RgbaImage) -> Image {
    let (w, h) = img.dimensions();
    Image::from_rgba8(w, h, img.into_raw()).unwrap()
}

fn config(quality: f32, speed: u8, threads: usize) -> EncodeConfig {
    EncodeConfig {
        quality,
        speed,
        threads: Some(threads),
        ..EncodeConfig::default()
    }
}

/// Test: a non-multiple-of-block-size RGBA image round-trips through the header
#[test]
fn test_rgba_partial_blocks() {
    let image = to_image(rgba_scene(130, 97));
    let cfg = EncodeConfig {
        alpha_color_mode: AlphaColorMode::from_dirty_alpha(false),
        ..config(50.0, 5, 4)
    };
    let bitstream = encode(&image, &cfg).expect("encode failed");
    assert!(!bitstream.is_empty());

    let info = read_container(bitstream.as_bytes()).expect("container should parse");
    assert_eq!((info.width, info.height), (130, 97));
    assert_eq!(info.channels, 4);
    assert_eq!(info.bit_depth, 8);
    assert!(info.has_alpha);
    assert_eq!(info.block_size, 64);
    // 3x2 grid of rects, three color planes plus alpha.
    assert_eq!(info.color_block_sizes.len(), 18);
    assert_eq!(info.alpha_block_sizes.len(), 6);
    assert_eq!(info.mdat_offset + info.mdat_len, bitstream.len() as u64);
}

#[test]
fn test_deterministic_output() {
    let image = to_image(rgba_scene(90, 70));
    let cfg = config(65.0, 3, 3);
    let first = encode(&image, &cfg).unwrap();
    let second = encode(&image, &cfg).unwrap();
    assert_eq!(first, second);
}

/// Test: worker count never changes the output bytes
#[test]
fn test_thread_count_independent() {
    let image = to_image(rgba_scene(100, 75));
    let reference = encode(&image, &config(60.0, 6, 1)).unwrap();
    for threads in 2..=4 {
        let out = encode(&image, &config(60.0, 6, threads)).unwrap();
        assert_eq!(
            out.as_bytes(),
            reference.as_bytes(),
            "output differs with {} threads",
            threads
        );
    }
}

#[test]
fn test_quality_trades_size() {
    let img = rgb_scene(96, 64);
    let image = Image::from_rgb8(96, 64, img.into_raw()).unwrap();
    let low = encode(&image, &config(1.0, 4, 2)).unwrap();
    let high = encode(&image, &config(100.0, 4, 2)).unwrap();
    assert!(
        high.len() >= low.len(),
        "q100 gave {} bytes, q1 gave {} bytes",
        high.len(),
        low.len()
    );

    let low_info = read_container(low.as_bytes()).unwrap();
    let high_info = read_container(high.as_bytes()).unwrap();
    assert!(low_info.color_qindex > high_info.color_qindex);
    assert_eq!(high_info.color_qindex, 0);
}

#[test]
fn test_rgb_input_has_no_alpha() {
    let img = rgb_scene(40, 33);
    let image = Image::from_rgb8(40, 33, img.into_raw()).unwrap();
    let encoded = Encoder::new().with_speed(7).encode_image(&image).unwrap();
    assert_eq!(encoded.alpha_byte_size, 0);

    let info = read_container(encoded.bitstream.as_bytes()).unwrap();
    assert_eq!(info.channels, 3);
    assert!(!info.has_alpha);
    assert!(info.alpha_block_sizes.is_empty());
    assert_eq!(info.alpha_qindex, 0);
}

#[test]
fn test_opaque_rgba_drops_alpha() {
    let img = RgbaImage::from_fn(50, 20, |x, y| Rgba([x as u8 * 5, y as u8 * 9, 77, 255]));
    let encoded = Encoder::new().encode_image(&to_image(img)).unwrap();
    let info = read_container(encoded.bitstream.as_bytes()).unwrap();
    assert_eq!(info.channels, 3);
    assert!(!info.has_alpha);
    assert_eq!(encoded.alpha_byte_size, 0);
}

#[test]
fn test_ten_bit_input() {
    let img: ImageBuffer<Rgba<u16>, Vec<u16>> = ImageBuffer::from_fn(48, 40, |x, y| {
        let a = if (x + y) % 11 == 0 { 0 } else { 1023 };
        Rgba([(x * 21) as u16 % 1024, (y * 25) as u16 % 1024, 512, a])
    });
    let image = Image::from_rgba16(48, 40, img.into_raw()).unwrap();
    let encoded = Encoder::new()
        .with_quality(75.0)
        .with_block_size(32)
        .encode_image(&image)
        .unwrap();

    let info = read_container(encoded.bitstream.as_bytes()).unwrap();
    assert_eq!(info.bit_depth, 10);
    assert_eq!(info.channels, 4);
    assert_eq!(info.block_size, 32);
    assert_eq!(info.color_block_sizes.len(), 3 * 4);
}

/// Test: the dirty alpha switch only matters when transparent pixels carry color
#[test]
fn test_dirty_alpha_changes_color_payload() {
    let image = to_image(rgba_scene(64, 64));
    let clean = Encoder::new().with_dirty_alpha(false).encode_image(&image).unwrap();
    let dirty = Encoder::new().with_dirty_alpha(true).encode_image(&image).unwrap();
    assert_ne!(clean.bitstream, dirty.bitstream);
    // Alpha itself is coded the same way under both policies.
    assert_eq!(clean.alpha_byte_size, dirty.alpha_byte_size);

    let opaque = to_image(RgbaImage::from_fn(32, 32, |x, y| Rgba([x as u8, y as u8, 9, 255])));
    let a = Encoder::new().with_dirty_alpha(false).encode_image(&opaque).unwrap();
    let b = Encoder::new().with_dirty_alpha(true).encode_image(&opaque).unwrap();
    assert_eq!(a.bitstream, b.bitstream);
}

#[test]
fn test_alpha_quality_is_independent() {
    let image = to_image(rgba_scene(80, 60));
    let coarse = Encoder::new().with_alpha_quality(5.0).encode_image(&image).unwrap();
    let fine = Encoder::new().with_alpha_quality(100.0).encode_image(&image).unwrap();

    let coarse_info = read_container(coarse.bitstream.as_bytes()).unwrap();
    let fine_info = read_container(fine.bitstream.as_bytes()).unwrap();
    assert_eq!(coarse_info.color_block_sizes, fine_info.color_block_sizes);
    assert_eq!(coarse_info.color_qindex, fine_info.color_qindex);
    assert_eq!(fine_info.alpha_qindex, 0);
    assert!(coarse_info.alpha_qindex > 0);
}

#[test]
fn test_byte_sizes_match_container() {
    let image = to_image(rgba_scene(70, 45));
    let encoded = Encoder::new()
        .with_color_model(ColorModel::Rgb)
        .with_block_size(16)
        .encode_image(&image)
        .unwrap();
    let data = encoded.bitstream.as_bytes();
    let info = read_container(data).unwrap();
    assert_eq!(info.color_model, ColorModel::Rgb);

    let color: u64 = info.color_block_sizes.iter().map(|&s| u64::from(s)).sum();
    let alpha: u64 = info.alpha_block_sizes.iter().map(|&s| u64::from(s)).sum();
    assert_eq!(color, encoded.color_byte_size as u64);
    assert_eq!(alpha, encoded.alpha_byte_size as u64);
    assert_eq!(color + alpha, info.mdat_len);

    let last = info.color_block_sizes.len() + info.alpha_block_sizes.len() - 1;
    let payload = info.payload(data, last).unwrap();
    assert_eq!(payload.len() as u32, *info.alpha_block_sizes.last().unwrap());
    assert!(info.payload(data, last + 1).is_none());
}

#[test]
fn test_write_to_file() {
    let image = to_image(rgba_scene(33, 17));
    let bitstream = encode(&image, &EncodeConfig::default()).unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    bitstream.write_to(file.as_file_mut()).unwrap();

    let mut written = Vec::new();
    file.reopen().unwrap().read_to_end(&mut written).unwrap();
    assert_eq!(written, bitstream.as_bytes());
}

#[test]
fn test_invalid_input_rejected() {
    assert!(matches!(
        Image::from_rgba8(0, 5, Vec::new()),
        Err(EncodeError::InvalidDimension { width: 0, height: 5 })
    ));
    assert!(matches!(
        Image::from_rgb8(4, 4, vec![0; 10]),
        Err(EncodeError::InvalidBuffer { .. })
    ));
}

#[test]
fn test_tiny_image() {
    let image = to_image(RgbaImage::from_pixel(1, 1, Rgba([12, 200, 40, 100])));
    let bitstream = encode(&image, &config(90.0, 1, 2)).unwrap();
    let info = read_container(bitstream.as_bytes()).unwrap();
    assert_eq!((info.width, info.height), (1, 1));
    assert_eq!(info.color_block_sizes.len(), 3);
    assert_eq!(info.alpha_block_sizes.len(), 1);
}

#[test]
fn test_open_resize_and_encode() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scene.png");
    rgba_scene(120, 80).save(&path).unwrap();

    let decoded = image::open(&path).unwrap();
    let image = Image::from_dynamic(&decoded).unwrap().resize(60, 60).unwrap();
    assert_eq!(image.dimensions(), (60, 40));
    let bitstream = encode(&image, &config(70.0, 6, 2)).unwrap();
    let info = read_container(bitstream.as_bytes()).unwrap();
    assert_eq!((info.width, info.height), (60, 40));
    assert!(info.has_alpha);
}

#[test]
fn test_sixteen_bit_gray_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gray16.png");
    let gray: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_fn(24, 18, |x, y| Luma([((x * 2000) + y * 300) as u16]));
    gray.save(&path).unwrap();

    let image = Image::from_dynamic(&image::open(&path).unwrap()).unwrap();
    assert_eq!(image.pixels().pixel(10, 4), [82, 82, 82, 255]);
    let bitstream = encode(&image, &EncodeConfig::default()).unwrap();
    let info = read_container(bitstream.as_bytes()).unwrap();
    assert_eq!(info.bit_depth, 8);
    assert_eq!(info.channels, 3);
}
