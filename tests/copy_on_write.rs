//! End-to-end behavior of the copy-on-write handle: isolation between
//! sharing handles, refcount observation, concurrent use, and loading
//! through a registered decoder.

use std::fs;

use pixcow::{
    Cuboid, Image, ImageDecoder, ImageError, ImageKind, LoadOptions, LoaderRegistry, PixelBuffer,
    PixelFormat, Rect, Rgba,
};
use quickcheck::{quickcheck, TestResult};

const RED: Rgba<u8> = Rgba {
    r: 255,
    g: 0,
    b: 0,
    a: 255,
};

fn rgba(r: u8, g: u8, b: u8, a: u8) -> Rgba<u8> {
    Rgba { r, g, b, a }
}

fn filled_image() -> Image {
    let mut image = Image::create(ImageKind::Flat, PixelFormat::Rgba8, 8, 8, 1, 2).unwrap();
    image.fill(RED).unwrap();
    image
}

/// Toy encoded format: `b"pix1"`, width byte, height byte, RGBA payload.
struct ToyDecoder;

fn toy_encode(width: u8, height: u8, rgba: &[u8]) -> Vec<u8> {
    let mut out = b"pix1".to_vec();
    out.push(width);
    out.push(height);
    out.extend_from_slice(rgba);
    out
}

impl ImageDecoder for ToyDecoder {
    fn extensions(&self) -> &'static [&'static str] {
        &["pix"]
    }

    fn sniff(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(b"pix1")
    }

    fn decode(&self, bytes: &[u8], _options: &LoadOptions) -> Result<PixelBuffer, ImageError> {
        if !self.sniff(bytes) || bytes.len() < 6 {
            return Err(ImageError::load("not a pix1 stream"));
        }
        let (width, height) = (bytes[4] as u32, bytes[5] as u32);
        let mut buffer =
            PixelBuffer::new(ImageKind::Flat, PixelFormat::Rgba8, width, height, 1, 1)?;
        buffer
            .update_level(&bytes[6..], 0)
            .map_err(|_| ImageError::load("pix1 payload is truncated"))?;
        Ok(buffer)
    }
}

fn toy_registry() -> LoaderRegistry {
    let mut registry = LoaderRegistry::new();
    registry.register(ToyDecoder);
    registry
}

#[test]
fn no_mutation_is_visible_through_a_sharing_handle() {
    let original = filled_image();
    let snapshot = original.pixels(0).unwrap().to_vec();

    let mutations: Vec<(&str, fn(&mut Image))> = vec![
        ("fill", |img| img.fill(rgba(1, 2, 3, 4)).unwrap()),
        ("fill_rect", |img| {
            img.fill_rect(rgba(1, 2, 3, 4), Rect::new(0, 0, 2, 2), 0).unwrap()
        }),
        ("fill_cuboid", |img| {
            img.fill_cuboid(rgba(1, 2, 3, 4), Cuboid::new(0, 0, 0, 2, 2, 1))
                .unwrap()
        }),
        ("convert", |img| img.convert(PixelFormat::Bgra8).unwrap()),
        ("flip_horizontally", |img| {
            img.set_pixel_color(rgba(9, 9, 9, 9), 0, 0, 0).unwrap();
            img.flip_horizontally().unwrap();
        }),
        ("flip_vertically", |img| {
            img.set_pixel_color(rgba(9, 9, 9, 9), 0, 0, 0).unwrap();
            img.flip_vertically().unwrap();
        }),
        ("set_level_count", |img| img.set_level_count(1).unwrap()),
        ("set_pixel_color", |img| {
            img.set_pixel_color(rgba(9, 9, 9, 9), 3, 3, 0).unwrap()
        }),
        ("update", |img| {
            let bytes = vec![7u8; img.level_byte_size(0).unwrap()];
            img.update(&bytes, 0).unwrap();
        }),
        ("update_rect", |img| {
            img.update_rect(&[7u8; 16], Rect::new(0, 0, 2, 2), 0, 0).unwrap()
        }),
        ("pixels_mut", |img| img.pixels_mut(0).unwrap()[0] = 0),
        ("destroy", |img| img.destroy()),
    ];

    for (name, mutate) in mutations {
        let mut copy = original.clone();
        assert_eq!(original.ref_count(), 2, "{name}: copy should share");
        mutate(&mut copy);
        assert_eq!(
            original.pixels(0).unwrap(),
            snapshot.as_slice(),
            "{name}: mutation leaked into the sharing handle"
        );
        assert_eq!(original.ref_count(), 1, "{name}: copy should have detached");
    }
}

#[test]
fn ref_count_tracks_copies_and_drops() {
    let image = filled_image();
    assert_eq!(image.ref_count(), 1);

    let copies: Vec<Image> = (0..4).map(|_| image.clone()).collect();
    assert_eq!(image.ref_count(), 5);
    for copy in &copies {
        assert_eq!(copy.ref_count(), 5);
    }

    drop(copies);
    assert_eq!(image.ref_count(), 1);
}

#[test]
fn create_with_excess_levels_fails() {
    // max_level_count(8, 8, 1) == 4
    let err = Image::create(ImageKind::Flat, PixelFormat::Rgba8, 8, 8, 1, 5);
    assert!(matches!(err, Err(ImageError::InvalidArgument(_))));
    assert!(Image::create(ImageKind::Flat, PixelFormat::Rgba8, 8, 8, 1, 4).is_ok());
}

#[test]
fn convert_round_trips_losslessly() {
    let mut image = filled_image();
    image.set_pixel_color(rgba(11, 22, 33, 44), 5, 5, 0).unwrap();
    let snapshot = image.pixels(0).unwrap().to_vec();

    image.convert(PixelFormat::Bgra8).unwrap();
    image.convert(PixelFormat::Rgba8).unwrap();
    assert_eq!(image.pixels(0).unwrap(), snapshot.as_slice());

    image.convert(PixelFormat::Rgb8).unwrap();
    image.convert(PixelFormat::Rgba8).unwrap();
    // Alpha was 255 everywhere except the marked texel, which had a=44 and
    // cannot survive RGB8. Color channels do survive.
    assert_eq!(image.pixel_color(5, 5, 0).unwrap(), rgba(11, 22, 33, 255));
    assert_eq!(image.pixel_color(0, 0, 0).unwrap(), RED);
}

#[test]
fn same_format_convert_does_not_detach() {
    let mut image = filled_image();
    let copy = image.clone();
    image.convert(PixelFormat::Rgba8).unwrap();
    assert_eq!(image.ref_count(), 2);
    drop(copy);
}

#[test]
fn fill_then_pixel_color_is_exact_per_format() {
    let color = rgba(10, 20, 30, 40);
    for format in [
        PixelFormat::Rgba8,
        PixelFormat::Bgra8,
        PixelFormat::Rgba16,
        PixelFormat::RgbaF32,
    ] {
        let mut image = Image::create(ImageKind::Flat, PixelFormat::Rgba8, 4, 4, 1, 1).unwrap();
        image.convert(format).unwrap();
        image.fill(color).unwrap();
        for (x, y) in [(0, 0), (3, 3), (2, 1)] {
            assert_eq!(
                image.pixel_color(x, y, 0).unwrap(),
                color,
                "fill readback drifted for {format:?}"
            );
        }
    }
}

#[test]
fn flip_twice_restores_layout() {
    let mut image = Image::create(ImageKind::Flat, PixelFormat::Rgba8, 5, 3, 1, 1).unwrap();
    for y in 0..3 {
        for x in 0..5 {
            image
                .set_pixel_color(rgba(x as u8, y as u8, 0, 255), x, y, 0)
                .unwrap();
        }
    }
    let snapshot = image.pixels(0).unwrap().to_vec();

    image.flip_horizontally().unwrap();
    assert_ne!(image.pixels(0).unwrap(), snapshot.as_slice());
    image.flip_horizontally().unwrap();
    assert_eq!(image.pixels(0).unwrap(), snapshot.as_slice());

    image.flip_vertically().unwrap();
    image.flip_vertically().unwrap();
    assert_eq!(image.pixels(0).unwrap(), snapshot.as_slice());
}

#[test]
fn out_of_bounds_writes_fail_without_modifying() {
    let mut image = filled_image();
    let snapshot = image.pixels(0).unwrap().to_vec();

    assert!(image
        .fill_rect(rgba(0, 0, 0, 0), Rect::new(7, 7, 2, 2), 0)
        .is_err());
    assert!(image.set_pixel_color(rgba(0, 0, 0, 0), 8, 0, 0).is_err());
    assert!(image.update_rect(&[0u8; 4], Rect::new(8, 0, 1, 1), 0, 0).is_err());

    assert_eq!(image.pixels(0).unwrap(), snapshot.as_slice());
}

#[test]
fn concurrent_copies_stay_isolated() {
    let base = filled_image();

    std::thread::scope(|scope| {
        for i in 0u8..8 {
            let mut copy = base.clone();
            scope.spawn(move || {
                let color = rgba(i, i, i, 255);
                copy.fill(color).unwrap();
                assert_eq!(copy.pixel_color(0, 0, 0).unwrap(), color);
                assert_eq!(copy.ref_count(), 1);
            });
        }
    });

    assert_eq!(base.pixel_color(0, 0, 0).unwrap(), RED);
    assert_eq!(base.ref_count(), 1);
}

#[test]
fn concurrent_clone_and_drop_is_safe() {
    let base = filled_image();
    std::thread::scope(|scope| {
        for _ in 0..8 {
            let handle = base.clone();
            scope.spawn(move || {
                for _ in 0..1000 {
                    let copy = handle.clone();
                    assert!(copy.is_valid());
                    drop(copy);
                }
            });
        }
    });
    assert_eq!(base.ref_count(), 1);
    assert_eq!(base.pixel_color(0, 0, 0).unwrap(), RED);
}

#[test]
fn load_from_file_by_extension_and_signature() {
    let registry = toy_registry();
    let dir = tempfile::tempdir().unwrap();

    let with_ext = dir.path().join("sprite.pix");
    fs::write(&with_ext, toy_encode(2, 2, &[7u8; 16])).unwrap();
    let mut image = Image::new();
    image
        .load_from_file(&registry, &with_ext, &LoadOptions::new())
        .unwrap();
    assert_eq!((image.width(), image.height()), (2, 2));
    assert_eq!(image.pixel_color(0, 0, 0).unwrap(), rgba(7, 7, 7, 7));

    // Unknown extension still loads through the signature probe.
    let with_odd_ext = dir.path().join("sprite.dat");
    fs::write(&with_odd_ext, toy_encode(1, 1, &[1, 2, 3, 4])).unwrap();
    let mut image = Image::new();
    image
        .load_from_file(&registry, &with_odd_ext, &LoadOptions::new())
        .unwrap();
    assert_eq!(image.pixel_color(0, 0, 0).unwrap(), rgba(1, 2, 3, 4));
}

#[test]
fn failed_load_leaves_the_handle_unchanged() {
    let registry = toy_registry();
    let mut image = filled_image();

    let err = image.load_from_memory(&registry, b"garbage", &LoadOptions::new());
    assert!(matches!(err, Err(ImageError::Load(_))));
    assert!(image.is_valid());
    assert_eq!(image.pixel_color(0, 0, 0).unwrap(), RED);

    // An empty handle stays empty.
    let mut empty = Image::new();
    assert!(empty
        .load_from_memory(&registry, b"garbage", &LoadOptions::new())
        .is_err());
    assert!(!empty.is_valid());
}

#[test]
fn load_replaces_shared_content_privately() {
    let registry = toy_registry();
    let mut image = filled_image();
    let copy = image.clone();

    image
        .load_from_memory(&registry, &toy_encode(1, 1, &[9, 9, 9, 9]), &LoadOptions::new())
        .unwrap();

    assert_eq!((image.width(), image.height()), (1, 1));
    assert_eq!(image.ref_count(), 1);
    // The sharing handle keeps the old content.
    assert_eq!((copy.width(), copy.height()), (8, 8));
    assert_eq!(copy.pixel_color(0, 0, 0).unwrap(), RED);
}

#[test]
fn load_from_stream_and_options() {
    let registry = toy_registry();
    let encoded = toy_encode(4, 4, &[3u8; 64]);
    let mut cursor = std::io::Cursor::new(encoded);
    let mut image = Image::new();
    image
        .load_from_stream(
            &registry,
            &mut cursor,
            &LoadOptions::new()
                .with_format(PixelFormat::Bgra8)
                .with_level_count(3),
        )
        .unwrap();
    assert_eq!(image.format(), Some(PixelFormat::Bgra8));
    assert_eq!(image.level_count(), 3);
}

quickcheck! {
    fn prop_max_level_matches_log2(width: u32, height: u32, depth: u32) -> TestResult {
        let (w, h, d) = (width % 100_000 + 1, height % 100_000 + 1, depth % 512 + 1);
        let expected = (w.max(h).max(d) as f64).log2().floor() as u8 + 1;
        TestResult::from_bool(PixelBuffer::max_level_count(w, h, d) == expected)
    }

    fn prop_flip_horizontally_is_involution(width: u8, height: u8, seed: u8) -> TestResult {
        let (w, h) = (width as u32 % 16 + 1, height as u32 % 16 + 1);
        let mut image = match Image::create(ImageKind::Flat, PixelFormat::Rgba8, w, h, 1, 1) {
            Ok(image) => image,
            Err(_) => return TestResult::discard(),
        };
        for y in 0..h {
            for x in 0..w {
                let v = (x as u8).wrapping_mul(31).wrapping_add((y as u8).wrapping_mul(7)).wrapping_add(seed);
                image.set_pixel_color(Rgba { r: v, g: v ^ 0xFF, b: seed, a: 255 }, x, y, 0).unwrap();
            }
        }
        let snapshot = image.pixels(0).unwrap().to_vec();
        image.flip_horizontally().unwrap();
        image.flip_horizontally().unwrap();
        TestResult::from_bool(image.pixels(0).unwrap() == snapshot.as_slice())
    }

    fn prop_fill_readback(r: u8, g: u8, b: u8, a: u8) -> bool {
        let color = Rgba { r, g, b, a };
        let mut image = Image::create(ImageKind::Flat, PixelFormat::Rgba8, 3, 3, 1, 1).unwrap();
        image.fill(color).unwrap();
        image.pixel_color(2, 1, 0).unwrap() == color
    }
}
