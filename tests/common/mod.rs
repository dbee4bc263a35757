#![allow(dead_code)]

use image::{imageops, GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roialign::{PipelineConfig, RansacConfig, Region};
use std::path::{Path, PathBuf};

/// Smooth background covered with random opaque rectangles and discs.
pub fn textured_scene(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut img = RgbImage::from_fn(width, height, |x, y| {
        let v = 70 + (x * 60 / width) as u8 + (y * 40 / height) as u8;
        Rgb([v, v, v])
    });
    let shapes = (width * height / 2500).max(20);
    for _ in 0..shapes {
        let color = Rgb([
            rng.random_range(0..=255u8),
            rng.random_range(0..=255u8),
            rng.random_range(0..=255u8),
        ]);
        let x = rng.random_range(0..width as i32);
        let y = rng.random_range(0..height as i32);
        if rng.random_bool(0.6) {
            let w = rng.random_range(8..48u32);
            let h = rng.random_range(8..48u32);
            draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(w, h), color);
        } else {
            let r = rng.random_range(4..18i32);
            draw_filled_circle_mut(&mut img, (x, y), r, color);
        }
    }
    img
}

pub fn uniform_noise(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    RgbImage::from_fn(width, height, |_, _| {
        let v = rng.random_range(0..=255u8);
        Rgb([v, v, v])
    })
}

pub fn blank(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([128, 128, 128]))
}

/// Half-size copy of `img` turned upside down.
pub fn rotated_half(img: &RgbImage) -> RgbImage {
    let small = imageops::resize(
        img,
        img.width() / 2,
        img.height() / 2,
        imageops::FilterType::Triangle,
    );
    imageops::rotate180(&small)
}

pub fn gray_ramp(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]))
}

/// Pipeline settings with a fixed RANSAC seed.
pub fn seeded_config(seed: u64) -> PipelineConfig {
    PipelineConfig {
        ransac: RansacConfig {
            seed: Some(seed),
            ..RansacConfig::default()
        },
        ..PipelineConfig::default()
    }
}

/// Two regions inside a 480x360 canvas; the second is authored with
/// swapped corners.
pub fn two_regions() -> Vec<Region> {
    vec![
        Region::new("r1", "upper left", (60, 50), (220, 170)),
        Region::new("r2", "lower right", (420, 310), (260, 190)),
    ]
}

pub fn save_png(dir: &Path, name: &str, img: &RgbImage) -> PathBuf {
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

pub fn assert_near_identity(m: [[f64; 3]; 3], tol: f64) {
    for (r, row) in m.iter().enumerate() {
        for (c, &v) in row.iter().enumerate() {
            let expected = if r == c { 1.0 } else { 0.0 };
            assert!(
                (v - expected).abs() <= tol,
                "H[{r}][{c}] = {v}, expected {expected}"
            );
        }
    }
}
