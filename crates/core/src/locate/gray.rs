//! Grayscale helpers shared by the matchers.

use image::{GrayImage, Luma, RgbaImage};

use crate::types::Capture;

/// ITU-R BT.601 luma, the weighting screen matchers conventionally use.
fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    y.round().clamp(0.0, 255.0) as u8
}

pub fn capture_to_gray(capture: &Capture) -> GrayImage {
    let mut out = GrayImage::new(capture.width, capture.height);
    for (px, chunk) in out.pixels_mut().zip(capture.data.chunks_exact(4)) {
        *px = Luma([luma(chunk[0], chunk[1], chunk[2])]);
    }
    out
}

pub fn rgba_to_gray(image: &RgbaImage) -> GrayImage {
    let mut out = GrayImage::new(image.width(), image.height());
    for (dst, src) in out.pixels_mut().zip(image.pixels()) {
        *dst = Luma([luma(src[0], src[1], src[2])]);
    }
    out
}

/// Otsu's threshold: the level that maximises between-class variance.
pub fn otsu_level(image: &GrayImage) -> u8 {
    let mut hist = [0u64; 256];
    for p in image.pixels() {
        hist[p[0] as usize] += 1;
    }
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return 0;
    }

    let sum_all: f64 = hist.iter().enumerate().map(|(i, &n)| i as f64 * n as f64).sum();
    let mut sum_bg = 0.0;
    let mut weight_bg = 0u64;
    let mut best = (0u8, -1.0f64);

    for (level, &count) in hist.iter().enumerate() {
        weight_bg += count;
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }
        sum_bg += level as f64 * count as f64;
        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (sum_all - sum_bg) / weight_fg as f64;
        let between = weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg).powi(2);
        if between > best.1 {
            best = (level as u8, between);
        }
    }
    best.0
}

/// Pixels strictly above `level` become 255, the rest 0.
pub fn binarize(image: &GrayImage, level: u8) -> GrayImage {
    let mut out = image.clone();
    for p in out.pixels_mut() {
        p[0] = if p[0] > level { 255 } else { 0 };
    }
    out
}

pub fn otsu_binarize(image: &GrayImage) -> GrayImage {
    binarize(image, otsu_level(image))
}
