//! Normalized cross-correlation template matching (zero-mean, the
//! `CCOEFF_NORMED` score): 1.0 is a perfect match, 0 no correlation.
//!
//! Small searches are exhaustive. Large ones are first run on a downscaled
//! pair; the best coarse peaks are then re-scored exhaustively at full
//! resolution in a window around each peak, so the reported score is always
//! the exact full-resolution one.

use image::GrayImage;
use image::imageops::{self, FilterType};

use crate::types::Rect;

// Exhaustive search budget, in multiply-adds.
const EXHAUSTIVE_BUDGET: u64 = 60_000_000;
// Template side below which downscaling stops.
const MIN_COARSE_SIDE: u32 = 6;
// Coarse peaks carried into refinement.
const REFINE_CANDIDATES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Top-left of the best window, in image pixels.
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub score: f64,
}

impl Match {
    pub fn bbox(&self) -> Rect {
        Rect::new(self.x as i32, self.y as i32, self.width, self.height)
    }
}

/// Summed-area tables of pixel values and squared values.
struct Integral {
    stride: usize,
    sum: Vec<u64>,
    sq: Vec<u64>,
}

impl Integral {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0u64; stride * (h + 1)];
        let mut sq = vec![0u64; stride * (h + 1)];
        let raw = image.as_raw();
        for y in 0..h {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w {
                let v = raw[y * w + x] as u64;
                row_sum += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row_sum;
                sq[(y + 1) * stride + x + 1] = sq[y * stride + x + 1] + row_sq;
            }
        }
        Self { stride, sum, sq }
    }

    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let s = self.stride;
        let at = |t: &[u64], xx: usize, yy: usize| t[yy * s + xx];
        let total = |t: &[u64]| {
            (at(t, x + w, y + h) + at(t, x, y)) as f64 - (at(t, x + w, y) + at(t, x, y + h)) as f64
        };
        (total(&self.sum), total(&self.sq))
    }
}

/// Zero-mean template with its energy, ready for correlation.
struct Prepared {
    w: usize,
    h: usize,
    centered: Vec<f64>,
    energy: f64,
}

impl Prepared {
    fn new(template: &GrayImage) -> Self {
        let (w, h) = (template.width() as usize, template.height() as usize);
        let raw = template.as_raw();
        let mean = raw.iter().map(|&v| v as f64).sum::<f64>() / (w * h) as f64;
        let centered: Vec<f64> = raw.iter().map(|&v| v as f64 - mean).collect();
        let energy = centered.iter().map(|v| v * v).sum();
        Self { w, h, centered, energy }
    }
}

fn score_at(image: &GrayImage, integral: &Integral, tpl: &Prepared, x: usize, y: usize) -> f64 {
    let iw = image.width() as usize;
    let raw = image.as_raw();
    let n = (tpl.w * tpl.h) as f64;

    let (sum, sq) = integral.window(x, y, tpl.w, tpl.h);
    let window_energy = (sq - sum * sum / n).max(0.0);

    if tpl.energy <= f64::EPSILON || window_energy <= f64::EPSILON {
        // A flat template only correlates with an equally flat window.
        return if tpl.energy <= f64::EPSILON && window_energy <= f64::EPSILON { 1.0 } else { 0.0 };
    }

    let mut cross = 0.0;
    for ty in 0..tpl.h {
        let img_row = &raw[(y + ty) * iw + x..(y + ty) * iw + x + tpl.w];
        let tpl_row = &tpl.centered[ty * tpl.w..(ty + 1) * tpl.w];
        cross += img_row.iter().zip(tpl_row).map(|(&a, &b)| a as f64 * b).sum::<f64>();
    }

    (cross / (tpl.energy * window_energy).sqrt()).clamp(-1.0, 1.0)
}

fn exhaustive(image: &GrayImage, template: &GrayImage) -> Vec<(f64, u32, u32)> {
    let integral = Integral::new(image);
    let tpl = Prepared::new(template);
    let (rw, rh) = (image.width() - template.width() + 1, image.height() - template.height() + 1);
    let mut scores = Vec::with_capacity((rw * rh) as usize);
    for y in 0..rh {
        for x in 0..rw {
            scores.push((score_at(image, &integral, &tpl, x as usize, y as usize), x, y));
        }
    }
    scores
}

fn cost(image: &GrayImage, template: &GrayImage) -> u64 {
    let positions = (image.width() - template.width() + 1) as u64 * (image.height() - template.height() + 1) as u64;
    positions * template.width() as u64 * template.height() as u64
}

/// Find the best placement of `template` inside `image`.
/// Returns `None` when the template is empty or larger than the image.
pub fn match_template(image: &GrayImage, template: &GrayImage) -> Option<Match> {
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > image.width() || th > image.height() {
        return None;
    }

    let best = if cost(image, template) <= EXHAUSTIVE_BUDGET {
        exhaustive(image, template)
            .into_iter()
            .fold(None, |acc: Option<(f64, u32, u32)>, c| match acc {
                Some(a) if a.0 >= c.0 => Some(a),
                _ => Some(c),
            })?
    } else {
        coarse_to_fine(image, template)?
    };

    Some(Match { x: best.1, y: best.2, width: tw, height: th, score: best.0 })
}

fn coarse_to_fine(image: &GrayImage, template: &GrayImage) -> Option<(f64, u32, u32)> {
    let (tw, th) = template.dimensions();

    let mut factor = 1u32;
    loop {
        let next = factor * 2;
        if tw / next < MIN_COARSE_SIDE || th / next < MIN_COARSE_SIDE {
            break;
        }
        factor = next;
        let small_img = (image.width() / factor) as u64 * (image.height() / factor) as u64;
        let small_tpl = (tw / factor) as u64 * (th / factor) as u64;
        if small_img * small_tpl <= EXHAUSTIVE_BUDGET {
            break;
        }
    }

    let resize = |img: &GrayImage| {
        imageops::resize(img, (img.width() / factor).max(1), (img.height() / factor).max(1), FilterType::Triangle)
    };
    let small_img = resize(image);
    let small_tpl = resize(template);

    let mut coarse = exhaustive(&small_img, &small_tpl);
    coarse.sort_by(|a, b| b.0.total_cmp(&a.0));

    // Greedy non-maximum suppression over the coarse map.
    let mut peaks: Vec<(u32, u32)> = Vec::new();
    for &(_, x, y) in &coarse {
        if peaks.len() == REFINE_CANDIDATES {
            break;
        }
        if peaks.iter().all(|&(px, py)| px.abs_diff(x) > 1 || py.abs_diff(y) > 1) {
            peaks.push((x, y));
        }
    }

    let integral = Integral::new(image);
    let tpl = Prepared::new(template);
    let (max_x, max_y) = (image.width() - tw, image.height() - th);

    let mut best: Option<(f64, u32, u32)> = None;
    for (cx, cy) in peaks {
        let (x0, x1) = ((cx * factor).saturating_sub(factor), (cx * factor + factor).min(max_x));
        let (y0, y1) = ((cy * factor).saturating_sub(factor), (cy * factor + factor).min(max_y));
        for y in y0.min(max_y)..=y1 {
            for x in x0.min(max_x)..=x1 {
                let s = score_at(image, &integral, &tpl, x as usize, y as usize);
                if best.map_or(true, |b| s > b.0) {
                    best = Some((s, x, y));
                }
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn noise(w: u32, h: u32, seed: u32) -> GrayImage {
        let mut state = seed.wrapping_mul(2654435761).max(1);
        GrayImage::from_fn(w, h, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            Luma([(state % 256) as u8])
        })
    }

    #[test]
    fn test_exact_match_found() {
        let screen = noise(80, 60, 7);
        let tpl = imageops::crop_imm(&screen, 31, 17, 12, 9).to_image();
        let m = match_template(&screen, &tpl).unwrap();
        assert_eq!((m.x, m.y), (31, 17));
        assert!(m.score > 0.999);
        assert_eq!(m.bbox().center(), crate::types::Point::new(37, 21));
    }

    #[test]
    fn test_brightness_shift_still_matches() {
        let screen = noise(60, 40, 3);
        let mut tpl = imageops::crop_imm(&screen, 5, 5, 10, 10).to_image();
        for p in tpl.pixels_mut() {
            p[0] = (p[0] / 2).saturating_add(40);
        }
        let m = match_template(&screen, &tpl).unwrap();
        assert_eq!((m.x, m.y), (5, 5));
        assert!(m.score > 0.99);
    }

    #[test]
    fn test_unrelated_template_scores_low() {
        let screen = noise(60, 40, 11);
        let tpl = noise(10, 10, 999);
        let m = match_template(&screen, &tpl).unwrap();
        assert!(m.score < 0.8, "score {}", m.score);
    }

    #[test]
    fn test_template_larger_than_image() {
        assert!(match_template(&noise(10, 10, 1), &noise(11, 5, 2)).is_none());
    }

    #[test]
    fn test_large_search_uses_refinement() {
        // A smooth pattern survives downscaling, so the coarse pass finds it.
        let screen = GrayImage::from_fn(900, 600, |x, y| {
            let v = ((x as f64 / 23.0).sin() * (y as f64 / 17.0).cos() * 100.0 + 128.0) as u8;
            Luma([v])
        });
        let mut screen = screen;
        for y in 0..80 {
            for x in 0..120 {
                let v = if (x / 10 + y / 10) % 2 == 0 { 10 } else { 245 };
                screen.put_pixel(500 + x, 300 + y, Luma([v]));
            }
        }
        let tpl = imageops::crop_imm(&screen, 500, 300, 120, 80).to_image();
        assert!(cost(&screen, &tpl) > EXHAUSTIVE_BUDGET);
        let m = match_template(&screen, &tpl).unwrap();
        assert_eq!((m.x, m.y), (500, 300));
        assert!(m.score > 0.999);
    }
}
