//! Coarse text-region heuristic used when no OCR engine is available.
//!
//! It does not read text. Candidate blobs come from a blurred, Otsu-binarised
//! screen; each blob's "similarity" is a plain image statistic of its
//! binarised pixels. Expect false positives.

use image::GrayImage;
use image::imageops;

use crate::types::Rect;
use super::gray::{otsu_binarize, otsu_level};

const MIN_AREA: u64 = 100;
const MIN_ASPECT: f64 = 0.1;
const MAX_ASPECT: f64 = 10.0;
// Sigma OpenCV derives for a 5x5 Gaussian kernel.
const BLUR_SIGMA: f32 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    pub bbox: Rect,
    /// Pixels enclosed by the outer boundary, holes included.
    pub area: u64,
}

/// Bounding boxes of the outermost 8-connected foreground blobs.
/// Blobs whose box lies inside another blob's box are dropped.
pub fn outer_blobs(binary: &GrayImage) -> Vec<Blob> {
    let (w, h) = binary.dimensions();
    let (wu, hu) = (w as usize, h as usize);
    let raw = binary.as_raw();
    // 0 = unlabelled, otherwise blob index + 1
    let mut label = vec![0u32; wu * hu];
    let mut blobs = Vec::new();
    let mut stack = Vec::new();

    for start in 0..wu * hu {
        if label[start] != 0 || raw[start] == 0 {
            continue;
        }
        let id = blobs.len() as u32 + 1;
        label[start] = id;
        stack.push(start);
        let (mut x0, mut y0, mut x1, mut y1) = (usize::MAX, usize::MAX, 0, 0);

        while let Some(i) = stack.pop() {
            let (x, y) = (i % wu, i / wu);
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
            for ny in y.saturating_sub(1)..=(y + 1).min(hu - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(wu - 1) {
                    let j = ny * wu + nx;
                    if label[j] == 0 && raw[j] != 0 {
                        label[j] = id;
                        stack.push(j);
                    }
                }
            }
        }

        blobs.push(Blob {
            bbox: Rect::new(x0 as i32, y0 as i32, (x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32),
            area: enclosed_area(&label, wu, id, (x0, y0, x1, y1)),
        });
    }

    let inside = |a: &Rect, b: &Rect| {
        a != b
            && a.l >= b.l
            && a.t >= b.t
            && a.l + a.w as i32 <= b.l + b.w as i32
            && a.t + a.h as i32 <= b.t + b.h as i32
    };
    let outer: Vec<Blob> = blobs
        .iter()
        .filter(|a| !blobs.iter().any(|b| inside(&a.bbox, &b.bbox)))
        .copied()
        .collect();
    outer
}

/// Pixels of the box that cannot reach its border without crossing blob `id`.
/// Background is 4-connected against the 8-connected foreground.
fn enclosed_area(label: &[u32], stride: usize, id: u32, (x0, y0, x1, y1): (usize, usize, usize, usize)) -> u64 {
    let (bw, bh) = (x1 - x0 + 1, y1 - y0 + 1);
    let open = |x: usize, y: usize| label[(y0 + y) * stride + x0 + x] != id;
    let mut outside = vec![false; bw * bh];
    let mut stack = Vec::new();

    for y in 0..bh {
        for x in 0..bw {
            let border = x == 0 || y == 0 || x == bw - 1 || y == bh - 1;
            if border && open(x, y) {
                outside[y * bw + x] = true;
                stack.push((x, y));
            }
        }
    }
    while let Some((x, y)) = stack.pop() {
        for (nx, ny) in [(x.wrapping_sub(1), y), (x + 1, y), (x, y.wrapping_sub(1)), (x, y + 1)] {
            if nx < bw && ny < bh && !outside[ny * bw + nx] && open(nx, ny) {
                outside[ny * bw + nx] = true;
                stack.push((nx, ny));
            }
        }
    }
    (bw * bh - outside.iter().filter(|o| **o).count()) as u64
}

/// Candidate text regions, top-to-bottom then left-to-right.
pub fn text_regions(gray: &GrayImage) -> Vec<Rect> {
    let blurred = imageops::blur(gray, BLUR_SIGMA);
    let binary = otsu_binarize(&blurred);

    let mut regions: Vec<Rect> = outer_blobs(&binary)
        .into_iter()
        .filter(|b| {
            let aspect = b.bbox.w as f64 / b.bbox.h as f64;
            aspect > MIN_ASPECT && aspect < MAX_ASPECT && b.area > MIN_AREA
        })
        .map(|b| b.bbox)
        .collect();
    regions.sort_by_key(|r| (r.t, r.l));
    regions
}

/// Weak score in [0, 1] for one region: (mean + std) / 2 of the region
/// binarised and min-max normalised. The target text does not influence it.
pub fn region_score(gray: &GrayImage, region: Rect, _target: &str) -> f64 {
    let roi = imageops::crop_imm(gray, region.l as u32, region.t as u32, region.w, region.h).to_image();
    let level = otsu_level(&roi);

    let values: Vec<f64> = roi.pixels().map(|p| if p[0] > level { 1.0 } else { 0.0 }).collect();
    if values.is_empty() {
        return 0.0;
    }
    // A constant region normalises to all zeros.
    let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if hi - lo <= f64::EPSILON {
        return 0.0;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean + var.sqrt()) / 2.0
}

/// First region, in reading order, whose score reaches `confidence`.
pub fn find_text_region(gray: &GrayImage, target: &str, confidence: f64) -> (Vec<Rect>, Option<(Rect, f64)>) {
    let regions = text_regions(gray);
    let hit = regions
        .iter()
        .map(|r| (*r, region_score(gray, *r, target)))
        .find(|(_, s)| *s >= confidence);
    (regions, hit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn canvas() -> GrayImage {
        let mut img = GrayImage::from_pixel(120, 80, Luma([0]));
        // 30x12 solid block, 6x6 speck, 40x3 bar with inner dark stripe
        for y in 10..22 {
            for x in 10..40 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        for y in 50..56 {
            for x in 80..86 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        for y in 40..70 {
            for x in 20..60 {
                let edge = x == 20 || x == 59 || y == 40 || y == 69;
                let mark = (30..50).contains(&x) && (50..60).contains(&y);
                if edge || mark {
                    img.put_pixel(x, y, Luma([255]));
                }
            }
        }
        img
    }

    #[test]
    fn test_outer_blobs_drop_nested() {
        let blobs = outer_blobs(&canvas());
        let boxes: Vec<Rect> = blobs.iter().map(|b| b.bbox).collect();
        assert!(boxes.contains(&Rect::new(10, 10, 30, 12)));
        assert!(boxes.contains(&Rect::new(20, 40, 40, 30)));
        assert!(boxes.contains(&Rect::new(80, 50, 6, 6)));
        // the mark inside the frame is not an outer blob
        assert!(!boxes.contains(&Rect::new(30, 50, 20, 10)));
        assert_eq!(boxes.len(), 3);
    }

    #[test]
    fn test_blob_area_includes_holes() {
        let blobs = outer_blobs(&canvas());
        let area = |r: Rect| blobs.iter().find(|b| b.bbox == r).map(|b| b.area);
        assert_eq!(area(Rect::new(10, 10, 30, 12)), Some(360));
        assert_eq!(area(Rect::new(80, 50, 6, 6)), Some(36));
        // a one-pixel frame encloses its whole box
        assert_eq!(area(Rect::new(20, 40, 40, 30)), Some(1200));

        // an open "C" encloses only its own pixels
        let mut c = GrayImage::from_pixel(20, 20, Luma([0]));
        for i in 2..12 {
            c.put_pixel(2, i, Luma([255]));
            c.put_pixel(i, 2, Luma([255]));
            c.put_pixel(i, 11, Luma([255]));
        }
        let blobs = outer_blobs(&c);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].area, 28);
    }

    #[test]
    fn test_text_regions_filter_small_and_sort() {
        let regions = text_regions(&canvas());
        // the 6x6 speck falls under the area floor
        assert!(regions.iter().all(|r| r.w * r.h > 36));
        assert!(regions.windows(2).all(|p| (p[0].t, p[0].l) <= (p[1].t, p[1].l)));
        assert!(!regions.is_empty());
    }

    #[test]
    fn test_region_score_range() {
        let img = canvas();
        let flat = region_score(&img, Rect::new(12, 12, 10, 5), "x");
        assert_eq!(flat, 0.0);
        let mixed = region_score(&img, Rect::new(20, 40, 40, 30), "x");
        assert!(mixed > 0.0 && mixed <= 1.0);
    }
}
