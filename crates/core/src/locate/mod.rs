pub mod gray;
pub mod template;
pub mod ocr;
pub mod contours;

use std::path::Path;

use image::{DynamicImage, Rgba, RgbaImage};

use crate::error::StepError;
use crate::logger;
use crate::platform::Desktop;
use crate::telemetry::Telemetry;
use crate::types::*;
use ocr::{OcrEngine, TesseractCli};

const MATCH_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
const REGION_COLOR: Rgba<u8> = Rgba([255, 160, 0, 255]);

/// Finds things on the live screen: reference images by template matching,
/// text by OCR or, without an OCR engine, by the contour heuristic.
///
/// Returned points are screen coordinates.
pub struct Locator {
    ocr: Option<Box<dyn OcrEngine>>,
}

impl Locator {
    pub fn new(ocr: Option<Box<dyn OcrEngine>>) -> Self {
        logger::register_prefix("locate", logger::COLOR_GREEN);
        Self { ocr }
    }

    /// Use tesseract when it is installed.
    pub fn detect() -> Self {
        Self::new(TesseractCli::detect().map(|t| Box::new(t) as Box<dyn OcrEngine>))
    }

    pub fn ocr_name(&self) -> Option<&str> {
        self.ocr.as_deref().map(|o| o.name())
    }

    /// Centre of the best match of the image at `path`, if its score reaches
    /// `confidence`. A missing or undecodable file is `TargetNotFound`.
    pub fn find_image(
        &self,
        desktop: &mut dyn Desktop,
        telemetry: &Telemetry,
        path: &Path,
        confidence: f64,
    ) -> Result<Option<Point>, StepError> {
        let target = path.display().to_string();
        if !path.is_file() {
            return Err(StepError::not_found(target, "image file does not exist"));
        }
        let reference = image::open(path)
            .map_err(|e| StepError::not_found(&target, format!("not a valid image ({})", e)))?
            .to_rgba8();

        let screen = desktop
            .capture_screen()
            .map_err(|e| StepError::not_found(&target, format!("screen capture failed ({:#})", e)))?;
        let screen_gray = gray::capture_to_gray(&screen);
        let template_gray = gray::rgba_to_gray(&reference);

        let screen_rgba = screen.to_rgba();
        if let Some(rgba) = &screen_rgba {
            telemetry.save_artifact("current_screen.png", rgba.clone());
        }
        telemetry.save_artifact("template.png", reference);

        let Some(best) = template::match_template(&screen_gray, &template_gray) else {
            telemetry.debug(&format!(
                "Template {}x{} does not fit in screen {}x{}",
                template_gray.width(),
                template_gray.height(),
                screen.width,
                screen.height
            ));
            return Ok(None);
        };
        telemetry.debug(&format!("Best match confidence: {:.4}", best.score));

        if best.score < confidence {
            logger::info_p(
                "locate",
                &format!("{}: best {:.4} below threshold {:.2}", target, best.score, confidence),
            );
            return Ok(None);
        }

        let local = best.bbox().center();
        if let Some(mut canvas) = screen_rgba.filter(|_| telemetry.enabled()) {
            draw_box(&mut canvas, best.bbox(), MATCH_COLOR, 2);
            draw_dot(&mut canvas, local, 5, MATCH_COLOR);
            telemetry.save_artifact("match_result.png", canvas);
        }

        let found = Point::new(local.x + screen.origin.x, local.y + screen.origin.y);
        telemetry.debug(&format!("Found {} at ({}, {})", target, found.x, found.y));
        Ok(Some(found))
    }

    /// Centre of the first on-screen occurrence of `text`, searched within
    /// `region` (screen coordinates) or the whole screen.
    pub fn find_text(
        &self,
        desktop: &mut dyn Desktop,
        telemetry: &Telemetry,
        text: &str,
        region: Option<Rect>,
        confidence: f64,
    ) -> Result<Option<Point>, StepError> {
        let target = format!("text \"{}\"", text);
        if text.trim().is_empty() {
            return Err(StepError::InvalidParameter {
                name: "text".to_string(),
                reason: "nothing to search for".to_string(),
            });
        }

        let screen = desktop
            .capture_screen()
            .map_err(|e| StepError::not_found(&target, format!("screen capture failed ({:#})", e)))?;
        let area = match region {
            Some(r) => match screen.crop(r) {
                Some(c) => c,
                None => {
                    telemetry.debug(&format!("Search region {:?} is off screen", r));
                    return Ok(None);
                }
            },
            None => screen,
        };
        let gray_area = gray::capture_to_gray(&area);

        if let Some(engine) = &self.ocr {
            let binary = gray::otsu_binarize(&gray_area);
            telemetry.save_artifact("ocr_screen.png", binary.clone());
            match engine.recognize(&binary) {
                Ok(words) => match ocr::find_word(&words, text, confidence) {
                    Some(word) => {
                        telemetry.debug(&format!("{} read \"{}\" at {:.2}", engine.name(), word.text, word.confidence));
                        if telemetry.enabled() {
                            let mut canvas = DynamicImage::ImageLuma8(gray_area).to_rgba8();
                            draw_box(&mut canvas, word.bbox, MATCH_COLOR, 2);
                            telemetry.save_artifact("tesseract_match.png", canvas);
                        }
                        return Ok(Some(offset(word.bbox.center(), area.origin)));
                    }
                    None => telemetry.debug(&format!(
                        "{} not found by {} ({} words), trying contours",
                        target,
                        engine.name(),
                        words.len()
                    )),
                },
                Err(e) => {
                    telemetry.warn(&format!("{} failed, using contour fallback: {:#}", engine.name(), e));
                }
            }
        }

        let (regions, hit) = contours::find_text_region(&gray_area, text, confidence);
        logger::info_p("locate", &format!("{} candidate text regions", regions.len()));
        if telemetry.enabled() {
            let mut canvas = DynamicImage::ImageLuma8(gray_area).to_rgba8();
            for r in &regions {
                draw_box(&mut canvas, *r, REGION_COLOR, 1);
            }
            if let Some((r, _)) = hit {
                draw_box(&mut canvas, r, MATCH_COLOR, 2);
            }
            telemetry.save_artifact("opencv_regions.png", canvas);
        }

        Ok(hit.map(|(r, score)| {
            telemetry.debug(&format!("Contour fallback picked region {:?} (score {:.4})", r, score));
            offset(r.center(), area.origin)
        }))
    }
}

fn offset(p: Point, origin: Point) -> Point {
    Point::new(p.x + origin.x, p.y + origin.y)
}

/// Outline `rect` with a border `thickness` pixels wide, clipped to the image.
pub fn draw_box(image: &mut RgbaImage, rect: Rect, color: Rgba<u8>, thickness: u32) {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let (l, t) = (rect.l as i64, rect.t as i64);
    let (r, b) = (l + rect.w as i64 - 1, t + rect.h as i64 - 1);
    let th = thickness as i64;
    for y in t.max(0)..=b.min(h - 1) {
        for x in l.max(0)..=r.min(w - 1) {
            let edge = x - l < th || r - x < th || y - t < th || b - y < th;
            if edge {
                image.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

/// Filled disc of `radius` around `center`.
pub fn draw_dot(image: &mut RgbaImage, center: Point, radius: i32, color: Rgba<u8>) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let (x, y) = (center.x + dx, center.y + dy);
            if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
                image.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}
