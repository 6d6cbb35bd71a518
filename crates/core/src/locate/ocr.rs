use std::io::{Cursor, Write};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, anyhow};
use image::{GrayImage, ImageFormat};

use crate::types::Rect;

/// One recognised word and where it is, relative to the recognised image.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub bbox: Rect,
    /// 0..=1
    pub confidence: f64,
}

pub trait OcrEngine: Send {
    fn name(&self) -> &str;
    fn recognize(&self, image: &GrayImage) -> Result<Vec<OcrWord>>;
}

/// First word whose text contains `target` (case-insensitive) with a
/// confidence at or above `min_confidence`.
pub fn find_word<'a>(words: &'a [OcrWord], target: &str, min_confidence: f64) -> Option<&'a OcrWord> {
    let needle = target.to_lowercase();
    words
        .iter()
        .find(|w| w.text.to_lowercase().contains(&needle) && w.confidence >= min_confidence)
}

/// The `tesseract` command-line program, fed a PNG on stdin.
pub struct TesseractCli {
    program: String,
}

impl TesseractCli {
    /// Probe for `tesseract` on PATH.
    pub fn detect() -> Option<Self> {
        let ok = Command::new("tesseract")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        ok.then(|| Self { program: "tesseract".to_string() })
    }
}

impl OcrEngine for TesseractCli {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &GrayImage) -> Result<Vec<OcrWord>> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .context("failed to encode OCR input")?;

        let mut child = Command::new(&self.program)
            .args(["stdin", "stdout", "tsv"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start {}", self.program))?;

        let sent = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&png).context("failed to send image to tesseract"),
            None => Err(anyhow!("no stdin for {}", self.program)),
        };
        if let Err(e) = sent {
            child.kill().ok();
            child.wait().ok();
            return Err(e);
        }

        let out = child.wait_with_output().context("tesseract did not finish")?;
        if !out.status.success() {
            return Err(anyhow!("tesseract exited with {}", out.status));
        }
        Ok(parse_tsv(&String::from_utf8_lossy(&out.stdout)))
    }
}

/// Parse tesseract's TSV output into word boxes, skipping structural rows
/// (conf -1) and empty text.
pub fn parse_tsv(tsv: &str) -> Vec<OcrWord> {
    let mut lines = tsv.lines();
    let Some(header) = lines.next() else { return Vec::new() };
    let cols: Vec<&str> = header.split('\t').collect();
    let col = |name: &str| cols.iter().position(|c| c.trim() == name);
    let (Some(left), Some(top), Some(width), Some(height), Some(conf), Some(text)) = (
        col("left"),
        col("top"),
        col("width"),
        col("height"),
        col("conf"),
        col("text"),
    ) else {
        return Vec::new();
    };

    lines
        .filter_map(|line| {
            let f: Vec<&str> = line.split('\t').collect();
            let word = f.get(text)?.trim();
            let confidence: f64 = f.get(conf)?.trim().parse().ok()?;
            if word.is_empty() || confidence < 0.0 {
                return None;
            }
            Some(OcrWord {
                text: word.to_string(),
                bbox: Rect::new(
                    f.get(left)?.trim().parse().ok()?,
                    f.get(top)?.trim().parse().ok()?,
                    f.get(width)?.trim().parse().ok()?,
                    f.get(height)?.trim().parse().ok()?,
                ),
                confidence: confidence / 100.0,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
1\t1\t0\t0\t0\t0\t0\t0\t800\t600\t-1\t\n\
5\t1\t1\t1\t1\t1\t40\t12\t64\t18\t96.5\tSubmit\n\
5\t1\t1\t1\t1\t2\t120\t12\t50\t18\t41.0\tCancel\n";

    #[test]
    fn test_parse_tsv_skips_structure_rows() {
        let words = parse_tsv(SAMPLE);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "Submit");
        assert_eq!(words[0].bbox, Rect::new(40, 12, 64, 18));
        assert!((words[0].confidence - 0.965).abs() < 1e-9);
    }

    #[test]
    fn test_find_word_respects_confidence() {
        let words = parse_tsv(SAMPLE);
        assert_eq!(find_word(&words, "submit", 0.7).map(|w| w.bbox.center().x), Some(72));
        assert!(find_word(&words, "cancel", 0.7).is_none());
        assert!(find_word(&words, "cancel", 0.4).is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_exiting_early_is_an_error() {
        // Noise keeps the PNG larger than a pipe buffer, so the write can hit
        // a closed pipe as well as a failed exit status.
        let image = GrayImage::from_fn(512, 512, |x, y| {
            let h = (x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503)).wrapping_mul(2_246_822_519);
            image::Luma([(h >> 24) as u8])
        });
        let engine = TesseractCli { program: "false".to_string() };
        assert!(engine.recognize(&image).is_err());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_tsv("").is_empty());
        assert!(parse_tsv("no\theader\n1\t2").is_empty());
    }
}
