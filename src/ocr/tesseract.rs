//! Tesseract OCR backend implementation.
//!
//! Runs `tesseract <image> stdout -l <lang> tsv` and turns the word rows of
//! the TSV report into recognized text fragments.

use std::path::{Path, PathBuf};
use std::process::Command;

use image::{GrayImage, ImageFormat};
use tempfile::TempDir;

use super::backend::{RecognitionError, RecognizerBackend, RecognizerConfig, TextRecognizer};
use crate::models::{RecognizedText, TextRegion};
use crate::utils::check_binary;

/// TSV level of word rows.
const WORD_LEVEL: &str = "5";

/// Tesseract OCR backend.
pub struct TesseractRecognizer {
    config: RecognizerConfig,
    /// Scratch directory for page images, kept for the recognizer's lifetime.
    scratch: TempDir,
}

impl TesseractRecognizer {
    pub fn new(config: RecognizerConfig) -> Result<Self, RecognitionError> {
        Ok(Self {
            config,
            scratch: TempDir::new()?,
        })
    }

    fn input_path(&self) -> PathBuf {
        self.scratch.path().join("page.png")
    }

    fn run_tesseract(&self, image_path: &Path) -> Result<String, RecognitionError> {
        let mut command = Command::new(&self.config.binary);
        command
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.config.language]);
        if let Some(psm) = self.config.page_segmentation_mode {
            command.args(["--psm", &psm.to_string()]);
        }
        command.arg("tsv");

        match command.output() {
            Ok(output) => {
                if output.status.success() {
                    Ok(String::from_utf8_lossy(&output.stdout).to_string())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(RecognitionError::OcrFailed(format!(
                        "tesseract failed: {}",
                        stderr.trim()
                    )))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RecognitionError::BackendNotAvailable(
                    "tesseract not found (install tesseract-ocr)".to_string(),
                ))
            }
            Err(e) => Err(RecognitionError::Io(e)),
        }
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn backend_type(&self) -> RecognizerBackend {
        RecognizerBackend::Tesseract
    }

    fn is_available(&self) -> bool {
        check_binary(&self.config.binary)
    }

    fn availability_hint(&self) -> String {
        if !check_binary(&self.config.binary) {
            "Tesseract not installed. Install with: apt install tesseract-ocr".to_string()
        } else {
            "Tesseract is available".to_string()
        }
    }

    fn recognize(&mut self, image: &GrayImage) -> Result<Vec<RecognizedText>, RecognitionError> {
        let input = self.input_path();
        image
            .save_with_format(&input, ImageFormat::Png)
            .map_err(|e| RecognitionError::ImageError(e.to_string()))?;

        let tsv = self.run_tesseract(&input)?;
        parse_tsv(&tsv)
    }
}

/// Parse Tesseract's TSV report into word fragments.
///
/// Rows that are not words, carry a negative confidence, or have blank text
/// are skipped. Confidence is rescaled from 0-100 to 0-1.
fn parse_tsv(tsv: &str) -> Result<Vec<RecognizedText>, RecognitionError> {
    let mut lines = tsv.lines();
    let header = lines
        .next()
        .ok_or_else(|| RecognitionError::OcrFailed("empty TSV output".to_string()))?;
    let columns: Vec<&str> = header.split('\t').collect();

    let index_of = |name: &str| {
        columns
            .iter()
            .position(|c| *c == name)
            .ok_or_else(|| RecognitionError::OcrFailed(format!("TSV missing column {}", name)))
    };
    let level = index_of("level")?;
    let left = index_of("left")?;
    let top = index_of("top")?;
    let width = index_of("width")?;
    let height = index_of("height")?;
    let conf = index_of("conf")?;
    let text = index_of("text")?;

    let mut texts = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.get(level).copied() != Some(WORD_LEVEL) {
            continue;
        }

        let word = fields.get(text).map(|t| t.trim()).unwrap_or("");
        let confidence: f64 = match fields.get(conf).and_then(|c| c.trim().parse().ok()) {
            Some(c) if c >= 0.0 => c,
            _ => continue,
        };
        if word.is_empty() {
            continue;
        }

        let number = |idx: usize| {
            fields
                .get(idx)
                .and_then(|v| v.trim().parse::<u32>().ok())
                .unwrap_or(0)
        };

        texts.push(RecognizedText {
            region: TextRegion {
                left: number(left),
                top: number(top),
                width: number(width),
                height: number(height),
            },
            text: word.to_string(),
            confidence: (confidence / 100.0).clamp(0.0, 1.0),
        });
    }

    Ok(texts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t
4\t1\t1\t1\t1\t0\t10\t20\t300\t30\t-1\t
5\t1\t1\t1\t1\t1\t10\t20\t80\t30\t96.5\t홍길동
5\t1\t1\t1\t1\t2\t100\t20\t60\t30\t41\t1,234
5\t1\t1\t1\t1\t3\t170\t20\t10\t30\t-1\t
5\t1\t1\t1\t1\t4\t190\t20\t10\t30\t88\t
";

    #[test]
    fn test_parse_tsv_words() {
        let texts = parse_tsv(SAMPLE).unwrap();
        assert_eq!(texts.len(), 2);

        assert_eq!(texts[0].text, "홍길동");
        assert!((texts[0].confidence - 0.965).abs() < 1e-9);
        assert_eq!(
            texts[0].region,
            TextRegion {
                left: 10,
                top: 20,
                width: 80,
                height: 30
            }
        );
        assert_eq!(texts[1].text, "1,234");
        assert!((texts[1].confidence - 0.41).abs() < 1e-9);
    }

    #[test]
    fn test_parse_tsv_header_only() {
        let header = SAMPLE.lines().next().unwrap();
        assert!(parse_tsv(header).unwrap().is_empty());
    }

    #[test]
    fn test_parse_tsv_rejects_garbage() {
        assert!(parse_tsv("").is_err());
        assert!(parse_tsv("not\ta\ttsv\n").is_err());
    }

    #[test]
    fn test_recognize_blank_page() {
        let config = RecognizerConfig {
            language: "eng".to_string(),
            ..RecognizerConfig::default()
        };
        let mut recognizer = TesseractRecognizer::new(config).unwrap();
        if !recognizer.is_available() {
            eprintln!("skipping: tesseract not installed");
            return;
        }

        let blank = GrayImage::from_pixel(200, 100, image::Luma([255]));
        let texts = recognizer.recognize(&blank).unwrap();
        assert!(texts.iter().all(|t| (0.0..=1.0).contains(&t.confidence)));
    }
}
