//! Recognizer abstraction and configuration.

use std::fmt;

use image::GrayImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::tesseract::TesseractRecognizer;
use crate::models::RecognizedText;

/// Errors from text recognizers.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("Backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageError(String),
}

/// Available recognizer backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognizerBackend {
    /// Tesseract OCR via command-line.
    #[default]
    Tesseract,
}

impl fmt::Display for RecognizerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognizerBackend::Tesseract => f.write_str("tesseract"),
        }
    }
}

/// Recognizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub backend: RecognizerBackend,
    /// Language code(s) passed to the engine, e.g. `kor+eng`.
    pub language: String,
    /// Engine binary name or path.
    pub binary: String,
    /// Tesseract `--psm` value; engine default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_segmentation_mode: Option<u32>,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            backend: RecognizerBackend::Tesseract,
            language: "kor+eng".to_string(),
            binary: "tesseract".to_string(),
            page_segmentation_mode: None,
        }
    }
}

/// A text recognition engine.
///
/// Instances are created once per worker and reused for every page that
/// worker handles, so engines may keep expensive state between calls.
pub trait TextRecognizer: Send {
    fn backend_type(&self) -> RecognizerBackend;

    fn is_available(&self) -> bool;

    /// Installation hint shown when the backend is unavailable.
    fn availability_hint(&self) -> String;

    fn recognize(&mut self, image: &GrayImage) -> Result<Vec<RecognizedText>, RecognitionError>;
}

/// Construct the configured recognizer, failing if its engine is missing.
pub fn create_recognizer(
    config: &RecognizerConfig,
) -> Result<Box<dyn TextRecognizer>, RecognitionError> {
    match config.backend {
        RecognizerBackend::Tesseract => {
            let recognizer = TesseractRecognizer::new(config.clone())?;
            if !recognizer.is_available() {
                return Err(RecognitionError::BackendNotAvailable(
                    recognizer.availability_hint(),
                ));
            }
            Ok(Box::new(recognizer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_engine_is_unavailable() {
        let config = RecognizerConfig {
            binary: "tallyscan-missing-tesseract".to_string(),
            ..RecognizerConfig::default()
        };
        assert!(matches!(
            create_recognizer(&config),
            Err(RecognitionError::BackendNotAvailable(_))
        ));
    }

    #[test]
    fn test_backend_names() {
        assert_eq!(RecognizerBackend::Tesseract.to_string(), "tesseract");
        assert_eq!(
            serde_json::to_string(&RecognizerBackend::Tesseract).unwrap(),
            "\"tesseract\""
        );
    }
}
