//! Page task and page result models.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One unit of work: a single page of a single document.
///
/// Tasks are plain data so they can be handed to a worker process as a JSON
/// line. Every task carries everything a worker needs to process it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTask {
    /// Source document (PDF file or page image directory).
    pub document: PathBuf,
    /// Zero-based page index.
    pub page_index: u32,
    pub dpi: u32,
    pub output_dir: PathBuf,
    /// Run text recognition after preprocessing.
    pub recognition: bool,
    /// Per-task time limit, enforced by the executor running the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl PageTask {
    /// One-based page number used in artifact names and reports.
    pub fn page_number(&self) -> u32 {
        self.page_index + 1
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Dimensions of the rasterized page before preprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

/// Axis-aligned bounding box of a recognized text fragment, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRegion {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// A (region, text, confidence) triple produced by a recognizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedText {
    pub region: TextRegion,
    pub text: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Text recognized on one page.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub texts: Vec<RecognizedText>,
    /// Mean confidence over `texts`; `0.0` when nothing was recognized.
    pub average_confidence: f64,
}

impl Recognition {
    pub fn new(texts: Vec<RecognizedText>) -> Self {
        let average_confidence = if texts.is_empty() {
            0.0
        } else {
            texts.iter().map(|t| t.confidence).sum::<f64>() / texts.len() as f64
        };
        Self {
            texts,
            average_confidence,
        }
    }

    /// All recognized fragments joined with single spaces, in recognizer order.
    pub fn joined_text(&self) -> String {
        self.texts
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Files written for a successfully processed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub image_path: PathBuf,
    pub json_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageOutput {
    pub image_shape: ImageShape,
    /// `None` when recognition was disabled for the run.
    pub recognition: Option<Recognition>,
    pub artifacts: ArtifactPaths,
}

/// Which stage of page processing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Rasterize,
    PageAccess,
    InvalidImage,
    Recognition,
    ArtifactWrite,
    Timeout,
    WorkerLost,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Rasterize => "rasterize",
            FailureKind::PageAccess => "page access",
            FailureKind::InvalidImage => "invalid image",
            FailureKind::Recognition => "recognition",
            FailureKind::ArtifactWrite => "artifact write",
            FailureKind::Timeout => "timeout",
            FailureKind::WorkerLost => "worker lost",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageFailure {
    pub kind: FailureKind,
    /// Human-readable description; never empty.
    pub message: String,
}

impl PageFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            format!("{} failed", kind)
        } else {
            message
        };
        Self { kind, message }
    }
}

impl fmt::Display for PageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Succeeded(PageOutput),
    Failed(PageFailure),
}

/// Outcome of processing one page.
///
/// On disk this is a flat record with a `success` flag; the conversion
/// rejects records whose flag disagrees with the fields present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "PageRecord", try_from = "PageRecord")]
pub struct PageResult {
    pub page_number: u32,
    /// Seconds spent on this page, including artifact writes.
    pub processing_time: f64,
    pub outcome: PageOutcome,
}

impl PageResult {
    pub fn succeeded(page_number: u32, processing_time: f64, output: PageOutput) -> Self {
        Self {
            page_number,
            processing_time,
            outcome: PageOutcome::Succeeded(output),
        }
    }

    pub fn failed(page_number: u32, processing_time: f64, failure: PageFailure) -> Self {
        Self {
            page_number,
            processing_time,
            outcome: PageOutcome::Failed(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PageOutcome::Succeeded(_))
    }

    pub fn output(&self) -> Option<&PageOutput> {
        match &self.outcome {
            PageOutcome::Succeeded(output) => Some(output),
            PageOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&PageFailure> {
        match &self.outcome {
            PageOutcome::Succeeded(_) => None,
            PageOutcome::Failed(failure) => Some(failure),
        }
    }

    pub fn recognition(&self) -> Option<&Recognition> {
        self.output().and_then(|o| o.recognition.as_ref())
    }
}

#[derive(Serialize, Deserialize)]
struct PageRecord {
    page_number: u32,
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image_shape: Option<ImageShape>,
    processing_time: f64,
    #[serde(default)]
    has_ocr: bool,
    #[serde(default)]
    ocr_text_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ocr_results: Option<Vec<RecognizedText>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    avg_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    json_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_kind: Option<FailureKind>,
}

impl From<PageResult> for PageRecord {
    fn from(result: PageResult) -> Self {
        let mut record = PageRecord {
            page_number: result.page_number,
            success: false,
            image_shape: None,
            processing_time: result.processing_time,
            has_ocr: false,
            ocr_text_count: 0,
            ocr_results: None,
            avg_confidence: None,
            image_path: None,
            json_path: None,
            error: None,
            error_kind: None,
        };

        match result.outcome {
            PageOutcome::Succeeded(output) => {
                record.success = true;
                record.image_shape = Some(output.image_shape);
                record.image_path = Some(output.artifacts.image_path);
                record.json_path = Some(output.artifacts.json_path);
                if let Some(recognition) = output.recognition {
                    record.has_ocr = true;
                    record.ocr_text_count = recognition.texts.len();
                    record.avg_confidence = Some(recognition.average_confidence);
                    record.ocr_results = Some(recognition.texts);
                }
            }
            PageOutcome::Failed(failure) => {
                record.error = Some(failure.message);
                record.error_kind = Some(failure.kind);
            }
        }

        record
    }
}

impl TryFrom<PageRecord> for PageResult {
    type Error = String;

    fn try_from(record: PageRecord) -> Result<Self, Self::Error> {
        let page = record.page_number;

        if !record.success {
            let message = record
                .error
                .filter(|e| !e.trim().is_empty())
                .ok_or_else(|| format!("failed record for page {} has no error", page))?;
            let kind = record.error_kind.unwrap_or(FailureKind::Rasterize);
            return Ok(PageResult::failed(
                page,
                record.processing_time,
                PageFailure::new(kind, message),
            ));
        }

        if record.error.is_some() {
            return Err(format!("successful record for page {} carries an error", page));
        }

        let missing = |field: &str| format!("successful record for page {} has no {}", page, field);
        let image_shape = record.image_shape.ok_or_else(|| missing("image_shape"))?;
        let image_path = record.image_path.ok_or_else(|| missing("image_path"))?;
        let json_path = record.json_path.ok_or_else(|| missing("json_path"))?;

        let recognition = if record.has_ocr {
            let texts = record.ocr_results.unwrap_or_default();
            let mut recognition = Recognition::new(texts);
            if let Some(avg) = record.avg_confidence {
                recognition.average_confidence = avg;
            }
            Some(recognition)
        } else {
            None
        };

        Ok(PageResult::succeeded(
            page,
            record.processing_time,
            PageOutput {
                image_shape,
                recognition,
                artifacts: ArtifactPaths {
                    image_path,
                    json_path,
                },
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str, confidence: f64) -> RecognizedText {
        RecognizedText {
            region: TextRegion {
                left: 0,
                top: 0,
                width: 10,
                height: 10,
            },
            text: s.to_string(),
            confidence,
        }
    }

    fn success(page: u32, recognition: Option<Recognition>) -> PageResult {
        PageResult::succeeded(
            page,
            0.25,
            PageOutput {
                image_shape: ImageShape {
                    width: 100,
                    height: 200,
                    channels: 3,
                },
                recognition,
                artifacts: ArtifactPaths {
                    image_path: PathBuf::from(format!("out/page_{:04}.png", page)),
                    json_path: PathBuf::from(format!("out/page_{:04}.json", page)),
                },
            },
        )
    }

    #[test]
    fn test_page_number_is_one_based() {
        let task = PageTask {
            document: PathBuf::from("doc.pdf"),
            page_index: 0,
            dpi: 200,
            output_dir: PathBuf::from("out"),
            recognition: false,
            timeout_secs: None,
        };
        assert_eq!(task.page_number(), 1);
        assert!(task.timeout().is_none());
    }

    #[test]
    fn test_empty_recognition_has_zero_confidence() {
        let recognition = Recognition::new(Vec::new());
        assert_eq!(recognition.average_confidence, 0.0);
        assert_eq!(recognition.joined_text(), "");
    }

    #[test]
    fn test_recognition_average() {
        let recognition = Recognition::new(vec![text("a", 0.5), text("b", 1.0)]);
        assert!((recognition.average_confidence - 0.75).abs() < 1e-12);
        assert_eq!(recognition.joined_text(), "a b");
    }

    #[test]
    fn test_success_record_fields() {
        let result = success(3, Some(Recognition::new(vec![text("x", 0.9)])));
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["page_number"], 3);
        assert_eq!(value["success"], true);
        assert_eq!(value["has_ocr"], true);
        assert_eq!(value["ocr_text_count"], 1);
        assert_eq!(value["image_shape"]["width"], 100);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_failure_record_fields() {
        let result = PageResult::failed(
            2,
            0.1,
            PageFailure::new(FailureKind::PageAccess, "page index 1 out of range"),
        );
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["success"], false);
        assert_eq!(value["error_kind"], "page_access");
        assert_eq!(value["error"], "page index 1 out of range");
        assert!(value.get("image_path").is_none());
    }

    #[test]
    fn test_record_without_ocr_loads_without_recognition() {
        let result = success(1, None);
        let json = serde_json::to_string(&result).unwrap();
        let loaded: PageResult = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, result);
        assert!(loaded.recognition().is_none());
    }

    #[test]
    fn test_inconsistent_records_are_rejected() {
        let no_error = r#"{"page_number": 1, "success": false, "processing_time": 0.0}"#;
        assert!(serde_json::from_str::<PageResult>(no_error).is_err());

        let with_error = r#"{"page_number": 1, "success": true, "processing_time": 0.0,
            "image_shape": {"width": 1, "height": 1, "channels": 1},
            "image_path": "a.png", "json_path": "a.json", "error": "boom"}"#;
        assert!(serde_json::from_str::<PageResult>(with_error).is_err());

        let no_shape = r#"{"page_number": 1, "success": true, "processing_time": 0.0,
            "image_path": "a.png", "json_path": "a.json"}"#;
        assert!(serde_json::from_str::<PageResult>(no_shape).is_err());
    }

    #[test]
    fn test_failure_message_never_empty() {
        let failure = PageFailure::new(FailureKind::Timeout, "  ");
        assert_eq!(failure.message, "timeout failed");
    }
}
