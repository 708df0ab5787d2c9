//! Extraction service types and events.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::ocr::RecognizerConfig;
use crate::preprocess::PreprocessOptions;
use crate::raster::RasterConfig;

/// Events emitted during an extraction run.
#[derive(Debug, Clone)]
pub enum ExtractionEvent {
    /// Document opened and tasks planned
    RunStarted {
        source: PathBuf,
        total_pages: u32,
        pages_to_process: usize,
        workers: usize,
    },
    /// Page finished successfully
    PageCompleted {
        page_number: u32,
        completed: usize,
        total: usize,
        processing_time: f64,
        text_count: Option<usize>,
    },
    /// Page failed and will not be retried
    PageFailed {
        page_number: u32,
        completed: usize,
        total: usize,
        error: String,
    },
    /// Page failed and was resubmitted
    PageRetrying {
        page_number: u32,
        attempt: u32,
        dpi: u32,
        error: String,
    },
    /// All pages accounted for
    RunCompleted {
        succeeded: usize,
        failed: usize,
        elapsed: Duration,
    },
}

/// Everything a worker needs to initialize itself.
///
/// Sent once to each worker process as its first input line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSettings {
    pub raster: RasterConfig,
    pub preprocess: PreprocessOptions,
    /// `None` when the run does not recognize text.
    pub recognizer: Option<RecognizerConfig>,
}

impl WorkerSettings {
    pub fn from_config(config: &Config, recognition: bool) -> Self {
        Self {
            raster: config.raster.clone(),
            preprocess: config.preprocess.clone(),
            recognizer: recognition.then(|| config.recognizer.clone()),
        }
    }
}

/// Parameters of one extraction run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub document: PathBuf,
    pub output_dir: PathBuf,
    /// First page to process, 1-based and inclusive.
    pub first_page: Option<u32>,
    /// Last page to process, 1-based and inclusive.
    pub last_page: Option<u32>,
    /// Worker count; defaults to one less than the available cores.
    pub workers: Option<usize>,
    pub dpi: u32,
    pub recognition: bool,
    pub timeout_secs: Option<u64>,
}

impl RunRequest {
    /// Request covering the whole document with the configured pipeline settings.
    pub fn from_config(config: &Config, document: impl Into<PathBuf>) -> Self {
        Self {
            document: document.into(),
            output_dir: config.pipeline.output_dir.clone(),
            first_page: None,
            last_page: None,
            workers: config.pipeline.workers,
            dpi: config.pipeline.dpi,
            recognition: config.pipeline.recognition,
            timeout_secs: config.pipeline.task_timeout_secs,
        }
    }
}
