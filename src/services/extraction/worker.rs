//! Page worker: rasterize, preprocess, recognize and persist one page.
//!
//! A worker never fails outward. Every error becomes a failed
//! [`PageResult`] for the page at hand, and the worker stays usable for the
//! next task.

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use thiserror::Error;

use super::types::WorkerSettings;
use crate::models::{
    ArtifactPaths, FailureKind, ImageShape, PageFailure, PageOutput, PageResult, PageTask,
    Recognition,
};
use crate::ocr::{create_recognizer, RecognitionError, TextRecognizer};
use crate::preprocess::{PreprocessError, Preprocessor};
use crate::raster::{self, RasterConfig, RasterError};
use crate::storage::{self, ArtifactError};

/// Anything that can go wrong while processing a single page.
#[derive(Debug, Error)]
pub enum PageError {
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("page was abandoned before its artifacts were written")]
    Cancelled,
}

impl PageError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PageError::Raster(RasterError::PageAccess { .. }) => FailureKind::PageAccess,
            PageError::Raster(_) => FailureKind::Rasterize,
            PageError::Preprocess(_) => FailureKind::InvalidImage,
            PageError::Recognition(_) => FailureKind::Recognition,
            PageError::Artifact(_) => FailureKind::ArtifactWrite,
            PageError::Cancelled => FailureKind::Timeout,
        }
    }

    pub fn into_failure(self) -> PageFailure {
        PageFailure::new(self.kind(), self.to_string())
    }
}

/// Stops an abandoned page from writing artifacts.
///
/// Writes happen while the lock is held, so once [`Cancellation::cancel`]
/// returns the page has persisted everything it ever will.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<Mutex<bool>>);

impl Cancellation {
    pub fn cancel(&self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `write` unless the page has been cancelled.
    fn persist<T>(
        &self,
        write: impl FnOnce() -> Result<T, ArtifactError>,
    ) -> Result<T, PageError> {
        let cancelled = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if *cancelled {
            return Err(PageError::Cancelled);
        }
        Ok(write()?)
    }
}

enum RecognizerSlot {
    Disabled,
    Ready(Box<dyn TextRecognizer>),
    Unavailable(String),
}

/// Processes page tasks one at a time.
pub struct PageWorker {
    raster: RasterConfig,
    preprocessor: Preprocessor,
    recognizer: RecognizerSlot,
}

impl PageWorker {
    /// Initialize a worker. The recognizer is constructed here, once.
    ///
    /// A recognizer that cannot be constructed does not stop the worker:
    /// pages that ask for recognition fail with a recognition error instead.
    pub fn new(settings: &WorkerSettings) -> Self {
        let recognizer = match &settings.recognizer {
            None => RecognizerSlot::Disabled,
            Some(config) => match create_recognizer(config) {
                Ok(recognizer) => RecognizerSlot::Ready(recognizer),
                Err(e) => {
                    tracing::warn!("Recognizer unavailable: {}", e);
                    RecognizerSlot::Unavailable(e.to_string())
                }
            },
        };

        Self {
            raster: settings.raster.clone(),
            preprocessor: Preprocessor::new(settings.preprocess.clone()),
            recognizer,
        }
    }

    /// Initialize a worker around an already constructed recognizer.
    pub fn with_recognizer(settings: &WorkerSettings, recognizer: Box<dyn TextRecognizer>) -> Self {
        Self {
            raster: settings.raster.clone(),
            preprocessor: Preprocessor::new(settings.preprocess.clone()),
            recognizer: RecognizerSlot::Ready(recognizer),
        }
    }

    /// Process one page and persist its artifacts.
    ///
    /// On success `page_NNNN.png` and `page_NNNN.json` are written. On failure
    /// the failure record is still written to `page_NNNN.json` when possible.
    pub fn process(&mut self, task: &PageTask) -> PageResult {
        self.process_with(task, &Cancellation::default())
    }

    /// Like [`PageWorker::process`], but writes nothing once `cancel` is set.
    pub fn process_with(&mut self, task: &PageTask, cancel: &Cancellation) -> PageResult {
        let start = Instant::now();
        let page_number = task.page_number();
        let json_path = storage::page_record_path(&task.output_dir, page_number);

        let outcome = self.run_stages(task, cancel).and_then(|output| {
            let result =
                PageResult::succeeded(page_number, start.elapsed().as_secs_f64(), output);
            cancel.persist(|| storage::write_json(&json_path, &result))?;
            Ok(result)
        });

        match outcome {
            Ok(result) => {
                tracing::debug!(
                    "Page {} processed in {:.2}s",
                    page_number,
                    result.processing_time
                );
                result
            }
            Err(e) => {
                tracing::debug!("Page {} failed: {}", page_number, e);
                let result = PageResult::failed(
                    page_number,
                    start.elapsed().as_secs_f64(),
                    e.into_failure(),
                );
                match cancel.persist(|| storage::write_json(&json_path, &result)) {
                    Ok(()) | Err(PageError::Cancelled) => {}
                    Err(write_err) => tracing::warn!(
                        "Could not record failure of page {}: {}",
                        page_number,
                        write_err
                    ),
                }
                result
            }
        }
    }

    fn run_stages(
        &mut self,
        task: &PageTask,
        cancel: &Cancellation,
    ) -> Result<PageOutput, PageError> {
        let page_number = task.page_number();

        let document = raster::open_document(&task.document, &self.raster)?;
        let raw = document.render(task.page_index, task.dpi)?;
        drop(document);

        let image_shape = ImageShape {
            width: raw.width(),
            height: raw.height(),
            channels: raw.color().channel_count(),
        };

        let processed = self.preprocessor.process(&raw)?;
        drop(raw);

        let image_path = storage::page_image_path(&task.output_dir, page_number);
        cancel.persist(|| storage::save_page_image(&image_path, &processed))?;

        let recognition = if task.recognition {
            Some(self.recognize(&processed)?)
        } else {
            None
        };

        Ok(PageOutput {
            image_shape,
            recognition,
            artifacts: ArtifactPaths {
                image_path,
                json_path: storage::page_record_path(&task.output_dir, page_number),
            },
        })
    }

    fn recognize(&mut self, image: &image::GrayImage) -> Result<Recognition, RecognitionError> {
        match &mut self.recognizer {
            RecognizerSlot::Ready(recognizer) => Ok(Recognition::new(recognizer.recognize(image)?)),
            RecognizerSlot::Unavailable(reason) => {
                Err(RecognitionError::BackendNotAvailable(reason.clone()))
            }
            RecognizerSlot::Disabled => Err(RecognitionError::BackendNotAvailable(
                "worker was started without a recognizer".to_string(),
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkerProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid worker message: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("worker input ended before settings were received")]
    MissingSettings,
}

/// Worker-process main loop.
///
/// The first input line carries the [`WorkerSettings`]; every following
/// line is a [`PageTask`]. Each task is answered with exactly one
/// [`PageResult`] line, flushed immediately. Returns the number of tasks
/// handled once the input closes.
pub fn serve<R: BufRead, W: Write>(input: R, mut output: W) -> Result<usize, WorkerProtocolError> {
    let mut lines = input.lines();

    let settings_line = lines.next().ok_or(WorkerProtocolError::MissingSettings)??;
    let settings: WorkerSettings = serde_json::from_str(&settings_line)?;
    let mut worker = PageWorker::new(&settings);
    tracing::debug!("Worker {} ready", std::process::id());

    let mut handled = 0;
    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let task: PageTask = serde_json::from_str(&line)?;
        let result = worker.process(&task);

        serde_json::to_writer(&mut output, &result)?;
        output.write_all(b"\n")?;
        output.flush()?;
        handled += 1;
    }

    Ok(handled)
}
