//! Parallel page extraction.
//!
//! Fans page tasks out over a fixed pool of workers, collects results as
//! they complete and restores page order in the final summary. Separated
//! from UI concerns: progress is reported through [`ExtractionEvent`]s.

mod executor;
mod retry;
mod types;
mod worker;

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use crate::config::Config;
use crate::models::{FailureKind, Isolation, PageFailure, PageResult, PageTask, RunSummary};
use crate::raster::{self, RasterConfig, RasterError};
use crate::storage::{self, SUMMARY_FILE};

pub use executor::{PageExecutor, ProcessExecutor, ThreadExecutor, WorkerProgram};
pub use retry::{EscalateDpi, NoRetry, RetryConfig, RetryPolicy};
pub use types::{ExtractionEvent, RunRequest, WorkerSettings};
pub use worker::{serve, Cancellation, PageError, PageWorker, WorkerProtocolError};

/// Errors that stop a run before any page is processed.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("cannot open document {path}: {source}")]
    DocumentOpen { path: PathBuf, source: RasterError },
    #[error("cannot create output directory {path}: {source}")]
    OutputDir { path: PathBuf, source: io::Error },
    #[error("failed to start worker pool: {0}")]
    WorkerSpawn(io::Error),
}

/// Default worker count: one less than the available cores, at least one.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .saturating_sub(1)
        .max(1)
}

/// Clamp a requested worker count to the number of tasks.
fn resolve_worker_count(requested: Option<usize>, task_count: usize) -> usize {
    requested
        .unwrap_or_else(default_worker_count)
        .max(1)
        .min(task_count.max(1))
}

/// Build one task per page in the 1-based inclusive range, clamped to the document.
fn plan_tasks(request: &RunRequest, total_pages: u32) -> Vec<PageTask> {
    let first = request.first_page.unwrap_or(1).max(1);
    let last = request.last_page.unwrap_or(total_pages).min(total_pages);

    (first..=last)
        .map(|page_number| PageTask {
            document: request.document.clone(),
            page_index: page_number - 1,
            dpi: request.dpi,
            output_dir: request.output_dir.clone(),
            recognition: request.recognition,
            timeout_secs: request.timeout_secs,
        })
        .collect()
}

/// SHA-256 of a source document; image sets hash their pages in order.
pub fn source_hash(path: &Path) -> io::Result<String> {
    if path.is_dir() {
        storage::compute_files_hash(&raster::page_image_files(path)?)
    } else {
        storage::compute_file_hash(path)
    }
}

/// Service that runs extraction over a worker pool.
pub struct ExtractionService {
    config: Config,
    isolation: Isolation,
    program: Option<WorkerProgram>,
    retry: Arc<dyn RetryPolicy>,
}

impl ExtractionService {
    /// Create a service using the configured isolation and retry policy.
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            isolation: config.pipeline.isolation,
            program: None,
            retry: config.retry.policy(),
        }
    }

    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// Command used to start worker processes. Defaults to this executable's
    /// `worker` subcommand.
    pub fn with_worker_program(mut self, program: WorkerProgram) -> Self {
        self.program = Some(program);
        self
    }

    pub fn with_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry = policy;
        self
    }

    fn raster_config(&self) -> &RasterConfig {
        &self.config.raster
    }

    async fn start_executor(
        &self,
        settings: &Arc<WorkerSettings>,
    ) -> Result<Box<dyn PageExecutor>, DispatchError> {
        match self.isolation {
            Isolation::Thread => Ok(Box::new(ThreadExecutor::new(settings.clone()))),
            Isolation::Process => {
                let program = match &self.program {
                    Some(program) => program.clone(),
                    None => WorkerProgram::current_exe().map_err(DispatchError::WorkerSpawn)?,
                };
                let executor = ProcessExecutor::spawn(program, settings.clone())
                    .await
                    .map_err(DispatchError::WorkerSpawn)?;
                Ok(Box::new(executor))
            }
        }
    }

    /// Process the requested pages and write `processing_summary.json`.
    ///
    /// Fails only if the document cannot be opened, the output directory
    /// cannot be created, or the worker pool cannot start. Page failures are
    /// recorded in the summary.
    pub async fn run(
        &self,
        request: RunRequest,
        event_tx: mpsc::Sender<ExtractionEvent>,
    ) -> Result<RunSummary, DispatchError> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let document = raster::open_document(&request.document, self.raster_config()).map_err(
            |source| DispatchError::DocumentOpen {
                path: request.document.clone(),
                source,
            },
        )?;
        let total_pages = document.page_count();
        drop(document);

        std::fs::create_dir_all(&request.output_dir).map_err(|source| {
            DispatchError::OutputDir {
                path: request.output_dir.clone(),
                source,
            }
        })?;

        let source_sha256 = source_hash(&request.document).unwrap_or_else(|e| {
            tracing::warn!("Could not hash {}: {}", request.document.display(), e);
            String::new()
        });

        let tasks = plan_tasks(&request, total_pages);
        let total = tasks.len();
        let workers = resolve_worker_count(request.workers, total);

        tracing::info!(
            "Processing {} of {} pages from {} with {} {} workers",
            total,
            total_pages,
            request.document.display(),
            workers,
            self.isolation
        );
        let _ = event_tx
            .send(ExtractionEvent::RunStarted {
                source: request.document.clone(),
                total_pages,
                pages_to_process: total,
                workers,
            })
            .await;

        let settings = Arc::new(WorkerSettings::from_config(&self.config, request.recognition));
        let mut executors = Vec::with_capacity(workers);
        if total > 0 {
            for _ in 0..workers {
                executors.push(self.start_executor(&settings).await?);
            }
        }

        let (task_tx, task_rx) = mpsc::unbounded_channel::<PageTask>();
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<(PageTask, PageResult)>();
        let queue = Arc::new(Mutex::new(task_rx));

        let mut slots = JoinSet::new();
        for executor in executors {
            slots.spawn(run_slot(executor, queue.clone(), result_tx.clone()));
        }
        drop(result_tx);

        let mut pending: BTreeSet<u32> = tasks.iter().map(PageTask::page_number).collect();
        for task in tasks {
            let _ = task_tx.send(task);
        }

        let mut attempts: HashMap<u32, u32> = HashMap::new();
        let mut results: Vec<PageResult> = Vec::with_capacity(total);

        while !pending.is_empty() {
            let Some((task, result)) = result_rx.recv().await else {
                break;
            };
            let page_number = result.page_number;

            if let Some(failure) = result.failure() {
                let attempt = attempts.entry(page_number).or_insert(1);
                if let Some(next) = self.retry.retry(&task, failure, *attempt) {
                    *attempt += 1;
                    tracing::info!(
                        "Retrying page {} (attempt {}) at {} dpi: {}",
                        page_number,
                        attempt,
                        next.dpi,
                        failure
                    );
                    let _ = event_tx
                        .send(ExtractionEvent::PageRetrying {
                            page_number,
                            attempt: *attempt,
                            dpi: next.dpi,
                            error: failure.to_string(),
                        })
                        .await;
                    if task_tx.send(next).is_ok() {
                        continue;
                    }
                }
            }

            pending.remove(&page_number);
            results.push(result);
            let completed = results.len();
            let result = &results[completed - 1];

            match result.failure() {
                None => {
                    tracing::info!(
                        "Page {} done ({}/{}) in {:.2}s",
                        page_number,
                        completed,
                        total,
                        result.processing_time
                    );
                    let _ = event_tx
                        .send(ExtractionEvent::PageCompleted {
                            page_number,
                            completed,
                            total,
                            processing_time: result.processing_time,
                            text_count: result.recognition().map(|r| r.texts.len()),
                        })
                        .await;
                }
                Some(failure) => {
                    tracing::warn!(
                        "Page {} failed ({}/{}): {}",
                        page_number,
                        completed,
                        total,
                        failure
                    );
                    if matches!(failure.kind, FailureKind::Timeout | FailureKind::WorkerLost) {
                        record_lost_page(&request.output_dir, result);
                    }
                    let _ = event_tx
                        .send(ExtractionEvent::PageFailed {
                            page_number,
                            completed,
                            total,
                            error: failure.to_string(),
                        })
                        .await;
                }
            }
        }
        drop(task_tx);

        // Only reachable if every slot died with work outstanding.
        for page_number in pending {
            tracing::warn!("Page {} was never processed", page_number);
            let result = PageResult::failed(
                page_number,
                0.0,
                PageFailure::new(
                    FailureKind::WorkerLost,
                    "worker pool stopped before the page was processed",
                ),
            );
            record_lost_page(&request.output_dir, &result);
            results.push(result);
        }

        while let Some(joined) = slots.join_next().await {
            if let Err(e) = joined {
                tracing::warn!("Worker slot failed: {}", e);
            }
        }

        results.sort_by_key(|r| r.page_number);
        let summary = self.summarize(
            &request,
            total_pages,
            workers,
            source_sha256,
            started_at,
            clock,
            results,
        );

        let summary_path = request.output_dir.join(SUMMARY_FILE);
        if let Err(e) = storage::write_json(&summary_path, &summary) {
            tracing::error!("Failed to write run summary: {}", e);
        }

        let _ = event_tx
            .send(ExtractionEvent::RunCompleted {
                succeeded: summary.successful_pages,
                failed: summary.failed_pages,
                elapsed: clock.elapsed(),
            })
            .await;

        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    fn summarize(
        &self,
        request: &RunRequest,
        total_pages: u32,
        workers: usize,
        source_sha256: String,
        started_at: chrono::DateTime<Utc>,
        clock: Instant,
        results: Vec<PageResult>,
    ) -> RunSummary {
        let processed = results.len();
        let successful = results.iter().filter(|r| r.is_success()).count();
        let elapsed = clock.elapsed().as_secs_f64();

        let average_time_per_page = if processed > 0 {
            results.iter().map(|r| r.processing_time).sum::<f64>() / processed as f64
        } else {
            0.0
        };
        let pages_per_second = if elapsed > 0.0 {
            processed as f64 / elapsed
        } else {
            0.0
        };

        RunSummary {
            source_path: request.document.clone(),
            source_sha256,
            total_pages,
            processed_pages: processed,
            successful_pages: successful,
            failed_pages: processed - successful,
            total_processing_time: elapsed,
            average_time_per_page,
            pages_per_second,
            num_workers: workers,
            dpi: request.dpi,
            recognition_enabled: request.recognition,
            isolation: self.isolation,
            started_at,
            results,
        }
    }
}

/// Write the record of a page whose worker timed out or died, so the
/// output directory accounts for every attempted page.
fn record_lost_page(output_dir: &Path, result: &PageResult) {
    let path = storage::page_record_path(output_dir, result.page_number);
    if let Err(e) = storage::write_json(&path, result) {
        tracing::warn!(
            "Could not record failure of page {}: {}",
            result.page_number,
            e
        );
    }
}

/// Pull tasks from the shared queue until it closes.
async fn run_slot(
    mut executor: Box<dyn PageExecutor>,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<PageTask>>>,
    results: mpsc::UnboundedSender<(PageTask, PageResult)>,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };
        let result = executor.execute(task.clone()).await;
        if results.send((task, result)).is_err() {
            break;
        }
    }
    executor.shutdown().await;
}
