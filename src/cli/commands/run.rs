//! The `run` command: extract, recognize and grade a document.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use tokio::sync::mpsc;

use tallyscan::models::Isolation;
use tallyscan::ocr::create_recognizer;
use tallyscan::services::verification::{write_report, Verifier};
use tallyscan::services::{ExtractionEvent, ExtractionService, RunRequest};
use tallyscan::utils::format_duration;
use tallyscan::Config;

use super::verify::print_report;
use crate::cli::{icons, progress};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// PDF file or directory of page images
    pub document: PathBuf,

    /// Output directory for page images, records and reports
    #[arg(short, long, env = "TALLYSCAN_OUTPUT_DIR")]
    pub output: Option<PathBuf>,

    /// Rendering resolution in dots per inch
    #[arg(long, env = "TALLYSCAN_DPI")]
    pub dpi: Option<u32>,

    /// Number of parallel workers (default: cores - 1)
    #[arg(short, long, env = "TALLYSCAN_WORKERS")]
    pub workers: Option<usize>,

    /// First page to process (1-based, inclusive)
    #[arg(long)]
    pub first_page: Option<u32>,

    /// Last page to process (1-based, inclusive)
    #[arg(long)]
    pub last_page: Option<u32>,

    /// Only rasterize and preprocess; skip text recognition
    #[arg(long)]
    pub no_ocr: bool,

    /// Run workers as processes or threads
    #[arg(long, value_enum)]
    pub isolation: Option<Isolation>,

    /// Per-page time limit in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Skip the quality report
    #[arg(long)]
    pub no_verify: bool,
}

impl RunArgs {
    /// Fold command-line overrides into the loaded configuration.
    fn apply(&self, config: &mut Config) {
        if let Some(ref output) = self.output {
            config.pipeline.output_dir = output.clone();
        }
        if let Some(dpi) = self.dpi {
            config.pipeline.dpi = dpi;
        }
        if self.workers.is_some() {
            config.pipeline.workers = self.workers;
        }
        if self.no_ocr {
            config.pipeline.recognition = false;
        }
        if let Some(isolation) = self.isolation {
            config.pipeline.isolation = isolation;
        }
        if self.timeout.is_some() {
            config.pipeline.task_timeout_secs = self.timeout;
        }
    }

    fn request(&self, config: &Config) -> RunRequest {
        let mut request = RunRequest::from_config(config, &self.document);
        request.first_page = self.first_page;
        request.last_page = self.last_page;
        request
    }
}

pub async fn cmd_run(mut config: Config, args: RunArgs, quiet: bool) -> anyhow::Result<()> {
    args.apply(&mut config);
    config.validate().context("invalid run settings")?;
    let request = args.request(&config);
    let output_dir = request.output_dir.clone();

    if request.recognition {
        if let Err(e) = create_recognizer(&config.recognizer) {
            eprintln!(
                "{} Text recognition unavailable, pages will be marked failed: {}",
                icons::warn(),
                e
            );
        }
    }

    // Create event channel for progress tracking
    let (event_tx, mut event_rx) = mpsc::channel::<ExtractionEvent>(100);

    // Spawn event handler for UI
    let event_handler = tokio::spawn(async move {
        let mut progress = None;

        while let Some(event) = event_rx.recv().await {
            match event {
                ExtractionEvent::RunStarted {
                    source,
                    total_pages,
                    pages_to_process,
                    workers,
                } => {
                    if !quiet {
                        println!(
                            "{} Processing {} of {} pages from {} with {} workers",
                            icons::info(),
                            pages_to_process,
                            total_pages,
                            source.display(),
                            workers
                        );
                    }
                    let bar = progress::page_bar(pages_to_process as u64, quiet);
                    bar.set_message("Extracting pages...");
                    progress = Some(bar);
                }
                ExtractionEvent::PageCompleted {
                    page_number,
                    text_count,
                    ..
                } => {
                    if let Some(ref bar) = progress {
                        match text_count {
                            Some(count) => {
                                bar.set_message(format!("page {}: {} texts", page_number, count))
                            }
                            None => bar.set_message(format!("page {}", page_number)),
                        }
                        bar.inc(1);
                    }
                }
                ExtractionEvent::PageFailed {
                    page_number, error, ..
                } => {
                    let line = format!("  {} Page {} failed: {}", icons::error(), page_number, error);
                    match progress {
                        Some(ref bar) => {
                            bar.suspend(|| eprintln!("{}", line));
                            bar.inc(1);
                        }
                        None => eprintln!("{}", line),
                    }
                }
                ExtractionEvent::PageRetrying {
                    page_number,
                    attempt,
                    dpi,
                    ..
                } => {
                    if let Some(ref bar) = progress {
                        bar.set_message(format!(
                            "retrying page {} (attempt {}, {} dpi)",
                            page_number, attempt, dpi
                        ));
                    }
                }
                ExtractionEvent::RunCompleted { .. } => {
                    if let Some(bar) = progress.take() {
                        bar.finish_and_clear();
                    }
                }
            }
        }
    });

    let service = ExtractionService::new(&config);
    let outcome = service.run(request, event_tx).await;

    // Wait for event handler to finish
    if let Err(e) = event_handler.await {
        tracing::warn!("Event handler task failed: {}", e);
    }

    let summary = outcome?;

    println!(
        "{} Processed {} pages: {} succeeded, {} failed in {} ({:.2} pages/s)",
        icons::success(),
        summary.processed_pages,
        summary.successful_pages,
        summary.failed_pages,
        format_duration(Duration::from_secs_f64(summary.total_processing_time)),
        summary.pages_per_second
    );
    if !quiet {
        println!("  Results written to {}", output_dir.display());
    }

    if args.no_verify || summary.processed_pages == 0 {
        return Ok(());
    }

    let report = Verifier::from_config(&config.verification).aggregate(&summary.results);
    match write_report(&output_dir, &report) {
        Ok(path) => {
            if !quiet {
                print_report(&report);
                println!("  Report written to {}", path.display());
            }
        }
        Err(e) => eprintln!("{} Failed to write quality report: {}", icons::warn(), e),
    }

    Ok(())
}
