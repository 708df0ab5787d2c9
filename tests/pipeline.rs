//! End-to-end pipeline tests.
//!
//! Drive the `tallyscan` binary (process-isolated workers, exit codes) and
//! the library API over synthetic scanned pages. Recognition is disabled so
//! no external OCR engine is needed.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use image::{Rgb, RgbImage};
use tempfile::TempDir;
use tokio::sync::mpsc;

use tallyscan::models::{FailureKind, Isolation};
use tallyscan::services::extraction::WorkerProgram;
use tallyscan::services::verification::{load_results, Verifier};
use tallyscan::services::{ExtractionService, RunRequest};
use tallyscan::storage::{self, REPORT_FILE, SUMMARY_FILE};
use tallyscan::{Config, PageResult, QualityReport, RunSummary};

/// Write `count` scanned pages named `scan_001.png`, `scan_002.png`, ...
fn write_pages(dir: &Path, count: usize) {
    for i in 0..count {
        let page = RgbImage::from_fn(60, 80, |x, y| {
            if (y + i as u32) % 10 < 3 && x > 6 && x < 54 {
                Rgb([25, 25, 30])
            } else {
                Rgb([240, 236, 228])
            }
        });
        page.save(dir.join(format!("scan_{:03}.png", i + 1))).unwrap();
    }
}

fn corrupt_page(dir: &Path, page_number: usize) {
    std::fs::write(
        dir.join(format!("scan_{:03}.png", page_number)),
        b"not an image",
    )
    .unwrap();
}

/// Empty config so the user's own config file is never picked up.
fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("tallyscan.toml");
    std::fs::write(&path, "[pipeline]\nrecognition = false\n").unwrap();
    path
}

fn tallyscan(workdir: &Path, args: &[&str]) -> Output {
    let config = write_config(workdir);
    Command::new(env!("CARGO_BIN_EXE_tallyscan"))
        .current_dir(workdir)
        .env_remove("TALLYSCAN_DPI")
        .env_remove("TALLYSCAN_WORKERS")
        .env_remove("TALLYSCAN_OUTPUT_DIR")
        .env_remove("TALLYSCAN_CONFIG")
        .arg("--config")
        .arg(&config)
        .args(args)
        .output()
        .expect("failed to run tallyscan")
}

fn count_files(dir: &Path, extension: &str) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            name.starts_with("page_") && name.ends_with(extension)
        })
        .count()
}

#[test]
fn test_cli_extracts_ten_pages_with_four_process_workers() {
    let work = TempDir::new().unwrap();
    let pages = work.path().join("pages");
    std::fs::create_dir(&pages).unwrap();
    write_pages(&pages, 10);
    let out = work.path().join("out");

    let output = tallyscan(
        work.path(),
        &[
            "run",
            pages.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "--workers",
            "4",
            "--no-ocr",
            "--isolation",
            "process",
            "--dpi",
            "72",
        ],
    );
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    assert_eq!(count_files(&out, ".png"), 10);
    assert_eq!(count_files(&out, ".json"), 10);

    let summary: RunSummary = storage::read_json(&out.join(SUMMARY_FILE)).unwrap();
    assert!(summary.is_consistent());
    assert_eq!(summary.total_pages, 10);
    assert_eq!(summary.processed_pages, 10);
    assert_eq!(summary.successful_pages, 10);
    assert_eq!(summary.failed_pages, 0);
    assert_eq!(summary.num_workers, 4);
    assert_eq!(summary.isolation, Isolation::Process);
    let order: Vec<u32> = summary.results.iter().map(|r| r.page_number).collect();
    assert_eq!(order, (1..=10).collect::<Vec<_>>());

    let report: QualityReport = storage::read_json(&out.join(REPORT_FILE)).unwrap();
    assert_eq!(report.total_pages, 10);
    assert_eq!(report.successful_pages, 10);
}

#[test]
fn test_cli_isolates_a_failing_page() {
    let work = TempDir::new().unwrap();
    let pages = work.path().join("pages");
    std::fs::create_dir(&pages).unwrap();
    write_pages(&pages, 5);
    corrupt_page(&pages, 3);
    let out = work.path().join("out");

    let output = tallyscan(
        work.path(),
        &[
            "-q",
            "run",
            pages.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "--workers",
            "2",
            "--dpi",
            "72",
        ],
    );
    assert!(output.status.success());

    let summary: RunSummary = storage::read_json(&out.join(SUMMARY_FILE)).unwrap();
    assert_eq!(summary.successful_pages, 4);
    assert_eq!(summary.failed_pages, 1);

    let failed: Vec<&PageResult> = summary.failures().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].page_number, 3);
    let failure = failed[0].failure().unwrap();
    assert!(!failure.message.is_empty());
    assert_eq!(failure.kind, FailureKind::Rasterize);

    // The failure is also recorded next to the successful pages.
    let record: PageResult = storage::read_json(&out.join("page_0003.json")).unwrap();
    assert!(!record.is_success());
    assert!(!out.join("page_0003.png").exists());
}

#[test]
fn test_cli_fails_on_missing_document() {
    let work = TempDir::new().unwrap();
    let output = tallyscan(
        work.path(),
        &["run", "does-not-exist.pdf", "-o", "out", "--no-ocr"],
    );
    assert!(!output.status.success());
    assert!(!work.path().join("out").join(SUMMARY_FILE).exists());
}

#[test]
fn test_cli_verify_regrades_existing_results() {
    let work = TempDir::new().unwrap();
    let pages = work.path().join("pages");
    std::fs::create_dir(&pages).unwrap();
    write_pages(&pages, 3);
    let out = work.path().join("out");

    let run = tallyscan(
        work.path(),
        &[
            "run",
            pages.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "--isolation",
            "thread",
            "--no-verify",
        ],
    );
    assert!(run.status.success());
    assert!(!out.join(REPORT_FILE).exists());

    let verify = tallyscan(
        work.path(),
        &["verify", out.to_str().unwrap(), "--entity", "Kim"],
    );
    assert!(verify.status.success());

    let report: QualityReport = storage::read_json(&out.join(REPORT_FILE)).unwrap();
    assert_eq!(report.total_pages, 3);
    assert_eq!(report.entity_recognition["Kim"].found_count, 0);
}

#[test]
fn test_cli_verify_fails_on_empty_directory() {
    let work = TempDir::new().unwrap();
    let empty = work.path().join("empty");
    std::fs::create_dir(&empty).unwrap();

    let output = tallyscan(work.path(), &["verify", empty.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_cli_config_prints_toml() {
    let work = TempDir::new().unwrap();
    let output = tallyscan(work.path(), &["config"]);
    assert!(output.status.success());

    let printed = String::from_utf8(output.stdout).unwrap();
    let config = Config::from_toml_str(&printed).unwrap();
    assert!(!config.pipeline.recognition);
}

#[tokio::test]
async fn test_library_process_pool_matches_disk_records() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_pages(input.path(), 6);

    let mut config = Config::default();
    config.pipeline.recognition = false;

    let service = ExtractionService::new(&config)
        .with_isolation(Isolation::Process)
        .with_worker_program(WorkerProgram::new(
            env!("CARGO_BIN_EXE_tallyscan"),
            ["worker"],
        ));

    let mut request = RunRequest::from_config(&config, input.path());
    request.output_dir = out.path().to_path_buf();
    request.workers = Some(3);
    request.dpi = 144;

    let (event_tx, _event_rx) = mpsc::channel(100);
    let summary = service.run(request, event_tx).await.unwrap();
    assert_eq!(summary.successful_pages, 6);

    // Doubling the DPI doubles each dimension of the rendered page.
    let shape = summary.results[0].output().unwrap().image_shape;
    assert_eq!((shape.width, shape.height), (120, 160));

    // Records on disk aggregate to the same report as the in-memory results.
    let loaded = load_results(out.path()).unwrap();
    assert_eq!(loaded, summary.results);
    let verifier = Verifier::new(["Kim"]);
    assert_eq!(verifier.aggregate(&loaded), verifier.aggregate(&summary.results));
}
