//! Run summary model.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::page::PageResult;

/// How page workers are isolated from each other and from the dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    /// One long-lived OS process per worker slot.
    #[default]
    Process,
    /// Blocking threads inside the dispatcher's process.
    Thread,
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Isolation::Process => f.write_str("process"),
            Isolation::Thread => f.write_str("thread"),
        }
    }
}

/// Outcome of a whole extraction run, written as `processing_summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub source_path: PathBuf,
    /// SHA-256 of the source file, or of the page images in order for an image set.
    pub source_sha256: String,
    pub total_pages: u32,
    pub processed_pages: usize,
    pub successful_pages: usize,
    pub failed_pages: usize,
    /// Wall-clock seconds for the whole run.
    pub total_processing_time: f64,
    /// Mean per-page latency in seconds.
    pub average_time_per_page: f64,
    pub pages_per_second: f64,
    pub num_workers: usize,
    pub dpi: u32,
    pub recognition_enabled: bool,
    pub isolation: Isolation,
    pub started_at: DateTime<Utc>,
    /// Ascending by page number.
    pub results: Vec<PageResult>,
}

impl RunSummary {
    /// Check the counting and ordering invariants.
    pub fn is_consistent(&self) -> bool {
        let counts = self.successful_pages + self.failed_pages == self.processed_pages
            && self.processed_pages == self.results.len()
            && self.processed_pages <= self.total_pages as usize;
        let ordered = self
            .results
            .windows(2)
            .all(|w| w[0].page_number < w[1].page_number);
        counts && ordered
    }

    pub fn failures(&self) -> impl Iterator<Item = &PageResult> {
        self.results.iter().filter(|r| !r.is_success())
    }
}
