//! Parallel page extraction and OCR for scanned tally documents.
//!
//! A document is split into independent page tasks which a fixed pool of
//! workers rasterizes, preprocesses and (optionally) runs through a text
//! recognizer. Per-page artifacts land in an output directory and a quality
//! report can be computed over the whole set.

pub mod config;
pub mod models;
pub mod ocr;
pub mod preprocess;
pub mod raster;
pub mod services;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use models::{PageOutcome, PageResult, PageTask, QualityReport, RunSummary};
