//! Result aggregation and quality grading.
//!
//! Turns a set of page results into a [`QualityReport`]. Results are sorted
//! by page number before any reduction, so the report depends only on the
//! set of results and never on the order they arrived in.

mod stats;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::VerificationConfig;
use crate::models::{
    ConfidenceStats, EntityRecognition, Grade, LowConfidencePage, OverallQuality, PageResult,
    QualityReport, RunSummary,
};
use crate::storage::{self, ArtifactError, REPORT_FILE, SUMMARY_FILE};

pub use stats::{summarize, Summary};

/// Pages whose mean confidence falls below this are flagged.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;
/// Weight of the mean entity recognition rate in the composite score.
pub const ENTITY_WEIGHT: f64 = 0.6;
/// Weight of the mean fragment confidence in the composite score.
pub const CONFIDENCE_WEIGHT: f64 = 0.4;

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("no page results found in {0}")]
    NoResults(PathBuf),
}

/// Computes quality reports for a fixed list of tracked entities.
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    /// Entity name as given, keyed by its whitespace-free form.
    entities: BTreeMap<String, String>,
}

impl Verifier {
    pub fn new<I, S>(tracked_entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entities = BTreeMap::new();
        for name in tracked_entities {
            let name = name.into();
            let key = compact(&name);
            if !key.is_empty() {
                entities.entry(key).or_insert(name);
            }
        }
        Self { entities }
    }

    pub fn from_config(config: &VerificationConfig) -> Self {
        Self::new(config.tracked_entities.iter().cloned())
    }

    pub fn tracked_entities(&self) -> impl Iterator<Item = &str> {
        self.entities.values().map(String::as_str)
    }

    /// Aggregate `results` into a report.
    pub fn aggregate(&self, results: &[PageResult]) -> QualityReport {
        let mut pages: Vec<&PageResult> = results.iter().collect();
        pages.sort_by_key(|r| r.page_number);

        let total_pages = pages.len();
        let successful_pages = pages.iter().filter(|r| r.is_success()).count();

        let entity_recognition = self.entity_presence(&pages);
        let ocr_quality = confidence_stats(&pages);

        let rates: Vec<f64> = entity_recognition
            .values()
            .map(|e| e.recognition_rate)
            .collect();
        let recognition_rate = stats::mean(&rates);
        let confidence_score = ocr_quality.average_confidence;
        let overall_score = ENTITY_WEIGHT * recognition_rate + CONFIDENCE_WEIGHT * confidence_score;

        QualityReport {
            total_pages,
            successful_pages,
            failed_pages: total_pages - successful_pages,
            entity_recognition,
            ocr_quality,
            overall_quality: OverallQuality {
                overall_score,
                grade: Grade::from_score(overall_score),
                recognition_rate,
                confidence_score,
            },
        }
    }

    fn entity_presence(&self, pages: &[&PageResult]) -> BTreeMap<String, EntityRecognition> {
        let page_texts: Vec<(u32, String)> = pages
            .iter()
            .filter_map(|r| {
                r.recognition()
                    .map(|rec| (r.page_number, compact(&rec.joined_text())))
            })
            .collect();

        self.entities
            .iter()
            .map(|(key, name)| {
                let pages_found: Vec<u32> = page_texts
                    .iter()
                    .filter(|(_, text)| text.contains(key.as_str()))
                    .map(|(page, _)| *page)
                    .collect();
                let found_count = pages_found.len();
                let recognition_rate = if pages.is_empty() {
                    0.0
                } else {
                    found_count as f64 / pages.len() as f64
                };
                (
                    name.clone(),
                    EntityRecognition {
                        found_count,
                        missing_count: pages.len() - found_count,
                        recognition_rate,
                        pages_found,
                    },
                )
            })
            .collect()
    }
}

/// Strip all whitespace, so text split across fragments still matches.
fn compact(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn confidence_stats(pages: &[&PageResult]) -> ConfidenceStats {
    let recognized: Vec<(u32, &crate::models::Recognition)> = pages
        .iter()
        .filter_map(|r| r.recognition().map(|rec| (r.page_number, rec)))
        .collect();

    let confidences: Vec<f64> = recognized
        .iter()
        .flat_map(|(_, rec)| rec.texts.iter().map(|t| t.confidence))
        .collect();
    let summary = summarize(&confidences);

    let text_counts: Vec<f64> = recognized
        .iter()
        .map(|(_, rec)| rec.texts.len() as f64)
        .collect();

    let low_quality_pages: Vec<LowConfidencePage> = recognized
        .iter()
        .filter(|(_, rec)| rec.average_confidence < LOW_CONFIDENCE_THRESHOLD)
        .map(|(page, rec)| LowConfidencePage {
            page: *page,
            confidence: rec.average_confidence,
        })
        .collect();

    ConfidenceStats {
        text_count: summary.count,
        average_confidence: summary.mean,
        min_confidence: summary.min,
        max_confidence: summary.max,
        std_confidence: summary.std_dev,
        average_text_count: stats::mean(&text_counts),
        low_quality_count: low_quality_pages.len(),
        low_quality_pages,
    }
}

/// Load page results from an output directory.
///
/// Uses `processing_summary.json` when present, otherwise every
/// `page_NNNN.json` record.
pub fn load_results(dir: &Path) -> Result<Vec<PageResult>, VerificationError> {
    let summary_path = dir.join(SUMMARY_FILE);
    let results = if summary_path.is_file() {
        tracing::debug!("Loading results from {}", summary_path.display());
        storage::read_json::<RunSummary>(&summary_path)?.results
    } else {
        let records = storage::list_page_records(dir)?;
        tracing::debug!(
            "Loading {} page records from {}",
            records.len(),
            dir.display()
        );
        records
            .iter()
            .map(|path| storage::read_json::<PageResult>(path))
            .collect::<Result<Vec<_>, _>>()?
    };

    if results.is_empty() {
        return Err(VerificationError::NoResults(dir.to_path_buf()));
    }
    Ok(results)
}

/// Write `verification_report.json` into `dir`.
pub fn write_report(dir: &Path, report: &QualityReport) -> Result<PathBuf, ArtifactError> {
    let path = dir.join(REPORT_FILE);
    storage::write_json(&path, report)?;
    Ok(path)
}
