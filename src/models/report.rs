//! Quality report model.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Letter grade derived from the composite quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// Map a composite score to a grade. Boundaries are inclusive.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Grade::A
        } else if score >= 0.8 {
            Grade::B
        } else if score >= 0.7 {
            Grade::C
        } else if score >= 0.6 {
            Grade::D
        } else {
            Grade::F
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        f.write_str(letter)
    }
}

/// Presence of one tracked entity across the page set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecognition {
    pub found_count: usize,
    pub missing_count: usize,
    pub recognition_rate: f64,
    pub pages_found: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LowConfidencePage {
    pub page: u32,
    pub confidence: f64,
}

/// Confidence statistics over every recognized text fragment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceStats {
    pub text_count: usize,
    pub average_confidence: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
    /// Population standard deviation.
    pub std_confidence: f64,
    /// Mean number of fragments per recognized page.
    pub average_text_count: f64,
    pub low_quality_pages: Vec<LowConfidencePage>,
    pub low_quality_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallQuality {
    pub overall_score: f64,
    pub grade: Grade,
    /// Mean recognition rate over tracked entities.
    pub recognition_rate: f64,
    /// Mean fragment confidence.
    pub confidence_score: f64,
}

/// Aggregate quality of a page set, written as `verification_report.json`.
///
/// Holds no timestamps and only ordered maps, so the same page set always
/// serializes to the same bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub total_pages: usize,
    pub successful_pages: usize,
    pub failed_pages: usize,
    pub entity_recognition: BTreeMap<String, EntityRecognition>,
    pub ocr_quality: ConfidenceStats,
    pub overall_quality: OverallQuality,
}
