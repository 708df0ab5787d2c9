//! Data models shared by the pipeline stages.

mod page;
mod report;
mod summary;

pub use page::{
    ArtifactPaths, FailureKind, ImageShape, PageFailure, PageOutcome, PageOutput, PageResult,
    PageTask, Recognition, RecognizedText, TextRegion,
};
pub use report::{
    ConfidenceStats, EntityRecognition, Grade, LowConfidencePage, OverallQuality, QualityReport,
};
pub use summary::{Isolation, RunSummary};
