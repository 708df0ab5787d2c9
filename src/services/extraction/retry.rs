//! Retry policies for failed pages.
//!
//! The dispatcher consults a policy for every failed result. Runs do not
//! retry unless `[retry] max_attempts` is set.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::{FailureKind, PageFailure, PageTask};

/// Decides whether a failed page is resubmitted.
pub trait RetryPolicy: Send + Sync {
    /// Return the task to resubmit, or `None` to accept the failure.
    ///
    /// `attempt` is the 1-based number of the attempt that just failed.
    fn retry(&self, task: &PageTask, failure: &PageFailure, attempt: u32) -> Option<PageTask>;
}

/// Accept every failure as final.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn retry(&self, _task: &PageTask, _failure: &PageFailure, _attempt: u32) -> Option<PageTask> {
        None
    }
}

/// Retry image and recognition failures at a higher resolution.
///
/// Timeouts and lost workers are retried at the same resolution. Missing
/// pages and write failures are never retried.
#[derive(Debug, Clone, Copy)]
pub struct EscalateDpi {
    /// Extra attempts allowed per page.
    pub max_retries: u32,
    pub dpi_step: u32,
    pub max_dpi: u32,
}

impl RetryPolicy for EscalateDpi {
    fn retry(&self, task: &PageTask, failure: &PageFailure, attempt: u32) -> Option<PageTask> {
        if attempt > self.max_retries {
            return None;
        }

        let dpi = match failure.kind {
            FailureKind::PageAccess | FailureKind::ArtifactWrite => return None,
            FailureKind::Timeout | FailureKind::WorkerLost => task.dpi,
            FailureKind::Rasterize | FailureKind::InvalidImage | FailureKind::Recognition => {
                let raised = task.dpi.saturating_add(self.dpi_step);
                raised.min(self.max_dpi.max(task.dpi))
            }
        };

        Some(PageTask {
            dpi,
            ..task.clone()
        })
    }
}

/// `[retry]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts per failed page; `0` disables retries.
    pub max_attempts: u32,
    pub dpi_step: u32,
    pub max_dpi: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            dpi_step: 100,
            max_dpi: 600,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> Arc<dyn RetryPolicy> {
        if self.max_attempts == 0 {
            Arc::new(NoRetry)
        } else {
            Arc::new(EscalateDpi {
                max_retries: self.max_attempts,
                dpi_step: self.dpi_step,
                max_dpi: self.max_dpi,
            })
        }
    }
}
