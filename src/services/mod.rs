//! Service layer for tallyscan.
//!
//! This module contains the pipeline logic separated from UI concerns.
//! Services report progress through events so any front end can drive them.

pub mod extraction;
pub mod verification;

pub use extraction::{DispatchError, ExtractionEvent, ExtractionService, RunRequest};
pub use verification::{VerificationError, Verifier};
