//! Shared utility functions.
//!
//! - `format`: Human-readable formatting (sizes, durations)
//! - `tools`: Locating external command-line tools

mod format;
mod tools;

pub use format::{format_duration, format_size};
pub use tools::check_binary;
