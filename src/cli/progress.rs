//! Progress display for page processing.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const PAGE_TEMPLATE: &str = "{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}";

/// Progress bar counting finished pages. Hidden when `quiet` is set.
pub fn page_bar(len: u64, quiet: bool) -> ProgressBar {
    let progress = ProgressBar::new(len);
    if quiet {
        progress.set_draw_target(ProgressDrawTarget::hidden());
    }
    progress.set_style(
        ProgressStyle::default_bar()
            .template(PAGE_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░"),
    );
    progress
}
