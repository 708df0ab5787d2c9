//! The `verify` command: grade results already on disk.

use std::path::Path;

use anyhow::Context;
use console::style;

use tallyscan::models::{Grade, QualityReport};
use tallyscan::services::verification::{load_results, write_report, Verifier};
use tallyscan::Config;

use crate::cli::icons;

pub async fn cmd_verify(
    config: &Config,
    dir: &Path,
    entities: Vec<String>,
    quiet: bool,
) -> anyhow::Result<()> {
    let results = load_results(dir)?;

    let verifier = if entities.is_empty() {
        Verifier::from_config(&config.verification)
    } else {
        Verifier::new(entities)
    };
    let report = verifier.aggregate(&results);
    let path = write_report(dir, &report)
        .with_context(|| format!("failed to write report into {}", dir.display()))?;

    if quiet {
        println!(
            "{} Grade {} ({:.3})",
            icons::success(),
            report.overall_quality.grade,
            report.overall_quality.overall_score
        );
    } else {
        print_report(&report);
        println!("  Report written to {}", path.display());
    }
    Ok(())
}

/// Print a quality report for humans.
pub(super) fn print_report(report: &QualityReport) {
    let overall = &report.overall_quality;
    println!("\n{}", style("Quality Report").bold());
    println!("{}", "-".repeat(50));
    println!(
        "  {:<20} {} ({} ok, {} failed)",
        "Pages:", report.total_pages, report.successful_pages, report.failed_pages
    );

    if !report.entity_recognition.is_empty() {
        println!("\n{}", style("Entities:").cyan());
        for (name, entity) in &report.entity_recognition {
            let rate = format!("{:>5.1}%", entity.recognition_rate * 100.0);
            let rate = if entity.missing_count == 0 {
                style(rate).green()
            } else {
                style(rate).yellow()
            };
            println!(
                "  {:<20} {} ({} of {} pages)",
                name,
                rate,
                entity.found_count,
                entity.found_count + entity.missing_count
            );
        }
    }

    let ocr = &report.ocr_quality;
    if ocr.text_count > 0 {
        println!("\n{}", style("Recognition:").cyan());
        println!("  {:<20} {}", "Texts:", ocr.text_count);
        println!(
            "  {:<20} {:.3} (min {:.3}, max {:.3}, std {:.3})",
            "Confidence:",
            ocr.average_confidence,
            ocr.min_confidence,
            ocr.max_confidence,
            ocr.std_confidence
        );
        if ocr.low_quality_count > 0 {
            let pages: Vec<String> = ocr
                .low_quality_pages
                .iter()
                .map(|p| p.page.to_string())
                .collect();
            println!(
                "  {} {} low-confidence pages: {}",
                icons::warn(),
                ocr.low_quality_count,
                pages.join(", ")
            );
        }
    }

    let grade = match overall.grade {
        Grade::A | Grade::B => {
            style(overall.grade.to_string()).green().bold()
        }
        Grade::C | Grade::D => {
            style(overall.grade.to_string()).yellow().bold()
        }
        Grade::F => style(overall.grade.to_string()).red().bold(),
    };
    println!(
        "\n  {:<20} {} ({:.3})",
        "Overall:", grade, overall.overall_score
    );
}
