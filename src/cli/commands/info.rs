//! The `info` command: describe a source document.

use std::path::Path;

use anyhow::Context;
use console::style;

use tallyscan::raster::{self, page_image_files};
use tallyscan::services::extraction::source_hash;
use tallyscan::utils::format_size;
use tallyscan::Config;

pub async fn cmd_info(config: &Config, document: &Path) -> anyhow::Result<()> {
    let handle = raster::open_document(document, &config.raster)?;
    let page_count = handle.page_count();

    let (kind, size) = if document.is_dir() {
        let files = page_image_files(document)?;
        let mut total = 0;
        for file in &files {
            total += std::fs::metadata(file)?.len();
        }
        ("image set", total)
    } else {
        let size = std::fs::metadata(document)
            .with_context(|| format!("failed to stat {}", document.display()))?
            .len();
        ("PDF", size)
    };
    let sha256 = source_hash(document)
        .with_context(|| format!("failed to hash {}", document.display()))?;

    println!("\n{}", style(document.display()).bold());
    println!("{}", "-".repeat(50));
    println!("  {:<12} {}", "Type:", kind);
    println!("  {:<12} {}", "Pages:", page_count);
    println!("  {:<12} {}", "Size:", format_size(size));
    println!("  {:<12} {}", "SHA-256:", sha256);
    Ok(())
}
