//! The `check` command: external tool availability.

use console::style;

use tallyscan::ocr::create_recognizer;
use tallyscan::raster::PopplerRasterizer;
use tallyscan::utils::check_binary;
use tallyscan::Config;

pub async fn cmd_check(config: &Config) -> anyhow::Result<()> {
    println!("\n{}", style("Tool Status").bold());
    println!("{}", "-".repeat(50));

    println!("\n{}", style("Rasterizer:").cyan());
    for tool in [&config.raster.pdfinfo, &config.raster.pdftoppm] {
        let status = if check_binary(tool) {
            style("✓ found").green()
        } else {
            style("✗ not found").red()
        };
        println!("  {:<15} {}", tool, status);
    }
    let poppler = PopplerRasterizer::new(&config.raster);
    if !poppler.is_available() {
        println!(
            "                  {}",
            style(poppler.availability_hint()).dim()
        );
    }

    println!("\n{}", style("Recognizer:").cyan());
    let name = config.recognizer.backend.to_string();
    match create_recognizer(&config.recognizer) {
        Ok(_) => println!(
            "  {:<15} {} ({})",
            name,
            style("✓ available").green(),
            config.recognizer.language
        ),
        Err(e) => {
            println!("  {:<15} {}", name, style("✗ not available").red());
            println!("                  {}", style(e).dim());
        }
    }

    println!(
        "\n  {}",
        style("Directories of page images need no external tools.").dim()
    );
    Ok(())
}
