//! PDF rasterization via the poppler command-line tools.
//!
//! `pdfinfo` reports the page count and `pdftoppm` renders a single page
//! into a private temporary directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use image::DynamicImage;
use tempfile::TempDir;

use super::{DocumentHandle, RasterConfig, RasterError, Rasterizer};
use crate::utils::check_binary;

pub struct PopplerRasterizer {
    pdfinfo: String,
    pdftoppm: String,
}

impl PopplerRasterizer {
    pub fn new(config: &RasterConfig) -> Self {
        Self {
            pdfinfo: config.pdfinfo.clone(),
            pdftoppm: config.pdftoppm.clone(),
        }
    }

    pub fn is_available(&self) -> bool {
        check_binary(&self.pdfinfo) && check_binary(&self.pdftoppm)
    }

    pub fn availability_hint(&self) -> String {
        if !check_binary(&self.pdfinfo) || !check_binary(&self.pdftoppm) {
            "poppler not installed. Install with: apt install poppler-utils".to_string()
        } else {
            "poppler is available".to_string()
        }
    }
}

impl Rasterizer for PopplerRasterizer {
    fn name(&self) -> &'static str {
        "poppler"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn DocumentHandle>, RasterError> {
        let open_err = |reason: String| RasterError::DocumentOpen {
            path: path.to_path_buf(),
            reason,
        };

        if !path.is_file() {
            return Err(open_err("file not found".to_string()));
        }

        let output = run_tool(&self.pdfinfo, Command::new(&self.pdfinfo).arg(path))?;
        if !output.status.success() {
            return Err(open_err(stderr_reason(&output, "pdfinfo failed")));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let page_count = parse_page_count(&stdout)
            .ok_or_else(|| open_err("pdfinfo reported no page count".to_string()))?;

        Ok(Box::new(PopplerDocument {
            path: path.to_path_buf(),
            page_count,
            pdftoppm: self.pdftoppm.clone(),
        }))
    }
}

struct PopplerDocument {
    path: PathBuf,
    page_count: u32,
    pdftoppm: String,
}

impl DocumentHandle for PopplerDocument {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn render(&self, index: u32, dpi: u32) -> Result<DynamicImage, RasterError> {
        if index >= self.page_count {
            return Err(RasterError::PageAccess {
                index,
                page_count: self.page_count,
            });
        }

        let page = index + 1;
        let page_str = page.to_string();
        let dpi_str = dpi.to_string();

        let temp_dir = TempDir::new()?;
        let output_prefix = temp_dir.path().join("page");

        let output = run_tool(
            &self.pdftoppm,
            Command::new(&self.pdftoppm)
                .args(["-png", "-singlefile", "-r", &dpi_str])
                .args(["-f", &page_str, "-l", &page_str])
                .arg(&self.path)
                .arg(&output_prefix),
        )?;

        if !output.status.success() {
            return Err(RasterError::Render {
                page,
                reason: stderr_reason(&output, "pdftoppm failed"),
            });
        }

        // -singlefile writes exactly <prefix>.png
        let image_path = output_prefix.with_extension("png");
        image::open(&image_path).map_err(|e| RasterError::Render {
            page,
            reason: e.to_string(),
        })
    }
}

fn run_tool(name: &str, command: &mut Command) -> Result<Output, RasterError> {
    match command.output() {
        Ok(output) => Ok(output),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(RasterError::ToolNotFound(name.to_string())),
        Err(e) => Err(RasterError::Io(e)),
    }
}

fn stderr_reason(output: &Output, fallback: &str) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        fallback.to_string()
    } else {
        stderr.to_string()
    }
}

/// Extract the `Pages:` value from `pdfinfo` output.
fn parse_page_count(pdfinfo_output: &str) -> Option<u32> {
    pdfinfo_output
        .lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Build a PDF with `pages` empty pages of `width` x `height` points.
    fn minimal_pdf(pages: usize, width: u32, height: u32) -> Vec<u8> {
        let mut objects = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            format!(
                "<< /Type /Pages /Kids [{}] /Count {} >>",
                (0..pages)
                    .map(|i| format!("{} 0 R", i + 3))
                    .collect::<Vec<_>>()
                    .join(" "),
                pages
            ),
        ];
        for _ in 0..pages {
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] /Resources << >> >>",
                width, height
            ));
        }

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }

        let xref_offset = pdf.len();
        pdf.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
        pdf.extend_from_slice(b"0000000000 65535 f \n");
        for offset in offsets {
            pdf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        pdf.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref_offset
            )
            .as_bytes(),
        );
        pdf
    }

    #[test]
    fn test_parse_page_count() {
        let output = "Title:          tally\nProducer:       scanner\nPages:          312\nEncrypted:      no\n";
        assert_eq!(parse_page_count(output), Some(312));
        assert_eq!(parse_page_count("Title: x\n"), None);
        assert_eq!(parse_page_count("Pages: many\n"), None);
    }

    #[test]
    fn test_open_missing_file() {
        let rasterizer = PopplerRasterizer::new(&RasterConfig::default());
        let err = rasterizer.open(Path::new("/nonexistent.pdf")).err().unwrap();
        assert!(matches!(err, RasterError::DocumentOpen { .. }));
    }

    #[test]
    fn test_missing_tool_reported() {
        let temp_dir = TempDir::new().unwrap();
        let pdf_path = temp_dir.path().join("doc.pdf");
        std::fs::write(&pdf_path, minimal_pdf(1, 100, 100)).unwrap();

        let config = RasterConfig {
            pdfinfo: "tallyscan-missing-pdfinfo".to_string(),
            ..RasterConfig::default()
        };
        let err = PopplerRasterizer::new(&config).open(&pdf_path).err().unwrap();
        assert!(matches!(err, RasterError::ToolNotFound(_)));
    }

    #[test]
    fn test_render_scales_with_dpi() {
        let rasterizer = PopplerRasterizer::new(&RasterConfig::default());
        if !rasterizer.is_available() {
            eprintln!("skipping: poppler not installed");
            return;
        }

        let temp_dir = TempDir::new().unwrap();
        let pdf_path = temp_dir.path().join("doc.pdf");
        std::fs::write(&pdf_path, minimal_pdf(2, 144, 72)).unwrap();

        let doc = rasterizer.open(&pdf_path).unwrap();
        assert_eq!(doc.page_count(), 2);

        let base = doc.render(0, 72).unwrap();
        let double = doc.render(1, 144).unwrap();
        assert_eq!((base.width(), base.height()), (144, 72));
        assert_eq!((double.width(), double.height()), (288, 144));

        assert!(matches!(
            doc.render(2, 72),
            Err(RasterError::PageAccess { index: 2, page_count: 2 })
        ));
    }

    #[test]
    fn test_corrupt_pdf_fails_to_open() {
        let rasterizer = PopplerRasterizer::new(&RasterConfig::default());
        if !rasterizer.is_available() {
            eprintln!("skipping: poppler not installed");
            return;
        }

        let temp_dir = TempDir::new().unwrap();
        let pdf_path = temp_dir.path().join("broken.pdf");
        std::fs::write(&pdf_path, b"this is not a pdf").unwrap();

        let err = rasterizer.open(&pdf_path).err().unwrap();
        assert!(matches!(err, RasterError::DocumentOpen { .. }));
    }
}
