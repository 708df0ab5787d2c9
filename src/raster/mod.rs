//! Page rasterization.
//!
//! A [`Rasterizer`] opens a paginated document and hands back a
//! [`DocumentHandle`] that renders one page at a time. Handles are never
//! shared: every task opens its own.

mod image_set;
mod poppler;

use std::path::{Path, PathBuf};

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use image_set::{page_image_files, ImageSetRasterizer};
pub use poppler::PopplerRasterizer;

/// Points per inch; page geometry is expressed in points.
pub const POINTS_PER_INCH: u32 = 72;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("cannot open document {path}: {reason}")]
    DocumentOpen { path: PathBuf, reason: String },
    #[error("page index {index} out of range (document has {page_count} pages)")]
    PageAccess { index: u32, page_count: u32 },
    #[error("{0} not found (install poppler-utils)")]
    ToolNotFound(String),
    #[error("failed to render page {page}: {reason}")]
    Render { page: u32, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rasterizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    /// `pdftoppm` binary name or path.
    pub pdftoppm: String,
    /// `pdfinfo` binary name or path.
    pub pdfinfo: String,
    /// Native resolution assumed for page images in an image-set document.
    pub image_set_dpi: u32,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            pdftoppm: "pdftoppm".to_string(),
            pdfinfo: "pdfinfo".to_string(),
            image_set_dpi: POINTS_PER_INCH,
        }
    }
}

/// An open document.
pub trait DocumentHandle: Send {
    fn page_count(&self) -> u32;

    /// Render the page at zero-based `index`. Pixel dimensions scale by
    /// `dpi / 72` relative to the page's size in points.
    fn render(&self, index: u32, dpi: u32) -> Result<DynamicImage, RasterError>;
}

/// Opens documents of one kind.
pub trait Rasterizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn open(&self, path: &Path) -> Result<Box<dyn DocumentHandle>, RasterError>;
}

/// Pick the rasterizer for `path`: directories are image sets, files are PDFs.
pub fn rasterizer_for(path: &Path, config: &RasterConfig) -> Box<dyn Rasterizer> {
    if path.is_dir() {
        Box::new(ImageSetRasterizer::new(config.image_set_dpi))
    } else {
        Box::new(PopplerRasterizer::new(config))
    }
}

/// Open `path` with the matching rasterizer.
pub fn open_document(
    path: &Path,
    config: &RasterConfig,
) -> Result<Box<dyn DocumentHandle>, RasterError> {
    let rasterizer = rasterizer_for(path, config);
    tracing::debug!("Opening {} with {} rasterizer", path.display(), rasterizer.name());
    rasterizer.open(path)
}

/// Scale a length measured at `from_dpi` to `to_dpi`, never below one pixel.
pub fn scale_length(length: u32, from_dpi: u32, to_dpi: u32) -> u32 {
    let scaled = (length as f64 * to_dpi as f64 / from_dpi as f64).round();
    scaled.max(1.0) as u32
}
