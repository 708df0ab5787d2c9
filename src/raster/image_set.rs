//! Directories of pre-scanned page images treated as one document.
//!
//! Pages are the image files in the directory, ordered by file name.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::DynamicImage;

use super::{scale_length, DocumentHandle, RasterError, Rasterizer};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp", "gif", "webp"];

/// List the page images in `dir`, sorted by file name.
pub fn page_image_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_image_extension(path))
        .collect();
    files.sort();
    Ok(files)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub struct ImageSetRasterizer {
    native_dpi: u32,
}

impl ImageSetRasterizer {
    /// `native_dpi` is the resolution the page images were scanned at.
    pub fn new(native_dpi: u32) -> Self {
        Self {
            native_dpi: native_dpi.max(1),
        }
    }
}

impl Rasterizer for ImageSetRasterizer {
    fn name(&self) -> &'static str {
        "image-set"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn DocumentHandle>, RasterError> {
        let open_err = |reason: String| RasterError::DocumentOpen {
            path: path.to_path_buf(),
            reason,
        };

        if !path.is_dir() {
            return Err(open_err("not a directory".to_string()));
        }
        let files = page_image_files(path).map_err(|e| open_err(e.to_string()))?;
        if files.is_empty() {
            return Err(open_err("directory contains no page images".to_string()));
        }

        Ok(Box::new(ImageSetDocument {
            files,
            native_dpi: self.native_dpi,
        }))
    }
}

struct ImageSetDocument {
    files: Vec<PathBuf>,
    native_dpi: u32,
}

impl DocumentHandle for ImageSetDocument {
    fn page_count(&self) -> u32 {
        self.files.len() as u32
    }

    fn render(&self, index: u32, dpi: u32) -> Result<DynamicImage, RasterError> {
        let path = self
            .files
            .get(index as usize)
            .ok_or(RasterError::PageAccess {
                index,
                page_count: self.page_count(),
            })?;

        let image = image::open(path).map_err(|e| RasterError::Render {
            page: index + 1,
            reason: format!("{}: {}", path.display(), e),
        })?;

        if dpi == self.native_dpi {
            return Ok(image);
        }

        let width = scale_length(image.width(), self.native_dpi, dpi);
        let height = scale_length(image.height(), self.native_dpi, dpi);
        Ok(image.resize_exact(width, height, FilterType::Triangle))
    }
}
