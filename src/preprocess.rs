//! Image preprocessing ahead of text recognition.
//!
//! Four stages, always in this order:
//! 1. grayscale conversion (skipped for 8-bit grayscale input)
//! 2. median denoising
//! 3. contrast-limited adaptive histogram equalization (CLAHE)
//! 4. local-mean adaptive binarization
//!
//! The output is a grayscale image containing only 0 and 255. The same input
//! always produces the same output.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::adaptive_threshold;
use imageproc::filter::median_filter;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// Tuning for the preprocessing stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessOptions {
    /// Median filter radius; `0` disables denoising.
    pub denoise_radius: u32,
    /// Histogram clip limit, relative to a uniform distribution.
    pub clahe_clip_limit: f64,
    /// Tiles per axis.
    pub clahe_grid: u32,
    /// Binarization neighbourhood radius (block size `2r + 1`).
    pub threshold_radius: u32,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            denoise_radius: 1,
            clahe_clip_limit: 2.0,
            clahe_grid: 8,
            threshold_radius: 5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    options: PreprocessOptions,
}

impl Preprocessor {
    pub fn new(options: PreprocessOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PreprocessOptions {
        &self.options
    }

    /// Run all stages on `image`.
    pub fn process(&self, image: &DynamicImage) -> Result<GrayImage, PreprocessError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PreprocessError::InvalidImage(format!(
                "image has zero size ({}x{})",
                image.width(),
                image.height()
            )));
        }

        let gray = to_grayscale(image);

        let denoised = if self.options.denoise_radius > 0 {
            let r = self.options.denoise_radius;
            median_filter(&gray, r, r)
        } else {
            gray
        };

        let equalized = clahe(
            &denoised,
            self.options.clahe_grid.max(1),
            self.options.clahe_clip_limit,
        );

        Ok(adaptive_threshold(&equalized, self.options.threshold_radius))
    }
}

fn to_grayscale(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => other.to_luma8(),
    }
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into at most `grid` x `grid` tiles. Each tile gets a
/// clipped, equalized lookup table and every pixel is mapped through a
/// bilinear blend of the four nearest tile tables.
pub fn clahe(image: &GrayImage, grid: u32, clip_limit: f64) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let tile_w = width.div_ceil(grid.min(width));
    let tile_h = height.div_ceil(grid.min(height));
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            luts.push(tile_lut(image, x0, y0, x1, y1, clip_limit));
        }
    }

    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        let (ty0, ty1, fy) = neighbours(y, tile_h, tiles_y);
        for x in 0..width {
            let (tx0, tx1, fx) = neighbours(x, tile_w, tiles_x);
            let v = image.get_pixel(x, y)[0] as usize;

            let lut = |tx: u32, ty: u32| luts[(ty * tiles_x + tx) as usize][v] as f64;
            let top = lut(tx0, ty0) * (1.0 - fx) + lut(tx1, ty0) * fx;
            let bottom = lut(tx0, ty1) * (1.0 - fx) + lut(tx1, ty1) * fx;
            let value = top * (1.0 - fy) + bottom * fy;

            out.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

/// Tile indices surrounding `pos` along one axis and the blend weight.
fn neighbours(pos: u32, tile: u32, tiles: u32) -> (u32, u32, f64) {
    let g = (pos as f64 + 0.5) / tile as f64 - 0.5;
    if g <= 0.0 {
        return (0, 0, 0.0);
    }
    let t0 = (g.floor() as u32).min(tiles - 1);
    let t1 = (t0 + 1).min(tiles - 1);
    let f = if t0 == t1 { 0.0 } else { g - t0 as f64 };
    (t0, t1, f)
}

fn tile_lut(image: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f64) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[image.get_pixel(x, y)[0] as usize] += 1;
        }
    }

    let area = (x1 - x0) * (y1 - y0);
    let clip = ((clip_limit * area as f64 / 256.0) as u32).max(1);

    let mut excess = 0u32;
    for count in hist.iter_mut() {
        if *count > clip {
            excess += *count - clip;
            *count = clip;
        }
    }

    let bonus = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, count) in hist.iter_mut().enumerate() {
        *count += bonus;
        if i < remainder {
            *count += 1;
        }
    }

    let mut lut = [0u8; 256];
    let mut cdf = 0u64;
    for (i, count) in hist.iter().enumerate() {
        cdf += *count as u64;
        lut[i] = ((cdf * 255) / area as u64).min(255) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            Luma([((x * 7 + y * 3) % 200 + 20) as u8])
        })
    }

    fn text_like_page() -> RgbImage {
        RgbImage::from_fn(120, 80, |x, y| {
            if (20..100).contains(&x) && y % 12 < 3 {
                Rgb([30, 30, 30])
            } else {
                Rgb([220, 215, 210])
            }
        })
    }

    #[test]
    fn test_output_is_binary() {
        let preprocessor = Preprocessor::default();
        let output = preprocessor
            .process(&DynamicImage::ImageRgb8(text_like_page()))
            .unwrap();

        assert_eq!(output.dimensions(), (120, 80));
        assert!(output.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_deterministic() {
        let preprocessor = Preprocessor::default();
        let input = DynamicImage::ImageRgb8(text_like_page());
        let a = preprocessor.process(&input).unwrap();
        let b = preprocessor.process(&input).unwrap();
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn test_grayscale_input_matches_converted_color() {
        let preprocessor = Preprocessor::default();
        let color = DynamicImage::ImageRgb8(text_like_page());
        let gray = DynamicImage::ImageLuma8(color.to_luma8());

        let from_color = preprocessor.process(&color).unwrap();
        let from_gray = preprocessor.process(&gray).unwrap();
        assert_eq!(from_color.as_raw(), from_gray.as_raw());
    }

    #[test]
    fn test_zero_size_is_invalid() {
        let preprocessor = Preprocessor::default();
        let empty = DynamicImage::ImageLuma8(GrayImage::new(0, 10));
        assert!(matches!(
            preprocessor.process(&empty),
            Err(PreprocessError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_tiny_image_survives_all_stages() {
        let preprocessor = Preprocessor::default();
        let tiny = DynamicImage::ImageLuma8(GrayImage::from_pixel(1, 1, Luma([90])));
        let output = preprocessor.process(&tiny).unwrap();
        assert_eq!(output.dimensions(), (1, 1));
    }

    #[test]
    fn test_clahe_preserves_dimensions() {
        let img = gradient(33, 17);
        let out = clahe(&img, 8, 2.0);
        assert_eq!(out.dimensions(), (33, 17));
        assert_eq!(out.as_raw(), clahe(&img, 8, 2.0).as_raw());
    }

    #[test]
    fn test_clahe_stretches_low_contrast() {
        let narrow = GrayImage::from_fn(64, 64, |x, _| Luma([100 + (x % 16) as u8]));
        let out = clahe(&narrow, 4, 4.0);

        let range = |img: &GrayImage| {
            let min = img.pixels().map(|p| p[0]).min().unwrap();
            let max = img.pixels().map(|p| p[0]).max().unwrap();
            max - min
        };
        assert!(range(&out) > range(&narrow));
    }

    #[test]
    fn test_clahe_handles_more_tiles_than_pixels() {
        let img = gradient(5, 3);
        let out = clahe(&img, 8, 2.0);
        assert_eq!(out.dimensions(), (5, 3));
    }
}
