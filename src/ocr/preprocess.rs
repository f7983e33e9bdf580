use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use serde::{Deserialize, Serialize};

use crate::capture::RgbaImage;

/// How a captured region is prepared before recognition.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preprocess {
    /// Luminance cut-off separating text from background (0-255)
    pub threshold: u8,
    /// Integer upscale factor; the game font is small and Tesseract prefers ~30px glyphs
    pub scale: u32,
    /// True when the text is lighter than its background
    #[serde(default)]
    pub bright_text: bool,
}

impl Default for Preprocess {
    fn default() -> Self {
        Self {
            threshold: 140,
            scale: 3,
            bright_text: false,
        }
    }
}

/// Runs the full pipeline: binarize, then upscale.
pub fn prepare(img: &RgbaImage, options: &Preprocess) -> GrayImage {
    let binary = if options.bright_text {
        threshold_bright_pixels(img, options.threshold)
    } else {
        threshold_dark_pixels(img, options.threshold)
    };
    upscale(&binary, options.scale)
}

/// ITU-R BT.601 luma of an RGBA pixel.
fn luma(pixel: &image::Rgba<u8>) -> f32 {
    0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32
}

/// Converts image to binary by keeping only dark pixels.
///
/// Pixels darker than `threshold` become black (text), everything else white.
/// The game's panels are light with dark lettering.
pub fn threshold_dark_pixels(img: &RgbaImage, threshold: u8) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut output = ImageBuffer::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels() {
        let value = if luma(pixel) < threshold as f32 {
            0u8
        } else {
            255u8
        };
        output.put_pixel(x, y, Luma([value]));
    }

    output
}

/// Converts image to binary by keeping only bright pixels.
///
/// Pixels where R, G and B all exceed `threshold` become black (text).
/// All other pixels become white (background).
pub fn threshold_bright_pixels(img: &RgbaImage, threshold: u8) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut output = ImageBuffer::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels() {
        let value = if pixel[0] > threshold && pixel[1] > threshold && pixel[2] > threshold {
            0u8
        } else {
            255u8
        };
        output.put_pixel(x, y, Luma([value]));
    }

    output
}

/// Scales a binary image by an integer factor. Factors below 2 return a copy.
pub fn upscale(img: &GrayImage, factor: u32) -> GrayImage {
    if factor < 2 {
        return img.clone();
    }
    let (w, h) = img.dimensions();
    // Nearest keeps the image strictly two-tone
    imageops::resize(img, w * factor, h * factor, FilterType::Nearest)
}
