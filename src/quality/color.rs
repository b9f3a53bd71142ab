//! Brightness, chroma, white-out and glare over a region

use super::PixelBounds;
use image::RgbImage;

/// Luma at or above this counts as a glare pixel.
pub const GLARE_LUMA: f32 = 240.0;

/// Mean colour of a region.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColorMetrics {
    /// HSV value of the mean colour
    pub brightness: f32,
    /// HSV saturation of the mean colour
    pub saturation: f32,
    /// Standard deviation of the mean colour's three channels
    pub chroma: f32,
    /// Near-white, colourless region: blown-out glare rather than signal
    pub white_out: bool,
}

/// Rec. 601 luma in the 0..255 range.
#[inline]
pub fn luminance(rgb: [u8; 3]) -> f32 {
    0.299 * rgb[0] as f32 + 0.587 * rgb[1] as f32 + 0.114 * rgb[2] as f32
}

/// HSV `(value, saturation)` for normalised channels.
#[inline]
pub fn value_saturation(r: f32, g: f32, b: f32) -> (f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let saturation = if max == 0.0 { 0.0 } else { (max - min) / max };
    (max, saturation)
}

pub fn color_metrics(image: &RgbImage, bounds: PixelBounds) -> ColorMetrics {
    let count = bounds.pixel_count();
    if count == 0 {
        return ColorMetrics::default();
    }

    let mut sums = [0u64; 3];
    for y in bounds.y..bounds.y + bounds.height {
        for x in bounds.x..bounds.x + bounds.width {
            let px = image.get_pixel(x, y).0;
            sums[0] += px[0] as u64;
            sums[1] += px[1] as u64;
            sums[2] += px[2] as u64;
        }
    }

    let n = count as f64 * 255.0;
    let r = (sums[0] as f64 / n) as f32;
    let g = (sums[1] as f64 / n) as f32;
    let b = (sums[2] as f64 / n) as f32;

    let (value, saturation) = value_saturation(r, g, b);
    let mean = (r + g + b) / 3.0;
    let variance = ((r - mean).powi(2) + (g - mean).powi(2) + (b - mean).powi(2)) / 3.0;

    ColorMetrics {
        brightness: value,
        saturation,
        chroma: variance.max(0.0).sqrt(),
        white_out: value > 0.85 && saturation < 0.12,
    }
}

/// Fraction of region pixels at or above [`GLARE_LUMA`].
pub fn glare_fraction(image: &RgbImage, bounds: PixelBounds) -> f32 {
    let count = bounds.pixel_count();
    if count == 0 {
        return 0.0;
    }
    let mut bright = 0usize;
    for y in bounds.y..bounds.y + bounds.height {
        for x in bounds.x..bounds.x + bounds.width {
            if luminance(image.get_pixel(x, y).0) >= GLARE_LUMA {
                bright += 1;
            }
        }
    }
    bright as f32 / count as f32
}
