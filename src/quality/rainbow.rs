//! Multi-hue "rainbow" score
//!
//! A diffraction hologram shows many bright, saturated hues at once; plain
//! specular glare shows one hue or none. The region is downsampled to a
//! fixed grid, bright saturated pixels are bucketed into six 60-degree hue
//! bins, and the score is `coverage * bins_present / 6`.

use super::color::value_saturation;
use super::PixelBounds;
use crate::types::Rect;
use image::imageops::{self, FilterType};
use image::RgbImage;

/// Side of the downsampled analysis grid.
pub const GRID: u32 = 48;
pub const HUE_BINS: usize = 6;

const MIN_VALUE: f32 = 0.6;
const MIN_SATURATION: f32 = 0.3;

/// Sub-window layout for the localised scan: 4x4 windows of 45 % size
/// stepping 18 % from a 5 % origin.
const WINDOWS_PER_AXIS: usize = 4;
const WINDOW_ORIGIN: f32 = 0.05;
const WINDOW_STEP: f32 = 0.18;
const WINDOW_SIZE: f32 = 0.45;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RainbowScore {
    pub score: f32,
    pub bins_present: u8,
    /// Fraction of grid pixels that were bright and saturated
    pub coverage: f32,
}

/// Hue in degrees `[0, 360)` for normalised channels.
pub fn hue_degrees(r: f32, g: f32, b: f32) -> f32 {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let d = max - min;
    if d == 0.0 {
        return 0.0;
    }
    let hue = if max == r {
        60.0 * ((g - b) / d).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / d + 2.0)
    } else {
        60.0 * ((r - g) / d + 4.0)
    };
    if hue < 0.0 {
        hue + 360.0
    } else {
        hue
    }
}

/// Bin centred on red, then every 60 degrees.
pub fn hue_bin(hue: f32) -> usize {
    match hue {
        h if !(30.0..330.0).contains(&h) => 0,
        h if h < 90.0 => 1,
        h if h < 150.0 => 2,
        h if h < 210.0 => 3,
        h if h < 270.0 => 4,
        _ => 5,
    }
}

/// Score one region of the image.
pub fn rainbow_score(image: &RgbImage, bounds: PixelBounds) -> RainbowScore {
    if bounds.pixel_count() == 0 {
        return RainbowScore::default();
    }

    let region =
        imageops::crop_imm(image, bounds.x, bounds.y, bounds.width, bounds.height).to_image();
    let grid = imageops::resize(&region, GRID, GRID, FilterType::Triangle);

    let mut bins = [0usize; HUE_BINS];
    let mut hits = 0usize;
    for px in grid.pixels() {
        let r = px[0] as f32 / 255.0;
        let g = px[1] as f32 / 255.0;
        let b = px[2] as f32 / 255.0;
        let (value, saturation) = value_saturation(r, g, b);
        if value > MIN_VALUE && saturation > MIN_SATURATION {
            bins[hue_bin(hue_degrees(r, g, b))] += 1;
            hits += 1;
        }
    }

    let bins_present = bins.iter().filter(|&&count| count > 0).count();
    let coverage = hits as f32 / (GRID * GRID) as f32;
    RainbowScore {
        score: coverage * (bins_present as f32 / HUE_BINS as f32),
        bins_present: bins_present as u8,
        coverage,
    }
}

/// Best-scoring sub-window of `roi`; the glint is localised, so a
/// whole-region average would dilute it.
pub fn max_over_windows(image: &RgbImage, roi: Rect) -> RainbowScore {
    let mut best = RainbowScore::default();
    for yi in 0..WINDOWS_PER_AXIS {
        for xi in 0..WINDOWS_PER_AXIS {
            let window = Rect::new(
                roi.x + roi.width * (WINDOW_ORIGIN + xi as f32 * WINDOW_STEP),
                roi.y + roi.height * (WINDOW_ORIGIN + yi as f32 * WINDOW_STEP),
                roi.width * WINDOW_SIZE,
                roi.height * WINDOW_SIZE,
            );
            let Some(bounds) = PixelBounds::within(window, image.width(), image.height()) else {
                continue;
            };
            let candidate = rainbow_score(image, bounds);
            if candidate.score > best.score {
                best = candidate;
            }
        }
    }
    best
}
