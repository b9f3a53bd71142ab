//! Edge-energy sharpness
//!
//! Mean absolute response of an 8-neighbour Laplacian over the ROI luma,
//! with luma normalised to [0, 1]. Typical in-focus card text lands around
//! 0.005 to 0.05; a defocused card stays below 0.003.

use super::color::luminance;
use super::PixelBounds;
use image::{ImageBuffer, Luma, RgbImage};
use imageproc::filter::filter3x3;

const LAPLACIAN_8: [f32; 9] = [1.0, 1.0, 1.0, 1.0, -8.0, 1.0, 1.0, 1.0, 1.0];

/// Sharpness of the region, 0 when it is too small to convolve.
pub fn edge_energy(image: &RgbImage, bounds: PixelBounds) -> f32 {
    let PixelBounds {
        x: x0,
        y: y0,
        width,
        height,
    } = bounds;
    if width < 3 || height < 3 {
        return 0.0;
    }

    let luma: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::from_fn(width, height, |x, y| {
        Luma([luminance(image.get_pixel(x0 + x, y0 + y).0) / 255.0])
    });
    let response: ImageBuffer<Luma<f32>, Vec<f32>> = filter3x3(&luma, &LAPLACIAN_8);

    // Border pixels see padded neighbours and are skipped.
    let mut total = 0.0f64;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            total += response.get_pixel(x, y).0[0].abs().min(1.0) as f64;
        }
    }

    (total / (width as f64 * height as f64)) as f32
}
