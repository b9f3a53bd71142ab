//! Synthetic frames and scripted measurements
//!
//! Frames imitate what a phone camera sees during capture: a light card with
//! dark text strokes on a darker desk, a multi-hue hologram glint, or a
//! blown-out specular reflection. Metric presets feed the scorers directly,
//! bypassing pixel analysis.

use crate::quality::ID1_ASPECT;
use crate::types::{Frame, FrameMetrics, MotionSample, Rect};
use image::{Rgb, RgbImage};

const DESK: Rgb<u8> = Rgb([60, 58, 55]);
const CARD: Rgb<u8> = Rgb([200, 195, 180]);
const INK: Rgb<u8> = Rgb([30, 30, 40]);

/// Hues of a diffraction glint, one per 60-degree bin.
pub const GLINT_HUES: [[u8; 3]; 6] = [
    [255, 40, 40],
    [250, 230, 40],
    [40, 240, 60],
    [40, 230, 240],
    [50, 60, 255],
    [240, 50, 230],
];

/// Uniform frame.
pub fn blank_frame(width: u32, height: u32, rgb: [u8; 3], timestamp: f64) -> Frame {
    Frame::from_rgb_image(RgbImage::from_pixel(width, height, Rgb(rgb)), timestamp)
}

/// Centred ID-1 card spanning `width_fraction` of the frame width.
pub fn card_rect(width: u32, height: u32, width_fraction: f32) -> Rect {
    let w = width as f32 * width_fraction;
    let h = w / ID1_ASPECT;
    Rect::new(
        (width as f32 - w) / 2.0,
        (height as f32 - h) / 2.0,
        w,
        h,
    )
}

fn draw_card(image: &mut RgbImage, card: Rect, with_mrz: bool) {
    let (w, h) = image.dimensions();
    let x0 = card.x.max(0.0) as u32;
    let y0 = card.y.max(0.0) as u32;
    let x1 = (card.max_x() as u32).min(w);
    let y1 = (card.max_y() as u32).min(h);

    for y in y0..y1 {
        for x in x0..x1 {
            image.put_pixel(x, y, CARD);
        }
    }

    // Text strokes: short dark bars on regular rows.
    let cw = x1.saturating_sub(x0).max(1);
    let ch = y1.saturating_sub(y0).max(1);
    let row_step = (ch / 10).max(4);
    let text_rows = if with_mrz { ch * 6 / 10 } else { ch * 9 / 10 };
    let mut y = y0 + row_step;
    while y + 2 < y0 + text_rows {
        let mut x = x0 + cw / 20;
        while x + 6 < x1.saturating_sub(cw / 20) {
            for dy in 0..2 {
                for dx in 0..4 {
                    image.put_pixel(x + dx, y + dy, INK);
                }
            }
            x += 7;
        }
        y += row_step;
    }

    if with_mrz {
        // Dense bottom rows standing in for MRZ lines.
        let mut y = y0 + ch * 7 / 10;
        while y + 3 < y1.saturating_sub(2) {
            for x in (x0 + cw / 20)..x1.saturating_sub(cw / 20) {
                if x % 3 != 0 {
                    image.put_pixel(x, y, INK);
                    image.put_pixel(x, y + 1, INK);
                }
            }
            y += 6;
        }
    }
}

/// A card with printed text lying on a desk.
pub fn card_frame(width: u32, height: u32, card: Rect, timestamp: f64) -> Frame {
    let mut image = RgbImage::from_pixel(width, height, DESK);
    draw_card(&mut image, card, false);
    Frame::from_rgb_image(image, timestamp)
}

/// Back face of a card with MRZ-like rows at the bottom.
pub fn card_back_frame(width: u32, height: u32, card: Rect, timestamp: f64) -> Frame {
    let mut image = RgbImage::from_pixel(width, height, DESK);
    draw_card(&mut image, card, true);
    Frame::from_rgb_image(image, timestamp)
}

/// A card with a multi-hue glint patch of `patch` pixels near its centre.
pub fn glint_frame(width: u32, height: u32, patch: u32, timestamp: f64) -> Frame {
    let mut image = RgbImage::from_pixel(width, height, DESK);
    let card = card_rect(width, height, 0.8);
    draw_card(&mut image, card, false);

    let cx = width / 2;
    let cy = height / 2;
    let x0 = cx.saturating_sub(patch / 2);
    let y0 = cy.saturating_sub(patch / 2);
    let stripe = (patch / GLINT_HUES.len() as u32).max(1);
    for y in y0..(y0 + patch).min(height) {
        for x in x0..(x0 + patch).min(width) {
            let band = (((x - x0) / stripe) as usize).min(GLINT_HUES.len() - 1);
            image.put_pixel(x, y, Rgb(GLINT_HUES[band]));
        }
    }
    Frame::from_rgb_image(image, timestamp)
}

/// Near-white specular blow-out across most of the frame.
pub fn white_out_frame(width: u32, height: u32, timestamp: f64) -> Frame {
    blank_frame(width, height, [250, 248, 246], timestamp)
}

/// Measurements of a well-framed, sharp card (ID-1 aspect, 95 % coverage).
pub fn ready_metrics() -> FrameMetrics {
    FrameMetrics {
        sharpness: 0.02,
        coverage: 0.95,
        aspect_ratio: 0.63,
        brightness: 0.7,
        chroma: 0.04,
        white_out: false,
        glare: 0.01,
        rainbow_score: 0.01,
        hue_bins_present: 1,
        rectangle_present: true,
    }
}

/// Measurements with no document in view.
pub fn empty_metrics() -> FrameMetrics {
    FrameMetrics {
        sharpness: 0.001,
        brightness: 0.3,
        ..FrameMetrics::default()
    }
}

/// Hologram-step frame before any glint: the usual baseline.
pub fn ovd_baseline_metrics() -> FrameMetrics {
    FrameMetrics {
        rainbow_score: 0.01,
        chroma: 0.01,
        hue_bins_present: 1,
        brightness: 0.6,
        glare: 0.02,
        ..FrameMetrics::default()
    }
}

/// Hologram-step frame showing a clear multi-hue glint.
pub fn ovd_glint_metrics() -> FrameMetrics {
    FrameMetrics {
        rainbow_score: 0.06,
        chroma: 0.03,
        hue_bins_present: 5,
        brightness: 0.75,
        glare: 0.04,
        ..FrameMetrics::default()
    }
}

/// Blown-out frame with a deceptively high rainbow score.
pub fn ovd_white_out_metrics() -> FrameMetrics {
    FrameMetrics {
        rainbow_score: 0.2,
        chroma: 0.05,
        hue_bins_present: 6,
        brightness: 0.95,
        white_out: true,
        glare: 0.8,
        ..FrameMetrics::default()
    }
}

pub fn still_sample() -> MotionSample {
    MotionSample::new([0.01, 0.01, 0.02], [0.002, 0.001, 0.002])
}

pub fn shaking_sample() -> MotionSample {
    MotionSample::new([0.7, 0.5, 0.2], [0.06, 0.04, 0.03])
}
