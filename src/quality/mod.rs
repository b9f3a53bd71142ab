//! Frame metrics extraction
//!
//! Turns a frame and an analysis region into a [`FrameMetrics`] value:
//! edge-energy sharpness, mean-colour brightness/chroma/white-out, glare,
//! the localised multi-hue rainbow score and, when a document quad is known,
//! its aspect ratio and coverage of the guide.
//!
//! Everything here is a pure function of its inputs except
//! [`MetricsExtractor::measure`], which first asks the rectangle detector
//! for a quad. Degenerate regions and short buffers yield zeroed metrics.

pub mod color;
pub mod geometry;
pub mod rainbow;
pub mod sharpness;

pub use color::{color_metrics, glare_fraction, ColorMetrics};
pub use geometry::{default_roi, guide_roi, ovd_roi, ID1_ASPECT};
pub use rainbow::{max_over_windows, rainbow_score, RainbowScore};
pub use sharpness::edge_energy;

use crate::config::DetectorConfig;
use crate::platform::{RectangleDetector, RectangleQuery};
use crate::types::{Frame, FrameMetrics, Quadrilateral, Rect};
use image::RgbImage;
use std::sync::Arc;

/// Integer pixel region guaranteed to lie inside its image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelBounds {
    /// Clamp `rect` into a `width` x `height` image; `None` if nothing is left.
    pub fn within(rect: Rect, width: u32, height: u32) -> Option<Self> {
        let (x, y, w, h) = rect.clamp_to(width, height).to_pixel_bounds()?;
        let w = w.min(width.saturating_sub(x));
        let h = h.min(height.saturating_sub(y));
        if w == 0 || h == 0 {
            return None;
        }
        Some(Self {
            x,
            y,
            width: w,
            height: h,
        })
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Measure `roi` of `frame` given an already-detected quad.
pub fn measure_with_quad(frame: &Frame, roi: Rect, quad: Option<&Quadrilateral>) -> FrameMetrics {
    if roi.is_degenerate() {
        return FrameMetrics::default();
    }
    let Some(image) = frame.to_rgb_image() else {
        return FrameMetrics::default();
    };
    measure_image(&image, roi, quad)
}

pub(crate) fn measure_image(
    image: &RgbImage,
    roi: Rect,
    quad: Option<&Quadrilateral>,
) -> FrameMetrics {
    let Some(bounds) = PixelBounds::within(roi, image.width(), image.height()) else {
        return FrameMetrics::default();
    };

    let color = color_metrics(image, bounds);
    let rainbow = max_over_windows(image, roi);

    let (aspect_ratio, coverage) = match quad {
        Some(q) => (q.aspect_ratio(), geometry::coverage(q, &roi)),
        None => (0.0, 0.0),
    };

    FrameMetrics {
        sharpness: edge_energy(image, bounds),
        coverage,
        aspect_ratio,
        brightness: color.brightness,
        chroma: color.chroma,
        white_out: color.white_out,
        glare: glare_fraction(image, bounds),
        rainbow_score: rainbow.score,
        hue_bins_present: rainbow.bins_present,
        rectangle_present: quad.is_some(),
    }
}

/// Metrics extractor bound to a rectangle detector.
#[derive(Clone)]
pub struct MetricsExtractor {
    detector: Arc<dyn RectangleDetector>,
    query: RectangleQuery,
}

impl MetricsExtractor {
    pub fn new(detector: Arc<dyn RectangleDetector>, config: &DetectorConfig) -> Self {
        Self {
            detector,
            query: RectangleQuery::from(config),
        }
    }

    /// Document quad, searching the guide first and the whole frame second.
    pub fn detect_quad(&self, frame: &Frame, roi: Rect) -> Option<Quadrilateral> {
        let attempts = [Some(roi), None];
        for region in attempts {
            match self.detector.detect(frame, region, &self.query) {
                Ok(Some(quad)) => return Some(quad),
                Ok(None) => {}
                Err(e) => {
                    log::debug!("Rectangle detection failed: {}", e);
                    return None;
                }
            }
        }
        None
    }

    /// Front/back measurement inside the guide ROI.
    pub fn measure(&self, frame: &Frame, roi: Rect) -> FrameMetrics {
        if roi.is_degenerate() || !frame.is_valid() {
            return FrameMetrics::default();
        }
        let quad = self.detect_quad(frame, roi);
        measure_with_quad(frame, roi, quad.as_ref())
    }

    /// Hologram-step measurement over the wide centre region; no quad needed.
    pub fn measure_ovd(&self, frame: &Frame) -> FrameMetrics {
        measure_with_quad(frame, ovd_roi(frame.width, frame.height), None)
    }
}
