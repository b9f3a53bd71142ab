//! Core value types shared by the scorers, the flow machine and the
//! platform collaborators.

use bytes::Bytes;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which face of the document the flow is currently photographing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStep {
    Front,
    Ovd,
    Back,
}

impl CaptureStep {
    /// Step that follows a verified shot, `None` once the back face is done.
    pub fn next(self, ovd_enabled: bool) -> Option<CaptureStep> {
        match self {
            CaptureStep::Front if ovd_enabled => Some(CaptureStep::Ovd),
            CaptureStep::Front => Some(CaptureStep::Back),
            CaptureStep::Ovd => Some(CaptureStep::Back),
            CaptureStep::Back => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureStep::Front => "front",
            CaptureStep::Ovd => "ovd",
            CaptureStep::Back => "back",
        }
    }
}

impl fmt::Display for CaptureStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point in image pixel space (origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned rectangle in image pixel space (origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whole-frame rectangle.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        if self.is_degenerate() {
            0.0
        } else {
            self.width * self.height
        }
    }

    /// Zero or negative extent, or non-finite coordinates.
    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
            || !self.x.is_finite()
            || !self.y.is_finite()
            || !self.width.is_finite()
            || !self.height.is_finite()
    }

    /// Overlap of two rectangles; an empty rect when they do not intersect.
    pub fn intersection(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.max_x().min(other.max_x());
        let y1 = self.max_y().min(other.max_y());
        if x1 <= x0 || y1 <= y0 {
            return Rect::default();
        }
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Shrink by a fraction of width/height on each side.
    pub fn inset_fraction(&self, fx: f32, fy: f32) -> Rect {
        let dx = self.width * fx;
        let dy = self.height * fy;
        Rect::new(
            self.x + dx,
            self.y + dy,
            self.width - 2.0 * dx,
            self.height - 2.0 * dy,
        )
    }

    /// Clamp to the bounds of a `width` x `height` image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Rect {
        self.intersection(&Rect::full(width, height))
    }

    /// Integer pixel bounds `(x, y, w, h)`, rounded outward like a CG integral rect.
    pub fn to_pixel_bounds(&self) -> Option<(u32, u32, u32, u32)> {
        if self.is_degenerate() {
            return None;
        }
        let x0 = self.x.floor().max(0.0);
        let y0 = self.y.floor().max(0.0);
        let x1 = self.max_x().ceil();
        let y1 = self.max_y().ceil();
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Document corners as reported by the rectangle detector, in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quadrilateral {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_right: Point,
    pub bottom_left: Point,
    pub confidence: f32,
}

impl Quadrilateral {
    /// Axis-aligned quad covering `rect`.
    pub fn from_rect(rect: Rect, confidence: f32) -> Self {
        Self {
            top_left: Point::new(rect.x, rect.y),
            top_right: Point::new(rect.max_x(), rect.y),
            bottom_right: Point::new(rect.max_x(), rect.max_y()),
            bottom_left: Point::new(rect.x, rect.max_y()),
            confidence,
        }
    }

    /// Averaged opposite-side lengths `(width, height)`.
    pub fn side_lengths(&self) -> (f32, f32) {
        let w = (self.top_left.distance(&self.top_right)
            + self.bottom_left.distance(&self.bottom_right))
            / 2.0;
        let h = (self.top_left.distance(&self.bottom_left)
            + self.top_right.distance(&self.bottom_right))
            / 2.0;
        (w, h)
    }

    /// Short side over long side, 0 for a collapsed quad.
    pub fn aspect_ratio(&self) -> f32 {
        let (w, h) = self.side_lengths();
        let long = w.max(h);
        if long <= 0.0 {
            0.0
        } else {
            w.min(h) / long
        }
    }

    pub fn bounding_box(&self) -> Rect {
        let xs = [
            self.top_left.x,
            self.top_right.x,
            self.bottom_right.x,
            self.bottom_left.x,
        ];
        let ys = [
            self.top_left.y,
            self.top_right.y,
            self.bottom_right.y,
            self.bottom_left.y,
        ];
        let min_x = xs.iter().cloned().fold(f32::INFINITY, f32::min);
        let max_x = xs.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let min_y = ys.iter().cloned().fold(f32::INFINITY, f32::min);
        let max_y = ys.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Shift every corner, used when a quad was detected inside a crop.
    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        let shift = |p: Point| Point::new(p.x + dx, p.y + dy);
        Self {
            top_left: shift(self.top_left),
            top_right: shift(self.top_right),
            bottom_right: shift(self.bottom_right),
            bottom_left: shift(self.bottom_left),
            confidence: self.confidence,
        }
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }
}

/// A camera frame as packed RGB24, stamped with flow time in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub timestamp: f64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp: f64) -> Self {
        Self {
            width,
            height,
            data,
            timestamp,
        }
    }

    /// Buffer is non-empty and large enough for its declared dimensions.
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() >= (self.width as usize) * (self.height as usize) * 3
    }

    pub fn bounds(&self) -> Rect {
        Rect::full(self.width, self.height)
    }

    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        if !self.is_valid() {
            return None;
        }
        let len = (self.width as usize) * (self.height as usize) * 3;
        RgbImage::from_raw(self.width, self.height, self.data[..len].to_vec())
    }

    pub fn from_rgb_image(image: RgbImage, timestamp: f64) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, timestamp)
    }
}

/// Per-frame measurements. Created fresh each cycle and discarded after scoring.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub sharpness: f32,
    pub coverage: f32,
    pub aspect_ratio: f32,
    pub brightness: f32,
    pub chroma: f32,
    pub white_out: bool,
    pub glare: f32,
    pub rainbow_score: f32,
    pub hue_bins_present: u8,
    pub rectangle_present: bool,
}

/// One device-motion reading in rad/s and g.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionSample {
    pub rotation_rate: [f64; 3],
    pub user_acceleration: [f64; 3],
}

impl MotionSample {
    pub fn new(rotation_rate: [f64; 3], user_acceleration: [f64; 3]) -> Self {
        Self {
            rotation_rate,
            user_acceleration,
        }
    }

    pub fn rotation_magnitude(&self) -> f64 {
        self.rotation_rate.iter().map(|v| v.abs()).sum()
    }

    pub fn acceleration_magnitude(&self) -> f64 {
        self.user_acceleration.iter().map(|v| v.abs()).sum()
    }
}

/// Recognition level requested from the text recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionSpeed {
    Fast,
    Accurate,
}

/// A cropped/rectified still for one step. Replaced on retry, never mutated.
#[derive(Debug, Clone)]
pub struct Shot {
    pub step: CaptureStep,
    pub frame: Frame,
    pub jpeg: Bytes,
    pub rectified: bool,
    pub rotated: bool,
}

/// Result reported by the upload/OCR collaborator for one shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VerificationOutcome {
    Accepted { fields: BTreeMap<String, String> },
    Rejected { reason: String },
}

impl VerificationOutcome {
    pub fn accepted() -> Self {
        VerificationOutcome::Accepted {
            fields: BTreeMap::new(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        VerificationOutcome::Rejected {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_sequence() {
        assert_eq!(CaptureStep::Front.next(true), Some(CaptureStep::Ovd));
        assert_eq!(CaptureStep::Front.next(false), Some(CaptureStep::Back));
        assert_eq!(CaptureStep::Ovd.next(true), Some(CaptureStep::Back));
        assert_eq!(CaptureStep::Back.next(true), None);
    }

    #[test]
    fn test_rect_intersection() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        let b = Rect::new(50.0, 50.0, 100.0, 100.0);
        let i = a.intersection(&b);
        assert_eq!(i, Rect::new(50.0, 50.0, 50.0, 50.0));
        assert_eq!(a.intersection(&Rect::new(200.0, 0.0, 10.0, 10.0)).area(), 0.0);
    }

    #[test]
    fn test_degenerate_rect() {
        assert!(Rect::new(0.0, 0.0, 0.0, 10.0).is_degenerate());
        assert!(Rect::new(0.0, 0.0, -5.0, 10.0).is_degenerate());
        assert!(Rect::new(f32::NAN, 0.0, 5.0, 10.0).is_degenerate());
        assert_eq!(Rect::new(0.0, 0.0, -5.0, 10.0).area(), 0.0);
        assert!(Rect::new(0.0, 0.0, -5.0, 10.0).to_pixel_bounds().is_none());
    }

    #[test]
    fn test_quad_aspect_ratio() {
        let quad = Quadrilateral::from_rect(Rect::new(10.0, 10.0, 856.0, 540.0), 0.9);
        let ratio = quad.aspect_ratio();
        assert!((ratio - 540.0 / 856.0).abs() < 1e-4);
        assert_eq!(quad.bounding_box(), Rect::new(10.0, 10.0, 856.0, 540.0));
    }

    #[test]
    fn test_frame_validity() {
        assert!(Frame::new(vec![0; 12], 2, 2, 0.0).is_valid());
        assert!(!Frame::new(vec![0; 11], 2, 2, 0.0).is_valid());
        assert!(!Frame::new(vec![], 0, 0, 0.0).is_valid());
    }
}
