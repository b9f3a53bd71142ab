//! Post-capture shot preparation
//!
//! A raw photo is cropped to the guide, rectified when the detector finds a
//! document that fills a reasonable share of the crop, turned right side up
//! on the back face, and JPEG-encoded for the verifier.

use crate::config::IdCaptureConfig;
use crate::errors::CaptureError;
use crate::mrz::{count_chevrons, lower_band, upper_band};
use crate::platform::{RectangleDetector, RectangleQuery, TextRecognizer};
use crate::quality::{guide_roi, PixelBounds, ID1_ASPECT};
use crate::types::{CaptureStep, Frame, Quadrilateral, RecognitionSpeed, Rect, Shot};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use std::sync::Arc;

/// Band height used when comparing chevrons at the top and bottom of a back shot.
const ORIENTATION_BAND: f32 = 0.35;
/// Extra chevrons the top band needs before the shot is treated as upside down.
const UPSIDE_DOWN_MARGIN: usize = 12;

/// Collaborators and settings needed to turn a photo into a [`Shot`].
#[derive(Clone)]
pub struct ShotPreparer {
    detector: Arc<dyn RectangleDetector>,
    recognizer: Arc<dyn TextRecognizer>,
    config: IdCaptureConfig,
}

impl ShotPreparer {
    pub fn new(
        detector: Arc<dyn RectangleDetector>,
        recognizer: Arc<dyn TextRecognizer>,
        config: IdCaptureConfig,
    ) -> Self {
        Self {
            detector,
            recognizer,
            config,
        }
    }

    pub fn prepare(&self, step: CaptureStep, photo: &Frame) -> Result<Shot, CaptureError> {
        let image = photo
            .to_rgb_image()
            .ok_or_else(|| CaptureError::PhotoUnavailable("photo buffer is empty".to_string()))?;

        let roi = guide_roi(image.width(), image.height(), &self.config.guide);
        let cropped = crop_to(&image, roi);
        let crop_frame = Frame::from_rgb_image(cropped.clone(), photo.timestamp);

        let query = RectangleQuery::from(&self.config.detector);
        let quad = match self.detector.detect(&crop_frame, None, &query) {
            Ok(quad) => quad,
            Err(e) => {
                log::warn!("Rectangle detection on {} shot failed: {}", step, e);
                None
            }
        };

        let (mut shot_image, rectified) = match quad {
            Some(q) if covers_enough(&q, &cropped, self.config.detector.min_rectify_area_ratio) => {
                match rectify(&cropped, &q) {
                    Some(warped) => (warped, true),
                    None => (cropped, false),
                }
            }
            _ => (cropped, false),
        };

        let mut rotated = false;
        if step == CaptureStep::Back && self.is_upside_down(&shot_image, photo.timestamp) {
            shot_image = imageops::rotate180(&shot_image);
            rotated = true;
        }

        let jpeg = encode_jpeg(&shot_image, self.config.flow.jpeg_quality)?;
        log::info!(
            "Prepared {} shot {}x{} (rectified={}, rotated={}, {} bytes)",
            step,
            shot_image.width(),
            shot_image.height(),
            rectified,
            rotated,
            jpeg.len()
        );

        Ok(Shot {
            step,
            frame: Frame::from_rgb_image(shot_image, photo.timestamp),
            jpeg,
            rectified,
            rotated,
        })
    }

    /// MRZ chevrons sit at the bottom of an upright back face.
    fn is_upside_down(&self, image: &RgbImage, timestamp: f64) -> bool {
        let frame = Frame::from_rgb_image(image.clone(), timestamp);
        let bounds = frame.bounds();
        let top = self
            .recognizer
            .recognize(&frame, upper_band(bounds, ORIENTATION_BAND), RecognitionSpeed::Fast);
        let bottom = self
            .recognizer
            .recognize(&frame, lower_band(bounds, ORIENTATION_BAND), RecognitionSpeed::Fast);
        match (top, bottom) {
            (Ok(top), Ok(bottom)) => {
                let top = count_chevrons(&top);
                let bottom = count_chevrons(&bottom);
                log::debug!("Back orientation: top chevrons={} bottom chevrons={}", top, bottom);
                top >= bottom + UPSIDE_DOWN_MARGIN
            }
            (Err(e), _) | (_, Err(e)) => {
                log::warn!("Orientation check skipped: {}", e);
                false
            }
        }
    }
}

/// Crop to `roi`; the whole image when the ROI does not intersect it.
pub fn crop_to(image: &RgbImage, roi: Rect) -> RgbImage {
    match PixelBounds::within(roi, image.width(), image.height()) {
        Some(b) => imageops::crop_imm(image, b.x, b.y, b.width, b.height).to_image(),
        None => image.clone(),
    }
}

fn covers_enough(quad: &Quadrilateral, image: &RgbImage, min_ratio: f32) -> bool {
    let crop_area = image.width() as f32 * image.height() as f32;
    if crop_area <= 0.0 {
        return false;
    }
    let bbox = quad
        .bounding_box()
        .intersection(&Rect::full(image.width(), image.height()));
    bbox.area() / crop_area >= min_ratio
}

/// Warp `quad` to an upright ID-1 rectangle whose long side matches the
/// image's long side. `None` when the corners do not define a projection.
pub fn rectify(image: &RgbImage, quad: &Quadrilateral) -> Option<RgbImage> {
    if quad.aspect_ratio() <= 0.0 {
        return None;
    }
    let long = image.width().max(image.height()) as f32;
    let short = (long / ID1_ASPECT).round();
    let (quad_w, quad_h) = quad.side_lengths();
    let (out_w, out_h) = if quad_w >= quad_h {
        (long, short)
    } else {
        (short, long)
    };
    if out_w < 1.0 || out_h < 1.0 {
        return None;
    }

    let from = quad.corners().map(|p| (p.x, p.y));
    let to = [(0.0, 0.0), (out_w, 0.0), (out_w, out_h), (0.0, out_h)];
    let projection = Projection::from_control_points(from, to)?;

    let mut output = RgbImage::new(out_w as u32, out_h as u32);
    warp_into(
        image,
        &projection,
        Interpolation::Bilinear,
        Rgb([0, 0, 0]),
        &mut output,
    );
    Some(output)
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Bytes, CaptureError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    DynamicImage::ImageRgb8(image.clone()).write_with_encoder(encoder)?;
    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;

    #[test]
    fn test_rectify_axis_aligned_quad() {
        let image = RgbImage::from_fn(400, 300, |x, y| {
            if (50..350).contains(&x) && (60..250).contains(&y) {
                Rgb([200, 180, 160])
            } else {
                Rgb([10, 10, 10])
            }
        });
        let quad = Quadrilateral::from_rect(Rect::new(50.0, 60.0, 300.0, 190.0), 0.9);
        let out = rectify(&image, &quad).unwrap();
        assert_eq!(out.width(), 400);
        assert_eq!(out.height(), (400.0 / ID1_ASPECT).round() as u32);
        let centre = out.get_pixel(200, 126);
        assert_eq!(centre.0, [200, 180, 160]);
    }

    #[test]
    fn test_collapsed_quad_is_not_rectified() {
        let image = RgbImage::new(100, 100);
        let p = Point::new(10.0, 10.0);
        let quad = Quadrilateral {
            top_left: p,
            top_right: p,
            bottom_right: p,
            bottom_left: p,
            confidence: 1.0,
        };
        assert!(rectify(&image, &quad).is_none());
    }

    #[test]
    fn test_small_quad_does_not_cover_enough() {
        let image = RgbImage::new(400, 300);
        let small = Quadrilateral::from_rect(Rect::new(0.0, 0.0, 100.0, 100.0), 0.9);
        let large = Quadrilateral::from_rect(Rect::new(0.0, 0.0, 300.0, 200.0), 0.9);
        assert!(!covers_enough(&small, &image, 0.25));
        assert!(covers_enough(&large, &image, 0.25));
    }

    #[test]
    fn test_crop_outside_falls_back_to_whole_image() {
        let image = RgbImage::new(50, 40);
        let cropped = crop_to(&image, Rect::new(100.0, 100.0, 10.0, 10.0));
        assert_eq!(cropped.dimensions(), (50, 40));
        let cropped = crop_to(&image, Rect::new(10.0, 10.0, 20.0, 10.0));
        assert_eq!(cropped.dimensions(), (20, 10));
    }

    #[test]
    fn test_jpeg_has_soi_marker() {
        let image = RgbImage::from_pixel(16, 16, Rgb([120, 60, 30]));
        let jpeg = encode_jpeg(&image, 90).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}
