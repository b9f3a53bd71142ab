//! Frame metric extraction on synthetic camera frames
//!
//! Covers the measurements the scorers depend on:
//! - Edge-energy sharpness
//! - White-out and glare detection
//! - Localised multi-hue rainbow scoring
//! - Guide geometry and detector fallbacks

use idcapture::config::{DetectorConfig, GuideConfig};
use idcapture::quality::geometry::{guide_in_view, view_to_image};
use idcapture::quality::{
    default_roi, guide_roi, measure_with_quad, ovd_roi, MetricsExtractor, ID1_ASPECT,
};
use idcapture::testing::{
    blank_frame, card_frame, card_rect, glint_frame, white_out_frame, DetectorMode,
    ScriptedDetector,
};
use idcapture::types::{Quadrilateral, Rect};
use std::sync::Arc;

const W: u32 = 640;
const H: u32 = 360;

fn guide() -> Rect {
    default_roi(W, H, 0.6)
}

// ═══════════════════════════════════════════════════════════════════════════
// PIXEL METRICS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_printed_card_is_sharp_and_blank_is_not() {
    let card = card_frame(W, H, card_rect(W, H, 0.8), 0.0);
    let blank = blank_frame(W, H, [200, 195, 180], 0.0);

    let card_metrics = measure_with_quad(&card, guide(), None);
    let blank_metrics = measure_with_quad(&blank, guide(), None);

    assert!(blank_metrics.sharpness < 1e-5);
    assert!(
        card_metrics.sharpness > 0.0035,
        "printed text should clear the base floor, got {}",
        card_metrics.sharpness
    );
}

#[test]
fn test_white_out_frame_is_flagged() {
    let metrics = measure_with_quad(&white_out_frame(W, H, 0.0), guide(), None);
    assert!(metrics.white_out);
    assert!(metrics.brightness > 0.95);
    assert!((metrics.glare - 1.0).abs() < 1e-6);
}

#[test]
fn test_card_is_not_white_out() {
    let card = card_frame(W, H, card_rect(W, H, 0.8), 0.0);
    let metrics = measure_with_quad(&card, guide(), None);
    assert!(!metrics.white_out);
    assert_eq!(metrics.glare, 0.0);
}

#[test]
fn test_glint_scores_rainbow_and_plain_card_does_not() {
    let roi = ovd_roi(W, H);
    let glint = measure_with_quad(&glint_frame(W, H, 120, 0.0), roi, None);
    let plain = measure_with_quad(&card_frame(W, H, card_rect(W, H, 0.8), 0.0), roi, None);

    assert!(glint.hue_bins_present >= 4, "bins = {}", glint.hue_bins_present);
    assert!(glint.rainbow_score > 0.055, "score = {}", glint.rainbow_score);
    assert_eq!(plain.rainbow_score, 0.0);
    assert_eq!(plain.hue_bins_present, 0);
}

#[test]
fn test_small_glint_survives_window_scan() {
    // A glint covering a few percent of the region still registers because
    // the best sub-window is used rather than the whole-region average.
    let roi = ovd_roi(W, H);
    let metrics = measure_with_quad(&glint_frame(W, H, 60, 0.0), roi, None);
    assert!(metrics.hue_bins_present >= 3);
    assert!(metrics.rainbow_score > 0.0);
}

#[test]
fn test_quad_geometry_feeds_coverage_and_aspect() {
    let frame = card_frame(W, H, card_rect(W, H, 0.8), 0.0);
    let roi = guide();
    let half = Rect::new(roi.x, roi.y, roi.width / 2.0, roi.height);
    let metrics = measure_with_quad(&frame, roi, Some(&Quadrilateral::from_rect(half, 0.9)));
    assert!(metrics.rectangle_present);
    assert!((metrics.coverage - 0.5).abs() < 0.01);
    assert!(metrics.aspect_ratio > 0.75);
}

// ═══════════════════════════════════════════════════════════════════════════
// EXTRACTOR WITH DETECTOR
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_extractor_uses_detected_quad() {
    let detector = Arc::new(ScriptedDetector::new(DetectorMode::FillRegion { inset: 0.0 }));
    let extractor = MetricsExtractor::new(detector.clone(), &DetectorConfig::default());
    let frame = card_frame(W, H, card_rect(W, H, 0.8), 0.0);

    let metrics = extractor.measure(&frame, guide());
    assert!(metrics.rectangle_present);
    assert!((metrics.coverage - 1.0).abs() < 1e-3);
    assert!((metrics.aspect_ratio - 1.0 / ID1_ASPECT).abs() < 0.01);
    assert_eq!(detector.calls(), 1);
}

#[test]
fn test_extractor_falls_back_to_full_frame() {
    let detector = Arc::new(ScriptedDetector::new(DetectorMode::None));
    let extractor = MetricsExtractor::new(detector.clone(), &DetectorConfig::default());
    let frame = card_frame(W, H, card_rect(W, H, 0.8), 0.0);

    let metrics = extractor.measure(&frame, guide());
    assert!(!metrics.rectangle_present);
    assert_eq!(metrics.coverage, 0.0);
    // Guide first, then the whole frame.
    assert_eq!(detector.calls(), 2);
}

#[test]
fn test_ovd_measurement_skips_detector() {
    let detector = Arc::new(ScriptedDetector::new(DetectorMode::FillRegion { inset: 0.0 }));
    let extractor = MetricsExtractor::new(detector.clone(), &DetectorConfig::default());
    let metrics = extractor.measure_ovd(&glint_frame(W, H, 120, 0.0));
    assert!(!metrics.rectangle_present);
    assert!(metrics.rainbow_score > 0.0);
    assert_eq!(detector.calls(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// GUIDE GEOMETRY
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_default_roi_is_centred_id1() {
    let roi = default_roi(1280, 720, 0.6);
    assert!((roi.width - 768.0).abs() < 1e-3);
    assert!((roi.width / roi.height - ID1_ASPECT).abs() < 1e-3);
    assert!((roi.center().x - 640.0).abs() < 1e-3);
    assert!((roi.center().y - 360.0).abs() < 1e-3);
}

#[test]
fn test_portrait_view_guide_maps_inside_image() {
    let config = GuideConfig {
        view_width: Some(390.0),
        view_height: Some(844.0),
        ..GuideConfig::default()
    };
    let roi = guide_roi(1080, 1920, &config);
    assert!(roi.x >= 0.0 && roi.y >= 0.0);
    assert!(roi.max_x() <= 1080.0 && roi.max_y() <= 1920.0);
    assert!((roi.width / roi.height - ID1_ASPECT).abs() < 0.01);
    // Integral after mapping.
    assert_eq!(roi.x, roi.x.floor());
    assert_eq!(roi.width, roi.width.floor());
}

#[test]
fn test_guide_height_is_capped() {
    let config = GuideConfig::default();
    let guide = guide_in_view(1000.0, 400.0, &config);
    assert!((guide.height - 180.0).abs() < 1e-3);
    assert!((guide.width - 180.0 * ID1_ASPECT).abs() < 1e-2);
}

#[test]
fn test_view_mapping_undoes_aspect_fill() {
    // 2x scale, no cropping.
    let mapped = view_to_image(Rect::new(100.0, 50.0, 200.0, 100.0), 1280.0, 720.0, 640, 360);
    assert_eq!(mapped, Rect::new(50.0, 25.0, 100.0, 50.0));
}
