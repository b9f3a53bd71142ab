//! Document geometry against the on-screen guide
//!
//! The guide is drawn in view space over an aspect-fill preview, so mapping
//! it into image space undoes the fill scale and centring offsets.

use crate::config::GuideConfig;
use crate::types::{Quadrilateral, Rect};

/// ID-1 card outline, 85.6 mm x 54 mm.
pub const ID1_ASPECT: f32 = 85.6 / 54.0;

/// Fraction of the guide covered by the document's bounding box.
pub fn coverage(quad: &Quadrilateral, guide: &Rect) -> f32 {
    let guide_area = guide.area();
    if guide_area <= 0.0 {
        return 0.0;
    }
    quad.bounding_box().intersection(guide).area() / guide_area.max(1.0)
}

/// Guide rectangle in view coordinates for a `view_w` x `view_h` preview.
pub fn guide_in_view(view_w: f32, view_h: f32, config: &GuideConfig) -> Rect {
    let mut width = view_w - 2.0 * config.margin;
    let mut height = width / ID1_ASPECT;
    let max_height = view_h * config.max_height_fraction;
    if height > max_height {
        height = max_height;
        width = height * ID1_ASPECT;
    }
    Rect::new((view_w - width) / 2.0, (view_h - height) / 2.0, width, height)
}

/// Map a view-space rect into image space for an aspect-fill preview.
pub fn view_to_image(view_rect: Rect, view_w: f32, view_h: f32, img_w: u32, img_h: u32) -> Rect {
    if img_w == 0 || img_h == 0 || view_w <= 0.0 || view_h <= 0.0 {
        return Rect::default();
    }
    let iw = img_w as f32;
    let ih = img_h as f32;
    let scale = (view_w / iw).max(view_h / ih);
    let offset_x = (view_w - iw * scale) / 2.0;
    let offset_y = (view_h - ih * scale) / 2.0;

    let mapped = Rect::new(
        (view_rect.x - offset_x) / scale,
        (view_rect.y - offset_y) / scale,
        view_rect.width / scale,
        view_rect.height / scale,
    );
    // Integral, like the preview layer's own conversion.
    let x0 = mapped.x.floor();
    let y0 = mapped.y.floor();
    let integral = Rect::new(
        x0,
        y0,
        (mapped.max_x().ceil() - x0).max(0.0),
        (mapped.max_y().ceil() - y0).max(0.0),
    );
    integral.clamp_to(img_w, img_h)
}

/// Centred ID-1 rectangle spanning `width_fraction` of the frame width.
pub fn default_roi(img_w: u32, img_h: u32, width_fraction: f32) -> Rect {
    let iw = img_w as f32;
    let ih = img_h as f32;
    let width = iw * width_fraction;
    let height = width / ID1_ASPECT;
    Rect::new((iw - width) / 2.0, (ih - height) / 2.0, width, height).clamp_to(img_w, img_h)
}

/// Guide ROI in image space: mapped from the view when one is configured,
/// otherwise the default centred rectangle.
pub fn guide_roi(img_w: u32, img_h: u32, config: &GuideConfig) -> Rect {
    match (config.view_width, config.view_height) {
        (Some(vw), Some(vh)) if vw > 0.0 && vh > 0.0 => {
            let mapped = view_to_image(guide_in_view(vw, vh, config), vw, vh, img_w, img_h);
            if mapped.is_degenerate() {
                default_roi(img_w, img_h, config.default_width_fraction)
            } else {
                mapped
            }
        }
        _ => default_roi(img_w, img_h, config.default_width_fraction),
    }
}

/// Wide centre region used by the hologram step.
pub fn ovd_roi(img_w: u32, img_h: u32) -> Rect {
    Rect::full(img_w, img_h).inset_fraction(0.10, 0.18)
}
