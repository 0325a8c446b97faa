// ============================================================================
// OVERLAY COMPOSITOR — bakes annotation callouts into an exportable raster
// ============================================================================
//
// The on-screen callouts are live widgets and cannot be captured by a raster
// export, so this pass redraws them in pixels: marker dot, edge-docked card,
// dashed elbow connector, texture swatch, and text.  Display adjustments are
// reapplied to the pixels first — the export cannot inherit display styling.

use ab_glyph::FontArc;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::ops::adjustments::{self, DisplayAdjustments};
use crate::ops::text;

/// Marker/card color when an annotation has no usable hex color.
const FALLBACK_COLOR: [u8; 3] = [255, 176, 46];
/// Swatch crop side as a divisor of the smaller image dimension.
const SWATCH_CROP_DIVISOR: f32 = 8.0;

/// A material/label callout anchored to a point on the image.  The position
/// is stored in percent so it survives any resize of the underlying pixels.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Annotation {
    pub x_pct: f32,
    pub y_pct: f32,
    pub name: String,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub hex_color: String,
}

/// Parse `#RRGGBB` (leading `#` optional). Anything else gets the fallback
/// accent so a bad color never hides a callout.
pub fn parse_hex_color(hex: &str) -> [u8; 3] {
    let hex = hex.trim().trim_start_matches('#');
    if hex.len() != 6 {
        return FALLBACK_COLOR;
    }
    match (
        u8::from_str_radix(&hex[0..2], 16),
        u8::from_str_radix(&hex[2..4], 16),
        u8::from_str_radix(&hex[4..6], 16),
    ) {
        (Ok(r), Ok(g), Ok(b)) => [r, g, b],
        _ => FALLBACK_COLOR,
    }
}

/// Flatten `base` plus all annotations into one raster.  `font` of None
/// draws everything except text (headless systems without fonts still get
/// markers, cards, connectors, and swatches).
pub fn compose_annotations(
    base: &RgbaImage,
    annotations: &[Annotation],
    font: Option<&FontArc>,
    adj: &DisplayAdjustments,
) -> RgbaImage {
    let mut out = adjustments::apply(base, adj);
    if out.width() == 0 || out.height() == 0 {
        return out;
    }

    for ann in annotations {
        draw_annotation(&mut out, base, ann, font, adj);
    }
    out
}

fn draw_annotation(
    out: &mut RgbaImage,
    base: &RgbaImage,
    ann: &Annotation,
    font: Option<&FontArc>,
    adj: &DisplayAdjustments,
) {
    let (w, h) = (out.width() as f32, out.height() as f32);
    let accent = parse_hex_color(&ann.hex_color);

    let anchor = (
        (ann.x_pct / 100.0 * w).clamp(0.0, w - 1.0),
        (ann.y_pct / 100.0 * h).clamp(0.0, h - 1.0),
    );

    let geo = CalloutGeometry::layout(w, h, ann.x_pct, ann.y_pct);

    // Connector first so the marker and card cover its endpoints.
    let conn = geo.connection_point();
    let bend = (anchor.0 + (conn.0 - anchor.0) * 0.5, anchor.1);
    draw_dashed_connector(out, anchor, bend, conn);

    // Anchor marker: filled dot with a contrasting outline.
    let marker_r = (w.min(h) * 0.012).clamp(5.0, 10.0);
    fill_circle(out, anchor, marker_r, [accent[0], accent[1], accent[2], 255]);
    stroke_circle(out, anchor, marker_r, 2.0, [255, 255, 255, 230]);

    // Card background and border.
    fill_rounded_rect(out, &geo.card, geo.radius, [18, 18, 26, 215]);
    stroke_rounded_rect(out, &geo.card, geo.radius, 1.5, [255, 255, 255, 80]);

    // Texture swatch cropped from the adjusted source pixels around the
    // anchor, at a fixed zoom relative to the smaller image dimension.
    let swatch_rect = geo.swatch_rect();
    draw_swatch(out, base, adj, anchor, &swatch_rect);

    let Some(font) = font else {
        return;
    };

    // Text column to the right of the swatch.
    let pad = geo.pad;
    let text_x = swatch_rect.x + swatch_rect.w + pad;
    let text_right = geo.card.x + geo.card.w - pad;
    let avail = (text_right - text_x).max(0.0);

    let title_size = (geo.card.h * 0.22).clamp(12.0, 22.0);
    let chip_h = (geo.card.h * 0.2).clamp(12.0, 20.0);
    let desc_size = (geo.card.h * 0.18).clamp(10.0, 16.0);

    let title_baseline = geo.card.y + pad + title_size;
    text::draw_line(
        out,
        font,
        &ann.name.to_uppercase(),
        title_size,
        (text_x, title_baseline),
        [255, 255, 255, 255],
        avail,
    );

    // Category chip: accent pill with the category inside.
    let chip_text_size = chip_h * 0.72;
    let (_, chip_text_w) = text::layout_line(font, &ann.category, chip_text_size);
    let chip_w = (chip_text_w + chip_h).min(avail);
    let chip = RectF {
        x: text_x,
        y: title_baseline + pad * 0.5,
        w: chip_w,
        h: chip_h,
    };
    fill_rounded_rect(out, &chip, chip_h * 0.5, [accent[0], accent[1], accent[2], 200]);
    text::draw_line(
        out,
        font,
        &ann.category,
        chip_text_size,
        (chip.x + chip_h * 0.5, chip.y + chip_h * 0.78),
        [20, 20, 24, 255],
        (chip.w - chip_h * 0.5).max(0.0),
    );

    let desc_baseline = chip.y + chip.h + pad * 0.5 + desc_size;
    if desc_baseline < geo.card.y + geo.card.h - pad * 0.3 {
        text::draw_line(
            out,
            font,
            &ann.description,
            desc_size,
            (text_x, desc_baseline),
            [200, 200, 205, 255],
            avail,
        );
    }
}

// ============================================================================
// Callout geometry
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
struct RectF {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
}

struct CalloutGeometry {
    card: RectF,
    /// Card corner radius.
    radius: f32,
    /// Inner card padding.
    pad: f32,
    /// True when the card sits on the left image edge.
    on_left: bool,
}

impl CalloutGeometry {
    /// Card placement: docked to the left or right edge depending on which
    /// side of center the anchor sits, vertically centered on the anchor
    /// and clamped to stay within the canvas.
    fn layout(w: f32, h: f32, x_pct: f32, y_pct: f32) -> Self {
        let margin = (w.min(h) * 0.02).clamp(8.0, 24.0);
        let card_w = (w * 0.26).clamp(120.0, 360.0).min(w * 0.45);
        let card_h = (card_w * 0.36).clamp(56.0, 140.0).min(h - 2.0 * margin);

        let on_left = x_pct < 50.0;
        let card_x = if on_left { margin } else { w - margin - card_w };
        let anchor_y = y_pct / 100.0 * h;
        let card_y = (anchor_y - card_h * 0.5).clamp(margin, (h - margin - card_h).max(margin));

        Self {
            card: RectF {
                x: card_x,
                y: card_y,
                w: card_w,
                h: card_h,
            },
            radius: card_h * 0.12,
            pad: card_h * 0.12,
            on_left,
        }
    }

    /// Where the connector meets the card: the middle of the side that
    /// faces the anchor.
    fn connection_point(&self) -> (f32, f32) {
        let y = self.card.y + self.card.h * 0.5;
        if self.on_left {
            (self.card.x + self.card.w, y)
        } else {
            (self.card.x, y)
        }
    }

    fn swatch_rect(&self) -> RectF {
        let side = self.card.h - 2.0 * self.pad;
        RectF {
            x: self.card.x + self.pad,
            y: self.card.y + self.pad,
            w: side,
            h: side,
        }
    }
}

fn draw_swatch(
    out: &mut RgbaImage,
    base: &RgbaImage,
    adj: &DisplayAdjustments,
    anchor: (f32, f32),
    dest: &RectF,
) {
    let (w, h) = (base.width(), base.height());
    let side = (w.min(h) as f32 / SWATCH_CROP_DIVISOR).max(4.0) as u32;
    let cx = (anchor.0 as u32).min(w.saturating_sub(1));
    let cy = (anchor.1 as u32).min(h.saturating_sub(1));
    let x0 = cx.saturating_sub(side / 2).min(w.saturating_sub(side));
    let y0 = cy.saturating_sub(side / 2).min(h.saturating_sub(side));

    let crop = image::imageops::crop_imm(base, x0, y0, side, side).to_image();
    let crop = adjustments::apply(&crop, adj);

    let dw = dest.w.max(1.0) as u32;
    let dh = dest.h.max(1.0) as u32;
    let scaled = image::imageops::resize(&crop, dw, dh, image::imageops::FilterType::Triangle);

    // Clip the blit into a rounded rect inside the card.
    let radius = (dest.w * 0.14).max(3.0);
    for sy in 0..dh {
        for sx in 0..dw {
            let px = dest.x + sx as f32 + 0.5;
            let py = dest.y + sy as f32 + 0.5;
            let d = sd_rounded_rect(px, py, dest, radius);
            let coverage = (0.5 - d).clamp(0.0, 1.0);
            if coverage > 0.0 {
                let src = scaled.get_pixel(sx, sy).0;
                blend(out, px as i32, py as i32, [src[0], src[1], src[2], 255], coverage);
            }
        }
    }
}

fn draw_dashed_connector(
    out: &mut RgbaImage,
    anchor: (f32, f32),
    bend: (f32, f32),
    end: (f32, f32),
) {
    // Shadow pass for legibility on busy backgrounds, then the line itself.
    let shadow = (1.5, 1.5);
    for (p0, p1) in [(anchor, bend), (bend, end)] {
        dashed_line(
            out,
            (p0.0 + shadow.0, p0.1 + shadow.1),
            (p1.0 + shadow.0, p1.1 + shadow.1),
            2.0,
            [0, 0, 0, 110],
        );
    }
    for (p0, p1) in [(anchor, bend), (bend, end)] {
        dashed_line(out, p0, p1, 2.0, [255, 255, 255, 235]);
    }
}

// ============================================================================
// Raster primitives (coverage-based, soft 1px edges)
// ============================================================================

/// Signed distance to a rounded rectangle; negative inside.
fn sd_rounded_rect(px: f32, py: f32, rect: &RectF, radius: f32) -> f32 {
    let cx = rect.x + rect.w * 0.5;
    let cy = rect.y + rect.h * 0.5;
    let qx = (px - cx).abs() - (rect.w * 0.5 - radius);
    let qy = (py - cy).abs() - (rect.h * 0.5 - radius);
    let outside = (qx.max(0.0).powi(2) + qy.max(0.0).powi(2)).sqrt();
    outside + qx.max(qy).min(0.0) - radius
}

fn fill_rounded_rect(img: &mut RgbaImage, rect: &RectF, radius: f32, color: [u8; 4]) {
    let min_x = (rect.x.floor() as i32 - 1).max(0);
    let min_y = (rect.y.floor() as i32 - 1).max(0);
    let max_x = ((rect.x + rect.w).ceil() as i32 + 1).min(img.width() as i32 - 1);
    let max_y = ((rect.y + rect.h).ceil() as i32 + 1).min(img.height() as i32 - 1);
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let d = sd_rounded_rect(x as f32 + 0.5, y as f32 + 0.5, rect, radius);
            let coverage = (0.5 - d).clamp(0.0, 1.0);
            blend(img, x, y, color, coverage);
        }
    }
}

fn stroke_rounded_rect(img: &mut RgbaImage, rect: &RectF, radius: f32, width: f32, color: [u8; 4]) {
    let half = width * 0.5;
    let min_x = ((rect.x - half).floor() as i32 - 1).max(0);
    let min_y = ((rect.y - half).floor() as i32 - 1).max(0);
    let max_x = ((rect.x + rect.w + half).ceil() as i32 + 1).min(img.width() as i32 - 1);
    let max_y = ((rect.y + rect.h + half).ceil() as i32 + 1).min(img.height() as i32 - 1);
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let d = sd_rounded_rect(x as f32 + 0.5, y as f32 + 0.5, rect, radius).abs();
            let coverage = (half - d + 0.5).clamp(0.0, 1.0);
            blend(img, x, y, color, coverage);
        }
    }
}

fn fill_circle(img: &mut RgbaImage, center: (f32, f32), r: f32, color: [u8; 4]) {
    let min_x = ((center.0 - r).floor() as i32 - 1).max(0);
    let min_y = ((center.1 - r).floor() as i32 - 1).max(0);
    let max_x = ((center.0 + r).ceil() as i32 + 1).min(img.width() as i32 - 1);
    let max_y = ((center.1 + r).ceil() as i32 + 1).min(img.height() as i32 - 1);
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let dx = x as f32 + 0.5 - center.0;
            let dy = y as f32 + 0.5 - center.1;
            let d = (dx * dx + dy * dy).sqrt() - r;
            let coverage = (0.5 - d).clamp(0.0, 1.0);
            blend(img, x, y, color, coverage);
        }
    }
}

fn stroke_circle(img: &mut RgbaImage, center: (f32, f32), r: f32, width: f32, color: [u8; 4]) {
    let half = width * 0.5;
    let reach = r + half;
    let min_x = ((center.0 - reach).floor() as i32 - 1).max(0);
    let min_y = ((center.1 - reach).floor() as i32 - 1).max(0);
    let max_x = ((center.0 + reach).ceil() as i32 + 1).min(img.width() as i32 - 1);
    let max_y = ((center.1 + reach).ceil() as i32 + 1).min(img.height() as i32 - 1);
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let dx = x as f32 + 0.5 - center.0;
            let dy = y as f32 + 0.5 - center.1;
            let d = ((dx * dx + dy * dy).sqrt() - r).abs();
            let coverage = (half - d + 0.5).clamp(0.0, 1.0);
            blend(img, x, y, color, coverage);
        }
    }
}

fn dashed_line(img: &mut RgbaImage, a: (f32, f32), b: (f32, f32), width: f32, color: [u8; 4]) {
    const DASH: f32 = 6.0;
    const GAP: f32 = 5.0;

    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len = (dx * dx + dy * dy).sqrt();
    if len <= f32::EPSILON {
        return;
    }
    let half = width * 0.5;

    let min_x = ((a.0.min(b.0) - half).floor() as i32 - 1).max(0);
    let min_y = ((a.1.min(b.1) - half).floor() as i32 - 1).max(0);
    let max_x = ((a.0.max(b.0) + half).ceil() as i32 + 1).min(img.width() as i32 - 1);
    let max_y = ((a.1.max(b.1) + half).ceil() as i32 + 1).min(img.height() as i32 - 1);

    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let px = x as f32 + 0.5;
            let py = y as f32 + 0.5;
            let t = (((px - a.0) * dx + (py - a.1) * dy) / (len * len)).clamp(0.0, 1.0);
            let along = t * len;
            if along % (DASH + GAP) >= DASH {
                continue;
            }
            let (qx, qy) = (a.0 + t * dx, a.1 + t * dy);
            let d = ((px - qx).powi(2) + (py - qy).powi(2)).sqrt();
            let coverage = (half - d + 0.5).clamp(0.0, 1.0);
            blend(img, x, y, color, coverage);
        }
    }
}

/// Source-over blend of `color` scaled by `coverage` onto one pixel.
fn blend(img: &mut RgbaImage, x: i32, y: i32, color: [u8; 4], coverage: f32) {
    if x < 0 || y < 0 || x >= img.width() as i32 || y >= img.height() as i32 {
        return;
    }
    let a = (color[3] as f32 / 255.0 * coverage).clamp(0.0, 1.0);
    if a <= 0.0 {
        return;
    }
    let dst = img.get_pixel_mut(x as u32, y as u32);
    for c in 0..3 {
        dst.0[c] = (color[c] as f32 * a + dst.0[c] as f32 * (1.0 - a)).round() as u8;
    }
    dst.0[3] = ((a + dst.0[3] as f32 / 255.0 * (1.0 - a)) * 255.0).round() as u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn annotation(x_pct: f32, y_pct: f32) -> Annotation {
        Annotation {
            x_pct,
            y_pct,
            name: "Oak veneer".into(),
            category: "Wood".into(),
            description: "Warm mid-tone grain".into(),
            hex_color: "#c08040".into(),
        }
    }

    #[test]
    fn hex_color_parsing() {
        assert_eq!(parse_hex_color("#ff0080"), [255, 0, 128]);
        assert_eq!(parse_hex_color("00ff00"), [0, 255, 0]);
        assert_eq!(parse_hex_color("  #0000FF "), [0, 0, 255]);
        assert_eq!(parse_hex_color(""), FALLBACK_COLOR);
        assert_eq!(parse_hex_color("#12345"), FALLBACK_COLOR);
        assert_eq!(parse_hex_color("#zzzzzz"), FALLBACK_COLOR);
    }

    #[test]
    fn no_annotations_and_neutral_adjustments_is_identity() {
        let base = RgbaImage::from_pixel(64, 48, Rgba([120, 90, 60, 255]));
        let out = compose_annotations(&base, &[], None, &DisplayAdjustments::default());
        assert_eq!(base.as_raw(), out.as_raw());
    }

    #[test]
    fn marker_is_drawn_at_anchor() {
        let base = RgbaImage::from_pixel(400, 300, Rgba([0, 0, 0, 255]));
        let ann = annotation(50.0, 50.0);
        let out = compose_annotations(&base, &[ann], None, &DisplayAdjustments::default());
        // Dot center carries the annotation's accent color.
        let px = out.get_pixel(200, 150).0;
        assert_eq!([px[0], px[1], px[2]], [0xc0, 0x80, 0x40]);
    }

    #[test]
    fn card_docks_left_for_left_anchor_and_right_for_right() {
        let (left, _) = {
            let g = CalloutGeometry::layout(400.0, 300.0, 20.0, 50.0);
            (g.on_left, g.card)
        };
        assert!(left);
        let g = CalloutGeometry::layout(400.0, 300.0, 80.0, 50.0);
        assert!(!g.on_left);
        assert!(g.card.x + g.card.w <= 400.0);
        // Boundary case: exactly 50% counts as right.
        assert!(!CalloutGeometry::layout(400.0, 300.0, 50.0, 50.0).on_left);
    }

    #[test]
    fn card_is_clamped_vertically() {
        let g = CalloutGeometry::layout(400.0, 300.0, 20.0, 0.0);
        assert!(g.card.y >= 8.0);
        let g = CalloutGeometry::layout(400.0, 300.0, 20.0, 100.0);
        assert!(g.card.y + g.card.h <= 300.0);
    }

    #[test]
    fn card_background_appears_on_the_docked_side() {
        let base = RgbaImage::from_pixel(400, 300, Rgba([255, 255, 255, 255]));
        let ann = annotation(85.0, 50.0);
        let out = compose_annotations(&base, &[ann], None, &DisplayAdjustments::default());

        let g = CalloutGeometry::layout(400.0, 300.0, 85.0, 50.0);
        let probe_x = (g.card.x + g.card.w * 0.85) as u32;
        let probe_y = (g.card.y + g.card.h * 0.5) as u32;
        let px = out.get_pixel(probe_x, probe_y).0;
        // Semi-transparent dark card over white: clearly darkened.
        assert!(px[0] < 100 && px[1] < 100 && px[2] < 100, "got {px:?}");
    }

    #[test]
    fn percentage_positions_are_resolution_independent() {
        for (w, h) in [(200u32, 100u32), (800, 400)] {
            let base = RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255]));
            let out =
                compose_annotations(&base, &[annotation(75.0, 25.0)], None, &Default::default());
            let px = out.get_pixel(w * 3 / 4, h / 4).0;
            assert_eq!([px[0], px[1], px[2]], [0xc0, 0x80, 0x40], "size {w}x{h}");
        }
    }

    #[test]
    fn adjustments_are_baked_into_the_export() {
        let base = RgbaImage::from_pixel(32, 32, Rgba([200, 200, 200, 255]));
        let adj = DisplayAdjustments {
            brightness: 0.0,
            contrast: 100.0,
            saturation: 100.0,
        };
        let out = compose_annotations(&base, &[], None, &adj);
        assert_eq!(out.get_pixel(16, 16).0, [0, 0, 0, 255]);
    }
}
