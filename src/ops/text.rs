// ============================================================================
// TEXT — single-line glyph layout and rasterization for callout cards
// ============================================================================

use ab_glyph::{Font, FontArc, GlyphId, PxScale, ScaleFont, point};
use image::RgbaImage;

/// Load the default UI sans-serif from the system for card text.
/// Returns None when no usable font is installed; callers skip text drawing.
pub fn load_ui_font() -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::Properties;
    use font_kit::source::SystemSource;

    let source = SystemSource::new();
    let handle = source
        .select_best_match(&[FamilyName::SansSerif], &Properties::new())
        .ok()?;
    let font_data = handle.load().ok()?;
    let bytes: Vec<u8> = (*font_data.copy_font_data()?).clone();
    FontArc::try_from_vec(bytes).ok()
}

/// Lay out one line, returning positioned glyphs (x offsets from the line
/// start) and the total advance width.
pub fn layout_line(font: &FontArc, text: &str, font_size: f32) -> (Vec<(GlyphId, f32)>, f32) {
    let scaled = font.as_scaled(font_size);
    let mut glyphs = Vec::new();
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }

    (glyphs, cursor_x)
}

/// Rasterize one line with its baseline starting at `origin`.  Glyphs whose
/// advance would cross `max_width` are dropped (truncation by available
/// width — no wrapping).
pub fn draw_line(
    img: &mut RgbaImage,
    font: &FontArc,
    text: &str,
    font_size: f32,
    origin: (f32, f32),
    color: [u8; 4],
    max_width: f32,
) {
    let scaled = font.as_scaled(font_size);
    let (glyphs, _) = layout_line(font, text, font_size);

    for (glyph_id, x) in glyphs {
        if x + scaled.h_advance(glyph_id) > max_width {
            break;
        }
        let glyph = glyph_id.with_scale_and_position(
            PxScale::from(font_size),
            point(origin.0 + x, origin.1),
        );
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue; // whitespace has no outline
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|gx, gy, coverage| {
            let px = bounds.min.x as i32 + gx as i32;
            let py = bounds.min.y as i32 + gy as i32;
            blend_coverage(img, px, py, color, coverage);
        });
    }
}

/// Source-over blend of `color` scaled by `coverage` onto one pixel.
fn blend_coverage(img: &mut RgbaImage, x: i32, y: i32, color: [u8; 4], coverage: f32) {
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
