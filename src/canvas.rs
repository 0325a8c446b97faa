// ============================================================================
// CANVAS — viewport transform, coordinate mapping, and the image widget
// ============================================================================

use eframe::egui;
use egui::{Color32, ColorImage, Pos2, Rect, Sense, TextureHandle, TextureOptions, Vec2};
use image::RgbaImage;

use crate::components::tools::{MaskPainter, MaskTool};

/// Zoom scale bounds. Wheel and button zoom both clamp into this range.
pub const SCALE_MIN: f32 = 0.5;
pub const SCALE_MAX: f32 = 5.0;
/// Additive scale change per wheel-delta unit.
const WHEEL_ZOOM_RATE: f32 = 0.001;
/// Additive scale step for the Zoom In / Zoom Out buttons.
const BUTTON_ZOOM_STEP: f32 = 0.2;

// ============================================================================
// VIEWPORT — pan/zoom state with anchor-preserving wheel zoom
// ============================================================================

/// Pan/zoom transform applied when displaying an image inside the canvas.
///
/// The image element is drawn with its top-left corner at `offset` (canvas
/// coordinates) and its fitted size multiplied by `scale`.  Wheel zoom keeps
/// the canvas point under the cursor stationary: the pre-zoom image-space
/// point `(cursor - offset) / scale` equals the post-zoom point
/// `(cursor - offset') / scale'`, including when the scale is pinned at a
/// clamp bound (the offset is still recomputed against the clamped scale).
pub struct Viewport {
    pub scale: f32,
    pub offset: Vec2,
    /// `pointer - offset` recorded at pan start; None while not panning.
    drag_start: Option<Vec2>,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: Vec2::ZERO,
            drag_start: None,
        }
    }
}

impl Viewport {
    /// Wheel zoom toward `cursor` (canvas coordinates).  `delta_y` follows
    /// the wheel convention: positive = scroll down = zoom out.
    pub fn wheel_zoom(&mut self, delta_y: f32, cursor: Pos2) {
        let zoom_factor = -delta_y * WHEEL_ZOOM_RATE;
        let new_scale = (self.scale + zoom_factor).clamp(SCALE_MIN, SCALE_MAX);
        let image_point = (cursor.to_vec2() - self.offset) / self.scale;
        self.offset = cursor.to_vec2() - image_point * new_scale;
        self.scale = new_scale;
    }

    /// Center-agnostic step zoom (toolbar buttons).
    pub fn zoom_in(&mut self) {
        self.scale = (self.scale + BUTTON_ZOOM_STEP).clamp(SCALE_MIN, SCALE_MAX);
    }

    pub fn zoom_out(&mut self) {
        self.scale = (self.scale - BUTTON_ZOOM_STEP).clamp(SCALE_MIN, SCALE_MAX);
    }

    /// Back to identity. Called whenever the displayed image changes.
    pub fn reset(&mut self) {
        self.scale = 1.0;
        self.offset = Vec2::ZERO;
        self.drag_start = None;
    }

    pub fn begin_pan(&mut self, pointer: Pos2) {
        self.drag_start = Some(pointer.to_vec2() - self.offset);
    }

    pub fn pan_to(&mut self, pointer: Pos2) {
        if let Some(start) = self.drag_start {
            self.offset = pointer.to_vec2() - start;
        }
    }

    pub fn end_pan(&mut self) {
        self.drag_start = None;
    }

    pub fn is_panning(&self) -> bool {
        self.drag_start.is_some()
    }
}

// ============================================================================
// CANVAS VIEW — egui widget that renders the image and routes pointer input
// ============================================================================

pub struct CanvasView {
    pub viewport: Viewport,
    /// Widget rect from the last laid-out frame. Pointer mapping returns
    /// None until this exists.
    pub last_canvas_rect: Option<Rect>,

    // Cached textures, invalidated by revision counters.
    image_tex: Option<TextureHandle>,
    image_tex_rev: u64,
    mask_tex: Option<TextureHandle>,
    mask_tex_rev: u64,

    /// Source image resampled to mask-buffer resolution, fed to the Magic
    /// Wand so fills match displayed colors.  Keyed by (source revision,
    /// mask dimensions).
    fill_reference: Option<RgbaImage>,
    fill_reference_key: (u64, u32, u32),
}

impl Default for CanvasView {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            last_canvas_rect: None,
            image_tex: None,
            image_tex_rev: u64::MAX,
            mask_tex: None,
            mask_tex_rev: u64::MAX,
            fill_reference: None,
            fill_reference_key: (u64::MAX, 0, 0),
        }
    }
}

impl CanvasView {
    /// Coordinate mapper: pointer position in window space -> canvas pixel
    /// space (`pointer - rect.min`).  None when the widget has not been laid
    /// out yet.  No side effects; pan, zoom, and mask painting all go
    /// through this one mapping.
    pub fn to_canvas(&self, pointer: Pos2) -> Option<Pos2> {
        let rect = self.last_canvas_rect?;
        Some((pointer - rect.min).to_pos2())
    }

    pub fn reset_view(&mut self) {
        self.viewport.reset();
    }

    /// Render the canvas and route pointer input.  While `mask_edit` is
    /// active all pointer events go to the mask painter and the viewport is
    /// untouched; otherwise primary drag pans and the wheel zooms.
    pub fn show(
        &mut self,
        ui: &mut egui::Ui,
        source: Option<&RgbaImage>,
        source_rev: u64,
        painter: &mut MaskPainter,
        mask_edit: bool,
    ) {
        let avail = ui.available_size();
        let (response, shape_painter) = ui.allocate_painter(avail, Sense::click_and_drag());
        let rect = response.rect;
        self.last_canvas_rect = Some(rect);

        let Some(source) = source else {
            shape_painter.text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                "Open an image to begin",
                egui::FontId::proportional(16.0),
                ui.visuals().weak_text_color(),
            );
            return;
        };

        // Fitted (scale = 1) element size; the mask buffer tracks this size
        // and is cleared whenever it changes.
        let base = fit_size(source.width(), source.height(), rect.size());
        let mask_w = base.x.round().max(1.0) as u32;
        let mask_h = base.y.round().max(1.0) as u32;
        if painter.sync_size(mask_w, mask_h) {
            self.fill_reference = None;
        }

        let image_rect =
            Rect::from_min_size(rect.min + self.viewport.offset, base * self.viewport.scale);

        self.update_textures(ui.ctx(), source, source_rev, painter);
        if let Some(tex) = &self.image_tex {
            shape_painter.image(tex.id(), image_rect, uv_full(), Color32::WHITE);
        }
        if mask_edit || !painter.buffer.is_empty() {
            if let Some(tex) = &self.mask_tex {
                shape_painter.image(tex.id(), image_rect, uv_full(), Color32::WHITE);
            }
        }

        if mask_edit {
            self.route_mask_input(&response, image_rect, source, source_rev, painter);
        } else {
            self.route_view_input(ui, &response);
        }
    }

    // -- input routing --------------------------------------------------------

    fn route_view_input(&mut self, ui: &egui::Ui, response: &egui::Response) {
        if response.drag_started()
            && let Some(pos) = response.interact_pointer_pos()
            && let Some(canvas_pos) = self.to_canvas(pos)
        {
            self.viewport.begin_pan(canvas_pos);
        }
        if response.dragged()
            && let Some(pos) = response.interact_pointer_pos()
            && let Some(canvas_pos) = self.to_canvas(pos)
        {
            self.viewport.pan_to(canvas_pos);
        }
        if response.drag_released() {
            self.viewport.end_pan();
        }

        if response.hovered() {
            let scroll = ui.input(|i| i.scroll_delta.y);
            if scroll != 0.0
                && let Some(pos) = response.hover_pos()
                && let Some(canvas_pos) = self.to_canvas(pos)
            {
                // egui scroll-up is positive; the zoom formula expects the
                // wheel convention (positive = down), so flip it.
                self.viewport.wheel_zoom(-scroll, canvas_pos);
            }
        }
    }

    fn route_mask_input(
        &mut self,
        response: &egui::Response,
        image_rect: Rect,
        source: &RgbaImage,
        source_rev: u64,
        painter: &mut MaskPainter,
    ) {
        // The mask buffer is aligned 1:1 with the displayed image element, so
        // painting coordinates are simply pointer - element top-left.
        let mask_pos = |pos: Pos2| (pos - image_rect.min).to_pos2();

        if response.drag_started() || response.clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                if painter.active_tool == MaskTool::MagicWand {
                    self.ensure_fill_reference(source, source_rev, painter);
                }
                painter.pointer_down(mask_pos(pos), self.fill_reference.as_ref());
            }
        } else if response.dragged() {
            if let Some(pos) = response.interact_pointer_pos() {
                painter.pointer_move(mask_pos(pos));
            }
        }
        if response.drag_released() {
            painter.pointer_up();
        }
    }

    // -- caches ---------------------------------------------------------------

    fn ensure_fill_reference(
        &mut self,
        source: &RgbaImage,
        source_rev: u64,
        painter: &MaskPainter,
    ) {
        let key = (source_rev, painter.buffer.width(), painter.buffer.height());
        if self.fill_reference.is_some() && self.fill_reference_key == key {
            return;
        }
        if key.1 == 0 || key.2 == 0 {
            self.fill_reference = None;
            return;
        }
        self.fill_reference = Some(image::imageops::resize(
            source,
            key.1,
            key.2,
            image::imageops::FilterType::Triangle,
        ));
        self.fill_reference_key = key;
    }

    fn update_textures(
        &mut self,
        ctx: &egui::Context,
        source: &RgbaImage,
        source_rev: u64,
        painter: &MaskPainter,
    ) {
        if self.image_tex.is_none() || self.image_tex_rev != source_rev {
            self.image_tex = Some(ctx.load_texture(
                "canvas_image",
                rgba_to_color_image(source),
                TextureOptions::LINEAR,
            ));
            self.image_tex_rev = source_rev;
        }
        let mask_rev = painter.revision();
        if self.mask_tex.is_none() || self.mask_tex_rev != mask_rev {
            self.mask_tex = Some(ctx.load_texture(
                "canvas_mask",
                rgba_to_color_image(painter.buffer.as_image()),
                TextureOptions::LINEAR,
            ));
            self.mask_tex_rev = mask_rev;
        }
    }
}

/// Aspect-fit `(w, h)` into `avail`, never upscaling past 1:1.
fn fit_size(w: u32, h: u32, avail: Vec2) -> Vec2 {
    if w == 0 || h == 0 || avail.x <= 0.0 || avail.y <= 0.0 {
        return Vec2::ZERO;
    }
    let scale = (avail.x / w as f32).min(avail.y / h as f32).min(1.0);
    Vec2::new(w as f32 * scale, h as f32 * scale)
}

fn uv_full() -> Rect {
    Rect::from_min_max(Pos2::new(0.0, 0.0), Pos2::new(1.0, 1.0))
}

/// Converts an RgbaImage to egui's ColorImage format.
pub fn rgba_to_color_image(img: &RgbaImage) -> ColorImage {
    ColorImage::from_rgba_unmultiplied(
        [img.width() as usize, img.height() as usize],
        img.as_raw(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_point(vp: &Viewport, cursor: Pos2) -> Vec2 {
        (cursor.to_vec2() - vp.offset) / vp.scale
    }

    #[test]
    fn wheel_zoom_preserves_anchor_point() {
        let mut vp = Viewport::default();
        vp.offset = Vec2::new(13.0, -7.5);
        vp.scale = 1.3;
        let cursor = Pos2::new(211.0, 97.0);

        for delta in [-120.0, -53.0, 240.0, -800.0, 77.0] {
            let before = image_point(&vp, cursor);
            vp.wheel_zoom(delta, cursor);
            let after = image_point(&vp, cursor);
            assert!(
                (before - after).length() < 1e-3,
                "anchor drifted by {:?} for delta {delta}",
                before - after
            );
        }
    }

    #[test]
    fn wheel_zoom_preserves_anchor_at_clamp_bound() {
        let mut vp = Viewport::default();
        vp.scale = SCALE_MAX;
        vp.offset = Vec2::new(-40.0, 25.0);
        let cursor = Pos2::new(120.0, 300.0);

        // Scale cannot move past the bound, but the offset must still be
        // recomputed consistently with the clamped scale.
        let before = image_point(&vp, cursor);
        vp.wheel_zoom(-500.0, cursor);
        assert_eq!(vp.scale, SCALE_MAX);
        let after = image_point(&vp, cursor);
        assert!((before - after).length() < 1e-3);
    }

    #[test]
    fn repeated_wheel_zoom_respects_clamp() {
        let mut vp = Viewport::default();
        let cursor = Pos2::new(50.0, 50.0);
        for _ in 0..200 {
            vp.wheel_zoom(-400.0, cursor);
        }
        assert_eq!(vp.scale, SCALE_MAX);
        for _ in 0..400 {
            vp.wheel_zoom(400.0, cursor);
        }
        assert_eq!(vp.scale, SCALE_MIN);
    }

    #[test]
    fn wheel_zoom_is_additive_in_delta() {
        let mut vp = Viewport::default();
        vp.wheel_zoom(-250.0, Pos2::new(0.0, 0.0));
        assert!((vp.scale - 1.25).abs() < 1e-6);
        vp.wheel_zoom(100.0, Pos2::new(0.0, 0.0));
        assert!((vp.scale - 1.15).abs() < 1e-6);
    }

    #[test]
    fn button_zoom_steps_and_clamps() {
        let mut vp = Viewport::default();
        vp.zoom_in();
        assert!((vp.scale - 1.2).abs() < 1e-6);
        // Buttons are center-agnostic: offset untouched.
        assert_eq!(vp.offset, Vec2::ZERO);
        for _ in 0..40 {
            vp.zoom_in();
        }
        assert_eq!(vp.scale, SCALE_MAX);
        for _ in 0..60 {
            vp.zoom_out();
        }
        assert_eq!(vp.scale, SCALE_MIN);
    }

    #[test]
    fn pan_tracks_pointer_minus_drag_start() {
        let mut vp = Viewport::default();
        vp.offset = Vec2::new(10.0, 20.0);
        vp.begin_pan(Pos2::new(100.0, 100.0));
        vp.pan_to(Pos2::new(130.0, 90.0));
        assert_eq!(vp.offset, Vec2::new(40.0, 10.0));
        vp.end_pan();
        // Moves after release are ignored.
        vp.pan_to(Pos2::new(500.0, 500.0));
        assert_eq!(vp.offset, Vec2::new(40.0, 10.0));
    }

    #[test]
    fn reset_restores_identity() {
        let mut vp = Viewport::default();
        vp.wheel_zoom(-300.0, Pos2::new(77.0, 31.0));
        vp.begin_pan(Pos2::new(0.0, 0.0));
        vp.reset();
        assert_eq!(vp.scale, 1.0);
        assert_eq!(vp.offset, Vec2::ZERO);
        assert!(!vp.is_panning());
    }

    #[test]
    fn fit_size_never_upscales() {
        let s = fit_size(100, 50, Vec2::new(1000.0, 1000.0));
        assert_eq!(s, Vec2::new(100.0, 50.0));
        let s = fit_size(200, 100, Vec2::new(100.0, 100.0));
        assert_eq!(s, Vec2::new(100.0, 50.0));
    }
}
