// ============================================================================
// COMPARISON SLIDER — draggable before/after split view
// ============================================================================

use eframe::egui;
use egui::{Color32, Pos2, Rect, Sense, Stroke, TextureHandle, TextureOptions, Vec2};
use image::RgbaImage;

use crate::canvas::rgba_to_color_image;

/// Split view between a "before" and "after" image.  The before image is
/// drawn full-bleed; the after image is revealed from the left up to the
/// divider position.
///
/// Reset law: a genuinely new before reference snaps the divider to 50%
/// ("first time comparing"); a new result against the same before snaps it
/// to 100% (fully showing the newest result).
pub struct CompareSlider {
    /// Divider position in percent, clamped to [0, 100].
    position: f32,
    before_rev: Option<u64>,

    before_tex: Option<TextureHandle>,
    before_tex_rev: u64,
    after_tex: Option<TextureHandle>,
    after_tex_rev: u64,
}

impl Default for CompareSlider {
    fn default() -> Self {
        Self {
            position: 50.0,
            before_rev: None,
            before_tex: None,
            before_tex_rev: u64::MAX,
            after_tex: None,
            after_tex_rev: u64::MAX,
        }
    }
}

impl CompareSlider {
    pub fn position(&self) -> f32 {
        self.position
    }

    /// Tell the slider which before-image it is comparing against.  A change
    /// of reference resets the divider to 50% and returns true; the caller
    /// must not follow up with [`CompareSlider::notify_new_result`] in that
    /// case, or the "first time comparing" split would be lost.
    pub fn sync_before(&mut self, before_rev: u64) -> bool {
        if self.before_rev != Some(before_rev) {
            self.before_rev = Some(before_rev);
            self.position = 50.0;
            return true;
        }
        false
    }

    /// A new result arrived for the current before-image: show it fully.
    pub fn notify_new_result(&mut self) {
        self.position = 100.0;
    }

    pub fn show(
        &mut self,
        ui: &mut egui::Ui,
        before: &RgbaImage,
        before_rev: u64,
        after: &RgbaImage,
        after_rev: u64,
    ) {
        self.sync_before(before_rev);
        self.update_textures(ui.ctx(), before, before_rev, after, after_rev);

        let avail = ui.available_size();
        let (response, painter) = ui.allocate_painter(avail, Sense::click_and_drag());
        let rect = response.rect;

        // Fit to the before image's aspect; both images share logical content.
        let image_rect = fit_rect(before.width(), before.height(), rect);

        if response.dragged() || response.clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                self.position = position_from_pointer(pos.x, image_rect);
            }
        }

        if let Some(tex) = &self.before_tex {
            painter.image(
                tex.id(),
                image_rect,
                Rect::from_min_max(Pos2::new(0.0, 0.0), Pos2::new(1.0, 1.0)),
                Color32::WHITE,
            );
        }

        // Reveal the after image from the left up to the divider.
        let frac = self.position / 100.0;
        if frac > 0.0 {
            if let Some(tex) = &self.after_tex {
                let reveal = Rect::from_min_size(
                    image_rect.min,
                    Vec2::new(image_rect.width() * frac, image_rect.height()),
                );
                painter.image(
                    tex.id(),
                    reveal,
                    Rect::from_min_max(Pos2::new(0.0, 0.0), Pos2::new(frac, 1.0)),
                    Color32::WHITE,
                );
            }
        }

        // Divider with a grab handle.
        let x = image_rect.left() + image_rect.width() * frac;
        painter.line_segment(
            [
                Pos2::new(x, image_rect.top()),
                Pos2::new(x, image_rect.bottom()),
            ],
            Stroke::new(2.0, Color32::WHITE),
        );
        painter.circle_filled(Pos2::new(x, image_rect.center().y), 7.0, Color32::WHITE);
        painter.circle_stroke(
            Pos2::new(x, image_rect.center().y),
            7.0,
            Stroke::new(1.0, Color32::from_gray(60)),
        );
    }

    fn update_textures(
        &mut self,
        ctx: &egui::Context,
        before: &RgbaImage,
        before_rev: u64,
        after: &RgbaImage,
        after_rev: u64,
    ) {
        if self.before_tex.is_none() || self.before_tex_rev != before_rev {
            self.before_tex = Some(ctx.load_texture(
                "compare_before",
                rgba_to_color_image(before),
                TextureOptions::LINEAR,
            ));
            self.before_tex_rev = before_rev;
        }
        if self.after_tex.is_none() || self.after_tex_rev != after_rev {
            self.after_tex = Some(ctx.load_texture(
                "compare_after",
                rgba_to_color_image(after),
                TextureOptions::LINEAR,
            ));
            self.after_tex_rev = after_rev;
        }
    }
}

/// Divider percentage from a pointer x position, clamped to [0, 100].
fn position_from_pointer(pointer_x: f32, rect: Rect) -> f32 {
    if rect.width() <= 0.0 {
        return 50.0;
    }
    ((pointer_x - rect.left()) / rect.width() * 100.0).clamp(0.0, 100.0)
}

/// Aspect-fit an image into the widget rect, centered.
fn fit_rect(w: u32, h: u32, rect: Rect) -> Rect {
    if w == 0 || h == 0 {
        return rect;
    }
    let aspect = w as f32 / h as f32;
    let rect_aspect = rect.width() / rect.height();
    let size = if aspect > rect_aspect {
        Vec2::new(rect.width(), rect.width() / aspect)
    } else {
        Vec2::new(rect.height() * aspect, rect.height())
    };
    Rect::from_center_size(rect.center(), size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_before_reference_resets_to_half() {
        let mut slider = CompareSlider::default();
        slider.sync_before(1);
        slider.position = 83.0;
        slider.sync_before(2);
        assert_eq!(slider.position(), 50.0);
    }

    #[test]
    fn same_before_reference_keeps_position() {
        let mut slider = CompareSlider::default();
        slider.sync_before(7);
        slider.position = 31.0;
        slider.sync_before(7);
        assert_eq!(slider.position(), 31.0);
    }

    #[test]
    fn new_result_snaps_to_full_reveal() {
        let mut slider = CompareSlider::default();
        slider.sync_before(7);
        slider.position = 31.0;
        slider.notify_new_result();
        assert_eq!(slider.position(), 100.0);
        // Still the same before: no 50% reset afterwards.
        slider.sync_before(7);
        assert_eq!(slider.position(), 100.0);
    }

    #[test]
    fn first_result_for_a_new_before_image_keeps_the_half_split() {
        // A previous session left the divider fully revealed.
        let mut slider = CompareSlider::default();
        slider.sync_before(1);
        slider.notify_new_result();
        assert_eq!(slider.position(), 100.0);

        // A new image is opened and its first result arrives: the result
        // handler syncs the before reference and only snaps to 100% when
        // the reference did not change.
        if !slider.sync_before(2) {
            slider.notify_new_result();
        }
        assert_eq!(slider.position(), 50.0, "first comparison must open split");

        // A second result for the same before-image reveals fully.
        if !slider.sync_before(2) {
            slider.notify_new_result();
        }
        assert_eq!(slider.position(), 100.0);
    }

    #[test]
    fn sync_before_reports_reference_changes() {
        let mut slider = CompareSlider::default();
        assert!(slider.sync_before(1));
        assert!(!slider.sync_before(1));
        assert!(slider.sync_before(2));
    }

    #[test]
    fn pointer_position_is_clamped() {
        let rect = Rect::from_min_size(Pos2::new(100.0, 0.0), Vec2::new(200.0, 100.0));
        assert_eq!(position_from_pointer(100.0, rect), 0.0);
        assert_eq!(position_from_pointer(200.0, rect), 50.0);
        assert_eq!(position_from_pointer(300.0, rect), 100.0);
        assert_eq!(position_from_pointer(-50.0, rect), 0.0);
        assert_eq!(position_from_pointer(900.0, rect), 100.0);
    }
}
