// ============================================================================
// MASK TOOLS — painter state machine and the tool panel
// ============================================================================

use eframe::egui;
use egui::{Color32, Pos2};
use image::RgbaImage;

use crate::ops::mask::{DEFAULT_TOLERANCE, MaskBuffer, MaskSnapshot};

/// Mask painting tools. Brush and Line are drag gestures; Magic Wand is a
/// single click.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MaskTool {
    #[default]
    Brush,
    Line,
    MagicWand,
}

impl MaskTool {
    pub fn label(&self) -> &'static str {
        match self {
            MaskTool::Brush => "Brush",
            MaskTool::Line => "Line",
            MaskTool::MagicWand => "Magic Wand",
        }
    }

    pub fn all() -> &'static [MaskTool] {
        &[MaskTool::Brush, MaskTool::Line, MaskTool::MagicWand]
    }
}

/// Shared tool properties. Tolerance only applies to the Magic Wand.
#[derive(Clone, Copy, Debug)]
pub struct ToolProperties {
    pub size: f32,
    pub color: [u8; 4],
    pub tolerance: i32,
}

impl Default for ToolProperties {
    fn default() -> Self {
        Self {
            size: 24.0,
            // Semi-transparent highlight so the photo stays visible under
            // the painted region.
            color: [64, 156, 255, 150],
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Ephemeral per-gesture state, alive only between pointer-down and
/// pointer-up.  An explicit Idle -> Drawing -> Idle machine instead of
/// mutable cells read across event callbacks.
enum StrokeSession {
    /// Last recorded point; each move draws a segment from here and then
    /// advances it, so sparse pointer events still yield a continuous path.
    Brush { last: Pos2 },
    /// Anchor plus the pre-stroke pixels; every move restores the snapshot
    /// before drawing the preview segment so previews never accumulate.
    Line {
        anchor: Pos2,
        snapshot: MaskSnapshot,
    },
}

/// Owns the mask buffer and interprets pointer events according to the
/// active tool.  Emits a mask-changed event (carrying the new emptiness
/// state) after every paint operation; the host consumes it via
/// [`MaskPainter::take_mask_event`] to gate generation.
pub struct MaskPainter {
    pub active_tool: MaskTool,
    pub properties: ToolProperties,
    pub buffer: MaskBuffer,
    session: Option<StrokeSession>,
    revision: u64,
    pending_mask_event: Option<bool>,
}

impl Default for MaskPainter {
    fn default() -> Self {
        Self {
            active_tool: MaskTool::default(),
            properties: ToolProperties::default(),
            buffer: MaskBuffer::new(0, 0),
            session: None,
            revision: 0,
            pending_mask_event: None,
        }
    }
}

impl MaskPainter {
    /// Monotonic counter bumped on every visible buffer change; the canvas
    /// uses it to invalidate its overlay texture.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Take the pending mask-changed event (if any) for processing.
    pub fn take_mask_event(&mut self) -> Option<bool> {
        self.pending_mask_event.take()
    }

    /// Track the rendered image element size.  A size change clears the
    /// buffer and discards any in-progress stroke — a resize mid-stroke is
    /// accepted data loss, not an error.  Returns true when resized.
    pub fn sync_size(&mut self, width: u32, height: u32) -> bool {
        if !self.buffer.resize(width, height) {
            return false;
        }
        self.session = None;
        self.report();
        true
    }

    /// Pointer-down in mask-buffer coordinates.  `fill_reference` is the
    /// source image resampled to the buffer's resolution; it is only needed
    /// (and only consulted) by the Magic Wand.
    pub fn pointer_down(&mut self, pos: Pos2, fill_reference: Option<&RgbaImage>) {
        if !self.buffer.has_area() {
            return;
        }
        match self.active_tool {
            MaskTool::Brush => {
                self.session = Some(StrokeSession::Brush { last: pos });
            }
            MaskTool::Line => {
                self.session = Some(StrokeSession::Line {
                    anchor: pos,
                    snapshot: self.buffer.snapshot(),
                });
            }
            MaskTool::MagicWand => {
                // One-shot: no session, no drag continuation.
                let Some(reference) = fill_reference else {
                    return;
                };
                if pos.x < 0.0 || pos.y < 0.0 {
                    return;
                }
                let seed = (pos.x as u32, pos.y as u32);
                if seed.0 >= self.buffer.width() || seed.1 >= self.buffer.height() {
                    return;
                }
                self.buffer.flood_fill(
                    reference,
                    seed,
                    self.properties.tolerance,
                    self.properties.color,
                );
                self.report();
            }
        }
    }

    pub fn pointer_move(&mut self, pos: Pos2) {
        let (size, color) = (self.properties.size, self.properties.color);
        match self.session.take() {
            Some(StrokeSession::Brush { last }) => {
                self.buffer
                    .paint_segment((last.x, last.y), (pos.x, pos.y), size, color);
                self.session = Some(StrokeSession::Brush { last: pos });
                self.report();
            }
            Some(StrokeSession::Line { anchor, snapshot }) => {
                // Undo the previous preview, then draw the single live segment.
                self.buffer.restore(&snapshot);
                self.buffer
                    .paint_segment((anchor.x, anchor.y), (pos.x, pos.y), size, color);
                self.session = Some(StrokeSession::Line { anchor, snapshot });
                self.report();
            }
            None => {}
        }
    }

    /// Ends the gesture.  For Line, the last-drawn preview segment becomes
    /// permanent (the snapshot is simply discarded).
    pub fn pointer_up(&mut self) {
        self.session = None;
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.session = None;
        self.report();
    }

    fn report(&mut self) {
        self.revision += 1;
        self.pending_mask_event = Some(self.buffer.is_empty());
    }

    // -- panel UI -------------------------------------------------------------

    pub fn ui(&mut self, ui: &mut egui::Ui) {
        ui.label("Mask tool");
        ui.horizontal(|ui| {
            for tool in MaskTool::all() {
                ui.selectable_value(&mut self.active_tool, *tool, tool.label());
            }
        });
        ui.separator();

        match self.active_tool {
            MaskTool::Brush | MaskTool::Line => {
                ui.add(egui::Slider::new(&mut self.properties.size, 1.0..=120.0).text("Size"));
            }
            MaskTool::MagicWand => {
                ui.add(
                    egui::Slider::new(&mut self.properties.tolerance, 0..=255).text("Tolerance"),
                );
            }
        }

        let mut color = Color32::from_rgba_unmultiplied(
            self.properties.color[0],
            self.properties.color[1],
            self.properties.color[2],
            self.properties.color[3],
        );
        ui.horizontal(|ui| {
            ui.label("Color");
            if ui.color_edit_button_srgba(&mut color).changed() {
                self.properties.color = color.to_array();
            }
        });

        ui.separator();
        if ui.button("Clear mask").clicked() {
            self.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn painter(w: u32, h: u32) -> MaskPainter {
        let mut p = MaskPainter::default();
        p.sync_size(w, h);
        p.take_mask_event();
        p
    }

    fn alpha_at(p: &MaskPainter, x: u32, y: u32) -> u8 {
        p.buffer.as_image().get_pixel(x, y).0[3]
    }

    #[test]
    fn brush_gesture_is_continuous_across_sparse_moves() {
        let mut p = painter(100, 100);
        p.properties.size = 6.0;
        p.pointer_down(Pos2::new(10.0, 50.0), None);
        // Down only records the anchor; nothing painted yet.
        assert!(p.is_empty());

        p.pointer_move(Pos2::new(55.0, 50.0));
        p.pointer_move(Pos2::new(90.0, 50.0));
        p.pointer_up();

        for x in 10..=90 {
            assert!(alpha_at(&p, x, 50) > 0, "gap at x={x}");
        }
        assert_eq!(p.take_mask_event(), Some(false));
    }

    #[test]
    fn line_gesture_leaves_exactly_one_segment() {
        let mut p = painter(80, 80);
        p.properties.size = 4.0;
        p.pointer_down(Pos2::new(10.0, 10.0), None);
        for end in [(60.0, 10.0), (60.0, 60.0), (20.0, 70.0), (70.0, 20.0)] {
            p.pointer_move(Pos2::new(end.0, end.1));
        }
        p.pointer_up();

        // Expected: only the final anchor -> (70, 20) segment.
        let mut expected = MaskBuffer::new(80, 80);
        expected.paint_segment((10.0, 10.0), (70.0, 20.0), 4.0, p.properties.color);
        assert_eq!(
            p.buffer.as_image().as_raw(),
            expected.as_image().as_raw(),
            "intermediate previews leaked into the final buffer"
        );
    }

    #[test]
    fn magic_wand_is_single_shot() {
        let mut p = painter(10, 10);
        p.active_tool = MaskTool::MagicWand;
        let reference = RgbaImage::from_pixel(10, 10, image::Rgba([100, 100, 100, 255]));

        p.pointer_down(Pos2::new(5.0, 5.0), Some(&reference));
        assert!(!p.is_empty());
        let rev = p.revision();

        // A drag after the click must not repaint.
        p.pointer_move(Pos2::new(8.0, 8.0));
        p.pointer_up();
        assert_eq!(p.revision(), rev);
    }

    #[test]
    fn magic_wand_without_reference_or_out_of_bounds_is_noop() {
        let mut p = painter(10, 10);
        p.active_tool = MaskTool::MagicWand;
        p.pointer_down(Pos2::new(5.0, 5.0), None);
        assert!(p.is_empty());

        let reference = RgbaImage::new(10, 10);
        p.pointer_down(Pos2::new(-3.0, 5.0), Some(&reference));
        p.pointer_down(Pos2::new(5.0, 42.0), Some(&reference));
        assert!(p.is_empty());
        assert_eq!(p.take_mask_event(), None);
    }

    #[test]
    fn mask_events_track_emptiness() {
        let mut p = painter(40, 40);
        p.pointer_down(Pos2::new(5.0, 5.0), None);
        p.pointer_move(Pos2::new(20.0, 5.0));
        assert_eq!(p.take_mask_event(), Some(false));
        assert_eq!(p.take_mask_event(), None);

        p.clear();
        assert_eq!(p.take_mask_event(), Some(true));
    }

    #[test]
    fn resize_mid_stroke_discards_the_stroke() {
        let mut p = painter(60, 60);
        p.pointer_down(Pos2::new(5.0, 5.0), None);
        p.pointer_move(Pos2::new(20.0, 5.0));
        assert!(!p.is_empty());

        assert!(p.sync_size(30, 30));
        assert!(p.is_empty());
        assert_eq!(p.take_mask_event(), Some(true));

        // The gesture is dead: further moves paint nothing.
        p.pointer_move(Pos2::new(25.0, 25.0));
        assert!(p.is_empty());
    }
}
