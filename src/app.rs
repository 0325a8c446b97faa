// ============================================================================
// APP — panels, pointer routing, and the generation pipeline
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;

use eframe::egui;
use image::RgbaImage;

use crate::canvas::CanvasView;
use crate::components::compare::CompareSlider;
use crate::components::history::HistoryPanel;
use crate::components::tools::MaskPainter;
use crate::generate::{
    GenerateBackend, GenerateOutcome, GenerateRequest, StubBackend, spawn_generate_job,
};
use crate::io::{self, SaveFormat};
use crate::ops::adjustments::DisplayAdjustments;
use crate::ops::overlay::{self, Annotation};
use crate::ops::text;
use crate::{log_err, log_info, log_warn, logger};

/// Central-panel view.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Tab {
    Canvas,
    Compare,
}

pub struct GenBrushApp {
    /// The photo as opened from disk; the comparison baseline.
    original: Option<RgbaImage>,
    original_rev: u64,
    /// Bumped whenever the displayed image changes (load, new result,
    /// history selection) — drives texture invalidation.
    display_rev: u64,

    canvas: CanvasView,
    painter: MaskPainter,
    mask_edit: bool,

    compare: CompareSlider,
    active_tab: Tab,
    history: HistoryPanel,

    prompt: String,
    backend: Arc<dyn GenerateBackend>,
    gen_sender: mpsc::Sender<GenerateOutcome>,
    gen_receiver: mpsc::Receiver<GenerateOutcome>,
    /// When > 0, a generation is in flight; show spinner and disable submit.
    pending_generations: usize,

    adjustments: DisplayAdjustments,
    annotations: Vec<Annotation>,
    ui_font: Option<ab_glyph::FontArc>,

    status: String,
}

impl GenBrushApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let (gen_sender, gen_receiver) = mpsc::channel();
        let ui_font = text::load_ui_font();
        if ui_font.is_none() {
            log_warn!("no system sans-serif font found; annotation text disabled");
        }
        Self {
            original: None,
            original_rev: 0,
            display_rev: 0,
            canvas: CanvasView::default(),
            painter: MaskPainter::default(),
            mask_edit: false,
            compare: CompareSlider::default(),
            active_tab: Tab::Canvas,
            history: HistoryPanel::default(),
            prompt: String::new(),
            backend: Arc::new(StubBackend),
            gen_sender,
            gen_receiver,
            pending_generations: 0,
            adjustments: DisplayAdjustments::default(),
            annotations: Vec::new(),
            ui_font,
            status: String::new(),
        }
    }

    // -- state transitions ----------------------------------------------------

    fn open_image(&mut self, path: PathBuf) {
        match io::load_image_sync(&path) {
            Ok(img) => {
                log_info!("opened {} ({}x{})", path.display(), img.width(), img.height());
                self.original = Some(img);
                self.original_rev += 1;
                self.display_rev += 1;
                self.history.clear();
                self.history.take_selection_changed();
                self.painter.clear();
                self.painter.take_mask_event();
                self.canvas.reset_view();
                self.mask_edit = false;
                self.active_tab = Tab::Canvas;
                self.status.clear();
            }
            Err(e) => {
                log_err!("open failed for {}: {}", path.display(), e);
                self.status = format!("Could not open image: {}", e);
            }
        }
    }

    fn export_image(&mut self) {
        let Some(display) = self.displayed_image() else {
            return;
        };
        let composed = overlay::compose_annotations(
            display,
            &self.annotations,
            self.ui_font.as_ref(),
            &self.adjustments,
        );
        let Some(path) = io::save_image_dialog("genbrush_export.jpg") else {
            return;
        };
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(SaveFormat::from_extension)
            .unwrap_or(SaveFormat::Jpeg);
        match io::encode_and_write(&composed, &path, format, io::JPEG_QUALITY) {
            Ok(()) => {
                log_info!("exported {}", path.display());
                self.status = format!("Exported {}", path.display());
            }
            Err(e) => {
                log_err!("export failed: {}", e);
                self.status = format!("Export failed: {}", e);
            }
        }
    }

    /// Whether the Generate button is enabled: an image is loaded, the
    /// prompt is non-empty, nothing is in flight, and in mask-edit mode the
    /// mask must contain at least one painted pixel.
    fn can_generate(&self) -> bool {
        self.original.is_some()
            && !self.prompt.trim().is_empty()
            && self.pending_generations == 0
            && (!self.mask_edit || !self.painter.is_empty())
    }

    fn submit_generation(&mut self, ctx: &egui::Context) {
        let Some(display) = self.displayed_image() else {
            return;
        };
        let source = display.clone();

        // Outside mask-edit mode no mask is sent, even if one is painted.
        let mask = if self.mask_edit {
            let Some(binary) = self.painter.buffer.binary_mask() else {
                return;
            };
            // The buffer lives at element resolution; the backend needs it
            // at image resolution.  Nearest keeps the pixels strictly
            // white/black.
            Some(image::imageops::resize(
                &binary,
                source.width(),
                source.height(),
                image::imageops::FilterType::Nearest,
            ))
        } else {
            None
        };

        let request = match GenerateRequest::pack(self.prompt.trim(), &source, mask.as_ref()) {
            Ok(req) => req,
            Err(e) => {
                log_err!("request packing failed: {}", e);
                self.status = e.to_string();
                return;
            }
        };

        self.pending_generations += 1;
        self.status.clear();
        spawn_generate_job(
            self.backend.clone(),
            request,
            self.gen_sender.clone(),
            ctx.clone(),
        );
    }

    fn drain_generation_results(&mut self) {
        while let Ok(outcome) = self.gen_receiver.try_recv() {
            self.pending_generations = self.pending_generations.saturating_sub(1);
            match outcome.result {
                Ok(image) => {
                    log_info!("generation finished: \"{}\"", outcome.prompt);
                    self.history.push_result(&outcome.prompt, outcome.kind, image);
                    self.history.take_selection_changed();
                    self.display_rev += 1;
                    self.canvas.reset_view();
                    // The first result against a fresh before-image keeps the
                    // 50% split; later results for the same before reveal
                    // fully.
                    if !self.compare.sync_before(self.original_rev) {
                        self.compare.notify_new_result();
                    }
                    self.active_tab = Tab::Compare;
                }
                Err(e) => {
                    self.status = e.to_string();
                }
            }
        }
    }

    fn displayed_image(&self) -> Option<&RgbaImage> {
        self.history.active_image().or(self.original.as_ref())
    }

    // -- panels ---------------------------------------------------------------

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("Open…").clicked()
                && let Some(path) = io::open_image_dialog()
            {
                self.open_image(path);
            }
            let has_image = self.original.is_some();
            if ui
                .add_enabled(has_image, egui::Button::new("Export…"))
                .clicked()
            {
                self.export_image();
            }
            ui.separator();

            ui.selectable_value(&mut self.active_tab, Tab::Canvas, "Canvas");
            let can_compare = !self.history.is_empty();
            if ui
                .add_enabled(
                    can_compare,
                    egui::SelectableLabel::new(self.active_tab == Tab::Compare, "Compare"),
                )
                .clicked()
            {
                self.active_tab = Tab::Compare;
            }
            ui.separator();

            // Viewport controls; inert while mask editing.
            ui.add_enabled_ui(!self.mask_edit && has_image, |ui| {
                if ui.button("−").on_hover_text("Zoom out").clicked() {
                    self.canvas.viewport.zoom_out();
                }
                if ui.button("+").on_hover_text("Zoom in").clicked() {
                    self.canvas.viewport.zoom_in();
                }
                if ui.button("1:1").on_hover_text("Reset view").clicked() {
                    self.canvas.reset_view();
                }
                ui.label(format!("{:.0}%", self.canvas.viewport.scale * 100.0));
            });

            if self.pending_generations > 0 {
                ui.separator();
                ui.spinner();
                ui.label("Generating…");
            }
        });
    }

    fn side_panel(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.heading("Edit");
        ui.add_space(4.0);

        let had_mask_edit = self.mask_edit;
        ui.checkbox(&mut self.mask_edit, "Mask edit mode");
        if self.mask_edit != had_mask_edit && self.mask_edit {
            // Entering mask mode: a panned/zoomed view would break the 1:1
            // buffer alignment, so the viewport goes back to identity.
            self.canvas.reset_view();
        }
        if self.mask_edit {
            ui.add_space(4.0);
            self.painter.ui(ui);
        }

        ui.separator();
        ui.label("Prompt");
        ui.add(
            egui::TextEdit::multiline(&mut self.prompt)
                .desired_rows(3)
                .hint_text("Describe the change…"),
        );
        let enabled = self.can_generate();
        if ui
            .add_enabled(enabled, egui::Button::new("Generate"))
            .clicked()
        {
            self.submit_generation(ctx);
        }
        if self.mask_edit && self.painter.is_empty() {
            ui.weak("Paint a mask region to enable generation");
        }

        ui.separator();
        egui::CollapsingHeader::new("Adjustments")
            .default_open(false)
            .show(ui, |ui| {
                ui.add(
                    egui::Slider::new(&mut self.adjustments.brightness, 0.0..=200.0)
                        .text("Brightness"),
                );
                ui.add(
                    egui::Slider::new(&mut self.adjustments.contrast, 0.0..=200.0).text("Contrast"),
                );
                ui.add(
                    egui::Slider::new(&mut self.adjustments.saturation, 0.0..=200.0)
                        .text("Saturation"),
                );
                if ui.button("Reset").clicked() {
                    self.adjustments = DisplayAdjustments::default();
                }
            });

        egui::CollapsingHeader::new("Annotations")
            .default_open(false)
            .show(ui, |ui| self.annotations_ui(ui));

        if !self.status.is_empty() {
            ui.separator();
            ui.colored_label(ui.visuals().warn_fg_color, &self.status);
        }

        if let Some(path) = logger::log_path() {
            ui.separator();
            ui.weak(format!("Session log: {}", path.display()))
                .on_hover_text("Truncated at each launch");
        }
    }

    fn annotations_ui(&mut self, ui: &mut egui::Ui) {
        let mut remove: Option<usize> = None;
        for (i, ann) in self.annotations.iter_mut().enumerate() {
            ui.push_id(i, |ui| {
                ui.horizontal(|ui| {
                    ui.text_edit_singleline(&mut ann.name);
                    if ui.small_button("✕").clicked() {
                        remove = Some(i);
                    }
                });
                ui.horizontal(|ui| {
                    ui.label("Category");
                    ui.text_edit_singleline(&mut ann.category);
                });
                ui.text_edit_singleline(&mut ann.description);
                ui.add(egui::Slider::new(&mut ann.x_pct, 0.0..=100.0).text("x %"));
                ui.add(egui::Slider::new(&mut ann.y_pct, 0.0..=100.0).text("y %"));
                ui.horizontal(|ui| {
                    ui.label("Color");
                    ui.text_edit_singleline(&mut ann.hex_color);
                });
                ui.separator();
            });
        }
        if let Some(i) = remove {
            self.annotations.remove(i);
        }
        if ui.button("Add annotation").clicked() {
            self.annotations.push(Annotation {
                x_pct: 50.0,
                y_pct: 50.0,
                name: "Material".to_string(),
                category: "Category".to_string(),
                description: String::new(),
                hex_color: "#40a0ff".to_string(),
            });
        }
    }

    fn central_panel(&mut self, ui: &mut egui::Ui) {
        match self.active_tab {
            Tab::Canvas => {
                let display = self.history.active_image().or(self.original.as_ref());
                self.canvas.show(
                    ui,
                    display,
                    self.display_rev,
                    &mut self.painter,
                    self.mask_edit,
                );
            }
            Tab::Compare => {
                let (Some(before), Some(after)) =
                    (self.original.as_ref(), self.history.active_image())
                else {
                    self.active_tab = Tab::Canvas;
                    return;
                };
                self.compare
                    .show(ui, before, self.original_rev, after, self.display_rev);
            }
        }
    }
}

impl eframe::App for GenBrushApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_generation_results();

        // Paint events gate the Generate button; selection swaps reset the
        // viewport so the new image is framed from identity.
        if let Some(is_empty) = self.painter.take_mask_event() {
            log_info!("mask changed, empty={}", is_empty);
        }
        if self.history.take_selection_changed() {
            self.display_rev += 1;
            self.canvas.reset_view();
        }

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| self.toolbar(ui));

        egui::SidePanel::left("edit_panel")
            .default_width(260.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| self.side_panel(ui, ctx));
            });

        egui::SidePanel::right("history_panel")
            .default_width(200.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| self.history.ui(ui));
            });

        egui::CentralPanel::default().show(ctx, |ui| self.central_panel(ui));
    }
}
