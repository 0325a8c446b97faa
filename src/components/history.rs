// ============================================================================
// GENERATION HISTORY — ordered steps, each with its candidate outputs
// ============================================================================
//
// History is a sequence of steps where each step owns its prompt, kind, and
// candidate images as fields of one object.  There are no parallel arrays to
// keep in lockstep: a step cannot exist without its metadata.

use eframe::egui;
use image::RgbaImage;
use uuid::Uuid;

/// How a result was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationKind {
    /// Whole-image edit, no mask sent.
    FullImage,
    /// Edit scoped to the painted mask region.
    MaskedRegion,
}

impl GenerationKind {
    pub fn label(&self) -> &'static str {
        match self {
            GenerationKind::FullImage => "Full image",
            GenerationKind::MaskedRegion => "Masked region",
        }
    }
}

/// One generation request and everything it produced.
pub struct GenerationStep {
    pub id: Uuid,
    pub prompt: String,
    pub kind: GenerationKind,
    /// Candidate outputs for this step; never empty.
    pub candidates: Vec<RgbaImage>,
    /// Index into `candidates` of the displayed variant.
    pub selected: usize,
}

impl GenerationStep {
    pub fn selected_image(&self) -> &RgbaImage {
        &self.candidates[self.selected]
    }
}

/// Side-panel history list.  The host consumes selection changes via
/// [`HistoryPanel::take_selection_changed`] and swaps the displayed image.
#[derive(Default)]
pub struct HistoryPanel {
    steps: Vec<GenerationStep>,
    /// Active step index; None means the original source is displayed.
    active: Option<usize>,
    selection_changed: bool,
}

impl HistoryPanel {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn active_step(&self) -> Option<&GenerationStep> {
        self.active.map(|i| &self.steps[i])
    }

    /// Image currently selected in history, or None when the original
    /// source should be shown.
    pub fn active_image(&self) -> Option<&RgbaImage> {
        self.active_step().map(|s| s.selected_image())
    }

    pub fn take_selection_changed(&mut self) -> bool {
        std::mem::take(&mut self.selection_changed)
    }

    /// Record a freshly generated result and make it active.  A result for
    /// the same prompt and kind as the latest step becomes another candidate
    /// of that step (a variant); anything else starts a new step.
    pub fn push_result(&mut self, prompt: &str, kind: GenerationKind, image: RgbaImage) {
        match self.steps.last_mut() {
            Some(last) if last.prompt == prompt && last.kind == kind => {
                last.candidates.push(image);
                last.selected = last.candidates.len() - 1;
            }
            _ => {
                self.steps.push(GenerationStep {
                    id: Uuid::new_v4(),
                    prompt: prompt.to_string(),
                    kind,
                    candidates: vec![image],
                    selected: 0,
                });
            }
        }
        self.active = Some(self.steps.len() - 1);
        self.selection_changed = true;
    }

    /// Activate a step (and optionally one of its candidates). Out-of-range
    /// indices are ignored.
    pub fn select(&mut self, step: usize, candidate: Option<usize>) {
        if step >= self.steps.len() {
            return;
        }
        if let Some(c) = candidate {
            if c >= self.steps[step].candidates.len() {
                return;
            }
            self.steps[step].selected = c;
        }
        self.active = Some(step);
        self.selection_changed = true;
    }

    /// Show the original source image again.
    pub fn select_source(&mut self) {
        if self.active.is_some() {
            self.active = None;
            self.selection_changed = true;
        }
    }

    /// Drop all steps. Called when a new source image is opened.
    pub fn clear(&mut self) {
        self.steps.clear();
        self.active = None;
        self.selection_changed = true;
    }

    // -- panel UI -------------------------------------------------------------

    pub fn ui(&mut self, ui: &mut egui::Ui) {
        ui.label("History");
        if self.steps.is_empty() {
            ui.weak("No generations yet");
            return;
        }

        let source_active = self.active.is_none();
        if ui.selectable_label(source_active, "Original").clicked() {
            self.select_source();
        }

        let mut clicked: Option<(usize, Option<usize>)> = None;
        for (i, step) in self.steps.iter().enumerate() {
            let is_active = self.active == Some(i);
            let title = format!("{}. {}", i + 1, truncate_prompt(&step.prompt));
            if ui
                .selectable_label(is_active, title)
                .on_hover_text(format!("{} — {}", step.kind.label(), step.prompt))
                .clicked()
            {
                clicked = Some((i, None));
            }
            if step.candidates.len() > 1 {
                ui.horizontal(|ui| {
                    for c in 0..step.candidates.len() {
                        let tag = format!("v{}", c + 1);
                        if ui
                            .selectable_label(is_active && step.selected == c, tag)
                            .clicked()
                        {
                            clicked = Some((i, Some(c)));
                        }
                    }
                });
            }
        }
        if let Some((step, candidate)) = clicked {
            self.select(step, candidate);
        }
    }
}

fn truncate_prompt(prompt: &str) -> String {
    const MAX: usize = 28;
    if prompt.chars().count() <= MAX {
        prompt.to_string()
    } else {
        let cut: String = prompt.chars().take(MAX).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img(v: u8) -> RgbaImage {
        RgbaImage::from_pixel(2, 2, image::Rgba([v, v, v, 255]))
    }

    #[test]
    fn same_prompt_groups_as_variants() {
        let mut h = HistoryPanel::default();
        h.push_result("make it dusk", GenerationKind::FullImage, img(1));
        h.push_result("make it dusk", GenerationKind::FullImage, img(2));
        assert_eq!(h.steps.len(), 1);
        assert_eq!(h.steps[0].candidates.len(), 2);
        // Newest variant is selected.
        assert_eq!(h.active_image().unwrap().get_pixel(0, 0).0[0], 2);
    }

    #[test]
    fn different_prompt_or_kind_starts_a_new_step() {
        let mut h = HistoryPanel::default();
        h.push_result("dusk", GenerationKind::FullImage, img(1));
        h.push_result("dusk", GenerationKind::MaskedRegion, img(2));
        h.push_result("dawn", GenerationKind::MaskedRegion, img(3));
        assert_eq!(h.steps.len(), 3);
        assert_ne!(h.steps[0].id, h.steps[1].id);
    }

    #[test]
    fn select_ignores_out_of_range() {
        let mut h = HistoryPanel::default();
        h.push_result("dusk", GenerationKind::FullImage, img(1));
        h.take_selection_changed();

        h.select(5, None);
        assert!(!h.take_selection_changed());
        h.select(0, Some(9));
        assert!(!h.take_selection_changed());
        h.select(0, Some(0));
        assert!(h.take_selection_changed());
    }

    #[test]
    fn select_source_shows_original() {
        let mut h = HistoryPanel::default();
        h.push_result("dusk", GenerationKind::FullImage, img(1));
        assert!(h.active_image().is_some());
        h.select_source();
        assert!(h.active_image().is_none());
    }

    #[test]
    fn clear_drops_everything() {
        let mut h = HistoryPanel::default();
        h.push_result("dusk", GenerationKind::FullImage, img(1));
        h.clear();
        assert!(h.is_empty());
        assert!(h.active_image().is_none());
    }
}
