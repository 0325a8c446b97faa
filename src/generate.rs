// ============================================================================
// GENERATION PIPELINE — backend seam and background job plumbing
// ============================================================================
//
// The app never blocks on a generation: requests are packed into base64
// payloads, handed to a backend on a worker thread, and results come back
// over an mpsc channel that `update()` drains each frame.

use std::sync::Arc;
use std::sync::mpsc;

use image::RgbaImage;

use crate::components::history::GenerationKind;
use crate::io;

/// Errors surfaced by a generation backend.
#[derive(Debug)]
pub enum GenerateError {
    /// The request payload could not be built or parsed.
    Payload(String),
    /// The backend rejected or failed the request.
    Backend(String),
    /// The backend answered but its image could not be decoded.
    Decode(String),
}

impl std::fmt::Display for GenerateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerateError::Payload(e) => write!(f, "Request payload error: {}", e),
            GenerateError::Backend(e) => write!(f, "Generation failed: {}", e),
            GenerateError::Decode(e) => write!(f, "Could not decode backend image: {}", e),
        }
    }
}

/// One generation request, fully packed for transport.  The mask payload is
/// present only for region edits; its absence means a whole-image edit.
#[derive(Clone, Debug)]
pub struct GenerateRequest {
    pub prompt: String,
    /// Base64 JPEG of the image the edit starts from.
    pub image_jpeg_b64: String,
    /// Base64 PNG of the binary white/black mask, if the edit is scoped.
    pub mask_png_b64: Option<String>,
}

impl GenerateRequest {
    /// Pack a request from in-memory images.  `mask` must already be the
    /// exported binary form (white = edit, black = keep).
    pub fn pack(
        prompt: &str,
        image: &RgbaImage,
        mask: Option<&RgbaImage>,
    ) -> Result<Self, GenerateError> {
        let image_jpeg_b64 =
            io::jpeg_payload(image).map_err(|e| GenerateError::Payload(e.to_string()))?;
        let mask_png_b64 = match mask {
            Some(m) => {
                Some(io::png_payload(m).map_err(|e| GenerateError::Payload(e.to_string()))?)
            }
            None => None,
        };
        Ok(Self {
            prompt: prompt.to_string(),
            image_jpeg_b64,
            mask_png_b64,
        })
    }

    pub fn kind(&self) -> GenerationKind {
        if self.mask_png_b64.is_some() {
            GenerationKind::MaskedRegion
        } else {
            GenerationKind::FullImage
        }
    }
}

/// Result delivered from a background generation thread.
pub struct GenerateOutcome {
    pub prompt: String,
    pub kind: GenerationKind,
    pub result: Result<RgbaImage, GenerateError>,
}

/// A service that turns a prompt (plus optional mask) into a new image.
/// Implementations run on a worker thread and may block.
pub trait GenerateBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn generate(&self, request: &GenerateRequest) -> Result<RgbaImage, GenerateError>;
}

/// Run one request on a worker thread, delivering the outcome over `sender`
/// and waking the UI when it lands.  Callers bump their pending counter
/// before calling and decrement it when the outcome is drained.
pub fn spawn_generate_job(
    backend: Arc<dyn GenerateBackend>,
    request: GenerateRequest,
    sender: mpsc::Sender<GenerateOutcome>,
    ctx: eframe::egui::Context,
) {
    std::thread::spawn(move || {
        let kind = request.kind();
        crate::log_info!(
            "generate [{}] via {}: \"{}\"",
            kind.label(),
            backend.name(),
            request.prompt
        );
        let result = backend.generate(&request);
        if let Err(e) = &result {
            crate::log_err!("generate failed: {}", e);
        }
        let _ = sender.send(GenerateOutcome {
            prompt: request.prompt,
            kind,
            result,
        });
        ctx.request_repaint();
    });
}

// ============================================================================
// Offline stub backend
// ============================================================================

/// Deterministic local backend used when no real service is configured.
/// It tints the requested region with a prompt-derived color so that mask
/// scoping, history, and the comparison slider are all exercisable offline.
pub struct StubBackend;

impl GenerateBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<RgbaImage, GenerateError> {
        let mut img = io::decode_payload(&request.image_jpeg_b64)
            .map_err(|e| GenerateError::Payload(e.to_string()))?;

        let mask = match &request.mask_png_b64 {
            Some(data) => {
                let m = io::decode_payload(data)
                    .map_err(|e| GenerateError::Payload(e.to_string()))?;
                if m.dimensions() != img.dimensions() {
                    return Err(GenerateError::Backend(format!(
                        "mask is {}x{} but image is {}x{}",
                        m.width(),
                        m.height(),
                        img.width(),
                        img.height()
                    )));
                }
                Some(m)
            }
            None => None,
        };

        let tint = prompt_color(&request.prompt);
        // Region edits tint hard so the change is obvious; whole-image edits
        // tint gently to keep the photo recognizable.
        for (x, y, px) in img.enumerate_pixels_mut() {
            let strength = match &mask {
                Some(m) => {
                    if m.get_pixel(x, y).0[0] > 127 {
                        0.65
                    } else {
                        continue;
                    }
                }
                None => 0.3,
            };
            for c in 0..3 {
                px.0[c] =
                    (px.0[c] as f32 * (1.0 - strength) + tint[c] as f32 * strength).round() as u8;
            }
        }
        Ok(img)
    }
}

/// Stable prompt → color mapping (FNV-1a over the prompt bytes).
fn prompt_color(prompt: &str) -> [u8; 3] {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in prompt.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    [
        128 + (hash & 0x7f) as u8,
        128 + ((hash >> 8) & 0x7f) as u8,
        128 + ((hash >> 16) & 0x7f) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn white_mask_left_half(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, _| {
            if x < w / 2 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        })
    }

    #[test]
    fn masked_request_only_changes_white_region() {
        let src = RgbaImage::from_pixel(8, 8, Rgba([100, 100, 100, 255]));
        let mask = white_mask_left_half(8, 8);
        let req = GenerateRequest::pack("red brick", &src, Some(&mask)).unwrap();
        assert_eq!(req.kind(), GenerationKind::MaskedRegion);

        let out = StubBackend.generate(&req).unwrap();
        // JPEG transport is lossy; the untouched half stays near the source
        // while the masked half moves far from it.
        let kept = out.get_pixel(7, 4).0;
        for c in 0..3 {
            assert!((kept[c] as i32 - 100).abs() < 12, "kept half drifted: {kept:?}");
        }
        let edited = out.get_pixel(0, 4).0;
        let delta: i32 = (0..3).map(|c| (edited[c] as i32 - 100).abs()).sum();
        assert!(delta > 40, "edited half unchanged: {edited:?}");
    }

    #[test]
    fn full_image_request_changes_everything() {
        let src = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let req = GenerateRequest::pack("golden hour", &src, None).unwrap();
        assert_eq!(req.kind(), GenerationKind::FullImage);

        let out = StubBackend.generate(&req).unwrap();
        let px = out.get_pixel(2, 2).0;
        assert!(px[0] > 20 || px[1] > 20 || px[2] > 20);
    }

    #[test]
    fn mismatched_mask_dimensions_are_rejected() {
        let src = RgbaImage::from_pixel(8, 8, Rgba([10, 10, 10, 255]));
        let mask = white_mask_left_half(4, 4);
        let req = GenerateRequest::pack("x", &src, Some(&mask)).unwrap();
        assert!(matches!(
            StubBackend.generate(&req),
            Err(GenerateError::Backend(_))
        ));
    }

    #[test]
    fn prompt_color_is_deterministic() {
        assert_eq!(prompt_color("dusk"), prompt_color("dusk"));
        assert_ne!(prompt_color("dusk"), prompt_color("dawn"));
    }
}
