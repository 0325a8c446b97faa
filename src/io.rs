// ============================================================================
// IMAGE I/O — decode, encode, dialogs, and backend payload packing
// ============================================================================

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, RgbaImage};
use rfd::FileDialog;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

/// JPEG quality used for backend payloads and default saves.
pub const JPEG_QUALITY: u8 = 95;

/// Extensions accepted by the open dialog and the CLI.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];

/// Error type for image load/save operations.
#[derive(Debug)]
pub enum IoError {
    Io(std::io::Error),
    Decode(String),
    Encode(String),
    UnsupportedFormat(String),
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoError::Io(e) => write!(f, "I/O error: {}", e),
            IoError::Decode(e) => write!(f, "Image decode error: {}", e),
            IoError::Encode(e) => write!(f, "Image encode error: {}", e),
            IoError::UnsupportedFormat(e) => write!(f, "Unsupported format: {}", e),
        }
    }
}

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        IoError::Io(e)
    }
}

/// Raster output formats for the save path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveFormat {
    Png,
    Jpeg,
    Webp,
    Bmp,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Webp => "webp",
            SaveFormat::Bmp => "bmp",
        }
    }

    /// Map a file extension to a format; None for anything unknown.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "jpg" | "jpeg" => Some(SaveFormat::Jpeg),
            "webp" => Some(SaveFormat::Webp),
            "bmp" => Some(SaveFormat::Bmp),
            _ => None,
        }
    }
}

// ============================================================================
// Decode
// ============================================================================

/// Load an image file and decode it to RGBA.  Synchronous; callers that care
/// about UI responsiveness run this on a worker thread.
pub fn load_image_sync(path: &Path) -> Result<RgbaImage, IoError> {
    let img = image::open(path).map_err(|e| IoError::Decode(e.to_string()))?;
    Ok(img.to_rgba8())
}

/// Decode in-memory bytes (backend responses, pasted data) to RGBA.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, IoError> {
    let img = image::load_from_memory(bytes).map_err(|e| IoError::Decode(e.to_string()))?;
    Ok(img.to_rgba8())
}

// ============================================================================
// Encode
// ============================================================================

/// Encode RGBA pixels as PNG into a fresh byte buffer.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, IoError> {
    let mut out = Vec::new();
    let encoder = PngEncoder::new(&mut out);
    #[allow(deprecated)]
    encoder
        .encode(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ColorType::Rgba8,
        )
        .map_err(|e| IoError::Encode(e.to_string()))?;
    Ok(out)
}

/// Encode RGBA pixels as JPEG.  Alpha is dropped (JPEG has none).
pub fn encode_jpeg(image: &RgbaImage, quality: u8) -> Result<Vec<u8>, IoError> {
    let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode(
            rgb_image.as_raw(),
            rgb_image.width(),
            rgb_image.height(),
            image::ColorType::Rgb8,
        )
        .map_err(|e| IoError::Encode(e.to_string()))?;
    Ok(out)
}

/// Encode an image and write it to `path` in the requested format.
pub fn encode_and_write(
    image: &RgbaImage,
    path: &Path,
    format: SaveFormat,
    quality: u8,
) -> Result<(), IoError> {
    match format {
        SaveFormat::Png => {
            std::fs::write(path, encode_png(image)?)?;
        }
        SaveFormat::Jpeg => {
            std::fs::write(path, encode_jpeg(image, quality)?)?;
        }
        SaveFormat::Webp => {
            let dyn_img = DynamicImage::ImageRgba8(image.clone());
            dyn_img.save(path).map_err(|e| IoError::Encode(e.to_string()))?;
        }
        SaveFormat::Bmp => {
            let file = File::create(path)?;
            let mut writer = BufWriter::new(file);
            let mut encoder = BmpEncoder::new(&mut writer);
            encoder
                .encode(
                    image.as_raw(),
                    image.width(),
                    image.height(),
                    image::ColorType::Rgba8,
                )
                .map_err(|e| IoError::Encode(e.to_string()))?;
        }
    }
    Ok(())
}

// ============================================================================
// Backend payloads
// ============================================================================

/// Pack an image as a base64 JPEG payload for a generation request.
pub fn jpeg_payload(image: &RgbaImage) -> Result<String, IoError> {
    Ok(BASE64.encode(encode_jpeg(image, JPEG_QUALITY)?))
}

/// Pack a binary mask as a base64 PNG payload (lossless — the backend must
/// see exact white/black pixels, JPEG ringing would corrupt the region).
pub fn png_payload(image: &RgbaImage) -> Result<String, IoError> {
    Ok(BASE64.encode(encode_png(image)?))
}

/// Decode a base64 image payload from a backend response.
pub fn decode_payload(data: &str) -> Result<RgbaImage, IoError> {
    let bytes = BASE64
        .decode(data.trim())
        .map_err(|e| IoError::Decode(format!("base64: {}", e)))?;
    decode_image(&bytes)
}

// ============================================================================
// File dialogs
// ============================================================================

pub fn open_image_dialog() -> Option<PathBuf> {
    FileDialog::new()
        .add_filter("Images", IMAGE_EXTENSIONS)
        .add_filter("All Files", &["*"])
        .pick_file()
}

pub fn save_image_dialog(default_name: &str) -> Option<PathBuf> {
    FileDialog::new()
        .add_filter("PNG", &["png"])
        .add_filter("JPEG", &["jpg", "jpeg"])
        .add_filter("WEBP", &["webp"])
        .add_filter("BMP", &["bmp"])
        .set_file_name(default_name)
        .save_file()
}
