// ============================================================================
// GenBrush CLI — headless annotation compositing and mask export
// ============================================================================
//
// Usage examples:
//   genbrush --input photo.png --annotations callouts.json --output out.jpg
//   genbrush -i photo.jpg -a callouts.json -o out.png --brightness 110
//   genbrush -i painted_mask.png --binarize-mask -o mask.png
//
// No GUI is opened in CLI mode.  All processing runs synchronously on the
// current thread.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::io::{self, SaveFormat};
use crate::ops::adjustments::DisplayAdjustments;
use crate::ops::{mask, overlay, text};

/// GenBrush headless processor.
///
/// Bake annotation callouts into images and export binary edit masks
/// without opening the GUI.
#[derive(Parser, Debug)]
#[command(
    name = "genbrush",
    about = "GenBrush headless annotation compositor",
    long_about = "Bake annotation callouts (from a JSON file) into an image, or convert a\n\
                  painted mask into the binary white/black convention, without opening\n\
                  the GUI.  Supports PNG, JPEG, WEBP, and BMP.\n\n\
                  Example:\n  \
                  genbrush --input photo.png --annotations callouts.json --output out.jpg\n  \
                  genbrush -i painted_mask.png --binarize-mask -o mask.png"
)]
pub struct CliArgs {
    /// Input image file.
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// JSON file with an array of annotations to composite onto the image.
    #[arg(short, long, value_name = "FILE.json")]
    pub annotations: Option<PathBuf>,

    /// Treat the input as a painted mask and export its binary
    /// white/black form instead of compositing annotations.
    #[arg(long, default_value_t = false)]
    pub binarize_mask: bool,

    /// Output file path.  Format is inferred from the extension
    /// (png, jpg, webp, bmp); defaults to "<input stem>_out.jpg".
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// JPEG quality (1-100).
    #[arg(short, long, default_value_t = io::JPEG_QUALITY, value_name = "1-100")]
    pub quality: u8,

    /// Brightness percentage baked into the output (100 = unchanged).
    #[arg(long, default_value_t = 100.0, value_name = "PCT")]
    pub brightness: f32,

    /// Contrast percentage baked into the output (100 = unchanged).
    #[arg(long, default_value_t = 100.0, value_name = "PCT")]
    pub contrast: f32,

    /// Saturation percentage baked into the output (100 = unchanged).
    #[arg(long, default_value_t = 100.0, value_name = "PCT")]
    pub saturation: f32,

    /// Print timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns true when a CLI-mode flag is present in the real process
    /// arguments.  Used by `main()` to route before creating a window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }
}

/// Run all CLI processing and return an OS exit code.
/// `0` = success, `1` = failure.
pub fn run(args: CliArgs) -> ExitCode {
    let start = Instant::now();

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input, args.binarize_mask));
    let format = output
        .extension()
        .and_then(|e| e.to_str())
        .and_then(SaveFormat::from_extension)
        .unwrap_or(if args.binarize_mask {
            SaveFormat::Png
        } else {
            SaveFormat::Jpeg
        });

    let image = match io::load_image_sync(&args.input) {
        Ok(img) => img,
        Err(e) => {
            eprintln!("error: could not load '{}': {}", args.input.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let result = if args.binarize_mask {
        run_binarize(&image, &output, format, args.quality)
    } else {
        run_composite(&args, &image, &output, format)
    };

    match result {
        Ok(()) => {
            if args.verbose {
                println!(
                    "wrote {} in {:.1} ms",
                    output.display(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
            }
            ExitCode::SUCCESS
        }
        Err(msg) => {
            eprintln!("error: {}", msg);
            ExitCode::FAILURE
        }
    }
}

fn run_binarize(
    image: &image::RgbaImage,
    output: &Path,
    format: SaveFormat,
    quality: u8,
) -> Result<(), String> {
    let binary = mask::binarize(image).ok_or("input mask has zero area")?;
    io::encode_and_write(&binary, output, format, quality).map_err(|e| e.to_string())
}

fn run_composite(
    args: &CliArgs,
    image: &image::RgbaImage,
    output: &Path,
    format: SaveFormat,
) -> Result<(), String> {
    let annotations: Vec<overlay::Annotation> = match &args.annotations {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;
            serde_json::from_str(&json)
                .map_err(|e| format!("invalid annotations in '{}': {}", path.display(), e))?
        }
        None => Vec::new(),
    };

    let adjustments = DisplayAdjustments {
        brightness: args.brightness,
        contrast: args.contrast,
        saturation: args.saturation,
    };

    let font = text::load_ui_font();
    if font.is_none() && !annotations.is_empty() {
        eprintln!("warning: no system font found, annotation text will be omitted");
    }

    let composed = overlay::compose_annotations(image, &annotations, font.as_ref(), &adjustments);
    io::encode_and_write(&composed, output, format, args.quality).map_err(|e| e.to_string())
}

fn default_output_path(input: &Path, binarize: bool) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let (suffix, format) = if binarize {
        ("_mask", SaveFormat::Png)
    } else {
        ("_out", SaveFormat::Jpeg)
    };
    input.with_file_name(format!("{stem}{suffix}.{}", format.extension()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_names() {
        let p = default_output_path(Path::new("/tmp/photo.png"), false);
        assert_eq!(p, Path::new("/tmp/photo_out.jpg"));
        let p = default_output_path(Path::new("shot.jpg"), true);
        assert_eq!(p, Path::new("shot_mask.png"));
    }

    #[test]
    fn annotations_json_shape_parses() {
        let json = r##"[{
            "x_pct": 30.0, "y_pct": 60.0,
            "name": "Oak", "category": "Wood",
            "description": "Warm grain", "hex_color": "#c08040"
        }]"##;
        let anns: Vec<overlay::Annotation> = serde_json::from_str(json).unwrap();
        assert_eq!(anns.len(), 1);
        assert_eq!(anns[0].name, "Oak");
    }
}
