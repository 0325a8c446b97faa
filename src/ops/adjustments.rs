// ============================================================================
// DISPLAY ADJUSTMENTS — brightness / contrast / saturation
// ============================================================================
//
// On screen these run as cheap display-time filters; the overlay compositor
// reapplies them to the actual pixels before export, since the exported
// raster cannot inherit display styling.

use image::RgbaImage;
use rayon::prelude::*;

/// Percentage-based adjustments, 100 = neutral (filter-style semantics).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayAdjustments {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
}

impl Default for DisplayAdjustments {
    fn default() -> Self {
        Self {
            brightness: 100.0,
            contrast: 100.0,
            saturation: 100.0,
        }
    }
}

impl DisplayAdjustments {
    pub fn is_neutral(&self) -> bool {
        self.brightness == 100.0 && self.contrast == 100.0 && self.saturation == 100.0
    }
}

/// Apply the adjustments to a copy of `src`.  Alpha is preserved.
pub fn apply(src: &RgbaImage, adj: &DisplayAdjustments) -> RgbaImage {
    if adj.is_neutral() {
        return src.clone();
    }

    let (w, h) = (src.width(), src.height());
    let brightness = adj.brightness / 100.0;
    let contrast = adj.contrast / 100.0;
    let saturation = adj.saturation / 100.0;

    let stride = w as usize * 4;
    let src_raw = src.as_raw();
    let mut dst_raw = vec![0u8; stride * h as usize];

    dst_raw
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row_out)| {
            let row_in = &src_raw[y * stride..(y + 1) * stride];
            for x in 0..w as usize {
                let pi = x * 4;
                let mut r = row_in[pi] as f32;
                let mut g = row_in[pi + 1] as f32;
                let mut b = row_in[pi + 2] as f32;

                r *= brightness;
                g *= brightness;
                b *= brightness;

                r = (r - 128.0) * contrast + 128.0;
                g = (g - 128.0) * contrast + 128.0;
                b = (b - 128.0) * contrast + 128.0;

                // Rec. 709 luma as the desaturation target.
                let gray = 0.2126 * r + 0.7152 * g + 0.0722 * b;
                r = gray + (r - gray) * saturation;
                g = gray + (g - gray) * saturation;
                b = gray + (b - gray) * saturation;

                row_out[pi] = r.round().clamp(0.0, 255.0) as u8;
                row_out[pi + 1] = g.round().clamp(0.0, 255.0) as u8;
                row_out[pi + 2] = b.round().clamp(0.0, 255.0) as u8;
                row_out[pi + 3] = row_in[pi + 3];
            }
        });

    RgbaImage::from_raw(w, h, dst_raw).unwrap_or_else(|| src.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn neutral_is_identity() {
        let src = RgbaImage::from_pixel(4, 4, Rgba([90, 140, 30, 255]));
        let out = apply(&src, &DisplayAdjustments::default());
        assert_eq!(src.as_raw(), out.as_raw());
    }

    #[test]
    fn zero_brightness_is_black() {
        let src = RgbaImage::from_pixel(2, 2, Rgba([200, 100, 50, 200]));
        let adj = DisplayAdjustments {
            brightness: 0.0,
            contrast: 100.0,
            saturation: 100.0,
        };
        let out = apply(&src, &adj);
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0, 200]);
    }

    #[test]
    fn zero_saturation_is_gray() {
        let src = RgbaImage::from_pixel(2, 2, Rgba([250, 20, 20, 255]));
        let adj = DisplayAdjustments {
            brightness: 100.0,
            contrast: 100.0,
            saturation: 0.0,
        };
        let out = apply(&src, &adj);
        let px = out.get_pixel(0, 0).0;
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn contrast_pushes_away_from_midpoint() {
        let src = RgbaImage::from_pixel(1, 1, Rgba([160, 96, 128, 255]));
        let adj = DisplayAdjustments {
            brightness: 100.0,
            contrast: 200.0,
            saturation: 100.0,
        };
        let out = apply(&src, &adj);
        let px = out.get_pixel(0, 0).0;
        assert_eq!(px[0], 192); // (160-128)*2 + 128
        assert_eq!(px[1], 64); // (96-128)*2 + 128
        assert_eq!(px[2], 128); // midpoint unmoved
    }
}
