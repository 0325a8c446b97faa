// ============================================================================
// MASK BUFFER — paint primitives for the edit-region mask
// ============================================================================
//
// The mask is an RGBA buffer sized to the displayed image element (not the
// source resolution).  Painting writes the tool color directly — the export
// contract only distinguishes alpha > 0, so strokes are idempotent and
// overlapping segments never darken the on-screen preview.

use image::RgbaImage;
use rayon::prelude::*;

/// Default Magic Wand tolerance. User-facing values are calibrated against
/// the sum-of-channel-differences metric in [`MaskBuffer::flood_fill`].
pub const DEFAULT_TOLERANCE: i32 = 20;

/// Per-pixel alpha mask, same dimensions as the rendered image element.
///
/// `painted` counts pixels with alpha > 0 so emptiness checks are O(1) —
/// the host gates generation on every paint event.
pub struct MaskBuffer {
    img: RgbaImage,
    painted: u64,
}

/// Full-buffer snapshot taken at the start of a Line gesture, restored on
/// every pointer move so the live preview never accumulates.
pub struct MaskSnapshot {
    data: Vec<u8>,
    painted: u64,
}

impl MaskBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            img: RgbaImage::new(width, height),
            painted: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.img.width()
    }

    pub fn height(&self) -> u32 {
        self.img.height()
    }

    /// True when the buffer has usable pixel area.  Paint and export
    /// operations no-op on a zero-size buffer (unmounted element).
    pub fn has_area(&self) -> bool {
        self.img.width() > 0 && self.img.height() > 0
    }

    pub fn is_empty(&self) -> bool {
        self.painted == 0
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.img
    }

    /// Match the buffer to a new rendered-element size.  Any prior content is
    /// discarded — resizing mid-session is documented data loss, not an error.
    /// Returns true when the dimensions actually changed.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if self.img.width() == width && self.img.height() == height {
            return false;
        }
        self.img = RgbaImage::new(width, height);
        self.painted = 0;
        true
    }

    pub fn clear(&mut self) {
        for px in self.img.pixels_mut() {
            px.0 = [0, 0, 0, 0];
        }
        self.painted = 0;
    }

    pub fn snapshot(&self) -> MaskSnapshot {
        MaskSnapshot {
            data: self.img.as_raw().clone(),
            painted: self.painted,
        }
    }

    /// Restore a snapshot taken from a buffer of the same dimensions.
    /// Silently ignored if the buffer was resized since the snapshot — the
    /// in-progress stroke is discarded along with the old contents.
    pub fn restore(&mut self, snap: &MaskSnapshot) {
        if snap.data.len() != self.img.as_raw().len() {
            return;
        }
        self.img.copy_from_slice(&snap.data);
        self.painted = snap.painted;
    }

    /// Paint a stroke segment from `p0` to `p1` with round caps and joins:
    /// every pixel whose center lies within `width / 2` of the segment gets
    /// the tool color.  Consecutive segments that share an endpoint therefore
    /// form a continuous path even when pointer events arrive sparsely.
    pub fn paint_segment(&mut self, p0: (f32, f32), p1: (f32, f32), width: f32, color: [u8; 4]) {
        if !self.has_area() {
            return;
        }
        let radius = (width * 0.5).max(0.5);
        let (w, h) = (self.img.width() as i32, self.img.height() as i32);

        let min_x = ((p0.0.min(p1.0) - radius).floor() as i32).max(0);
        let max_x = ((p0.0.max(p1.0) + radius).ceil() as i32).min(w - 1);
        let min_y = ((p0.1.min(p1.1) - radius).floor() as i32).max(0);
        let max_y = ((p0.1.max(p1.1) + radius).ceil() as i32).min(h - 1);
        if min_x > max_x || min_y > max_y {
            return;
        }

        let radius_sq = radius * radius;
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let cx = x as f32 + 0.5;
                let cy = y as f32 + 0.5;
                if dist_sq_to_segment(cx, cy, p0, p1) <= radius_sq {
                    self.write_pixel(x as u32, y as u32, color);
                }
            }
        }
    }

    /// Magic Wand region paint.  `reference` is the source image resampled to
    /// this buffer's resolution (the fill matches source colors, never the
    /// mask's own strokes).  Stack-based 4-connected fill; a neighbor is
    /// included when the sum of its absolute channel differences from the
    /// seed color is at most `tolerance * 3` (four channel differences summed
    /// against a per-channel threshold — preserved exactly, user tolerances
    /// are calibrated against it).  Included pixels get the tool color.
    /// One-shot; no drag continuation.  Returns the number of pixels filled.
    pub fn flood_fill(
        &mut self,
        reference: &RgbaImage,
        seed: (u32, u32),
        tolerance: i32,
        color: [u8; 4],
    ) -> usize {
        let (w, h) = (self.img.width(), self.img.height());
        if w == 0 || h == 0 || reference.width() != w || reference.height() != h {
            return 0;
        }
        if seed.0 >= w || seed.1 >= h {
            return 0;
        }

        let wu = w as usize;
        let flat = reference.as_raw();
        let threshold = tolerance.max(0) * 3;

        #[inline(always)]
        fn channel_sum_diff(flat: &[u8], idx: usize, seed_px: [u8; 4]) -> i32 {
            let o = idx * 4;
            (flat[o] as i32 - seed_px[0] as i32).abs()
                + (flat[o + 1] as i32 - seed_px[1] as i32).abs()
                + (flat[o + 2] as i32 - seed_px[2] as i32).abs()
                + (flat[o + 3] as i32 - seed_px[3] as i32).abs()
        }

        let seed_idx = seed.1 as usize * wu + seed.0 as usize;
        let seed_px = {
            let o = seed_idx * 4;
            [flat[o], flat[o + 1], flat[o + 2], flat[o + 3]]
        };

        // visited doubles as the fill record; packed flat indices keep the
        // DFS stack compact (worst case O(w*h) for a uniform image).
        let mut visited = vec![false; wu * h as usize];
        let mut stack: Vec<u32> = Vec::with_capacity(4096);
        visited[seed_idx] = true;
        stack.push(seed_idx as u32);
        let mut filled = 0usize;

        while let Some(idx) = stack.pop() {
            let idx = idx as usize;
            let x = (idx % wu) as u32;
            let y = (idx / wu) as u32;
            self.write_pixel(x, y, color);
            filled += 1;

            if x > 0 {
                let ni = idx - 1;
                if !visited[ni] && channel_sum_diff(flat, ni, seed_px) <= threshold {
                    visited[ni] = true;
                    stack.push(ni as u32);
                }
            }
            if x + 1 < w {
                let ni = idx + 1;
                if !visited[ni] && channel_sum_diff(flat, ni, seed_px) <= threshold {
                    visited[ni] = true;
                    stack.push(ni as u32);
                }
            }
            if y > 0 {
                let ni = idx - wu;
                if !visited[ni] && channel_sum_diff(flat, ni, seed_px) <= threshold {
                    visited[ni] = true;
                    stack.push(ni as u32);
                }
            }
            if y + 1 < h {
                let ni = idx + wu;
                if !visited[ni] && channel_sum_diff(flat, ni, seed_px) <= threshold {
                    visited[ni] = true;
                    stack.push(ni as u32);
                }
            }
        }

        filled
    }

    /// Convert the painted (colored, semi-transparent) buffer into the strict
    /// binary convention the generation backend expects: alpha > 0 becomes
    /// opaque white (the edit region), everything else opaque black.  Output
    /// alpha is 255 everywhere.  `None` when the buffer has zero area.
    pub fn binary_mask(&self) -> Option<RgbaImage> {
        binarize(&self.img)
    }

    #[inline]
    fn write_pixel(&mut self, x: u32, y: u32, color: [u8; 4]) {
        let px = self.img.get_pixel_mut(x, y);
        let was_painted = px.0[3] > 0;
        let now_painted = color[3] > 0;
        px.0 = color;
        match (was_painted, now_painted) {
            (false, true) => self.painted += 1,
            (true, false) => self.painted -= 1,
            _ => {}
        }
    }
}

/// Binarize any RGBA mask image: alpha > 0 becomes opaque white, everything
/// else opaque black, output alpha 255 everywhere.  `None` on zero area.
/// Also used by the CLI on masks loaded from disk.
pub fn binarize(src: &RgbaImage) -> Option<RgbaImage> {
    let (w, h) = (src.width(), src.height());
    if w == 0 || h == 0 {
        return None;
    }
    let raw = src.as_raw();
    let stride = w as usize * 4;
    let mut out = vec![0u8; stride * h as usize];

    out.par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row_out)| {
            let row_in = &raw[y * stride..(y + 1) * stride];
            for x in 0..w as usize {
                let pi = x * 4;
                let v = if row_in[pi + 3] > 0 { 255 } else { 0 };
                row_out[pi] = v;
                row_out[pi + 1] = v;
                row_out[pi + 2] = v;
                row_out[pi + 3] = 255;
            }
        });

    RgbaImage::from_raw(w, h, out)
}

/// Squared distance from point `(px, py)` to the segment `a`–`b`.
fn dist_sq_to_segment(px: f32, py: f32, a: (f32, f32), b: (f32, f32)) -> f32 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq <= f32::EPSILON {
        0.0
    } else {
        (((px - a.0) * dx + (py - a.1) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (qx, qy) = (a.0 + t * dx, a.1 + t * dy);
    let (ex, ey) = (px - qx, py - qy);
    ex * ex + ey * ey
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const RED: [u8; 4] = [255, 0, 0, 128];

    fn painted_set(mask: &MaskBuffer) -> Vec<(u32, u32)> {
        mask.as_image()
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[3] > 0)
            .map(|(x, y, _)| (x, y))
            .collect()
    }

    #[test]
    fn segment_connects_sparse_points() {
        // Large gaps between pointer samples must still produce a continuous
        // band along each segment.
        let mut mask = MaskBuffer::new(100, 100);
        let points = [(5.0, 50.0), (40.0, 50.0), (90.0, 50.0)];
        for pair in points.windows(2) {
            mask.paint_segment(pair[0], pair[1], 6.0, RED);
        }
        for x in 5..=90 {
            assert!(
                mask.as_image().get_pixel(x, 50).0[3] > 0,
                "gap in stroke at x={x}"
            );
        }
    }

    #[test]
    fn segment_has_round_caps() {
        let mut mask = MaskBuffer::new(60, 60);
        // Zero-length segment degenerates to a stamped disk.
        mask.paint_segment((30.0, 30.0), (30.0, 30.0), 10.0, RED);
        assert!(mask.as_image().get_pixel(30, 30).0[3] > 0);
        assert!(mask.as_image().get_pixel(34, 30).0[3] > 0);
        assert_eq!(mask.as_image().get_pixel(40, 30).0[3], 0);
    }

    #[test]
    fn snapshot_restore_discards_preview() {
        let mut mask = MaskBuffer::new(50, 50);
        mask.paint_segment((5.0, 5.0), (20.0, 5.0), 4.0, RED);
        let snap = mask.snapshot();
        let committed = painted_set(&mask);

        // Several preview segments, each undone before the next — the Line
        // tool's restore-then-draw loop.
        for end in [(30.0, 30.0), (45.0, 10.0), (10.0, 45.0)] {
            mask.restore(&snap);
            mask.paint_segment((5.0, 5.0), end, 4.0, RED);
        }
        mask.restore(&snap);
        assert_eq!(painted_set(&mask), committed);
        assert!(!mask.is_empty());
    }

    #[test]
    fn restore_after_resize_is_ignored() {
        let mut mask = MaskBuffer::new(40, 40);
        mask.paint_segment((10.0, 10.0), (30.0, 10.0), 4.0, RED);
        let snap = mask.snapshot();
        mask.resize(20, 20);
        mask.restore(&snap);
        assert!(mask.is_empty());
        assert_eq!(mask.width(), 20);
    }

    #[test]
    fn resize_clears_content() {
        let mut mask = MaskBuffer::new(40, 40);
        mask.paint_segment((5.0, 5.0), (35.0, 35.0), 8.0, RED);
        assert!(!mask.is_empty());
        assert!(mask.resize(41, 40));
        assert!(mask.is_empty());
        // Same size is a no-op and keeps content.
        let mut mask = MaskBuffer::new(40, 40);
        mask.paint_segment((5.0, 5.0), (35.0, 35.0), 8.0, RED);
        assert!(!mask.resize(40, 40));
        assert!(!mask.is_empty());
    }

    #[test]
    fn flood_fill_respects_hard_edge_at_zero_tolerance() {
        // Left half blue, right half green, hard vertical edge at x=10.
        let mut reference = RgbaImage::new(20, 10);
        for (x, _, px) in reference.enumerate_pixels_mut() {
            px.0 = if x < 10 { [0, 0, 255, 255] } else { [0, 255, 0, 255] };
        }
        let mut mask = MaskBuffer::new(20, 10);
        let filled = mask.flood_fill(&reference, (3, 5), 0, RED);
        assert_eq!(filled, 10 * 10);
        for (x, y, px) in mask.as_image().enumerate_pixels() {
            if x < 10 {
                assert!(px.0[3] > 0, "region A pixel ({x},{y}) not filled");
            } else {
                assert_eq!(px.0[3], 0, "region B pixel ({x},{y}) leaked");
            }
        }
    }

    #[test]
    fn flood_fill_tolerance_sums_channel_differences() {
        // Seed (10,10,10,255); its neighbor differs by 10 on each of three
        // channels: total 30.  tolerance 10 -> threshold 30 includes it,
        // tolerance 9 -> threshold 27 does not.
        let mut reference = RgbaImage::new(2, 1);
        reference.put_pixel(0, 0, Rgba([10, 10, 10, 255]));
        reference.put_pixel(1, 0, Rgba([20, 20, 20, 255]));

        let mut mask = MaskBuffer::new(2, 1);
        assert_eq!(mask.flood_fill(&reference, (0, 0), 10, RED), 2);

        let mut mask = MaskBuffer::new(2, 1);
        assert_eq!(mask.flood_fill(&reference, (0, 0), 9, RED), 1);
    }

    #[test]
    fn flood_fill_dimension_mismatch_is_noop() {
        let reference = RgbaImage::new(30, 30);
        let mut mask = MaskBuffer::new(20, 20);
        assert_eq!(mask.flood_fill(&reference, (5, 5), 20, RED), 0);
        assert!(mask.is_empty());

        let mut empty = MaskBuffer::new(0, 0);
        assert_eq!(empty.flood_fill(&RgbaImage::new(0, 0), (0, 0), 20, RED), 0);
    }

    #[test]
    fn binary_mask_is_white_iff_alpha_positive() {
        let mut mask = MaskBuffer::new(8, 8);
        mask.paint_segment((2.0, 2.0), (5.0, 2.0), 2.0, [90, 30, 200, 1]);
        let binary = mask.binary_mask().unwrap();
        for (x, y, px) in binary.enumerate_pixels() {
            let src_alpha = mask.as_image().get_pixel(x, y).0[3];
            let expected = if src_alpha > 0 {
                [255, 255, 255, 255]
            } else {
                [0, 0, 0, 255]
            };
            assert_eq!(px.0, expected, "pixel ({x},{y})");
        }
    }

    #[test]
    fn binary_mask_requires_area() {
        assert!(MaskBuffer::new(0, 10).binary_mask().is_none());
        assert!(MaskBuffer::new(10, 0).binary_mask().is_none());
    }

    #[test]
    fn brush_band_example_scenario() {
        // Stroke from (10,10) to (50,10), size 20, on a 100x100 buffer:
        // a band roughly y in [0,20], x in [0,60] is painted, rest is black
        // after export.
        let mut mask = MaskBuffer::new(100, 100);
        mask.paint_segment((10.0, 10.0), (50.0, 10.0), 20.0, RED);
        let binary = mask.binary_mask().unwrap();

        assert_eq!(binary.get_pixel(30, 10).0, [255, 255, 255, 255]);
        assert_eq!(binary.get_pixel(10, 5).0, [255, 255, 255, 255]);
        assert_eq!(binary.get_pixel(50, 15).0, [255, 255, 255, 255]);
        // Well outside the band.
        assert_eq!(binary.get_pixel(70, 10).0, [0, 0, 0, 255]);
        assert_eq!(binary.get_pixel(30, 40).0, [0, 0, 0, 255]);
        assert_eq!(binary.get_pixel(90, 90).0, [0, 0, 0, 255]);
    }
}
