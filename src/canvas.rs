use image::imageops::FilterType;
use image::{Rgba, RgbaImage};
use rayon::prelude::*;

/// Longest edge a loaded photo is reduced to before editing.
pub const DEFAULT_MAX_EDGE: u32 = 800;
/// Translucency of the mask layer in the displayed composite.
pub const DEFAULT_MASK_OPACITY: f32 = 0.6;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
const PERMISSIVE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// A 2D grid of RGBA pixels. All three layers use this representation.
pub type RasterBuffer = RgbaImage;

// ============================================================================
// LAYER STACK — Base photo, editable Mask, Guard silhouette
// ============================================================================

/// Owns the three same-sized rasters of an editing session.
///
/// * `base`: the photo; written once per image load.
/// * `mask`: the editable body-part paint (RGBA, one color per part).
/// * `guard`: binary-alpha silhouette from the segmentation service; edits
///   outside it are discarded. Fully permissive until a service mask is loaded.
pub struct LayerStack {
    base: RasterBuffer,
    mask: RasterBuffer,
    guard: RasterBuffer,
    guard_loaded: bool,
    /// Bumped on every pixel mutation so views know when to re-upload.
    pub dirty_generation: u64,
}

impl LayerStack {
    pub fn new(width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        Self {
            base: RgbaImage::from_pixel(width, height, TRANSPARENT),
            mask: RgbaImage::from_pixel(width, height, TRANSPARENT),
            guard: RgbaImage::from_pixel(width, height, PERMISSIVE),
            guard_loaded: false,
            dirty_generation: 0,
        }
    }

    /// Build a stack around `image`, see [`LayerStack::load_base`].
    pub fn from_base(image: &RgbaImage, max_edge: Option<u32>) -> (Self, f32) {
        let mut stack = Self::new(1, 1);
        let scale = stack.load_base(image, max_edge);
        (stack, scale)
    }

    pub fn width(&self) -> u32 {
        self.base.width()
    }

    pub fn height(&self) -> u32 {
        self.base.height()
    }

    pub fn base(&self) -> &RasterBuffer {
        &self.base
    }

    pub fn mask(&self) -> &RasterBuffer {
        &self.mask
    }

    pub fn guard(&self) -> &RasterBuffer {
        &self.guard
    }

    pub fn has_guard(&self) -> bool {
        self.guard_loaded
    }

    #[cfg(test)]
    pub(crate) fn mask_mut(&mut self) -> &mut RasterBuffer {
        &mut self.mask
    }

    pub(crate) fn mask_and_guard_mut(&mut self) -> (&mut RasterBuffer, &RasterBuffer) {
        (&mut self.mask, &self.guard)
    }

    pub fn mark_dirty(&mut self) {
        self.dirty_generation = self.dirty_generation.wrapping_add(1);
    }

    /// Replace Base with `image`, optionally reduced so its longest edge is at
    /// most `max_edge` (aspect preserved, never enlarged). Mask is cleared and
    /// Guard returns to fully permissive. Returns the scale factor applied.
    pub fn load_base(&mut self, image: &RgbaImage, max_edge: Option<u32>) -> f32 {
        let (base, scale) = match max_edge {
            Some(edge) => downscale_to_max_edge(image, edge),
            None => (image.clone(), 1.0),
        };
        let (w, h) = base.dimensions();
        self.base = base;
        self.mask = RgbaImage::from_pixel(w, h, TRANSPARENT);
        self.guard = RgbaImage::from_pixel(w, h, PERMISSIVE);
        self.guard_loaded = false;
        self.mark_dirty();
        crate::log_info!(
            "Base loaded: {}×{} → {}×{} (scale {:.3})",
            image.width(),
            image.height(),
            w,
            h,
            scale
        );
        scale
    }

    /// Draw the service mask into Guard at Base resolution. Any pixel with
    /// non-zero alpha becomes fully inside the silhouette.
    pub fn load_guard(&mut self, mask_image: &RgbaImage) {
        let fitted = fit_to_raster(mask_image, self.width(), self.height());
        let mut guard = RgbaImage::from_pixel(self.width(), self.height(), TRANSPARENT);
        for (dst, src) in guard.pixels_mut().zip(fitted.pixels()) {
            if src[3] > 0 {
                *dst = PERMISSIVE;
            }
        }
        self.guard = guard;
        self.guard_loaded = true;
        self.mark_dirty();
    }

    /// Replace Mask with `mask_image` resampled to Base size, then clip it to Guard.
    pub fn load_mask(&mut self, mask_image: &RgbaImage) {
        self.mask = fit_to_raster(mask_image, self.width(), self.height());
        self.clip_mask_to_guard();
        self.mark_dirty();
    }

    /// Replace the live Mask with a history snapshot. Snapshots of a different
    /// size (from before a crop) are ignored.
    pub fn restore_mask(&mut self, snapshot: &RasterBuffer) -> bool {
        if snapshot.dimensions() != self.mask.dimensions() {
            crate::log_warn!(
                "restore_mask: snapshot {:?} does not match raster {:?}",
                snapshot.dimensions(),
                self.mask.dimensions()
            );
            return false;
        }
        self.mask.clone_from(snapshot);
        self.mark_dirty();
        true
    }

    pub fn clear_mask(&mut self) {
        self.mask = RgbaImage::from_pixel(self.width(), self.height(), TRANSPARENT);
        self.mark_dirty();
    }

    /// Intersect Mask with Guard across the whole raster.
    pub fn clip_mask_to_guard(&mut self) {
        let (w, h) = self.mask.dimensions();
        if w == 0 || h == 0 {
            return;
        }
        self.clip_region(0, 0, w - 1, h - 1);
    }

    /// Intersect Mask with Guard inside the inclusive pixel rectangle.
    /// Returns true when any mask pixel changed.
    pub fn clip_region(&mut self, min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> bool {
        let (w, h) = self.mask.dimensions();
        let max_x = max_x.min(w.saturating_sub(1));
        let max_y = max_y.min(h.saturating_sub(1));
        let mut changed = false;
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let keep = self.guard.get_pixel(x, y)[3];
                let px = self.mask.get_pixel_mut(x, y);
                let clipped = clip_pixel(*px, keep);
                if clipped != *px {
                    *px = clipped;
                    changed = true;
                }
            }
        }
        changed
    }

    /// Base at full opacity with Mask blended on top at `mask_opacity`.
    /// Pure function of the current layers; repeated calls are bit-identical.
    pub fn composite(&self, mask_opacity: f32) -> RasterBuffer {
        let (w, h) = self.base.dimensions();
        let mut out = self.base.clone();
        let row_len = w as usize * 4;
        let mask_raw = self.mask.as_raw();
        out.as_mut()
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| {
                let mask_row = &mask_raw[y * row_len..(y + 1) * row_len];
                for (dst, src) in row.chunks_exact_mut(4).zip(mask_row.chunks_exact(4)) {
                    let blended = blend_over(
                        Rgba([dst[0], dst[1], dst[2], dst[3]]),
                        Rgba([src[0], src[1], src[2], src[3]]),
                        mask_opacity,
                    );
                    dst.copy_from_slice(&blended.0);
                }
            });
        debug_assert_eq!(out.dimensions(), (w, h));
        out
    }
}

/// Alpha-intersection of one mask pixel with a guard alpha.
/// Fully clipped pixels collapse to transparent black.
pub(crate) fn clip_pixel(px: Rgba<u8>, guard_alpha: u8) -> Rgba<u8> {
    if guard_alpha == 255 {
        return px;
    }
    let a = (px[3] as u32 * guard_alpha as u32 + 127) / 255;
    if a == 0 {
        TRANSPARENT
    } else {
        Rgba([px[0], px[1], px[2], a as u8])
    }
}

/// Source-over compositing of `top` (scaled by `opacity`) onto `base`.
pub fn blend_over(base: Rgba<u8>, top: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let top_a = (top[3] as f32 / 255.0) * opacity;
    let base_a = base[3] as f32 / 255.0;
    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return TRANSPARENT;
    }

    let channel = |i: usize| -> u8 {
        let t = top[i] as f32 * top_a;
        let b = base[i] as f32 * base_a * (1.0 - top_a);
        ((t + b) / out_a).round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        channel(0),
        channel(1),
        channel(2),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

/// Reduce `image` so its longest edge is at most `max_edge`. Never enlarges.
pub fn downscale_to_max_edge(image: &RgbaImage, max_edge: u32) -> (RgbaImage, f32) {
    let (w, h) = image.dimensions();
    let longest = w.max(h);
    if max_edge == 0 || longest <= max_edge {
        return (image.clone(), 1.0);
    }
    let scale = max_edge as f32 / longest as f32;
    let nw = ((w as f32 * scale).round() as u32).max(1);
    let nh = ((h as f32 * scale).round() as u32).max(1);
    (image::imageops::resize(image, nw, nh, FilterType::Triangle), scale)
}

/// Resample `image` to exactly `width`×`height` with nearest-neighbour so
/// palette colors and binary alpha survive unchanged.
pub fn fit_to_raster(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    image::imageops::resize(image, width, height, FilterType::Nearest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 90, 255]))
    }

    #[test]
    fn load_base_downscales_long_edge() {
        let (stack, scale) = LayerStack::from_base(&photo(1600, 1200), Some(800));
        assert_eq!((stack.width(), stack.height()), (800, 600));
        assert!((scale - 0.5).abs() < 1e-6);
        assert_eq!(stack.mask().dimensions(), (800, 600));
        assert_eq!(stack.guard().dimensions(), (800, 600));
        assert!(!stack.has_guard());
    }

    #[test]
    fn small_images_are_not_enlarged() {
        let (stack, scale) = LayerStack::from_base(&photo(300, 200), Some(800));
        assert_eq!((stack.width(), stack.height()), (300, 200));
        assert_eq!(scale, 1.0);
    }

    #[test]
    fn composite_without_mask_is_base() {
        let (stack, _) = LayerStack::from_base(&photo(16, 16), None);
        assert_eq!(stack.composite(DEFAULT_MASK_OPACITY), *stack.base());
    }

    #[test]
    fn composite_blends_mask_at_fixed_opacity() {
        let base = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let (mut stack, _) = LayerStack::from_base(&base, None);
        stack.mask_mut().put_pixel(1, 1, Rgba([200, 100, 50, 255]));
        let out = stack.composite(0.6);
        assert_eq!(*out.get_pixel(1, 1), Rgba([120, 60, 30, 255]));
        assert_eq!(*out.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
        assert_eq!(out, stack.composite(0.6));
    }

    #[test]
    fn guard_load_binarizes_and_resamples() {
        let (mut stack, _) = LayerStack::from_base(&photo(8, 8), None);
        let mut service = RgbaImage::from_pixel(4, 4, TRANSPARENT);
        service.put_pixel(0, 0, Rgba([44, 160, 44, 30]));
        stack.load_guard(&service);
        assert!(stack.has_guard());
        assert_eq!(stack.guard().get_pixel(0, 0)[3], 255);
        assert_eq!(stack.guard().get_pixel(1, 1)[3], 255);
        assert_eq!(stack.guard().get_pixel(2, 2)[3], 0);
    }

    #[test]
    fn clip_discards_paint_outside_guard() {
        let (mut stack, _) = LayerStack::from_base(&photo(4, 1), None);
        let mut silhouette = RgbaImage::from_pixel(4, 1, TRANSPARENT);
        silhouette.put_pixel(0, 0, PERMISSIVE);
        stack.load_guard(&silhouette);
        for x in 0..4 {
            stack.mask_mut().put_pixel(x, 0, Rgba([31, 119, 180, 255]));
        }
        assert!(stack.clip_region(0, 0, 3, 0));
        assert_eq!(stack.mask().get_pixel(0, 0)[3], 255);
        for x in 1..4 {
            assert_eq!(*stack.mask().get_pixel(x, 0), TRANSPARENT);
        }
    }

    #[test]
    fn restore_rejects_mismatched_snapshot() {
        let (mut stack, _) = LayerStack::from_base(&photo(4, 4), None);
        assert!(!stack.restore_mask(&RgbaImage::new(2, 2)));
        assert!(stack.restore_mask(&RgbaImage::new(4, 4)));
    }
}
