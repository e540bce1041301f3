// ============================================================================
// CROP RECTANGLE — resizable crop frame over the Base image
// ============================================================================

use image::RgbaImage;

/// Default smallest width/height, in raster pixels.
pub const DEFAULT_MIN_CROP_SIZE: f32 = 50.0;
/// Grab radii in display pixels. Divided by the display scale before testing
/// so the on-screen target stays the same size at any zoom.
pub const CORNER_GRAB_RADIUS: f32 = 25.0;
pub const EDGE_GRAB_RADIUS: f32 = 20.0;
/// Drawn handle sizes in display pixels.
pub const CORNER_HANDLE_SIZE: f32 = 24.0;
pub const EDGE_HANDLE_LENGTH: f32 = 40.0;
pub const EDGE_HANDLE_THICKNESS: f32 = 16.0;
/// Fraction of each dimension covered by the initial rectangle.
pub const INITIAL_COVERAGE: f32 = 0.8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CropHandle {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Top,
    Bottom,
    Left,
    Right,
}

/// Resize cursor shape to show while hovering a handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeCursor {
    NwSe,
    NeSw,
    Vertical,
    Horizontal,
}

impl CropHandle {
    pub fn all() -> &'static [CropHandle] {
        &[
            CropHandle::TopLeft,
            CropHandle::TopRight,
            CropHandle::BottomLeft,
            CropHandle::BottomRight,
            CropHandle::Top,
            CropHandle::Bottom,
            CropHandle::Left,
            CropHandle::Right,
        ]
    }

    pub fn is_corner(&self) -> bool {
        matches!(
            self,
            CropHandle::TopLeft | CropHandle::TopRight | CropHandle::BottomLeft | CropHandle::BottomRight
        )
    }

    pub fn cursor(&self) -> ResizeCursor {
        match self {
            CropHandle::TopLeft | CropHandle::BottomRight => ResizeCursor::NwSe,
            CropHandle::TopRight | CropHandle::BottomLeft => ResizeCursor::NeSw,
            CropHandle::Top | CropHandle::Bottom => ResizeCursor::Vertical,
            CropHandle::Left | CropHandle::Right => ResizeCursor::Horizontal,
        }
    }

    fn moves_left(&self) -> bool {
        matches!(self, CropHandle::TopLeft | CropHandle::BottomLeft | CropHandle::Left)
    }

    fn moves_right(&self) -> bool {
        matches!(self, CropHandle::TopRight | CropHandle::BottomRight | CropHandle::Right)
    }

    fn moves_top(&self) -> bool {
        matches!(self, CropHandle::TopLeft | CropHandle::TopRight | CropHandle::Top)
    }

    fn moves_bottom(&self) -> bool {
        matches!(self, CropHandle::BottomLeft | CropHandle::BottomRight | CropHandle::Bottom)
    }
}

/// Axis-aligned rectangle in Base raster space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CropRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Centered rectangle covering 80% of each dimension.
    pub fn initial(bounds_w: u32, bounds_h: u32) -> Self {
        let (bw, bh) = (bounds_w as f32, bounds_h as f32);
        let width = bw * INITIAL_COVERAGE;
        let height = bh * INITIAL_COVERAGE;
        Self::new((bw - width) / 2.0, (bh - height) / 2.0, width, height)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Integer pixel region `(x, y, w, h)` clamped to the bounds, at least 1×1.
    pub fn to_pixels(&self, bounds_w: u32, bounds_h: u32) -> (u32, u32, u32, u32) {
        let x = (self.x.round().max(0.0) as u32).min(bounds_w.saturating_sub(1));
        let y = (self.y.round().max(0.0) as u32).min(bounds_h.saturating_sub(1));
        let w = (self.width.round().max(1.0) as u32).min(bounds_w - x).max(1);
        let h = (self.height.round().max(1.0) as u32).min(bounds_h - y).max(1);
        (x, y, w, h)
    }

    /// Which handle, if any, lies under the raster-space point.
    /// `scale` is display pixels per raster pixel.
    pub fn hit_test(&self, x: f32, y: f32, scale: f32) -> Option<CropHandle> {
        let scale = if scale > 0.0 { scale } else { 1.0 };
        let corner = CORNER_GRAB_RADIUS / scale;
        let edge = EDGE_GRAB_RADIUS / scale;
        let near = |a: f32, b: f32, r: f32| (a - b).abs() < r;

        if near(x, self.x, corner) && near(y, self.y, corner) {
            return Some(CropHandle::TopLeft);
        }
        if near(x, self.right(), corner) && near(y, self.y, corner) {
            return Some(CropHandle::TopRight);
        }
        if near(x, self.x, corner) && near(y, self.bottom(), corner) {
            return Some(CropHandle::BottomLeft);
        }
        if near(x, self.right(), corner) && near(y, self.bottom(), corner) {
            return Some(CropHandle::BottomRight);
        }

        let within_v = y > self.y + corner && y < self.bottom() - corner;
        let within_h = x > self.x + corner && x < self.right() - corner;
        if near(x, self.x, edge) && within_v {
            return Some(CropHandle::Left);
        }
        if near(x, self.right(), edge) && within_v {
            return Some(CropHandle::Right);
        }
        if near(y, self.y, edge) && within_h {
            return Some(CropHandle::Top);
        }
        if near(y, self.bottom(), edge) && within_h {
            return Some(CropHandle::Bottom);
        }
        None
    }

    /// New rectangle after dragging `handle` by `(dx, dy)` from `self`.
    ///
    /// The minimum size is enforced from the fixed edge, then the rectangle is
    /// clamped inside `bounds_w`×`bounds_h`.
    pub fn resized(
        &self,
        handle: CropHandle,
        dx: f32,
        dy: f32,
        bounds_w: u32,
        bounds_h: u32,
        min_size: f32,
    ) -> Self {
        let (bw, bh) = (bounds_w as f32, bounds_h as f32);
        let min_w = min_size.min(bw).max(1.0);
        let min_h = min_size.min(bh).max(1.0);
        let mut r = *self;

        if handle.moves_left() {
            r.x += dx;
            r.width -= dx;
        }
        if handle.moves_right() {
            r.width += dx;
        }
        if handle.moves_top() {
            r.y += dy;
            r.height -= dy;
        }
        if handle.moves_bottom() {
            r.height += dy;
        }

        if r.width < min_w {
            if handle.moves_left() {
                r.x = self.right() - min_w;
            }
            r.width = min_w;
        }
        if r.height < min_h {
            if handle.moves_top() {
                r.y = self.bottom() - min_h;
            }
            r.height = min_h;
        }

        if r.x < 0.0 {
            r.width += r.x;
            r.x = 0.0;
        }
        if r.y < 0.0 {
            r.height += r.y;
            r.y = 0.0;
        }
        if r.right() > bw {
            r.width = bw - r.x;
        }
        if r.bottom() > bh {
            r.height = bh - r.y;
        }

        if r.width < min_w {
            r.width = min_w;
            r.x = r.x.min(bw - min_w).max(0.0);
        }
        if r.height < min_h {
            r.height = min_h;
            r.y = r.y.min(bh - min_h).max(0.0);
        }
        r
    }

    /// Handle rectangles for drawing, in raster space.
    pub fn handle_rects(&self, scale: f32) -> Vec<(CropHandle, CropRect)> {
        let scale = if scale > 0.0 { scale } else { 1.0 };
        let c = CORNER_HANDLE_SIZE / scale;
        let long = EDGE_HANDLE_LENGTH / scale;
        let thin = EDGE_HANDLE_THICKNESS / scale;
        let cx = self.x + self.width / 2.0;
        let cy = self.y + self.height / 2.0;
        let square = |x: f32, y: f32| CropRect::new(x - c / 2.0, y - c / 2.0, c, c);
        vec![
            (CropHandle::TopLeft, square(self.x, self.y)),
            (CropHandle::TopRight, square(self.right(), self.y)),
            (CropHandle::BottomLeft, square(self.x, self.bottom())),
            (CropHandle::BottomRight, square(self.right(), self.bottom())),
            (CropHandle::Top, CropRect::new(cx - long / 2.0, self.y - thin / 2.0, long, thin)),
            (CropHandle::Bottom, CropRect::new(cx - long / 2.0, self.bottom() - thin / 2.0, long, thin)),
            (CropHandle::Left, CropRect::new(self.x - thin / 2.0, cy - long / 2.0, thin, long)),
            (CropHandle::Right, CropRect::new(self.right() - thin / 2.0, cy - long / 2.0, thin, long)),
        ]
    }
}

// ============================================================================
// CONTROLLER — Idle → Active → (Resizing → Active)* → Applied | Cancelled
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CropPhase {
    #[default]
    Idle,
    Active,
    Resizing,
    Applied,
    Cancelled,
}

#[derive(Clone, Copy, Debug)]
struct DragState {
    handle: CropHandle,
    start: (f32, f32),
    start_rect: CropRect,
}

#[derive(Clone, Debug)]
pub struct CropController {
    phase: CropPhase,
    rect: CropRect,
    bounds: (u32, u32),
    min_size: f32,
    drag: Option<DragState>,
}

impl Default for CropController {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CROP_SIZE)
    }
}

impl CropController {
    pub fn new(min_size: f32) -> Self {
        Self {
            phase: CropPhase::Idle,
            rect: CropRect::new(0.0, 0.0, 0.0, 0.0),
            bounds: (0, 0),
            min_size,
            drag: None,
        }
    }

    pub fn phase(&self) -> CropPhase {
        self.phase
    }

    pub fn rect(&self) -> CropRect {
        self.rect
    }

    pub fn bounds(&self) -> (u32, u32) {
        self.bounds
    }

    /// Enter the crop tool for a Base of the given size.
    pub fn enter(&mut self, width: u32, height: u32) {
        self.bounds = (width.max(1), height.max(1));
        let (bw, bh) = (self.bounds.0 as f32, self.bounds.1 as f32);
        let mut rect = CropRect::initial(self.bounds.0, self.bounds.1);
        let (min_w, min_h) = (self.min_size.min(bw), self.min_size.min(bh));
        if rect.width < min_w {
            rect.width = min_w;
            rect.x = (bw - min_w) / 2.0;
        }
        if rect.height < min_h {
            rect.height = min_h;
            rect.y = (bh - min_h) / 2.0;
        }
        self.rect = rect;
        self.drag = None;
        self.phase = CropPhase::Active;
    }

    pub fn hit_test(&self, x: f32, y: f32, scale: f32) -> Option<CropHandle> {
        match self.phase {
            CropPhase::Active | CropPhase::Resizing => self.rect.hit_test(x, y, scale),
            _ => None,
        }
    }

    /// Pointer-down at a raster-space point. Starts a resize if a handle is hit.
    pub fn begin_drag(&mut self, x: f32, y: f32, scale: f32) -> Option<CropHandle> {
        if self.phase != CropPhase::Active {
            return None;
        }
        let handle = self.rect.hit_test(x, y, scale)?;
        self.drag = Some(DragState {
            handle,
            start: (x, y),
            start_rect: self.rect,
        });
        self.phase = CropPhase::Resizing;
        Some(handle)
    }

    /// Pointer-move during a resize. Deltas are measured from the drag start.
    pub fn drag_to(&mut self, x: f32, y: f32) -> bool {
        let Some(drag) = self.drag else {
            return false;
        };
        let (bw, bh) = self.bounds;
        self.rect = drag.start_rect.resized(
            drag.handle,
            x - drag.start.0,
            y - drag.start.1,
            bw,
            bh,
            self.min_size,
        );
        true
    }

    /// Apply a single relative drag to the current rectangle.
    pub fn drag(&mut self, handle: CropHandle, dx: f32, dy: f32) {
        if !matches!(self.phase, CropPhase::Active | CropPhase::Resizing) {
            return;
        }
        let (bw, bh) = self.bounds;
        self.rect = self.rect.resized(handle, dx, dy, bw, bh, self.min_size);
    }

    pub fn end_drag(&mut self) {
        self.drag = None;
        if self.phase == CropPhase::Resizing {
            self.phase = CropPhase::Active;
        }
    }

    /// Rasterize the framed region of `base` as a new image.
    pub fn apply(&mut self, base: &RgbaImage) -> Option<RgbaImage> {
        if !matches!(self.phase, CropPhase::Active | CropPhase::Resizing) {
            return None;
        }
        let (x, y, w, h) = self.rect.to_pixels(base.width(), base.height());
        self.drag = None;
        self.phase = CropPhase::Applied;
        crate::log_info!("Crop applied: {}×{} at ({}, {})", w, h, x, y);
        Some(image::imageops::crop_imm(base, x, y, w, h).to_image())
    }

    pub fn cancel(&mut self) {
        self.drag = None;
        self.phase = CropPhase::Cancelled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_rect_is_centered_80_percent() {
        let r = CropRect::initial(500, 300);
        assert_eq!(r, CropRect::new(50.0, 30.0, 400.0, 240.0));
    }

    #[test]
    fn corners_win_over_edges() {
        let r = CropRect::new(100.0, 100.0, 200.0, 200.0);
        assert_eq!(r.hit_test(110.0, 105.0, 1.0), Some(CropHandle::TopLeft));
        assert_eq!(r.hit_test(200.0, 110.0, 1.0), Some(CropHandle::Top));
        assert_eq!(r.hit_test(295.0, 200.0, 1.0), Some(CropHandle::Right));
        assert_eq!(r.hit_test(200.0, 200.0, 1.0), None);
    }

    #[test]
    fn left_drag_keeps_right_edge_at_minimum() {
        let start = CropRect::new(100.0, 100.0, 200.0, 200.0);
        let r = start.resized(CropHandle::Left, 500.0, 0.0, 800, 800, 50.0);
        assert_eq!(r.width, 50.0);
        assert_eq!(r.right(), 300.0);
    }

    #[test]
    fn drag_past_bounds_is_clamped() {
        let start = CropRect::new(100.0, 100.0, 200.0, 200.0);
        let r = start.resized(CropHandle::TopLeft, -500.0, -500.0, 400, 400, 50.0);
        assert_eq!(r, CropRect::new(0.0, 0.0, 300.0, 300.0));
        let r = start.resized(CropHandle::BottomRight, 900.0, 900.0, 400, 400, 50.0);
        assert_eq!(r, CropRect::new(100.0, 100.0, 300.0, 300.0));
    }

    #[test]
    fn controller_state_machine() {
        let mut crop = CropController::default();
        assert_eq!(crop.phase(), CropPhase::Idle);
        crop.enter(100, 100);
        assert_eq!(crop.phase(), CropPhase::Active);
        assert_eq!(crop.begin_drag(90.0, 90.0, 1.0), Some(CropHandle::BottomRight));
        assert_eq!(crop.phase(), CropPhase::Resizing);
        assert!(crop.drag_to(80.0, 80.0));
        crop.end_drag();
        assert_eq!(crop.phase(), CropPhase::Active);
        assert_eq!(crop.rect(), CropRect::new(10.0, 10.0, 70.0, 70.0));

        let base = RgbaImage::new(100, 100);
        let out = crop.apply(&base).map(|img| img.dimensions());
        assert_eq!(out, Some((70, 70)));
        assert_eq!(crop.phase(), CropPhase::Applied);
        assert!(crop.apply(&base).is_none());
    }

    #[test]
    fn small_images_stay_croppable() {
        let start = CropRect::initial(30, 30);
        let r = start.resized(CropHandle::Right, -100.0, 0.0, 30, 30, 50.0);
        assert_eq!(r.width, 30.0);
        assert_eq!(r.x, 0.0);
    }

    #[test]
    fn entering_on_narrow_image_respects_minimum() {
        let mut crop = CropController::new(50.0);
        crop.enter(60, 500);
        let r = crop.rect();
        assert_eq!((r.x, r.width), (5.0, 50.0));
        assert_eq!(r.height, 400.0);
    }
}
