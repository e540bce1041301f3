//! Display ↔ raster coordinate mapping and the zoom/fit controller.
//!
//! Everything here is pure geometry; nothing touches pixel memory.

/// Zoom bounds for manual zoom, relative to the fit scale.
pub const MIN_ZOOM: f32 = 0.5;
pub const MAX_ZOOM: f32 = 3.0;
/// Padding subtracted from each side of the container before fitting.
pub const FIT_PADDING: f32 = 16.0;

// ============================================================================
// POINTER INPUT
// ============================================================================

/// A pointer event reduced to what the mapper needs. Touch events carry all
/// active touch points; only the first one is used.
#[derive(Clone, Debug, PartialEq)]
pub enum PointerInput {
    Mouse { x: f32, y: f32 },
    Touch(Vec<(f32, f32)>),
}

impl PointerInput {
    /// Client-space position, or `None` for a touch event with no touches.
    pub fn client_pos(&self) -> Option<(f32, f32)> {
        match self {
            PointerInput::Mouse { x, y } => Some((*x, *y)),
            PointerInput::Touch(points) => points.first().copied(),
        }
    }
}

/// Where the raster is drawn on screen, in client coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl DisplayRect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self { left, top, width, height }
    }
}

/// Map a pointer into raster space for a raster stretched over `rect`.
/// Horizontal and vertical scales are independent.
pub fn to_raster_space(
    input: &PointerInput,
    rect: DisplayRect,
    raster_width: u32,
    raster_height: u32,
) -> Option<(f32, f32)> {
    let (cx, cy) = input.client_pos()?;
    if rect.width <= 0.0 || rect.height <= 0.0 {
        return None;
    }
    let scale_x = raster_width as f32 / rect.width;
    let scale_y = raster_height as f32 / rect.height;
    Some(((cx - rect.left) * scale_x, (cy - rect.top) * scale_y))
}

// ============================================================================
// LETTERBOX — uniform fit inside a fixed-aspect container
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    /// Display pixels per raster pixel.
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Letterbox {
    /// Fit a raster into `container` using the tighter dimension and center
    /// it along the other axis.
    pub fn fit(container_width: f32, container_height: f32, raster_width: u32, raster_height: u32) -> Self {
        let rw = raster_width.max(1) as f32;
        let rh = raster_height.max(1) as f32;
        let scale = (container_width / rw).min(container_height / rh).max(f32::EPSILON);
        Self {
            scale,
            offset_x: (container_width - rw * scale) / 2.0,
            offset_y: (container_height - rh * scale) / 2.0,
        }
    }

    pub fn to_raster(&self, input: &PointerInput, container: DisplayRect) -> Option<(f32, f32)> {
        let (cx, cy) = input.client_pos()?;
        Some((
            (cx - container.left - self.offset_x) / self.scale,
            (cy - container.top - self.offset_y) / self.scale,
        ))
    }

    pub fn to_display(&self, container: DisplayRect, x: f32, y: f32) -> (f32, f32) {
        (
            container.left + self.offset_x + x * self.scale,
            container.top + self.offset_y + y * self.scale,
        )
    }
}

// ============================================================================
// ZOOM / FIT CONTROLLER
// ============================================================================

/// `min(container_w / raster_w, container_h / raster_h, 1.0)`.
pub fn fit_scale(container_width: f32, container_height: f32, raster_width: u32, raster_height: u32) -> f32 {
    if raster_width == 0 || raster_height == 0 {
        return 1.0;
    }
    let sx = container_width / raster_width as f32;
    let sy = container_height / raster_height as f32;
    sx.min(sy).min(1.0).max(f32::EPSILON)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomController {
    fit: f32,
    zoom: f32,
}

impl Default for ZoomController {
    fn default() -> Self {
        Self { fit: 1.0, zoom: 1.0 }
    }
}

impl ZoomController {
    /// Recompute the fit for a newly loaded raster and reset manual zoom.
    /// The container size is taken before padding.
    pub fn fit_to(&mut self, container_width: f32, container_height: f32, raster_width: u32, raster_height: u32) {
        let cw = (container_width - 2.0 * FIT_PADDING).max(1.0);
        let ch = (container_height - 2.0 * FIT_PADDING).max(1.0);
        self.fit = fit_scale(cw, ch, raster_width, raster_height);
        self.zoom = 1.0;
    }

    pub fn zoom_by(&mut self, delta: f32) {
        self.zoom = (self.zoom + delta).clamp(MIN_ZOOM, MAX_ZOOM);
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    }

    pub fn reset(&mut self) {
        self.zoom = 1.0;
    }

    pub fn fit(&self) -> f32 {
        self.fit
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Display pixels per raster pixel.
    pub fn display_scale(&self) -> f32 {
        self.fit * self.zoom
    }
}
