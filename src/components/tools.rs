use crate::canvas::{LayerStack, clip_pixel};
use crate::components::colors::BodyPart;
use crate::components::history::HistoryManager;
use image::Rgba;

/// Default spacing, in raster pixels, between interpolated stamps.
pub const DEFAULT_BRUSH_STEP: f32 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Tool {
    #[default]
    Draw,
    Erase,
}

impl Tool {
    pub fn label(&self) -> &'static str {
        match self {
            Tool::Draw => "Brush",
            Tool::Erase => "Eraser",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Tool::Draw => "draw",
            Tool::Erase => "erase",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "draw" | "brush" => Some(Tool::Draw),
            "erase" | "eraser" => Some(Tool::Erase),
            _ => None,
        }
    }
}

/// Reference brush radii offered in the toolbar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BrushPreset {
    Small,
    #[default]
    Medium,
    Large,
}

impl BrushPreset {
    pub fn all() -> &'static [BrushPreset] {
        &[BrushPreset::Small, BrushPreset::Medium, BrushPreset::Large]
    }

    pub fn radius(&self) -> f32 {
        match self {
            BrushPreset::Small => 12.0,
            BrushPreset::Medium => 24.0,
            BrushPreset::Large => 40.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BrushPreset::Small => "Small",
            BrushPreset::Medium => "Medium",
            BrushPreset::Large => "Large",
        }
    }
}

// ============================================================================
// STROKE
// ============================================================================

/// An ordered run of raster-space points painted with one tool.
#[derive(Clone, Debug, PartialEq)]
pub struct Stroke {
    pub tool: Tool,
    pub part: BodyPart,
    pub radius: f32,
    pub points: Vec<(f32, f32)>,
}

/// Outcome of a finished stroke.
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeSummary {
    pub stroke: Stroke,
    pub stamps: usize,
    pub changed: bool,
}

/// Tracks the stroke in progress between pointer-down and pointer-up.
pub struct StrokeTracker {
    active: Option<Stroke>,
    /// Interpolation spacing in raster pixels.
    pub step: f32,
    stamps: usize,
    changed: bool,
}

impl Default for StrokeTracker {
    fn default() -> Self {
        Self::new(DEFAULT_BRUSH_STEP)
    }
}

impl StrokeTracker {
    pub fn new(step: f32) -> Self {
        Self {
            active: None,
            step: if step > 0.0 { step } else { DEFAULT_BRUSH_STEP },
            stamps: 0,
            changed: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn current(&self) -> Option<&Stroke> {
        self.active.as_ref()
    }

    /// Pointer-down: start a stroke and stamp once at `pos`.
    /// A stroke still in progress is ended first so its pixels get a
    /// history entry. Returns true when the Mask changed.
    pub fn begin_stroke(
        &mut self,
        layers: &mut LayerStack,
        history: &mut HistoryManager,
        pos: (f32, f32),
        tool: Tool,
        part: BodyPart,
        radius: f32,
    ) -> bool {
        if self.is_active() {
            crate::log_warn!("Stroke started while another was active; ending the previous one");
            self.end_stroke(layers, history);
        }
        let stroke = Stroke {
            tool,
            part,
            radius: radius.max(0.5),
            points: vec![pos],
        };
        self.stamps = 0;
        self.changed = false;
        let changed = self.stamp(layers, &stroke, pos);
        self.active = Some(stroke);
        changed
    }

    /// Pointer-move: stamp along the segment from the previous point.
    /// A no-op when no stroke is active or `pos` is not finite.
    ///
    /// Only the part of the segment within `radius` of the raster is
    /// interpolated, so far-off points cost no more than a border-to-border
    /// drag.
    pub fn extend_stroke(&mut self, layers: &mut LayerStack, pos: (f32, f32)) -> bool {
        if !(pos.0.is_finite() && pos.1.is_finite()) {
            return false;
        }
        let Some(mut stroke) = self.active.take() else {
            return false;
        };
        let from = stroke.points.last().copied().unwrap_or(pos);
        let r = stroke.radius;
        let reach = (
            (-r, -r),
            (layers.width() as f32 + r, layers.height() as f32 + r),
        );
        let mut changed = false;
        if let Some((start, end)) = clip_segment(from, pos, reach.0, reach.1) {
            for point in interpolate(start, end, self.step) {
                changed |= self.stamp(layers, &stroke, point);
            }
        }
        stroke.points.push(pos);
        self.active = Some(stroke);
        changed
    }

    /// Pointer-up: finish the stroke and snapshot the Mask if it changed.
    pub fn end_stroke(
        &mut self,
        layers: &LayerStack,
        history: &mut HistoryManager,
    ) -> Option<StrokeSummary> {
        let stroke = self.active.take()?;
        let summary = StrokeSummary {
            stroke,
            stamps: self.stamps,
            changed: self.changed,
        };
        if summary.changed {
            let description = match summary.stroke.tool {
                Tool::Draw => format!("{} {}", summary.stroke.part.label(), Tool::Draw.label()),
                Tool::Erase => Tool::Erase.label().to_string(),
            };
            history.snapshot(layers, description);
        }
        crate::log_info!(
            "Stroke finished: {} r={} stamps={} changed={}",
            summary.stroke.tool.key(),
            summary.stroke.radius,
            summary.stamps,
            summary.changed
        );
        Some(summary)
    }

    /// Drop an in-progress stroke without recording history.
    pub fn cancel(&mut self) {
        self.active = None;
    }

    fn stamp(&mut self, layers: &mut LayerStack, stroke: &Stroke, pos: (f32, f32)) -> bool {
        self.stamps += 1;
        let changed = stamp_disk(layers, pos, stroke.radius, stroke.tool, stroke.part);
        self.changed |= changed;
        changed
    }
}

/// Paint every point of `stroke` as one continuous stroke and record history.
pub fn replay_stroke(
    layers: &mut LayerStack,
    history: &mut HistoryManager,
    stroke: &Stroke,
    step: f32,
) -> Option<StrokeSummary> {
    let (first, rest) = stroke.points.split_first()?;
    let mut tracker = StrokeTracker::new(step);
    tracker.begin_stroke(layers, history, *first, stroke.tool, stroke.part, stroke.radius);
    for point in rest {
        tracker.extend_stroke(layers, *point);
    }
    tracker.end_stroke(layers, history)
}

// ============================================================================
// RASTERIZATION
// ============================================================================

/// Stamp positions after `from` on the way to `to`, ending exactly at `to`.
/// Uses `max(floor(distance / step), 1)` evenly spaced steps.
pub fn interpolate(from: (f32, f32), to: (f32, f32), step: f32) -> Vec<(f32, f32)> {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let distance = (dx * dx + dy * dy).sqrt();
    if !distance.is_finite() {
        return vec![to];
    }
    let steps = ((distance / step.max(0.01)).floor() as usize).max(1);
    (1..=steps)
        .map(|i| {
            let t = i as f32 / steps as f32;
            (from.0 + dx * t, from.1 + dy * t)
        })
        .collect()
}

/// Clip the segment `from`→`to` to the box `min`..`max` (Liang–Barsky).
/// Endpoints already inside are returned unchanged. `None` when the segment
/// misses the box or has a non-finite coordinate.
pub fn clip_segment(
    from: (f32, f32),
    to: (f32, f32),
    min: (f32, f32),
    max: (f32, f32),
) -> Option<((f32, f32), (f32, f32))> {
    if ![from.0, from.1, to.0, to.1].iter().all(|v| v.is_finite()) {
        return None;
    }
    let (x0, y0) = (from.0 as f64, from.1 as f64);
    let (dx, dy) = (to.0 as f64 - x0, to.1 as f64 - y0);
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in [
        (-dx, x0 - min.0 as f64),
        (dx, max.0 as f64 - x0),
        (-dy, y0 - min.1 as f64),
        (dy, max.1 as f64 - y0),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    let at = |t: f64| ((x0 + dx * t) as f32, (y0 + dy * t) as f32);
    let start = if t0 == 0.0 { from } else { at(t0) };
    let end = if t1 == 1.0 { to } else { at(t1) };
    Some((start, end))
}

/// Rasterize one filled disk into the Mask, clipped by the Guard.
/// A pixel is covered when its center lies within `radius` of `center`.
pub fn stamp_disk(
    layers: &mut LayerStack,
    center: (f32, f32),
    radius: f32,
    tool: Tool,
    part: BodyPart,
) -> bool {
    let (w, h) = (layers.width() as i64, layers.height() as i64);
    let (cx, cy) = center;
    if !(cx.is_finite() && cy.is_finite()) {
        return false;
    }
    let r_sq = radius * radius;

    let min_x = ((cx - radius).floor() as i64).max(0);
    let max_x = ((cx + radius).ceil() as i64).min(w - 1);
    let min_y = ((cy - radius).floor() as i64).max(0);
    let max_y = ((cy + radius).ceil() as i64).min(h - 1);
    if min_x > max_x || min_y > max_y {
        return false;
    }

    let paint = match tool {
        Tool::Draw => part.paint(),
        Tool::Erase => Rgba([0, 0, 0, 0]),
    };

    let (mask, guard) = layers.mask_and_guard_mut();
    let mut changed = false;
    for y in min_y..=max_y {
        let dy = y as f32 + 0.5 - cy;
        for x in min_x..=max_x {
            let dx = x as f32 + 0.5 - cx;
            if dx * dx + dy * dy > r_sq {
                continue;
            }
            let (ux, uy) = (x as u32, y as u32);
            let next = clip_pixel(paint, guard.get_pixel(ux, uy)[3]);
            let px = mask.get_pixel_mut(ux, uy);
            if *px != next {
                *px = next;
                changed = true;
            }
        }
    }
    if changed {
        layers.mark_dirty();
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn layers(w: u32, h: u32) -> LayerStack {
        LayerStack::from_base(&RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255])), None).0
    }

    #[test]
    fn interpolation_step_count() {
        let pts = interpolate((0.0, 0.0), (10.0, 0.0), 2.0);
        assert_eq!(pts.len(), 5);
        assert_eq!(pts.last(), Some(&(10.0, 0.0)));
        assert_eq!(interpolate((3.0, 3.0), (3.0, 3.0), 2.0).len(), 1);
    }

    #[test]
    fn draw_then_erase() {
        let mut layers = layers(40, 40);
        let mut history = HistoryManager::default();
        history.reset_baseline(&layers);
        let mut tracker = StrokeTracker::default();

        assert!(tracker.begin_stroke(&mut layers, &mut history, (20.0, 20.0), Tool::Draw, BodyPart::Thorax, 5.0));
        let summary = tracker.end_stroke(&layers, &mut history);
        assert!(summary.is_some_and(|s| s.changed));
        assert_eq!(*layers.mask().get_pixel(20, 20), BodyPart::Thorax.paint());
        assert_eq!(layers.mask().get_pixel(0, 0)[3], 0);
        assert_eq!(history.len(), 2);

        tracker.begin_stroke(&mut layers, &mut history, (20.0, 20.0), Tool::Erase, BodyPart::Thorax, 10.0);
        tracker.end_stroke(&layers, &mut history);
        assert_eq!(*layers.mask().get_pixel(20, 20), Rgba([0, 0, 0, 0]));
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn unchanged_stroke_skips_history() {
        let mut layers = layers(20, 20);
        let mut history = HistoryManager::default();
        history.reset_baseline(&layers);
        let mut tracker = StrokeTracker::default();
        tracker.begin_stroke(&mut layers, &mut history, (10.0, 10.0), Tool::Erase, BodyPart::Head, 4.0);
        let summary = tracker.end_stroke(&layers, &mut history);
        assert!(summary.is_some_and(|s| !s.changed));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn extend_without_begin_is_noop() {
        let mut layers = layers(10, 10);
        let mut tracker = StrokeTracker::default();
        assert!(!tracker.extend_stroke(&mut layers, (5.0, 5.0)));
        assert!(!tracker.is_active());
    }

    #[test]
    fn stamp_respects_guard() {
        let mut layers = layers(30, 30);
        let mut silhouette = RgbaImage::new(30, 30);
        for y in 10..20 {
            for x in 10..20 {
                silhouette.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        layers.load_guard(&silhouette);
        stamp_disk(&mut layers, (15.0, 15.0), 12.0, Tool::Draw, BodyPart::Head);
        for (x, y, px) in layers.mask().enumerate_pixels() {
            let inside = (10..20).contains(&x) && (10..20).contains(&y);
            assert_eq!(px[3] > 0, inside, "pixel ({x},{y})");
        }
    }

    #[test]
    fn draw_over_other_part_replaces_only_the_disk() {
        let mut layers = layers(60, 30);
        assert!(stamp_disk(&mut layers, (15.0, 15.0), 10.0, Tool::Draw, BodyPart::Head));
        let before = layers.mask().clone();
        assert!(stamp_disk(&mut layers, (25.0, 15.0), 6.0, Tool::Draw, BodyPart::Thorax));

        let mask = layers.mask();
        assert_eq!(*mask.get_pixel(25, 15), BodyPart::Thorax.paint());
        assert_eq!(*mask.get_pixel(20, 15), BodyPart::Thorax.paint());
        for (x, y, px) in mask.enumerate_pixels() {
            let dx = x as f32 + 0.5 - 25.0;
            let dy = y as f32 + 0.5 - 15.0;
            if dx * dx + dy * dy > 36.0 {
                assert_eq!(px, before.get_pixel(x, y), "pixel ({x},{y}) outside the disk changed");
            }
        }
        assert_eq!(*mask.get_pixel(8, 15), BodyPart::Head.paint());
        assert_eq!(mask.get_pixel(50, 15)[3], 0);
    }

    #[test]
    fn beginning_over_an_active_stroke_records_it() {
        let mut layers = layers(60, 30);
        let mut history = HistoryManager::default();
        history.reset_baseline(&layers);
        let mut tracker = StrokeTracker::default();

        tracker.begin_stroke(&mut layers, &mut history, (10.0, 15.0), Tool::Draw, BodyPart::Head, 5.0);
        tracker.begin_stroke(&mut layers, &mut history, (45.0, 15.0), Tool::Draw, BodyPart::Legs, 5.0);
        assert_eq!(history.len(), 2);
        tracker.end_stroke(&layers, &mut history);
        assert_eq!(history.len(), 3);

        assert!(history.undo(&mut layers));
        assert_eq!(*layers.mask().get_pixel(10, 15), BodyPart::Head.paint());
        assert_eq!(layers.mask().get_pixel(45, 15)[3], 0);
    }

    #[test]
    fn far_off_point_is_clipped_to_the_raster() {
        let mut layers = layers(40, 20);
        let mut history = HistoryManager::default();
        history.reset_baseline(&layers);
        let stroke = Stroke {
            tool: Tool::Draw,
            part: BodyPart::Abdomen,
            radius: 3.0,
            points: vec![(10.0, 10.0), (1e30, 10.0), (-1e30, f32::MAX)],
        };
        let summary = replay_stroke(&mut layers, &mut history, &stroke, DEFAULT_BRUSH_STEP);
        let summary = summary.expect("stroke has points");
        assert!(summary.changed);
        assert!(summary.stamps < 200, "{} stamps", summary.stamps);
        assert_eq!(*layers.mask().get_pixel(39, 10), BodyPart::Abdomen.paint());
    }

    #[test]
    fn non_finite_points_are_ignored() {
        let mut layers = layers(20, 20);
        let mut history = HistoryManager::default();
        let mut tracker = StrokeTracker::default();
        assert!(!tracker.begin_stroke(&mut layers, &mut history, (f32::NAN, 5.0), Tool::Draw, BodyPart::Head, 4.0));
        assert!(!tracker.extend_stroke(&mut layers, (f32::INFINITY, 5.0)));
        assert!(layers.mask().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn clip_segment_keeps_inside_endpoints() {
        let inside = clip_segment((1.0, 2.0), (5.0, 6.0), (0.0, 0.0), (10.0, 10.0));
        assert_eq!(inside, Some(((1.0, 2.0), (5.0, 6.0))));
        let clipped = clip_segment((5.0, 5.0), (1e30, 5.0), (0.0, 0.0), (10.0, 10.0));
        assert_eq!(clipped, Some(((5.0, 5.0), (10.0, 5.0))));
        assert_eq!(clip_segment((20.0, 20.0), (30.0, 30.0), (0.0, 0.0), (10.0, 10.0)), None);
    }
}
