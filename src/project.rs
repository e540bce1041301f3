use image::RgbaImage;
use uuid::Uuid;

use crate::canvas::{LayerStack, RasterBuffer, fit_to_raster};
use crate::components::colors::BodyPart;
use crate::components::history::HistoryManager;
use crate::components::tools::{Stroke, StrokeSummary, StrokeTracker, Tool, replay_stroke};
use crate::io::{self, ImageIoError};
use crate::ops::boundaries::BoundaryTruth;
use crate::ops::crop::CropRect;
use crate::service::{MaskLogEntry, Segmentation};
use crate::settings::EditorSettings;

#[derive(Debug)]
pub enum SessionError {
    /// No original photo reached the editor; restart from acquisition.
    MissingOriginal,
    Image(ImageIoError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::MissingOriginal => write!(f, "No image to edit. Please pick a photo first."),
            SessionError::Image(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ImageIoError> for SessionError {
    fn from(e: ImageIoError) -> Self {
        SessionError::Image(e)
    }
}

// ============================================================================
// STAGE HANDOFFS
// ============================================================================

/// Processing → Edit: the photo that was segmented and what came back.
#[derive(Clone, Debug)]
pub struct SegmentedImage {
    pub original: RgbaImage,
    pub service_mask: Option<RgbaImage>,
    pub thorax_top: Option<f32>,
    pub thorax_bottom: Option<f32>,
}

impl SegmentedImage {
    pub fn new(original: RgbaImage, segmentation: Segmentation) -> Self {
        Self {
            original,
            service_mask: Some(segmentation.mask),
            thorax_top: segmentation.thorax_top,
            thorax_bottom: segmentation.thorax_bottom,
        }
    }

    /// Edit without a service result: permissive guard, fractional boundaries.
    pub fn unsegmented(original: RgbaImage) -> Self {
        Self {
            original,
            service_mask: None,
            thorax_top: None,
            thorax_bottom: None,
        }
    }
}

/// Edit → Result: everything the learning and quiz views need.
#[derive(Clone, Debug)]
pub struct EditedHandoff {
    pub session_id: Uuid,
    pub base: RgbaImage,
    pub edited_mask: RgbaImage,
    pub service_mask: Option<RgbaImage>,
    pub boundaries: BoundaryTruth,
    pub mask_opacity: f32,
}

impl EditedHandoff {
    pub fn composite(&self) -> RgbaImage {
        let mut layers = LayerStack::new(self.base.width(), self.base.height());
        layers.load_base(&self.base, None);
        layers.load_mask(&self.edited_mask);
        layers.composite(self.mask_opacity)
    }
}

// ============================================================================
// EDIT SESSION
// ============================================================================

/// One editing session over a single photo: layers, stroke state, history
/// and the boundary truth. The only owner of the pixel buffers.
pub struct EditSession {
    pub id: Uuid,
    layers: LayerStack,
    history: HistoryManager,
    tracker: StrokeTracker,
    boundaries: BoundaryTruth,
    service_mask: Option<RasterBuffer>,
    scale: f32,
    settings: EditorSettings,
    pub is_dirty: bool,
}

impl EditSession {
    /// Start a session from an original photo and, optionally, the service
    /// mask plus its boundary rows (in original-photo pixels).
    pub fn new(
        original: Option<&RgbaImage>,
        service_mask: Option<&RgbaImage>,
        thorax_top: Option<f32>,
        thorax_bottom: Option<f32>,
        settings: &EditorSettings,
    ) -> Result<Self, SessionError> {
        let original = original.ok_or(SessionError::MissingOriginal)?;
        if original.width() == 0 || original.height() == 0 {
            return Err(SessionError::Image(ImageIoError::Empty));
        }

        let (mut layers, scale) = LayerStack::from_base(original, Some(settings.max_edge));
        let service_mask = service_mask.map(|mask| fit_to_raster(mask, layers.width(), layers.height()));
        match &service_mask {
            Some(mask) => {
                layers.load_guard(mask);
                layers.load_mask(mask);
                crate::log_info!("Guard loaded from service mask");
            }
            None => crate::log_info!("No service mask; guard is permissive"),
        }

        let boundaries = BoundaryTruth::from_service(thorax_top, thorax_bottom, layers.height(), scale);
        let mut history = HistoryManager::new(settings.history_capacity);
        history.reset_baseline(&layers);

        Ok(Self {
            id: Uuid::new_v4(),
            layers,
            history,
            tracker: StrokeTracker::new(settings.brush_step),
            boundaries,
            service_mask,
            scale,
            settings: settings.clone(),
            is_dirty: false,
        })
    }

    pub fn from_segmented(input: &SegmentedImage, settings: &EditorSettings) -> Result<Self, SessionError> {
        Self::new(
            Some(&input.original),
            input.service_mask.as_ref(),
            input.thorax_top,
            input.thorax_bottom,
            settings,
        )
    }

    /// Replace Base with `base` and reset everything derived from it:
    /// empty Mask, permissive Guard, fresh history, fractional boundaries.
    pub fn reinitialize(&mut self, base: &RgbaImage) {
        self.tracker.cancel();
        self.layers.load_base(base, None);
        self.service_mask = None;
        self.scale = 1.0;
        self.boundaries = BoundaryTruth::fallback(self.layers.height());
        self.history.reset_baseline(&self.layers);
        self.is_dirty = false;
    }

    /// Crop the Base to `rect` and reinitialize the session at the new size.
    pub fn apply_crop(&mut self, rect: CropRect) {
        let (x, y, w, h) = rect.to_pixels(self.layers.width(), self.layers.height());
        let cropped = image::imageops::crop_imm(self.layers.base(), x, y, w, h).to_image();
        crate::log_info!("Session crop: {}×{} at ({}, {})", w, h, x, y);
        self.reinitialize(&cropped);
    }

    pub fn layers(&self) -> &LayerStack {
        &self.layers
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn boundaries(&self) -> BoundaryTruth {
        self.boundaries
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    /// Factor the original photo was reduced by on load.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn service_mask(&self) -> Option<&RasterBuffer> {
        self.service_mask.as_ref()
    }

    pub fn width(&self) -> u32 {
        self.layers.width()
    }

    pub fn height(&self) -> u32 {
        self.layers.height()
    }

    // ---- strokes -----------------------------------------------------------

    pub fn begin_stroke(&mut self, pos: (f32, f32), tool: Tool, part: BodyPart, radius: f32) -> bool {
        let changed = self.tracker.begin_stroke(&mut self.layers, &mut self.history, pos, tool, part, radius);
        self.is_dirty |= changed;
        changed
    }

    pub fn extend_stroke(&mut self, pos: (f32, f32)) -> bool {
        let changed = self.tracker.extend_stroke(&mut self.layers, pos);
        self.is_dirty |= changed;
        changed
    }

    pub fn end_stroke(&mut self) -> Option<StrokeSummary> {
        self.tracker.end_stroke(&self.layers, &mut self.history)
    }

    pub fn stroke_active(&self) -> bool {
        self.tracker.is_active()
    }

    /// Paint a recorded stroke in one go.
    pub fn replay(&mut self, stroke: &Stroke) -> Option<StrokeSummary> {
        let summary = replay_stroke(&mut self.layers, &mut self.history, stroke, self.settings.brush_step);
        if summary.as_ref().is_some_and(|s| s.changed) {
            self.is_dirty = true;
        }
        summary
    }

    /// Returns false at the baseline.
    pub fn undo(&mut self) -> bool {
        if self.tracker.is_active() {
            return false;
        }
        self.history.undo(&mut self.layers)
    }

    pub fn can_undo(&self) -> bool {
        !self.tracker.is_active() && self.history.can_undo()
    }

    // ---- output ------------------------------------------------------------

    pub fn composite(&self) -> RasterBuffer {
        self.layers.composite(self.settings.mask_opacity)
    }

    pub fn export_mask_png(&self) -> Result<Vec<u8>, ImageIoError> {
        io::encode_png(self.layers.mask())
    }

    pub fn export_mask_data_uri(&self) -> Result<String, ImageIoError> {
        io::to_data_uri(self.layers.mask())
    }

    /// Hand the edited mask over to the result stage.
    pub fn finish(&self) -> EditedHandoff {
        EditedHandoff {
            session_id: self.id,
            base: self.layers.base().clone(),
            edited_mask: self.layers.mask().clone(),
            service_mask: self.service_mask.clone(),
            boundaries: self.boundaries,
            mask_opacity: self.settings.mask_opacity,
        }
    }

    pub fn mask_log_entry(&self) -> Result<MaskLogEntry, ImageIoError> {
        let service_mask = match &self.service_mask {
            Some(mask) => Some(io::to_data_uri(mask)?),
            None => None,
        };
        Ok(MaskLogEntry {
            session_id: self.id.to_string(),
            timestamp: crate::logger::unix_seconds(),
            original: io::to_data_uri(self.layers.base())?,
            service_mask,
            edited_mask: io::to_data_uri(self.layers.mask())?,
            thorax_top: self.boundaries.thorax_top,
            thorax_bottom: self.boundaries.thorax_bottom,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn photo(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([200, 190, 180, 255]))
    }

    #[test]
    fn missing_original_is_fatal() {
        let err = EditSession::new(None, None, None, None, &EditorSettings::default());
        assert!(matches!(err, Err(SessionError::MissingOriginal)));
    }

    #[test]
    fn service_mask_seeds_guard_mask_and_baseline() {
        let mut mask = RgbaImage::new(800, 400);
        for y in 100..300 {
            for x in 100..700 {
                mask.put_pixel(x, y, BodyPart::Thorax.paint());
            }
        }
        let session = EditSession::new(
            Some(&photo(1600, 800)),
            Some(&mask),
            Some(300.0),
            Some(500.0),
            &EditorSettings::default(),
        )
        .unwrap();
        assert_eq!((session.width(), session.height()), (800, 400));
        assert!(session.layers().has_guard());
        assert_eq!(*session.layers().mask().get_pixel(400, 200), BodyPart::Thorax.paint());
        assert_eq!(session.layers().guard().get_pixel(10, 10)[3], 0);
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.boundaries(), BoundaryTruth::new(150.0, 250.0));
    }

    #[test]
    fn erase_then_undo_restores_service_mask() {
        let mask = RgbaImage::from_pixel(100, 100, BodyPart::Abdomen.paint());
        let mut session =
            EditSession::new(Some(&photo(100, 100)), Some(&mask), None, None, &EditorSettings::default()).unwrap();
        session.begin_stroke((50.0, 50.0), Tool::Erase, BodyPart::Head, 12.0);
        session.extend_stroke((60.0, 50.0));
        assert!(session.end_stroke().is_some_and(|s| s.changed));
        assert_eq!(session.layers().mask().get_pixel(55, 50)[3], 0);
        assert!(session.undo());
        assert_eq!(*session.layers().mask().get_pixel(55, 50), BodyPart::Abdomen.paint());
        assert!(!session.undo());
    }

    #[test]
    fn crop_reinitializes_everything() {
        let mut session =
            EditSession::new(Some(&photo(200, 100)), None, Some(10.0), Some(20.0), &EditorSettings::default()).unwrap();
        session.begin_stroke((50.0, 50.0), Tool::Draw, BodyPart::Head, 12.0);
        session.end_stroke();
        assert_eq!(session.history().len(), 2);

        session.apply_crop(CropRect::new(20.0, 10.0, 120.0, 80.0));
        assert_eq!((session.width(), session.height()), (120, 80));
        assert_eq!(session.history().len(), 1);
        assert!(session.layers().mask().pixels().all(|p| p[3] == 0));
        assert_eq!(session.boundaries(), BoundaryTruth::fallback(80));
    }

    #[test]
    fn handoff_carries_edited_mask() {
        let mut session =
            EditSession::new(Some(&photo(50, 50)), None, None, None, &EditorSettings::default()).unwrap();
        session.begin_stroke((25.0, 25.0), Tool::Draw, BodyPart::Legs, 5.0);
        session.end_stroke();
        let handoff = session.finish();
        assert_eq!(handoff.edited_mask, *session.layers().mask());
        assert_eq!(handoff.composite(), session.composite());
        let entry = session.mask_log_entry().unwrap();
        assert!(entry.edited_mask.starts_with("data:image/png;base64,"));
        assert!(entry.service_mask.is_none());
    }
}
