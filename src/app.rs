use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use eframe::egui;
use egui::{Align2, Color32, CursorIcon, FontId, Pos2, Rect, Sense, Stroke as PenStroke, TextureHandle, Vec2};
use image::RgbaImage;

use crate::components::colors::BodyPart;
use crate::components::tools::{BrushPreset, Tool};
use crate::io::{self, FileHandler};
use crate::ops::crop::{CropController, ResizeCursor};
use crate::ops::quiz::{self, QuizMode, QuizPhase, QuizState, RevealFocus};
use crate::project::{EditSession, EditedHandoff, SegmentedImage, SessionError};
use crate::service::{self, MaskLogClient, Segmentation, SegmentationClient, ServiceError};
use crate::settings::EditorSettings;
use crate::viewport::{DisplayRect, Letterbox, PointerInput, ZoomController, to_raster_space};

const ZOOM_STEP: f32 = 0.25;
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const CROP_SHADE: Color32 = Color32::from_rgba_premultiplied(0, 0, 0, 128);
const QUIZ_LINE: Color32 = Color32::from_rgb(251, 191, 36);
const ANSWER_LINE: Color32 = Color32::from_rgb(239, 68, 68);

/// Results delivered from background work.
pub enum IoResult {
    ImageLoaded { image: RgbaImage, path: PathBuf },
    LoadFailed(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Acquire,
    Crop,
    Processing,
    Edit,
    Result,
}

/// A GPU texture plus the generation it was uploaded from.
#[derive(Default)]
struct CachedTexture {
    handle: Option<TextureHandle>,
    key: Option<u64>,
}

impl CachedTexture {
    fn ensure(&mut self, ctx: &egui::Context, name: &str, key: u64, build: impl FnOnce() -> RgbaImage) -> Option<&TextureHandle> {
        if self.key != Some(key) || self.handle.is_none() {
            let img = build();
            let color = egui::ColorImage::from_rgba_unmultiplied(
                [img.width() as usize, img.height() as usize],
                img.as_raw(),
            );
            match &mut self.handle {
                Some(handle) => handle.set(color, egui::TextureOptions::LINEAR),
                None => self.handle = Some(ctx.load_texture(name, color, egui::TextureOptions::LINEAR)),
            }
            self.key = Some(key);
        }
        self.handle.as_ref()
    }

    fn invalidate(&mut self) {
        self.key = None;
    }
}

pub struct InsectMaskApp {
    settings: EditorSettings,
    file_handler: FileHandler,
    stage: Stage,

    // Acquire / Crop
    original: Option<RgbaImage>,
    original_name: String,
    crop: CropController,
    io_sender: mpsc::Sender<IoResult>,
    io_receiver: mpsc::Receiver<IoResult>,
    loading: bool,

    // Processing
    segment_rx: Option<mpsc::Receiver<Result<Segmentation, ServiceError>>>,

    // Edit
    session: Option<EditSession>,
    tool: Tool,
    part: BodyPart,
    brush: BrushPreset,
    zoom: ZoomController,
    needs_fit: bool,

    // Result
    handoff: Option<EditedHandoff>,
    quiz: QuizState,
    inspect: Option<BodyPart>,

    image_tex: CachedTexture,
    overlay_tex: CachedTexture,
    overlay_generation: u64,
    error: Option<String>,
    notice: Option<String>,
    log_rx: Option<mpsc::Receiver<Option<String>>>,
}

impl InsectMaskApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        Self::with_settings(EditorSettings::load())
    }

    pub fn with_settings(settings: EditorSettings) -> Self {
        let (io_sender, io_receiver) = mpsc::channel();
        Self {
            crop: CropController::new(settings.min_crop_size),
            quiz: QuizState::new(settings.quiz_tolerance),
            settings,
            file_handler: FileHandler::new(),
            stage: Stage::Acquire,
            original: None,
            original_name: String::new(),
            io_sender,
            io_receiver,
            loading: false,
            segment_rx: None,
            session: None,
            tool: Tool::Draw,
            part: BodyPart::Head,
            brush: BrushPreset::Medium,
            zoom: ZoomController::default(),
            needs_fit: true,
            handoff: None,
            inspect: None,
            image_tex: CachedTexture::default(),
            overlay_tex: CachedTexture::default(),
            overlay_generation: 0,
            error: None,
            notice: None,
            log_rx: None,
        }
    }

    fn go_to(&mut self, stage: Stage) {
        crate::log_info!("Stage {:?} → {:?}", self.stage, stage);
        self.stage = stage;
        self.image_tex.invalidate();
        self.overlay_tex.invalidate();
    }

    /// Back to the start with nothing retained.
    fn restart(&mut self, error: Option<String>) {
        self.original = None;
        self.session = None;
        self.handoff = None;
        self.segment_rx = None;
        self.quiz.end();
        self.inspect = None;
        self.error = error;
        self.go_to(Stage::Acquire);
    }

    // ========================================================================
    // Background work
    // ========================================================================

    fn open_image(&mut self, path: PathBuf) {
        self.loading = true;
        self.error = None;
        let sender = self.io_sender.clone();
        rayon::spawn(move || {
            let result = match io::load_image_file(&path) {
                Ok(image) => IoResult::ImageLoaded { image, path },
                Err(e) => IoResult::LoadFailed(format!("{}: {}", path.display(), e)),
            };
            let _ = sender.send(result);
        });
    }

    fn poll_background(&mut self) {
        while let Ok(result) = self.io_receiver.try_recv() {
            self.loading = false;
            match result {
                IoResult::ImageLoaded { image, path } => {
                    crate::log_info!("Loaded {} ({}×{})", path.display(), image.width(), image.height());
                    self.original_name = path
                        .file_name()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_else(|| "photo".to_string());
                    self.crop.enter(image.width(), image.height());
                    self.original = Some(image);
                    self.go_to(Stage::Crop);
                }
                IoResult::LoadFailed(msg) => {
                    crate::log_err!("Image load failed: {}", msg);
                    self.error = Some(msg);
                }
            }
        }

        if let Some(rx) = &self.segment_rx {
            match rx.try_recv() {
                Ok(Ok(seg)) => {
                    self.segment_rx = None;
                    match self.original.clone() {
                        Some(original) => self.start_editing(SegmentedImage::new(original, seg)),
                        None => self.restart(Some(SessionError::MissingOriginal.to_string())),
                    }
                }
                Ok(Err(e)) => {
                    crate::log_err!("Segmentation failed: {}", e);
                    self.restart(Some(format!("Segmentation failed: {}", e)));
                }
                Err(mpsc::TryRecvError::Empty) => {}
                Err(mpsc::TryRecvError::Disconnected) => {
                    self.restart(Some("Segmentation worker stopped unexpectedly".to_string()));
                }
            }
        }

        if let Some(rx) = &self.log_rx
            && let Ok(notice) = rx.try_recv()
        {
            if notice.is_some() {
                self.notice = notice;
            }
            self.log_rx = None;
        }
    }

    fn start_segmentation(&mut self) {
        let Some(original) = self.original.clone() else {
            self.restart(Some(SessionError::MissingOriginal.to_string()));
            return;
        };
        let timeout = Duration::from_secs(self.settings.request_timeout_secs);
        match SegmentationClient::new(&self.settings.service_url, timeout) {
            Ok(client) => {
                self.segment_rx = Some(service::spawn_segmentation(client, original));
                self.go_to(Stage::Processing);
            }
            Err(e) => self.restart(Some(format!("Segmentation failed: {}", e))),
        }
    }

    fn start_editing(&mut self, input: SegmentedImage) {
        match EditSession::from_segmented(&input, &self.settings) {
            Ok(session) => {
                self.session = Some(session);
                self.needs_fit = true;
                self.go_to(Stage::Edit);
            }
            Err(e) => self.restart(Some(e.to_string())),
        }
    }

    fn finish_editing(&mut self) {
        let Some(session) = &self.session else {
            self.restart(Some(SessionError::MissingOriginal.to_string()));
            return;
        };
        if self.settings.log_enabled() {
            let timeout = Duration::from_secs(self.settings.request_timeout_secs);
            match (MaskLogClient::new(&self.settings.log_url, timeout), session.mask_log_entry()) {
                (Ok(client), Ok(entry)) => self.log_rx = Some(service::spawn_mask_log(client, entry)),
                (Err(e), _) => self.notice = Some(format!("Could not save the mask log: {}", e)),
                (_, Err(e)) => self.notice = Some(format!("Could not save the mask log: {}", e)),
            }
        }
        self.handoff = Some(session.finish());
        self.quiz.end();
        self.inspect = None;
        self.go_to(Stage::Result);
    }

    fn save_mask(&mut self) {
        let Some(session) = &self.session else { return };
        let stem = self.original_name.rsplit_once('.').map_or(self.original_name.as_str(), |(s, _)| s);
        let Some(path) = self.file_handler.pick_png_save_path(&format!("{}_mask.png", stem)) else {
            return;
        };
        match io::save_png(session.layers().mask(), &path) {
            Ok(()) => self.notice = Some(format!("Saved {}", path.display())),
            Err(e) => self.error = Some(e.to_string()),
        }
    }

    // ========================================================================
    // Stages
    // ========================================================================

    fn show_acquire(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.iter().find_map(|f| f.path.clone()));
        if let Some(path) = dropped {
            self.open_image(path);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(80.0);
                ui.heading("Insect body explorer");
                ui.label("Pick a photo of an insect to find its head, thorax and abdomen.");
                ui.add_space(20.0);
                if ui.add_enabled(!self.loading, egui::Button::new("Choose photo…")).clicked()
                    && let Some(path) = self.file_handler.pick_image_path()
                {
                    self.open_image(path);
                }
                ui.label("…or drop an image file here.");
                if self.loading {
                    ui.add_space(10.0);
                    ui.spinner();
                }
            });
        });
    }

    fn show_crop(&mut self, ctx: &egui::Context) {
        let Some((w, h)) = self.original.as_ref().map(RgbaImage::dimensions) else {
            self.restart(Some(SessionError::MissingOriginal.to_string()));
            return;
        };

        let mut apply = false;
        let mut skip = false;
        let mut back = false;
        egui::TopBottomPanel::bottom("crop_actions").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("Drag the corners or edges to frame the insect.");
                if ui.button("Crop and continue").clicked() {
                    apply = true;
                }
                if ui.button("Use whole photo").clicked() {
                    skip = true;
                }
                if ui.button("Back").clicked() {
                    back = true;
                }
            });
        });
        if back {
            self.crop.cancel();
            self.restart(None);
            return;
        }

        let original = &self.original;
        let tex = self
            .image_tex
            .ensure(ctx, "crop_base", 0, || original.clone().unwrap_or_default())
            .map(|t| t.id());
        let crop = &mut self.crop;
        egui::CentralPanel::default().show(ctx, |ui| {
            let (response, painter) = ui.allocate_painter(ui.available_size(), Sense::click_and_drag());
            let container = response.rect;
            let lb = Letterbox::fit(container.width(), container.height(), w, h);
            let display = DisplayRect::new(container.left(), container.top(), container.width(), container.height());
            let to_screen = |x: f32, y: f32| {
                let (sx, sy) = lb.to_display(display, x, y);
                Pos2::new(sx, sy)
            };
            let image_rect = Rect::from_min_max(to_screen(0.0, 0.0), to_screen(w as f32, h as f32));
            if let Some(id) = tex {
                painter.image(id, image_rect, Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)), Color32::WHITE);
            }

            let r = crop.rect();
            let frame = Rect::from_min_max(to_screen(r.x, r.y), to_screen(r.right(), r.bottom()));
            for shade in [
                Rect::from_min_max(image_rect.min, Pos2::new(image_rect.max.x, frame.min.y)),
                Rect::from_min_max(Pos2::new(image_rect.min.x, frame.max.y), image_rect.max),
                Rect::from_min_max(Pos2::new(image_rect.min.x, frame.min.y), Pos2::new(frame.min.x, frame.max.y)),
                Rect::from_min_max(Pos2::new(frame.max.x, frame.min.y), Pos2::new(image_rect.max.x, frame.max.y)),
            ] {
                painter.rect_filled(shade, 0.0, CROP_SHADE);
            }
            painter.rect_stroke(frame, 0.0, PenStroke::new(2.0, Color32::WHITE));
            for (_, handle) in r.handle_rects(lb.scale) {
                let hr = Rect::from_min_max(
                    to_screen(handle.x, handle.y),
                    to_screen(handle.right(), handle.bottom()),
                );
                painter.rect_filled(hr, 2.0, Color32::WHITE);
            }

            let raster = |pos: Pos2| lb.to_raster(&PointerInput::Mouse { x: pos.x, y: pos.y }, display);
            if let Some(hover) = response.hover_pos().and_then(raster)
                && let Some(handle) = crop.hit_test(hover.0, hover.1, lb.scale)
            {
                ui.ctx().set_cursor_icon(match handle.cursor() {
                    ResizeCursor::NwSe => CursorIcon::ResizeNwSe,
                    ResizeCursor::NeSw => CursorIcon::ResizeNeSw,
                    ResizeCursor::Vertical => CursorIcon::ResizeVertical,
                    ResizeCursor::Horizontal => CursorIcon::ResizeHorizontal,
                });
            }
            if let Some((x, y)) = response.interact_pointer_pos().and_then(raster) {
                if response.drag_started() {
                    crop.begin_drag(x, y, lb.scale);
                } else if response.dragged() {
                    crop.drag_to(x, y);
                }
            }
            if response.drag_released() {
                crop.end_drag();
            }
        });

        if apply {
            if let Some(cropped) = self.original.as_ref().and_then(|o| self.crop.apply(o)) {
                self.original = Some(cropped);
            }
            self.start_segmentation();
        } else if skip {
            self.crop.cancel();
            self.start_segmentation();
        }
    }

    fn show_processing(&mut self, ctx: &egui::Context) {
        let mut skip = false;
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(120.0);
                ui.spinner();
                ui.label("Looking at your insect…");
                ui.add_space(20.0);
                if ui.button("Skip and paint by hand").clicked() {
                    skip = true;
                }
            });
        });
        if skip {
            self.segment_rx = None;
            match self.original.clone() {
                Some(original) => self.start_editing(SegmentedImage::unsegmented(original)),
                None => self.restart(Some(SessionError::MissingOriginal.to_string())),
            }
        }
    }

    fn show_edit(&mut self, ctx: &egui::Context) {
        let mut done = false;
        let mut save = false;
        let undo_key = ctx.input(|i| i.modifiers.command && i.key_pressed(egui::Key::Z));

        let Some(session) = self.session.as_mut() else {
            self.restart(Some(SessionError::MissingOriginal.to_string()));
            return;
        };
        if undo_key && session.undo() {
            crate::log_info!("Undo via shortcut");
        }

        egui::SidePanel::left("edit_tools").resizable(false).show(ctx, |ui| {
            ui.heading("Body parts");
            for part in BodyPart::all() {
                let [r, g, b] = part.rgb();
                let text = egui::RichText::new(format!("■ {}", part.label())).color(Color32::from_rgb(r, g, b));
                if ui.selectable_label(self.tool == Tool::Draw && self.part == *part, text).clicked() {
                    self.part = *part;
                    self.tool = Tool::Draw;
                }
            }
            ui.separator();
            if ui.selectable_label(self.tool == Tool::Erase, Tool::Erase.label()).clicked() {
                self.tool = Tool::Erase;
            }
            ui.separator();
            ui.label("Brush size");
            ui.horizontal(|ui| {
                for preset in BrushPreset::all() {
                    if ui.selectable_label(self.brush == *preset, preset.label()).clicked() {
                        self.brush = *preset;
                    }
                }
            });
            ui.separator();
            if ui.add_enabled(session.can_undo(), egui::Button::new("Undo")).clicked() {
                session.undo();
            }
            ui.horizontal(|ui| {
                if ui.button("−").clicked() {
                    self.zoom.zoom_by(-ZOOM_STEP);
                }
                ui.label(format!("{:.0}%", self.zoom.display_scale() * 100.0));
                if ui.button("+").clicked() {
                    self.zoom.zoom_by(ZOOM_STEP);
                }
                if ui.button("Fit").clicked() {
                    self.zoom.reset();
                }
            });
            ui.separator();
            if ui.button("Save mask…").clicked() {
                save = true;
            }
            if ui.button("Done").clicked() {
                done = true;
            }
        });

        let key = session.layers().dirty_generation;
        let opacity = self.settings.mask_opacity;
        let tex = {
            let layers = session.layers();
            self.image_tex
                .ensure(ctx, "edit_composite", key, || layers.composite(opacity))
                .map(|t| t.id())
        };
        let (w, h) = (session.width(), session.height());
        let radius = self.brush.radius();
        let (tool, part) = (self.tool, self.part);

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.needs_fit {
                let avail = ui.available_size();
                self.zoom.fit_to(avail.x, avail.y, w, h);
                self.needs_fit = false;
            }
            if ui.rect_contains_pointer(ui.max_rect()) {
                let (scroll, command) = ui.input(|i| (i.scroll_delta.y, i.modifiers.command));
                if command && scroll != 0.0 {
                    self.zoom.zoom_by(scroll.signum() * ZOOM_STEP);
                }
            }
            let scale = self.zoom.display_scale();
            egui::ScrollArea::both().show(ui, |ui| {
                let size = Vec2::new(w as f32 * scale, h as f32 * scale);
                let (response, painter) = ui.allocate_painter(size, Sense::click_and_drag());
                let rect = response.rect;
                if let Some(id) = tex {
                    painter.image(id, rect, Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)), Color32::WHITE);
                }
                let display = DisplayRect::new(rect.left(), rect.top(), rect.width(), rect.height());
                let raster = |pos: Pos2| to_raster_space(&PointerInput::Mouse { x: pos.x, y: pos.y }, display, w, h);

                if let Some(pos) = response.interact_pointer_pos().and_then(raster) {
                    if response.drag_started() {
                        session.begin_stroke(pos, tool, part, radius);
                    } else if response.dragged() {
                        session.extend_stroke(pos);
                    }
                }
                if response.drag_released() {
                    session.end_stroke();
                }
                if response.clicked()
                    && !session.stroke_active()
                    && let Some(pos) = response.interact_pointer_pos().and_then(raster)
                {
                    session.begin_stroke(pos, tool, part, radius);
                    session.end_stroke();
                }

                if let Some(hover) = response.hover_pos() {
                    let color = match tool {
                        Tool::Draw => {
                            let [r, g, b] = part.rgb();
                            Color32::from_rgb(r, g, b)
                        }
                        Tool::Erase => Color32::WHITE,
                    };
                    painter.circle_stroke(hover, radius * scale, PenStroke::new(1.5, color));
                }
            });
        });

        if save {
            self.save_mask();
        }
        if done {
            self.finish_editing();
        }
    }

    fn show_result(&mut self, ctx: &egui::Context) {
        let Some(handoff) = self.handoff.as_ref() else {
            self.restart(Some(SessionError::MissingOriginal.to_string()));
            return;
        };
        let truth = handoff.boundaries;
        let (w, h) = (handoff.base.width(), handoff.base.height());
        let mut check = false;
        let mut start_over = false;

        egui::SidePanel::right("result_panel").resizable(false).min_width(240.0).show(ctx, |ui| {
            match self.quiz.phase() {
                QuizPhase::Learning => {
                    ui.heading("Body parts");
                    for part in [BodyPart::Head, BodyPart::Thorax, BodyPart::Abdomen, BodyPart::Legs] {
                        let selected = self.inspect == Some(part);
                        if ui.selectable_label(selected, part.label()).clicked() {
                            self.inspect = if selected { None } else { Some(part) };
                            self.overlay_generation += 1;
                        }
                        if selected {
                            ui.label(part.description());
                        }
                    }
                    ui.separator();
                    if ui.button("Start quiz").clicked() {
                        self.quiz.start();
                        self.overlay_generation += 1;
                    }
                }
                QuizPhase::Drawing | QuizPhase::Answered => {
                    ui.heading("Quiz");
                    ui.label("Click the picture to draw the two lines that split head, thorax and abdomen.");
                    if self.quiz.remaining_lines() > 0 {
                        ui.label(format!("{} line(s) left", self.quiz.remaining_lines()));
                    }
                    if ui.button("Check").clicked() {
                        check = true;
                    }
                    if let Some(outcome) = self.quiz.result {
                        ui.strong(outcome.message());
                    }
                    if ui.button("Show hint").clicked() {
                        self.quiz.reveal_hint();
                        self.overlay_generation += 1;
                    }
                    if ui.button("Try again").clicked() {
                        self.quiz.restart();
                        self.overlay_generation += 1;
                    }
                    if ui.button("End quiz").clicked() {
                        self.quiz.end();
                        self.overlay_generation += 1;
                    }
                }
            }
            ui.separator();
            if ui.button("Start over").clicked() {
                start_over = true;
            }
        });

        if check {
            let msg = match self.quiz.score(&truth, h) {
                Ok(outcome) => outcome.message().to_string(),
                Err(prompt) => prompt.message().to_string(),
            };
            self.notice = Some(msg);
        }

        let focus = match (self.quiz.mode, self.quiz.hint_revealed, self.inspect) {
            (QuizMode::Active, true, _) => Some(RevealFocus::All),
            (QuizMode::Off, _, Some(part)) => Some(RevealFocus::Part(part)),
            _ => None,
        };
        let base_tex = self.image_tex.ensure(ctx, "result_composite", 0, || handoff.composite()).map(|t| t.id());
        let legs_distance = self.settings.legs_color_distance;
        let overlay_tex = focus.and_then(|focus| {
            self.overlay_tex
                .ensure(ctx, "reveal_overlay", self.overlay_generation, || {
                    quiz::reveal_overlay(&handoff.edited_mask, &truth, focus, legs_distance)
                })
                .map(|t| t.id())
        });
        let show_answer = self.quiz.mode == QuizMode::Off || self.quiz.hint_revealed;
        let quiz = &mut self.quiz;

        egui::CentralPanel::default().show(ctx, |ui| {
            let avail = ui.available_size();
            let lb = Letterbox::fit(avail.x, avail.y, w, h);
            let size = Vec2::new(w as f32 * lb.scale, h as f32 * lb.scale);
            let sense = if quiz.mode == QuizMode::Active { Sense::click() } else { Sense::hover() };
            let (response, painter) = ui.allocate_painter(size, sense);
            let rect = response.rect;
            let uv = Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
            if let Some(id) = base_tex {
                painter.image(id, rect, uv, Color32::WHITE);
            }
            if let Some(id) = overlay_tex {
                painter.image(id, rect, uv, Color32::WHITE);
            }
            let y_to_screen = |y: f32| rect.top() + y * lb.scale;

            if show_answer {
                let overlay = truth.answer_overlay(h);
                for y in overlay.lines {
                    let sy = y_to_screen(y);
                    painter.line_segment(
                        [Pos2::new(rect.left(), sy), Pos2::new(rect.right(), sy)],
                        PenStroke::new(4.0, ANSWER_LINE),
                    );
                }
                for label in overlay.labels {
                    let [r, g, b] = label.part.rgb();
                    painter.text(
                        Pos2::new(rect.right() - 10.0, y_to_screen(label.y)),
                        Align2::RIGHT_CENTER,
                        label.part.label(),
                        FontId::proportional(22.0),
                        Color32::from_rgb(r, g, b),
                    );
                }
            }
            for y in quiz.lines() {
                let sy = y_to_screen(*y);
                painter.line_segment(
                    [Pos2::new(rect.left(), sy), Pos2::new(rect.right(), sy)],
                    PenStroke::new(4.0, QUIZ_LINE),
                );
            }

            if response.clicked()
                && let Some(pos) = response.interact_pointer_pos()
            {
                let display = DisplayRect::new(rect.left(), rect.top(), rect.width(), rect.height());
                if let Some((_, y)) = to_raster_space(&PointerInput::Mouse { x: pos.x, y: pos.y }, display, w, h) {
                    quiz.place_line(y);
                }
            }
        });

        if start_over {
            self.restart(None);
        }
    }

    fn show_messages(&mut self, ctx: &egui::Context) {
        if self.error.is_none() && self.notice.is_none() {
            return;
        }
        egui::TopBottomPanel::top("messages").show(ctx, |ui| {
            if let Some(err) = self.error.clone() {
                ui.horizontal(|ui| {
                    ui.colored_label(Color32::from_rgb(220, 50, 50), err);
                    if ui.small_button("✕").clicked() {
                        self.error = None;
                    }
                });
            }
            if let Some(notice) = self.notice.clone() {
                ui.horizontal(|ui| {
                    ui.label(notice);
                    if ui.small_button("✕").clicked() {
                        self.notice = None;
                    }
                });
            }
        });
    }
}

impl eframe::App for InsectMaskApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_background();
        if self.loading || self.segment_rx.is_some() || self.log_rx.is_some() {
            ctx.request_repaint_after(POLL_INTERVAL);
        }

        self.show_messages(ctx);
        match self.stage {
            Stage::Acquire => self.show_acquire(ctx),
            Stage::Crop => self.show_crop(ctx),
            Stage::Processing => self.show_processing(ctx),
            Stage::Edit => self.show_edit(ctx),
            Stage::Result => self.show_result(ctx),
        }
    }
}
