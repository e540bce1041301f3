// ============================================================================
// BOUNDARY QUIZ — two drawn lines scored against the thorax band
// ============================================================================

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::components::colors::{BodyPart, DEFAULT_COLOR_DISTANCE, LEGS_RGB, color_distance};
use crate::ops::boundaries::BoundaryTruth;

/// Tolerance as a fraction of raster height.
pub const DEFAULT_QUIZ_TOLERANCE: f32 = 0.10;
pub const LINES_REQUIRED: usize = 2;
/// Overlay alpha for highlighted and dimmed pixels.
pub const HIGHLIGHT_ALPHA: u8 = 220;
pub const DIM_ALPHA: u8 = 40;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum QuizMode {
    #[default]
    Off,
    Active,
}

/// Where the result view currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuizPhase {
    Learning,
    Drawing,
    Answered,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuizOutcome {
    Correct,
    Partial,
    Incorrect,
}

impl QuizOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            QuizOutcome::Correct => "Correct! Great job!",
            QuizOutcome::Partial => "So close! Try again!",
            QuizOutcome::Incorrect => "Not quite... give it another try!",
        }
    }
}

/// A non-error reason scoring could not run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuizPrompt {
    NeedTwoLines,
}

impl QuizPrompt {
    pub fn message(&self) -> &'static str {
        match self {
            QuizPrompt::NeedTwoLines => "Draw two lines first!",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuizState {
    pub mode: QuizMode,
    lines: Vec<f32>,
    pub result: Option<QuizOutcome>,
    pub hint_revealed: bool,
    pub tolerance: f32,
}

impl Default for QuizState {
    fn default() -> Self {
        Self::new(DEFAULT_QUIZ_TOLERANCE)
    }
}

impl QuizState {
    pub fn new(tolerance: f32) -> Self {
        Self {
            mode: QuizMode::Off,
            lines: Vec::with_capacity(LINES_REQUIRED),
            result: None,
            hint_revealed: false,
            tolerance,
        }
    }

    pub fn phase(&self) -> QuizPhase {
        match (self.mode, self.result) {
            (QuizMode::Off, _) => QuizPhase::Learning,
            (QuizMode::Active, None) => QuizPhase::Drawing,
            (QuizMode::Active, Some(_)) => QuizPhase::Answered,
        }
    }

    pub fn lines(&self) -> &[f32] {
        &self.lines
    }

    pub fn remaining_lines(&self) -> usize {
        LINES_REQUIRED.saturating_sub(self.lines.len())
    }

    pub fn start(&mut self) {
        self.mode = QuizMode::Active;
        self.clear();
    }

    /// Clear lines and result, staying in the quiz.
    pub fn restart(&mut self) {
        self.clear();
    }

    /// Back to the learning view.
    pub fn end(&mut self) {
        self.mode = QuizMode::Off;
        self.clear();
    }

    pub fn reveal_hint(&mut self) {
        self.hint_revealed = true;
    }

    /// Record a click's raster y. Ignored outside the quiz or once two lines exist.
    pub fn place_line(&mut self, y: f32) -> bool {
        if self.mode != QuizMode::Active || self.lines.len() >= LINES_REQUIRED {
            return false;
        }
        self.lines.push(y);
        true
    }

    pub fn score(&mut self, truth: &BoundaryTruth, height: u32) -> Result<QuizOutcome, QuizPrompt> {
        let [a, b] = match self.lines.as_slice() {
            [a, b] => [*a, *b],
            _ => return Err(QuizPrompt::NeedTwoLines),
        };
        let outcome = score_lines([a, b], truth, height, self.tolerance);
        crate::log_info!("Quiz scored: lines {:.1}/{:.1} → {:?}", a, b, outcome);
        self.result = Some(outcome);
        Ok(outcome)
    }

    fn clear(&mut self) {
        self.lines.clear();
        self.result = None;
        self.hint_revealed = false;
    }
}

/// Sort the two lines and compare each to its boundary within
/// `tolerance_fraction × height`.
pub fn score_lines(lines: [f32; 2], truth: &BoundaryTruth, height: u32, tolerance_fraction: f32) -> QuizOutcome {
    let (top, bottom) = if lines[0] <= lines[1] {
        (lines[0], lines[1])
    } else {
        (lines[1], lines[0])
    };
    let tolerance = height as f32 * tolerance_fraction;
    let top_ok = (top - truth.thorax_top).abs() < tolerance;
    let bottom_ok = (bottom - truth.thorax_bottom).abs() < tolerance;
    match (top_ok, bottom_ok) {
        (true, true) => QuizOutcome::Correct,
        (true, false) | (false, true) => QuizOutcome::Partial,
        (false, false) => QuizOutcome::Incorrect,
    }
}

// ============================================================================
// REVEAL OVERLAY
// ============================================================================

/// Which parts the overlay highlights.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevealFocus {
    All,
    Part(BodyPart),
}

impl RevealFocus {
    fn matches(&self, part: BodyPart) -> bool {
        match self {
            RevealFocus::All => true,
            RevealFocus::Part(p) => *p == part,
        }
    }
}

/// Bucket for one opaque mask pixel: legs by color, otherwise by band.
pub fn classify_pixel(px: Rgba<u8>, y: u32, truth: &BoundaryTruth, legs_distance: u32) -> Option<BodyPart> {
    if px[3] == 0 {
        return None;
    }
    if color_distance([px[0], px[1], px[2]], LEGS_RGB) < legs_distance {
        return Some(BodyPart::Legs);
    }
    Some(truth.band_at(y as f32))
}

/// Recolor every opaque mask pixel by its bucket; focused buckets at high
/// alpha, the rest dimmed. Transparent pixels stay transparent.
pub fn reveal_overlay(mask: &RgbaImage, truth: &BoundaryTruth, focus: RevealFocus, legs_distance: u32) -> RgbaImage {
    let (w, h) = mask.dimensions();
    let mut out = RgbaImage::new(w, h);
    let row_len = w as usize * 4;
    if row_len == 0 {
        return out;
    }
    let src = mask.as_raw();
    out.as_mut()
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            let src_row = &src[y * row_len..(y + 1) * row_len];
            for (dst, px) in row.chunks_exact_mut(4).zip(src_row.chunks_exact(4)) {
                let px = Rgba([px[0], px[1], px[2], px[3]]);
                if let Some(part) = classify_pixel(px, y as u32, truth, legs_distance) {
                    let [r, g, b] = part.rgb();
                    let a = if focus.matches(part) { HIGHLIGHT_ALPHA } else { DIM_ALPHA };
                    dst.copy_from_slice(&[r, g, b, a]);
                }
            }
        });
    out
}

/// Overlay with the default legs threshold.
pub fn reveal_overlay_default(mask: &RgbaImage, truth: &BoundaryTruth, focus: RevealFocus) -> RgbaImage {
    reveal_overlay(mask, truth, focus, DEFAULT_COLOR_DISTANCE)
}
