//! End-to-end behaviour of the editing engine through its public API.

use image::{Rgba, RgbaImage};
use insectmask::components::colors::BodyPart;
use insectmask::components::tools::{Stroke, Tool};
use insectmask::ops::boundaries::BoundaryTruth;
use insectmask::ops::crop::{CropController, CropHandle, CropPhase};
use insectmask::ops::quiz::{QuizOutcome, QuizState, score_lines};
use insectmask::project::EditSession;
use insectmask::settings::EditorSettings;
use insectmask::viewport::fit_scale;

fn photo(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 90, 255]))
}

fn session(w: u32, h: u32) -> EditSession {
    EditSession::new(Some(&photo(w, h)), None, None, None, &EditorSettings::default()).unwrap()
}

fn draw(session: &mut EditSession, points: &[(f32, f32)], part: BodyPart, radius: f32) {
    session.begin_stroke(points[0], Tool::Draw, part, radius);
    for p in &points[1..] {
        session.extend_stroke(*p);
    }
    session.end_stroke();
}

/// Small deterministic generator for drag sequences.
struct Lcg(u64);

impl Lcg {
    fn next_f32(&mut self, lo: f32, hi: f32) -> f32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let unit = (self.0 >> 40) as f32 / (1u64 << 24) as f32;
        lo + unit * (hi - lo)
    }
}

#[test]
fn composite_is_repeatable_after_strokes() {
    let mut s = session(120, 80);
    draw(&mut s, &[(10.0, 10.0), (90.0, 60.0)], BodyPart::Thorax, 8.0);
    draw(&mut s, &[(30.0, 70.0), (30.0, 5.0)], BodyPart::Legs, 4.0);
    let first = s.composite();
    let second = s.composite();
    assert_eq!(first, second);
    assert_ne!(first, *s.layers().base());
}

#[test]
fn draw_never_escapes_the_guard() {
    // Service silhouette covers only the left half.
    let mask = RgbaImage::from_fn(100, 60, |x, _| {
        if x < 50 { Rgba([214, 39, 40, 255]) } else { Rgba([0, 0, 0, 0]) }
    });
    let mut s = EditSession::new(Some(&photo(100, 60)), Some(&mask), None, None, &EditorSettings::default()).unwrap();
    draw(&mut s, &[(45.0, 10.0), (55.0, 50.0)], BodyPart::Head, 20.0);
    draw(&mut s, &[(0.0, 0.0), (99.0, 59.0)], BodyPart::Legs, 30.0);

    for (x, y, px) in s.layers().mask().enumerate_pixels() {
        if x >= 50 {
            assert_eq!(px[3], 0, "mask leaked outside the guard at ({x}, {y})");
        }
    }
    assert!(s.layers().mask().get_pixel(45, 10)[3] > 0);
}

#[test]
fn history_keeps_ten_entries_and_stops_at_baseline() {
    let mut s = session(200, 40);
    for i in 0..12 {
        let x = 8.0 + i as f32 * 15.0;
        draw(&mut s, &[(x, 20.0)], BodyPart::Abdomen, 5.0);
    }
    assert_eq!(s.history().len(), 10);

    for _ in 0..10 {
        s.undo();
    }
    assert!(!s.can_undo());
    assert!(s.layers().mask().pixels().all(|p| p[3] == 0));
    assert!(!s.undo());
}

#[test]
fn crop_rectangle_survives_arbitrary_drags() {
    let mut rng = Lcg(7);
    for (w, h) in [(400u32, 300u32), (120, 80), (60, 500)] {
        let mut crop = CropController::new(50.0);
        crop.enter(w, h);
        for _ in 0..200 {
            let r = crop.rect();
            let handle = CropHandle::all()[(rng.next_f32(0.0, 8.0) as usize).min(7)];
            let (gx, gy) = match handle {
                CropHandle::TopLeft => (r.x, r.y),
                CropHandle::TopRight => (r.right(), r.y),
                CropHandle::BottomLeft => (r.x, r.bottom()),
                CropHandle::BottomRight => (r.right(), r.bottom()),
                CropHandle::Top => (r.x + r.width / 2.0, r.y),
                CropHandle::Bottom => (r.x + r.width / 2.0, r.bottom()),
                CropHandle::Left => (r.x, r.y + r.height / 2.0),
                CropHandle::Right => (r.right(), r.y + r.height / 2.0),
            };
            if crop.begin_drag(gx, gy, 1.0).is_none() {
                continue;
            }
            for _ in 0..4 {
                crop.drag_to(rng.next_f32(-300.0, w as f32 + 300.0), rng.next_f32(-300.0, h as f32 + 300.0));
            }
            crop.end_drag();

            let r = crop.rect();
            let (min_w, min_h) = (50f32.min(w as f32), 50f32.min(h as f32));
            assert!(r.width >= min_w - 1e-3 && r.height >= min_h - 1e-3, "{:?}", r);
            assert!(r.x >= 0.0 && r.y >= 0.0, "{:?}", r);
            assert!(r.right() <= w as f32 + 1e-3 && r.bottom() <= h as f32 + 1e-3, "{:?}", r);
        }
        assert_eq!(crop.phase(), CropPhase::Active);
    }
}

#[test]
fn quiz_scores_against_tolerance() {
    let truth = BoundaryTruth::new(100.0, 200.0);
    assert_eq!(score_lines([105.0, 195.0], &truth, 400, 0.10), QuizOutcome::Correct);
    assert_eq!(score_lines([105.0, 500.0], &truth, 400, 0.10), QuizOutcome::Partial);
    assert_eq!(score_lines([500.0, 600.0], &truth, 400, 0.10), QuizOutcome::Incorrect);

    let mut quiz = QuizState::new(0.10);
    quiz.start();
    quiz.place_line(195.0);
    quiz.place_line(105.0);
    assert_eq!(quiz.score(&truth, 400), Ok(QuizOutcome::Correct));
}

#[test]
fn fit_scale_uses_tighter_axis() {
    assert!((fit_scale(400.0, 300.0, 800, 800) - 0.375).abs() < 1e-6);
    assert_eq!(fit_scale(2000.0, 2000.0, 100, 100), 1.0);
}

#[test]
fn corner_grab_is_screen_space() {
    let mut crop = CropController::new(50.0);
    crop.enter(1000, 800);
    let r = crop.rect();
    for scale in [2.0f32, 0.5] {
        // 20 display pixels to the right of the top-left corner.
        let x = r.x + 20.0 / scale;
        assert_eq!(crop.hit_test(x, r.y, scale), Some(CropHandle::TopLeft), "scale {scale}");
        let y = r.bottom() - 20.0 / scale;
        assert_eq!(crop.hit_test(r.right(), y, scale), Some(CropHandle::BottomRight), "scale {scale}");
    }
}

#[test]
fn fast_stroke_leaves_no_gaps() {
    let mut s = session(120, 30);
    draw(&mut s, &[(0.0, 0.0), (100.0, 0.0)], BodyPart::Head, 12.0);
    let mask = s.layers().mask();
    for x in 0..=100 {
        assert_eq!(mask.get_pixel(x, 0)[3], 255, "gap at x={x}");
    }
}

#[test]
fn replayed_stroke_matches_live_stroke() {
    let mut live = session(80, 80);
    draw(&mut live, &[(10.0, 10.0), (70.0, 70.0)], BodyPart::Thorax, 6.0);

    let mut replayed = session(80, 80);
    replayed.replay(&Stroke {
        tool: Tool::Draw,
        part: BodyPart::Thorax,
        radius: 6.0,
        points: vec![(10.0, 10.0), (70.0, 70.0)],
    });
    assert_eq!(live.layers().mask(), replayed.layers().mask());
}
