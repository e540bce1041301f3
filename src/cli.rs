// ============================================================================
// InsectMask CLI — headless mask editing and quiz scoring
// ============================================================================
//
// Usage examples:
//   insectmask -i beetle.jpg --segment -o edited_mask.png
//   insectmask -i beetle.jpg --mask service.png --strokes fixes.json -o mask.png --composite view.png
//   insectmask -i beetle.jpg --mask mask.png --thorax-top 310 --thorax-bottom 520 --quiz-lines 300,530
//   insectmask -i beetle.jpg --crop 40,20,600,500 --segment --estimate-boundaries
//
// No GUI is opened in CLI mode. Everything runs on the current thread.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use image::RgbaImage;
use serde::Deserialize;

use crate::canvas::fit_to_raster;
use crate::components::colors::BodyPart;
use crate::components::tools::{Stroke, Tool};
use crate::io;
use crate::ops::boundaries::BoundaryTruth;
use crate::ops::crop::CropRect;
use crate::ops::quiz::{self, RevealFocus};
use crate::project::EditSession;
use crate::service::{SegmentationClient, Segmenter};
use crate::settings::EditorSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// InsectMask headless editor.
///
/// Segment an insect photo, replay brush/eraser strokes over the mask, and
/// score boundary guesses without opening the GUI.
#[derive(Parser, Debug)]
#[command(
    name = "insectmask",
    about = "InsectMask headless mask editor",
    long_about = "Load an insect photo, optionally segment it with the configured service,\n\
                  replay recorded strokes onto the body-part mask and write the results.\n\n\
                  Example:\n  \
                  insectmask -i beetle.jpg --segment --strokes fixes.json -o mask.png"
)]
pub struct CliArgs {
    /// Original photo.
    #[arg(short, long, value_name = "IMAGE")]
    pub input: PathBuf,

    /// Service mask image to start from (skips --segment).
    #[arg(short, long, value_name = "IMAGE")]
    pub mask: Option<PathBuf>,

    /// Crop the photo before anything else: x,y,width,height in photo pixels.
    #[arg(long, value_name = "X,Y,W,H")]
    pub crop: Option<String>,

    /// Ask the segmentation service for a mask and boundary rows.
    #[arg(long)]
    pub segment: bool,

    /// Override the configured service base URL.
    #[arg(long, value_name = "URL")]
    pub service_url: Option<String>,

    /// Thorax top row in photo pixels (overrides the service value).
    #[arg(long, value_name = "Y")]
    pub thorax_top: Option<f32>,

    /// Thorax bottom row in photo pixels (overrides the service value).
    #[arg(long, value_name = "Y")]
    pub thorax_bottom: Option<f32>,

    /// JSON stroke list: [{"tool":"draw","part":"head","radius":12,"points":[[x,y],...]}]
    #[arg(long, value_name = "FILE.json")]
    pub strokes: Option<PathBuf>,

    /// Write the edited mask as PNG.
    #[arg(short, long, value_name = "FILE.png")]
    pub output: Option<PathBuf>,

    /// Write the photo with the mask blended on top.
    #[arg(long, value_name = "FILE.png")]
    pub composite: Option<PathBuf>,

    /// Write the reveal overlay.
    #[arg(long, value_name = "FILE.png")]
    pub reveal: Option<PathBuf>,

    /// Part to highlight in the reveal overlay (head, thorax, abdomen, legs, all).
    #[arg(long, default_value = "all", value_name = "PART")]
    pub reveal_part: String,

    /// Two boundary guesses, in raster rows after downscaling: y1,y2
    #[arg(long, value_name = "Y1,Y2")]
    pub quiz_lines: Option<String>,

    /// Print boundary rows estimated from the edited mask.
    #[arg(long)]
    pub estimate_boundaries: bool,

    /// Override the longest-edge limit applied on load.
    #[arg(long, value_name = "PX")]
    pub max_edge: Option<u32>,

    /// Print per-step details.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when a CLI-mode flag is present in the real process arguments.
    /// Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }
}

// ============================================================================
// Stroke files
// ============================================================================

#[derive(Deserialize)]
struct StrokeRecord {
    tool: String,
    #[serde(default)]
    part: Option<String>,
    radius: f32,
    points: Vec<[f32; 2]>,
}

/// Parse a JSON stroke list. Erase strokes may omit `part`.
pub fn parse_strokes(json: &str) -> Result<Vec<Stroke>, String> {
    let records: Vec<StrokeRecord> = serde_json::from_str(json).map_err(|e| format!("invalid stroke file: {}", e))?;
    records
        .into_iter()
        .enumerate()
        .map(|(i, rec)| {
            let tool = Tool::from_key(&rec.tool).ok_or_else(|| format!("stroke {}: unknown tool '{}'", i, rec.tool))?;
            let part = match (&rec.part, tool) {
                (Some(key), _) => BodyPart::from_key(key).ok_or_else(|| format!("stroke {}: unknown part '{}'", i, key))?,
                (None, Tool::Erase) => BodyPart::default(),
                (None, Tool::Draw) => return Err(format!("stroke {}: draw strokes need a part", i)),
            };
            if !(rec.radius > 0.0 && rec.radius.is_finite()) {
                return Err(format!("stroke {}: radius must be positive", i));
            }
            if rec.points.iter().flatten().any(|v| !v.is_finite()) {
                return Err(format!("stroke {}: point coordinates must be finite", i));
            }
            Ok(Stroke {
                tool,
                part,
                radius: rec.radius,
                points: rec.points.iter().map(|p| (p[0], p[1])).collect(),
            })
        })
        .collect()
}

/// Parse `"a,b,c"` into exactly `N` floats.
pub fn parse_floats<const N: usize>(text: &str) -> Result<[f32; N], String> {
    let values: Vec<f32> = text
        .split(',')
        .map(|s| s.trim().parse::<f32>().map_err(|_| format!("'{}' is not a number", s.trim())))
        .collect::<Result<_, _>>()?;
    values
        .try_into()
        .map_err(|v: Vec<f32>| format!("expected {} comma-separated values, got {}", N, v.len()))
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the headless pipeline. `0` = success, `1` = any failure.
pub fn run(args: CliArgs) -> ExitCode {
    match run_inner(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("error: {}", msg);
            crate::log_err!("CLI failed: {}", msg);
            ExitCode::FAILURE
        }
    }
}

fn run_inner(args: &CliArgs) -> Result<(), String> {
    let started = Instant::now();
    let mut settings = EditorSettings::load();
    if let Some(url) = &args.service_url {
        settings.service_url = url.trim_end_matches('/').to_string();
    }
    if let Some(edge) = args.max_edge {
        settings.max_edge = edge;
    }

    let mut original = load(&args.input)?;
    let mut mask = match &args.mask {
        Some(path) => Some(load(path)?),
        None => None,
    };
    let (mut user_top, mut user_bottom) = (args.thorax_top, args.thorax_bottom);
    if let Some(crop_arg) = &args.crop {
        let [x, y, w, h] = parse_floats::<4>(crop_arg)?;
        let rect = CropRect::new(x, y, w, h);
        let (px, py, pw, ph) = rect.to_pixels(original.width(), original.height());
        (original, mask, user_top, user_bottom) = crop_inputs(rect, &original, mask.as_ref(), user_top, user_bottom);
        verbose(args, &format!("Cropped to {}×{} at ({}, {})", pw, ph, px, py));
    }

    let (mut top, mut bottom) = (None, None);
    if mask.is_none() && args.segment {
        let client = SegmentationClient::new(&settings.service_url, Duration::from_secs(settings.request_timeout_secs))
            .map_err(|e| e.to_string())?;
        verbose(args, &format!("Segmenting via {}", client.endpoint()));
        let seg = client.segment(&original).map_err(|e| e.to_string())?;
        mask = Some(seg.mask);
        top = seg.thorax_top;
        bottom = seg.thorax_bottom;
    }
    top = user_top.or(top);
    bottom = user_bottom.or(bottom);

    let mut session =
        EditSession::new(Some(&original), mask.as_ref(), top, bottom, &settings).map_err(|e| e.to_string())?;
    verbose(
        args,
        &format!(
            "Session {}: raster {}×{} (scale {:.3})",
            session.id,
            session.width(),
            session.height(),
            session.scale()
        ),
    );

    if let Some(path) = &args.strokes {
        let json = std::fs::read_to_string(path).map_err(|e| format!("could not read '{}': {}", path.display(), e))?;
        let strokes = parse_strokes(&json)?;
        let mut changed = 0;
        for stroke in &strokes {
            if session.replay(stroke).is_some_and(|s| s.changed) {
                changed += 1;
            }
        }
        verbose(args, &format!("Replayed {} strokes ({} changed the mask)", strokes.len(), changed));
    }

    if let Some(path) = &args.output {
        save(session.layers().mask(), path)?;
    }
    if let Some(path) = &args.composite {
        save(&session.composite(), path)?;
    }

    let truth = session.boundaries();
    println!("boundaries: top={:.1} bottom={:.1}", truth.thorax_top, truth.thorax_bottom);

    if let Some(path) = &args.reveal {
        let focus = match args.reveal_part.trim().to_ascii_lowercase().as_str() {
            "all" => RevealFocus::All,
            key => RevealFocus::Part(BodyPart::from_key(key).ok_or_else(|| format!("unknown part '{}'", key))?),
        };
        let overlay = quiz::reveal_overlay(session.layers().mask(), &truth, focus, settings.legs_color_distance);
        save(&overlay, path)?;
    }

    if let Some(lines_arg) = &args.quiz_lines {
        let lines = parse_floats::<2>(lines_arg)?;
        let outcome = quiz::score_lines(lines, &truth, session.height(), settings.quiz_tolerance);
        println!("quiz: {:?} ({})", outcome, outcome.message());
    }

    if args.estimate_boundaries {
        let est = BoundaryTruth::estimate_from_mask(session.layers().mask(), settings.legs_color_distance);
        println!("estimated: top={:.0} bottom={:.0}", est.thorax_top, est.thorax_bottom);
    }

    verbose(args, &format!("Done in {:.2}s", started.elapsed().as_secs_f32()));
    Ok(())
}

/// Cut photo, mask and boundary rows to `rect`. The mask is first aligned to
/// the uncropped photo so both are cut at the same pixels; rows move up by the
/// crop's top edge.
fn crop_inputs(
    rect: CropRect,
    original: &RgbaImage,
    mask: Option<&RgbaImage>,
    top: Option<f32>,
    bottom: Option<f32>,
) -> (RgbaImage, Option<RgbaImage>, Option<f32>, Option<f32>) {
    let (w, h) = original.dimensions();
    let (px, py, pw, ph) = rect.to_pixels(w, h);
    let cropped = image::imageops::crop_imm(original, px, py, pw, ph).to_image();
    let mask = mask.map(|m| {
        let aligned = fit_to_raster(m, w, h);
        image::imageops::crop_imm(&aligned, px, py, pw, ph).to_image()
    });
    let shift = |row: Option<f32>| row.map(|y| y - py as f32);
    (cropped, mask, shift(top), shift(bottom))
}

fn load(path: &Path) -> Result<RgbaImage, String> {
    io::load_image_file(path).map_err(|e| format!("'{}': {}", path.display(), e))
}

fn save(image: &RgbaImage, path: &Path) -> Result<(), String> {
    io::save_png(image, path).map_err(|e| format!("'{}': {}", path.display(), e))?;
    println!("wrote {}", path.display());
    Ok(())
}

fn verbose(args: &CliArgs, msg: &str) {
    crate::log_info!("{}", msg);
    if args.verbose {
        println!("{}", msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn strokes_parse() {
        let strokes = parse_strokes(
            r#"[{"tool":"draw","part":"thorax","radius":12,"points":[[1,2],[3,4]]},
                {"tool":"erase","radius":24,"points":[[5,5]]}]"#,
        )
        .unwrap();
        assert_eq!(strokes.len(), 2);
        assert_eq!(strokes[0].part, BodyPart::Thorax);
        assert_eq!(strokes[0].points, vec![(1.0, 2.0), (3.0, 4.0)]);
        assert_eq!(strokes[1].tool, Tool::Erase);
    }

    #[test]
    fn draw_without_part_is_rejected() {
        assert!(parse_strokes(r#"[{"tool":"draw","radius":12,"points":[]}]"#).is_err());
        assert!(parse_strokes(r#"[{"tool":"smudge","part":"head","radius":12,"points":[]}]"#).is_err());
    }

    #[test]
    fn float_lists() {
        assert_eq!(parse_floats::<2>("105, 195"), Ok([105.0, 195.0]));
        assert!(parse_floats::<4>("1,2,3").is_err());
        assert!(parse_floats::<2>("a,b").is_err());
    }

    #[test]
    fn args_parse() {
        let args = CliArgs::try_parse_from([
            "insectmask", "-i", "bug.png", "--segment", "--quiz-lines", "1,2", "-o", "m.png",
        ])
        .unwrap();
        assert!(args.segment);
        assert_eq!(args.output, Some(PathBuf::from("m.png")));
        assert_eq!(args.reveal_part, "all");
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        let json = r#"[{"tool":"draw","part":"head","radius":12,"points":[[1,2],[1e39,4]]}]"#;
        assert!(parse_strokes(json).is_err());
        assert!(parse_strokes(r#"[{"tool":"erase","radius":1e39,"points":[[1,2]]}]"#).is_err());
    }

    #[test]
    fn crop_shifts_rows_and_cuts_mask_at_same_pixels() {
        let photo = RgbaImage::new(200, 100);
        // Half-resolution mask, silhouette on the left half only.
        let mask = RgbaImage::from_fn(100, 50, |x, _| {
            if x < 50 { image::Rgba([214, 39, 40, 255]) } else { image::Rgba([0, 0, 0, 0]) }
        });
        let rect = CropRect::new(80.0, 20.0, 60.0, 50.0);
        let (cropped, mask, top, bottom) = crop_inputs(rect, &photo, Some(&mask), Some(30.0), Some(60.0));
        assert_eq!(cropped.dimensions(), (60, 50));
        let mask = mask.unwrap();
        assert_eq!(mask.dimensions(), (60, 50));
        assert_eq!(mask.get_pixel(15, 0)[3], 255);
        assert_eq!(mask.get_pixel(25, 0)[3], 0);
        assert_eq!((top, bottom), (Some(10.0), Some(40.0)));
    }

    #[test]
    fn cropping_away_the_silhouette_leaves_an_empty_mask() {
        let dir = tempfile::tempdir().unwrap();
        let photo_path = dir.path().join("photo.png");
        let mask_path = dir.path().join("mask.png");
        let out_path = dir.path().join("out.png");
        io::save_png(&RgbaImage::from_pixel(200, 100, image::Rgba([90, 90, 90, 255])), &photo_path).unwrap();
        let mask = RgbaImage::from_fn(200, 100, |x, _| {
            if x < 100 { image::Rgba([44, 160, 44, 255]) } else { image::Rgba([0, 0, 0, 0]) }
        });
        io::save_png(&mask, &mask_path).unwrap();

        let args = CliArgs::try_parse_from([
            OsStr::new("insectmask"),
            OsStr::new("-i"),
            photo_path.as_os_str(),
            OsStr::new("--mask"),
            mask_path.as_os_str(),
            OsStr::new("--crop"),
            OsStr::new("100,0,100,100"),
            OsStr::new("-o"),
            out_path.as_os_str(),
        ])
        .unwrap();
        assert_eq!(run_inner(&args), Ok(()));

        let out = io::load_image_file(&out_path).unwrap();
        assert_eq!(out.dimensions(), (100, 100));
        assert_eq!(out.pixels().filter(|p| p[3] > 0).count(), 0);
    }
}
