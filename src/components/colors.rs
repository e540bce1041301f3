use image::Rgba;

// ============================================================================
// BODY PART PALETTE
// ============================================================================

/// Reference colors painted into the mask. These match the palette the
/// segmentation service uses for its label image, so service output and
/// user strokes can be classified by the same table.
pub const HEAD_RGB: [u8; 3] = [31, 119, 180];
pub const THORAX_RGB: [u8; 3] = [44, 160, 44];
pub const ABDOMEN_RGB: [u8; 3] = [214, 39, 40];
pub const LEGS_RGB: [u8; 3] = [148, 103, 189];

/// Default Manhattan RGB distance under which a pixel counts as a palette match.
pub const DEFAULT_COLOR_DISTANCE: u32 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum BodyPart {
    #[default]
    Head,
    Thorax,
    Abdomen,
    Legs,
}

impl BodyPart {
    pub fn all() -> &'static [BodyPart] {
        &[BodyPart::Head, BodyPart::Thorax, BodyPart::Abdomen, BodyPart::Legs]
    }

    pub fn rgb(&self) -> [u8; 3] {
        match self {
            BodyPart::Head => HEAD_RGB,
            BodyPart::Thorax => THORAX_RGB,
            BodyPart::Abdomen => ABDOMEN_RGB,
            BodyPart::Legs => LEGS_RGB,
        }
    }

    /// Fully opaque paint color for this part.
    pub fn paint(&self) -> Rgba<u8> {
        let [r, g, b] = self.rgb();
        Rgba([r, g, b, 255])
    }

    pub fn label(&self) -> &'static str {
        match self {
            BodyPart::Head => "Head",
            BodyPart::Thorax => "Thorax",
            BodyPart::Abdomen => "Abdomen",
            BodyPart::Legs => "Legs",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BodyPart::Head => "Eyes, mouthparts and antennae live here.",
            BodyPart::Thorax => "Legs and wings are attached to the thorax.",
            BodyPart::Abdomen => "Digestion and egg production happen here.",
            BodyPart::Legs => "Six legs, all growing from the thorax.",
        }
    }

    /// Lowercase identifier used by stroke files and the CLI.
    pub fn key(&self) -> &'static str {
        match self {
            BodyPart::Head => "head",
            BodyPart::Thorax => "thorax",
            BodyPart::Abdomen => "abdomen",
            BodyPart::Legs => "legs",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "head" => Some(BodyPart::Head),
            "thorax" => Some(BodyPart::Thorax),
            "abdomen" => Some(BodyPart::Abdomen),
            "legs" | "appendages" => Some(BodyPart::Legs),
            _ => None,
        }
    }

    /// Nearest palette entry within `max_distance`, if any.
    pub fn classify(pixel: Rgba<u8>, max_distance: u32) -> Option<BodyPart> {
        if pixel[3] == 0 {
            return None;
        }
        let rgb = [pixel[0], pixel[1], pixel[2]];
        BodyPart::all()
            .iter()
            .map(|part| (*part, color_distance(rgb, part.rgb())))
            .filter(|(_, d)| *d < max_distance)
            .min_by_key(|(_, d)| *d)
            .map(|(part, _)| part)
    }
}

/// Manhattan distance between two RGB triples.
pub fn color_distance(a: [u8; 3], b: [u8; 3]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as i32 - *y as i32).unsigned_abs())
        .sum()
}
