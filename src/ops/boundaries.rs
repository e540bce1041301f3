// ============================================================================
// BOUNDARY TRUTH — head/thorax and thorax/abdomen divider rows
// ============================================================================

use image::RgbaImage;

use crate::components::colors::BodyPart;

/// Fractional defaults used when the service supplies no boundary.
pub const DEFAULT_TOP_FRACTION: f32 = 0.35;
pub const DEFAULT_BOTTOM_FRACTION: f32 = 0.65;

/// Leg dilation distance (4-neighbour steps) used to find leg attachments.
const LEG_DILATION: usize = 15;
/// Percentile of attachment rows taken as the lowest leg root.
const ATTACHMENT_PERCENTILE: f64 = 0.98;
/// When the estimated band is thinner than this, widen it.
const MIN_BAND: i64 = 10;
const WIDENED_BAND: i64 = 20;
/// Abdomen label is kept at least this far above the bottom edge.
const LABEL_BOTTOM_MARGIN: f32 = 20.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundaryTruth {
    pub thorax_top: f32,
    pub thorax_bottom: f32,
}

impl BoundaryTruth {
    pub fn new(thorax_top: f32, thorax_bottom: f32) -> Self {
        Self { thorax_top, thorax_bottom }
    }

    /// 0.35×height / 0.65×height.
    pub fn fallback(height: u32) -> Self {
        let h = height as f32;
        Self::new(h * DEFAULT_TOP_FRACTION, h * DEFAULT_BOTTOM_FRACTION)
    }

    /// Build from service scalars given in source-image pixels.
    ///
    /// `scale` is the factor the Base was downscaled by on load. Each missing
    /// scalar falls back to its fractional default independently.
    pub fn from_service(top: Option<f32>, bottom: Option<f32>, height: u32, scale: f32) -> Self {
        let fallback = Self::fallback(height);
        let pick = |v: Option<f32>, default: f32| match v {
            Some(v) if v.is_finite() => v * scale,
            _ => default,
        };
        Self::new(
            pick(top, fallback.thorax_top),
            pick(bottom, fallback.thorax_bottom),
        )
        .normalized(height)
    }

    /// Swap an inverted pair and clamp both rows to `[0, height]`.
    pub fn normalized(self, height: u32) -> Self {
        let h = height as f32;
        let (mut top, mut bottom) = (self.thorax_top, self.thorax_bottom);
        if top > bottom {
            crate::log_warn!("Inverted boundaries {} > {}; swapping", top, bottom);
            std::mem::swap(&mut top, &mut bottom);
        }
        Self::new(top.clamp(0.0, h), bottom.clamp(0.0, h))
    }

    /// Which vertical band `y` falls in.
    pub fn band_at(&self, y: f32) -> BodyPart {
        if y < self.thorax_top {
            BodyPart::Head
        } else if y < self.thorax_bottom {
            BodyPart::Thorax
        } else {
            BodyPart::Abdomen
        }
    }

    /// Estimate boundaries from a colored mask.
    ///
    /// Thorax top sits midway between the lowest head row and the highest
    /// thorax row. Thorax bottom is the lowest row where a leg touches the body,
    /// taken as the 98th percentile of contact rows after dilating legs by 15
    /// pixels, or the lowest thorax row when no legs touch.
    pub fn estimate_from_mask(mask: &RgbaImage, max_distance: u32) -> Self {
        let (w, h) = (mask.width() as usize, mask.height() as usize);
        if w == 0 || h == 0 {
            return Self::fallback(mask.height());
        }

        let mut legs = vec![false; w * h];
        let mut body = vec![false; w * h];
        let mut head_max: Option<usize> = None;
        let mut thorax_min: Option<usize> = None;
        let mut thorax_max: Option<usize> = None;

        for (x, y, px) in mask.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            match BodyPart::classify(*px, max_distance) {
                Some(BodyPart::Head) => {
                    body[y * w + x] = true;
                    head_max = Some(head_max.map_or(y, |m| m.max(y)));
                }
                Some(BodyPart::Thorax) => {
                    body[y * w + x] = true;
                    thorax_min = Some(thorax_min.map_or(y, |m| m.min(y)));
                    thorax_max = Some(thorax_max.map_or(y, |m| m.max(y)));
                }
                Some(BodyPart::Abdomen) => body[y * w + x] = true,
                Some(BodyPart::Legs) => legs[y * w + x] = true,
                None => {}
            }
        }

        let mut top = fraction_row(h, DEFAULT_TOP_FRACTION);
        match (head_max, thorax_min) {
            (Some(hm), Some(tm)) => top = ((hm + tm) / 2) as i64,
            (Some(hm), None) => top = hm as i64,
            (None, Some(tm)) => top = tm as i64,
            (None, None) => {}
        }

        let mut bottom = fraction_row(h, DEFAULT_BOTTOM_FRACTION);
        let dilated = dilate(&legs, w, h, LEG_DILATION);
        let mut row_counts = vec![0usize; h];
        for y in 0..h {
            row_counts[y] = (0..w).filter(|&x| dilated[y * w + x] && body[y * w + x]).count();
        }
        match percentile_row(&row_counts, ATTACHMENT_PERCENTILE) {
            Some(row) => bottom = row as i64,
            None => {
                if let Some(tm) = thorax_max {
                    bottom = tm as i64;
                }
            }
        }

        let last = h as i64 - 1;
        if bottom <= top + MIN_BAND {
            bottom = bottom.max(top + WIDENED_BAND).min(last);
        }
        Self::new(top.clamp(0, last) as f32, bottom.clamp(0, last) as f32)
    }

    /// Dividing lines and part label anchors for the answer view.
    pub fn answer_overlay(&self, height: u32) -> AnswerOverlay {
        let h = height as f32;
        let mut abdomen_y = (self.thorax_bottom + h) / 2.0;
        if abdomen_y > h - LABEL_BOTTOM_MARGIN {
            abdomen_y = h - LABEL_BOTTOM_MARGIN;
        }
        let labels = [
            (BodyPart::Head, self.thorax_top / 2.0),
            (BodyPart::Thorax, (self.thorax_top + self.thorax_bottom) / 2.0),
            (BodyPart::Abdomen, abdomen_y),
        ]
        .into_iter()
        .filter(|(_, y)| *y >= 0.0 && *y <= h)
        .map(|(part, y)| LabelAnchor { part, y })
        .collect();

        AnswerOverlay {
            lines: [self.thorax_top, self.thorax_bottom],
            labels,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LabelAnchor {
    pub part: BodyPart,
    pub y: f32,
}

/// What the answer view draws on top of the composite.
#[derive(Clone, Debug, PartialEq)]
pub struct AnswerOverlay {
    pub lines: [f32; 2],
    pub labels: Vec<LabelAnchor>,
}

fn fraction_row(height: usize, fraction: f32) -> i64 {
    (height as f32 * fraction + 1e-3).floor() as i64
}

// 4-neighbour binary dilation, `iters` times.
fn dilate(mask: &[bool], w: usize, h: usize, iters: usize) -> Vec<bool> {
    let mut current = mask.to_vec();
    let mut next = current.clone();
    for _ in 0..iters {
        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                next[i] = current[i]
                    || (x > 0 && current[i - 1])
                    || (x + 1 < w && current[i + 1])
                    || (y > 0 && current[i - w])
                    || (y + 1 < h && current[i + w]);
            }
        }
        std::mem::swap(&mut current, &mut next);
    }
    current
}

/// Linear-interpolated percentile over one sample per counted pixel,
/// truncated to a row index. `None` when there are no samples.
fn percentile_row(row_counts: &[usize], q: f64) -> Option<usize> {
    let total: usize = row_counts.iter().sum();
    if total == 0 {
        return None;
    }
    let rank = q * (total - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let lo_row = nth_row(row_counts, lo)?;
    let hi_row = nth_row(row_counts, hi)?;
    let value = lo_row as f64 + (hi_row as f64 - lo_row as f64) * (rank - lo as f64);
    Some(value as usize)
}

fn nth_row(row_counts: &[usize], n: usize) -> Option<usize> {
    let mut seen = 0;
    for (row, count) in row_counts.iter().enumerate() {
        seen += count;
        if seen > n {
            return Some(row);
        }
    }
    None
}
