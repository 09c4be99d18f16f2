use ndarray::ArrayView2;
use tracing::instrument;

use crate::geometry::{Point, RotatedRect, Size};
use crate::result::{Object, Orientation};
use crate::segment::IntPoint;
use crate::util::Letterbox;

/// Probability-field threshold, in the 0..=255 domain of the field.
pub const MASK_THRESHOLD: f32 = 0.3 * 255.0;
/// Minimum mean probability inside the contour, normalized to [0, 1].
const BOX_SCORE_THRESHOLD: f64 = 0.6;
/// Detector boxes hug the text too tightly; grow them before warping.
const ENLARGE_RATIO: f32 = 1.95;
/// Minimum long side of a candidate box, in probability-field pixels.
const MIN_BOX_SIDE: f32 = 3.0;
/// Side ratios beyond this are warp hazards and get dropped.
const MAX_ASPECT_RATIO: f32 = 120.0;
/// Threshold on `height > 2.7 * width` (and the transposed case) that flips a
/// region to vertical reading order.
const VERTICAL_SIDE_RATIO: f32 = 2.7;

/// Fits one contour into an [`Object`], or rejects it.
///
/// The gates run in a fixed order: containment score, principal-axis
/// rectangle, minimum size, orientation and angle normalization, enlargement,
/// remap to original-image coordinates, and finally the degeneracy gates.
#[instrument(level = "trace", skip(pred, contour), fields(pixels = contour.len()))]
pub fn fit_box(pred: ArrayView2<f32>, contour: &[IntPoint], letterbox: &Letterbox) -> Option<Object> {
    let score = contour_score(pred, contour) / 255.0;
    if score < BOX_SCORE_THRESHOLD {
        return None;
    }

    let rrect = principal_axis_rect(contour);
    if rrect.size.width.max(rrect.size.height) < MIN_BOX_SIDE * letterbox.scale {
        return None;
    }

    let orientation = classify_orientation(&rrect);
    let rrect = normalize_box(rrect, orientation, letterbox)?;

    Some(Object {
        rrect,
        orientation,
        prob: score as f32,
        text: Vec::new(),
    })
}

/// Mean probability over the pixels of the contour's bounding box that fall
/// inside the contour, by an even-odd ray-casting test. Returns a value in
/// the 0..=255 domain, or 0 when nothing tested inside.
fn contour_score(pred: ArrayView2<f32>, contour: &[IntPoint]) -> f64 {
    if contour.is_empty() {
        return 0.0;
    }
    let w = pred.ncols() as i32;
    let h = pred.nrows() as i32;

    let min_x = contour.iter().map(|p| p.x).min().unwrap_or(0).max(0);
    let max_x = contour.iter().map(|p| p.x).max().unwrap_or(0).min(w - 1);
    let min_y = contour.iter().map(|p| p.y).min().unwrap_or(0).max(0);
    let max_y = contour.iter().map(|p| p.y).max().unwrap_or(0).min(h - 1);

    let n = contour.len();
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let mut inside = false;
            let mut j = n - 1;
            for i in 0..n {
                let pi = contour[i];
                let pj = contour[j];
                if (pi.y > y) != (pj.y > y)
                    && (x as f64)
                        < (pj.x - pi.x) as f64 * (y - pi.y) as f64 / (pj.y - pi.y) as f64
                            + pi.x as f64
                {
                    inside = !inside;
                }
                j = i;
            }
            if inside {
                sum += pred[[y as usize, x as usize]] as f64;
                count += 1;
            }
        }
    }

    if count > 0 {
        sum / count as f64
    } else {
        0.0
    }
}

/// Principal-axis bounding rectangle of the contour.
///
/// The dominant eigenvector of the 2x2 covariance matrix (closed form) gives
/// the box direction; projecting all points onto it and its perpendicular
/// gives extents and center. This approximates a minimum-area rectangle and
/// the downstream orientation heuristics are tuned against exactly this
/// approximation's angle conventions, so it must not be swapped for a true
/// rotating-calipers fit.
fn principal_axis_rect(contour: &[IntPoint]) -> RotatedRect {
    if contour.is_empty() {
        return RotatedRect::default();
    }
    let n = contour.len() as f64;
    let mean_x = contour.iter().map(|p| p.x as f64).sum::<f64>() / n;
    let mean_y = contour.iter().map(|p| p.y as f64).sum::<f64>() / n;

    let mut cov_xx = 0.0;
    let mut cov_xy = 0.0;
    let mut cov_yy = 0.0;
    for p in contour {
        let dx = p.x as f64 - mean_x;
        let dy = p.y as f64 - mean_y;
        cov_xx += dx * dx;
        cov_xy += dx * dy;
        cov_yy += dy * dy;
    }

    // Dominant eigenvalue of [[xx, xy], [xy, yy]].
    let disc = ((cov_xx - cov_yy) * (cov_xx - cov_yy) + 4.0 * cov_xy * cov_xy).sqrt();
    let lambda = (cov_xx + cov_yy + disc) / 2.0;

    let (mut vx, mut vy) = if cov_xy.abs() > 1e-6 {
        (lambda - cov_yy, cov_xy)
    } else if cov_xx >= cov_yy {
        (1.0, 0.0)
    } else {
        (0.0, 1.0)
    };
    let len = (vx * vx + vy * vy).sqrt();
    vx /= len;
    vy /= len;

    // Extents along the principal axis (u) and its perpendicular (v).
    let mut min_u = f64::INFINITY;
    let mut max_u = f64::NEG_INFINITY;
    let mut min_v = f64::INFINITY;
    let mut max_v = f64::NEG_INFINITY;
    for p in contour {
        let dx = p.x as f64 - mean_x;
        let dy = p.y as f64 - mean_y;
        let u = dx * vx + dy * vy;
        let v = -dx * vy + dy * vx;
        min_u = min_u.min(u);
        max_u = max_u.max(u);
        min_v = min_v.min(v);
        max_v = max_v.max(v);
    }

    let center_u = (min_u + max_u) / 2.0;
    let center_v = (min_v + max_v) / 2.0;

    RotatedRect {
        center: Point {
            x: (mean_x + center_u * vx - center_v * vy) as f32,
            y: (mean_y + center_u * vy + center_v * vx) as f32,
        },
        size: Size {
            width: (max_u - min_u) as f32,
            height: (max_v - min_v) as f32,
        },
        angle: vy.atan2(vx).to_degrees() as f32,
    }
}

/// Vertical text shows up either as a steep box that is much taller than wide,
/// or as a near-right-angle principal axis with the sides transposed.
fn classify_orientation(rrect: &RotatedRect) -> Orientation {
    let Size { width, height } = rrect.size;
    let angle = rrect.angle;

    let vertical = ((-30.0..=30.0).contains(&angle) && height > width * VERTICAL_SIDE_RATIO)
        || ((angle <= -60.0 || angle >= 60.0) && width > height * VERTICAL_SIDE_RATIO);
    if vertical {
        Orientation::Vertical
    } else {
        Orientation::Horizontal
    }
}

/// Reconciles the PCA axis ambiguity with the orientation decision, enlarges
/// the box, and remaps it from probability-field coordinates back into
/// original-image pixel space. Degenerate and extreme boxes come back as
/// `None`.
fn normalize_box(
    mut rrect: RotatedRect,
    orientation: Orientation,
    letterbox: &Letterbox,
) -> Option<RotatedRect> {
    if rrect.angle < -30.0 {
        rrect.angle += 180.0;
    }
    if orientation == Orientation::Horizontal && rrect.angle < 30.0 {
        rrect.angle += 90.0;
        std::mem::swap(&mut rrect.size.width, &mut rrect.size.height);
    }
    if orientation == Orientation::Vertical && rrect.angle >= 60.0 {
        rrect.angle -= 90.0;
        std::mem::swap(&mut rrect.size.width, &mut rrect.size.height);
    }

    rrect.size.height += rrect.size.width * (ENLARGE_RATIO - 1.0);
    rrect.size.width *= ENLARGE_RATIO;

    rrect.center.x = (rrect.center.x - letterbox.pad_x as f32 / 2.0) / letterbox.scale;
    rrect.center.y = (rrect.center.y - letterbox.pad_y as f32 / 2.0) / letterbox.scale;
    rrect.size.width /= letterbox.scale;
    rrect.size.height /= letterbox.scale;

    if rrect.size.width < 1.0 || rrect.size.height < 1.0 {
        log::warn!(
            "ignoring degenerate text box: {}x{} at ({},{})",
            rrect.size.width,
            rrect.size.height,
            rrect.center.x,
            rrect.center.y
        );
        return None;
    }

    let ratio = rrect.size.height / (rrect.size.width + 1e-6);
    if ratio > MAX_ASPECT_RATIO || ratio < 1.0 / MAX_ASPECT_RATIO {
        log::warn!(
            "ignoring extreme aspect ratio text box: {}x{} (ratio {ratio})",
            rrect.size.width,
            rrect.size.height
        );
        return None;
    }

    Some(rrect)
}
