use nalgebra::{Matrix3, Vector3};
use ndarray::{Array3, Axis};

use crate::error::{Error, Result};
use crate::result::{Object, Orientation};

/// Fixed height of the rectified strip fed to the recognizer.
pub const STRIP_HEIGHT: usize = 48;
/// Hard cap on strip width so one extreme box cannot blow up memory.
pub const MAX_STRIP_WIDTH: f32 = 2048.0;
pub const MIN_STRIP_WIDTH: i32 = 16;
/// Extra pixels kept around the box when cropping the source region.
const CROP_MARGIN: i32 = 10;
/// Determinants below this are treated as singular.
const DEGENERACY_EPS: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

/// Rectangle defined by center, extents and rotation angle in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RotatedRect {
    pub center: Point,
    pub size: Size,
    pub angle: f32,
}

impl RotatedRect {
    /// The four corners, in TL, TR, BR, BL order relative to the rectangle's
    /// own width/height axes: the half-extents are rotated by `angle` and
    /// translated to `center`.
    pub fn points(&self) -> [Point; 4] {
        let rad = (self.angle as f64).to_radians();
        let cos_a = rad.cos() as f32;
        let sin_a = rad.sin() as f32;

        let hw = self.size.width / 2.0;
        let hh = self.size.height / 2.0;

        let rel = [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)];
        rel.map(|(rx, ry)| Point {
            x: self.center.x + rx * cos_a - ry * sin_a,
            y: self.center.y + rx * sin_a + ry * cos_a,
        })
    }
}

/// Row-major 2x3 affine matrix: `x' = m0*x + m1*y + m2`, `y' = m3*x + m4*y + m5`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub m: [f32; 6],
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self {
            m: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        }
    }

    /// Solves the 6-unknown system mapping three source points onto three
    /// destination points, by Cramer's rule over 3x3 determinants.
    ///
    /// A collinear (or otherwise degenerate) source triplet falls back to the
    /// identity transform instead of producing NaNs.
    pub fn solve(src: &[Point; 3], dst: &[Point; 3]) -> Self {
        let base = Matrix3::new(
            src[0].x, src[0].y, 1.0, //
            src[1].x, src[1].y, 1.0, //
            src[2].x, src[2].y, 1.0,
        );
        let det = base.determinant();
        if det.abs() < DEGENERACY_EPS {
            return Self::identity();
        }

        let solve_row = |rhs: Vector3<f32>| -> [f32; 3] {
            let mut coeffs = [0.0; 3];
            for (col, coeff) in coeffs.iter_mut().enumerate() {
                let mut replaced = base;
                replaced.set_column(col, &rhs);
                *coeff = replaced.determinant() / det;
            }
            coeffs
        };

        let [a, b, c] = solve_row(Vector3::new(dst[0].x, dst[1].x, dst[2].x));
        let [d, e, f] = solve_row(Vector3::new(dst[0].y, dst[1].y, dst[2].y));
        Self {
            m: [a, b, c, d, e, f],
        }
    }

    pub fn apply(&self, p: Point) -> Point {
        Point {
            x: self.m[0] * p.x + self.m[1] * p.y + self.m[2],
            y: self.m[3] * p.x + self.m[4] * p.y + self.m[5],
        }
    }

    /// Inverts the transform, or `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<Self> {
        let [a, b, c, d, e, f] = self.m;
        let det = a * e - b * d;
        if det.abs() < DEGENERACY_EPS {
            return None;
        }
        let inv = 1.0 / det;
        Some(Self {
            m: [
                e * inv,
                -b * inv,
                (b * f - c * e) * inv,
                -d * inv,
                a * inv,
                (c * d - a * f) * inv,
            ],
        })
    }
}

/// Rectifies one detected region out of the full RGBA frame into an upright
/// BGR planar strip of shape `(3, 48, w)` with values in 0..=255.
///
/// The strip width is `box_height * 48 / box_width`, clamped to
/// `[MIN_STRIP_WIDTH, MAX_STRIP_WIDTH]`. Only the corner bounding box plus a
/// 10px margin is copied out of the source frame before warping.
///
/// The corner triplet protocol is fixed: corners come out of
/// [`RotatedRect::points`] as TL,TR,BR,BL in the rectangle frame, and
/// horizontal text maps (BL, TL, BR) onto `(0,0)`, `(w,0)`, `(0,48)` while
/// vertical text maps (TR, BR, TL) onto the same destinations.
pub fn rectify_region(rgba: &[u8], img_w: u32, img_h: u32, object: &Object) -> Result<Array3<f32>> {
    let rw = object.rrect.size.width.max(1.0);
    let rh = object.rrect.size.height.max(1.0);

    let target_width = (rh * STRIP_HEIGHT as f32 / rw).min(MAX_STRIP_WIDTH);
    let strip_w = (target_width as i32).max(MIN_STRIP_WIDTH) as usize;

    let corners = object.rrect.points();
    let min_x = corners.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
    let max_x = corners.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max);
    let min_y = corners.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
    let max_y = corners.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);

    let img_w = img_w as i32;
    let img_h = img_h as i32;
    let crop_x = (min_x as i32 - CROP_MARGIN).max(0);
    let crop_y = (min_y as i32 - CROP_MARGIN).max(0);
    let crop_w = ((max_x - min_x) as i32 + 2 * CROP_MARGIN).min(img_w - crop_x);
    let crop_h = ((max_y - min_y) as i32 + 2 * CROP_MARGIN).min(img_h - crop_y);
    if crop_w <= 0 || crop_h <= 0 {
        return Err(Error::RegionOutsideImage);
    }

    let (cw, ch) = (crop_w as usize, crop_h as usize);
    let mut src = Array3::<f32>::zeros((3, ch, cw));
    for y in 0..ch {
        let row_off = ((crop_y as usize + y) * img_w as usize + crop_x as usize) * 4;
        let row = &rgba[row_off..row_off + cw * 4];
        for x in 0..cw {
            let px = &row[x * 4..x * 4 + 4];
            // RGBA source, BGR planar destination.
            src[[0, y, x]] = px[2] as f32;
            src[[1, y, x]] = px[1] as f32;
            src[[2, y, x]] = px[0] as f32;
        }
    }

    let (i0, i1, i2) = match object.orientation {
        Orientation::Horizontal => (3, 0, 2),
        Orientation::Vertical => (1, 2, 0),
    };
    let to_crop = |p: Point| Point {
        x: p.x - crop_x as f32,
        y: p.y - crop_y as f32,
    };
    let src_pts = [to_crop(corners[i0]), to_crop(corners[i1]), to_crop(corners[i2])];
    let dst_pts = [
        Point { x: 0.0, y: 0.0 },
        Point {
            x: strip_w as f32,
            y: 0.0,
        },
        Point {
            x: 0.0,
            y: STRIP_HEIGHT as f32,
        },
    ];

    let forward = AffineTransform::solve(&src_pts, &dst_pts);
    let inverse = forward.inverse().ok_or(Error::DegenerateTransform)?;
    let m = inverse.m;

    let mut dst = Array3::<f32>::zeros((3, STRIP_HEIGHT, strip_w));
    for channel in 0..3 {
        let plane = src.index_axis(Axis(0), channel);
        for dy in 0..STRIP_HEIGHT {
            let mut sx = dy as f32 * m[1] + m[2];
            let mut sy = dy as f32 * m[4] + m[5];
            for dx in 0..strip_w {
                let x0 = sx as i32;
                let y0 = sy as i32;
                let u = sx - x0 as f32;
                let v = sy - y0 as f32;

                // Out-of-range taps clamp to the nearest valid texel instead
                // of sampling transparent black.
                let x0c = x0.clamp(0, crop_w - 1) as usize;
                let x1c = (x0 + 1).clamp(0, crop_w - 1) as usize;
                let y0c = y0.clamp(0, crop_h - 1) as usize;
                let y1c = (y0 + 1).clamp(0, crop_h - 1) as usize;

                let v00 = plane[[y0c, x0c]];
                let v01 = plane[[y0c, x1c]];
                let v10 = plane[[y1c, x0c]];
                let v11 = plane[[y1c, x1c]];

                dst[[channel, dy, dx]] = v00 * (1.0 - u) * (1.0 - v)
                    + v01 * u * (1.0 - v)
                    + v10 * (1.0 - u) * v
                    + v11 * u * v;

                sx += m[0];
                sy += m[3];
            }
        }
    }

    Ok(dst)
}
