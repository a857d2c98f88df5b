//! Face alignment via 4-DOF similarity transform.
//!
//! Estimates the transform carrying hero landmarks onto page landmarks and
//! warps the hero image into the page's coordinate frame.

use crate::types::{Landmarks, Point2};
use image::{Rgb, RgbImage};
use thiserror::Error;

/// Reprojection error (pixels) under which a landmark counts as an inlier.
const INLIER_THRESHOLD: f64 = 3.0;
/// Relative eigenvalue floor below which a point set is treated as collinear.
const COLLINEAR_RATIO: f64 = 1e-6;
/// Minimum spread (squared pixels) for a point set to be usable at all.
const MIN_SPREAD: f64 = 1e-9;
const MIN_SCALE: f64 = 1e-9;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("landmark sets are degenerate (coincident or collinear points)")]
    Degenerate,
    #[error("least-squares system is singular")]
    Singular,
}

/// Uniform scale + rotation + translation, stored as the 2×3 matrix
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityTransform {
    pub a: f64,
    pub b: f64,
    pub tx: f64,
    pub ty: f64,
}

impl SimilarityTransform {
    pub const IDENTITY: Self = Self { a: 1.0, b: 0.0, tx: 0.0, ty: 0.0 };

    pub fn matrix(&self) -> [[f64; 3]; 2] {
        [[self.a, -self.b, self.tx], [self.b, self.a, self.ty]]
    }

    pub fn scale(&self) -> f64 {
        self.a.hypot(self.b)
    }

    /// Rotation angle in radians.
    pub fn rotation(&self) -> f64 {
        self.b.atan2(self.a)
    }

    pub fn apply(&self, p: Point2) -> Point2 {
        let (x, y) = (f64::from(p.x), f64::from(p.y));
        Point2::new(
            (self.a * x - self.b * y + self.tx) as f32,
            (self.b * x + self.a * y + self.ty) as f32,
        )
    }

    /// Inverse mapping; `None` if the transform collapses the plane.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det < MIN_SCALE * MIN_SCALE {
            return None;
        }
        let ia = self.a / det;
        let ib = -self.b / det;
        Some(Self {
            a: ia,
            b: ib,
            tx: -(ia * self.tx - ib * self.ty),
            ty: -(ib * self.tx + ia * self.ty),
        })
    }
}

/// Estimate the transform mapping `src` landmarks onto `dst` landmarks.
///
/// Eyes and nose are tried first; if they give no solution all five points
/// are used. Both failing is an error, never an identity fallback.
pub fn estimate_landmark_transform(
    src: &Landmarks,
    dst: &Landmarks,
) -> Result<SimilarityTransform, TransformError> {
    match estimate_partial_affine(src.eyes_and_nose(), dst.eyes_and_nose()) {
        Ok(t) => Ok(t),
        Err(err) => {
            tracing::debug!(error = %err, "eye/nose transform failed, retrying with all landmarks");
            estimate_partial_affine(src.points(), dst.points())
        }
    }
}

/// Robust 4-DOF fit over paired points.
///
/// Every point pair seeds a candidate transform; the candidate with the most
/// inliers wins (first one on ties), and the final transform is the
/// least-squares fit over its inliers.
pub fn estimate_partial_affine(
    src: &[Point2],
    dst: &[Point2],
) -> Result<SimilarityTransform, TransformError> {
    if src.len() != dst.len() || src.len() < 2 {
        return Err(TransformError::Degenerate);
    }
    if is_degenerate(src) || is_degenerate(dst) {
        return Err(TransformError::Degenerate);
    }

    let n = src.len();
    let mut best_inliers: Vec<usize> = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            let Ok(seed) = fit_least_squares(&[src[i], src[j]], &[dst[i], dst[j]]) else {
                continue;
            };
            let inliers: Vec<usize> = (0..n)
                .filter(|&k| f64::from(seed.apply(src[k]).distance(&dst[k])) <= INLIER_THRESHOLD)
                .collect();
            if inliers.len() > best_inliers.len() {
                best_inliers = inliers;
            }
        }
    }

    if best_inliers.len() < 2 {
        // No consensus: fall back to the plain fit over every pair.
        return fit_least_squares(src, dst);
    }

    let src_in: Vec<Point2> = best_inliers.iter().map(|&k| src[k]).collect();
    let dst_in: Vec<Point2> = best_inliers.iter().map(|&k| dst[k]).collect();
    fit_least_squares(&src_in, &dst_in)
}

/// True when the points are coincident or lie on one line.
fn is_degenerate(points: &[Point2]) -> bool {
    let n = points.len() as f64;
    let mx = points.iter().map(|p| f64::from(p.x)).sum::<f64>() / n;
    let my = points.iter().map(|p| f64::from(p.y)).sum::<f64>() / n;

    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for p in points {
        let dx = f64::from(p.x) - mx;
        let dy = f64::from(p.y) - my;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }

    let trace = sxx + syy;
    if trace < MIN_SPREAD {
        return true;
    }
    // Eigenvalues of the 2x2 scatter matrix.
    let disc = ((sxx - syy) * (sxx - syy) / 4.0 + sxy * sxy).sqrt();
    let max_eig = trace / 2.0 + disc;
    let min_eig = trace / 2.0 - disc;
    min_eig <= COLLINEAR_RATIO * max_eig
}

/// Least-squares similarity fit via the 4×4 normal equations.
fn fit_least_squares(
    src: &[Point2],
    dst: &[Point2],
) -> Result<SimilarityTransform, TransformError> {
    // Overdetermined system A * [a, b, tx, ty]^T = B
    // For each point pair (sx, sy) -> (dx, dy):
    //   sx * a - sy * b + tx = dx
    //   sy * a + sx * b + ty = dy
    let mut ata = [[0.0f64; 4]; 4];
    let mut atb = [0.0f64; 4];

    for (s, d) in src.iter().zip(dst) {
        let (sx, sy) = (f64::from(s.x), f64::from(s.y));
        let (dx, dy) = (f64::from(d.x), f64::from(d.y));
        let r1 = [sx, -sy, 1.0, 0.0];
        let r2 = [sy, sx, 0.0, 1.0];

        for j in 0..4 {
            for k in 0..4 {
                ata[j][k] += r1[j] * r1[k] + r2[j] * r2[k];
            }
            atb[j] += r1[j] * dx + r2[j] * dy;
        }
    }

    let [a, b, tx, ty] = solve_4x4(&ata, &atb).ok_or(TransformError::Singular)?;
    if a.hypot(b) < MIN_SCALE {
        return Err(TransformError::Degenerate);
    }
    Ok(SimilarityTransform { a, b, tx, ty })
}

/// Solve a 4×4 linear system via Gaussian elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
fn solve_4x4(ata: &[[f64; 4]; 4], atb: &[f64; 4]) -> Option<[f64; 4]> {
    let mut m = [[0.0f64; 5]; 4];
    for i in 0..4 {
        m[i][..4].copy_from_slice(&ata[i]);
        m[i][4] = atb[i];
    }

    for col in 0..4 {
        let mut max_row = col;
        let mut max_val = m[col][col].abs();
        for row in (col + 1)..4 {
            if m[row][col].abs() > max_val {
                max_val = m[row][col].abs();
                max_row = row;
            }
        }
        m.swap(col, max_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return None;
        }

        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f64; 4];
    for i in (0..4).rev() {
        x[i] = m[i][4];
        for j in (i + 1)..4 {
            x[i] -= m[i][j] * x[j];
        }
        x[i] /= m[i][i];
    }

    x.iter().all(|v| v.is_finite()).then_some(x)
}

/// Resample `src` into a `width`×`height` canvas through `transform`.
///
/// Uses bilinear interpolation. Out-of-bounds samples replicate the nearest
/// edge pixel. Returns `None` if the transform is not invertible.
pub fn warp_similarity(
    src: &RgbImage,
    transform: &SimilarityTransform,
    width: u32,
    height: u32,
) -> Option<RgbImage> {
    let inv = transform.inverse()?;
    let (src_w, src_h) = (src.width() as i64, src.height() as i64);
    if src_w == 0 || src_h == 0 {
        return None;
    }

    let sample = |x: i64, y: i64| -> [f64; 3] {
        let px = src.get_pixel(x.clamp(0, src_w - 1) as u32, y.clamp(0, src_h - 1) as u32);
        [f64::from(px[0]), f64::from(px[1]), f64::from(px[2])]
    };

    Some(RgbImage::from_fn(width, height, |ox, oy| {
        // Map output pixel back to source: src = M_inv * dst
        let (dx, dy) = (f64::from(ox), f64::from(oy));
        let sx = inv.a * dx - inv.b * dy + inv.tx;
        let sy = inv.b * dx + inv.a * dy + inv.ty;

        let x0 = sx.floor() as i64;
        let y0 = sy.floor() as i64;
        let fx = sx - x0 as f64;
        let fy = sy - y0 as f64;

        let tl = sample(x0, y0);
        let tr = sample(x0 + 1, y0);
        let bl = sample(x0, y0 + 1);
        let br = sample(x0 + 1, y0 + 1);

        let mut out = [0u8; 3];
        for c in 0..3 {
            let val = tl[c] * (1.0 - fx) * (1.0 - fy)
                + tr[c] * fx * (1.0 - fy)
                + bl[c] * (1.0 - fx) * fy
                + br[c] * fx * fy;
            out[c] = val.round().clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FACE: [(f32, f32); 5] = [
        (38.2946, 51.6963), // left eye
        (73.5318, 51.5014), // right eye
        (56.0252, 71.7366), // nose
        (41.5493, 92.3655), // left mouth
        (70.7299, 92.2041), // right mouth
    ];

    fn map_all(t: &SimilarityTransform, lm: &Landmarks) -> Landmarks {
        Landmarks(lm.points().map(|p| t.apply(p)))
    }

    #[test]
    fn test_identity_transform() {
        let pts = Landmarks::from(FACE);
        let t = estimate_landmark_transform(&pts, &pts).unwrap();
        assert!((t.a - 1.0).abs() < 1e-6, "a = {}", t.a);
        assert!(t.b.abs() < 1e-6, "b = {}", t.b);
        assert!(t.tx.abs() < 1e-4, "tx = {}", t.tx);
        assert!(t.ty.abs() < 1e-4, "ty = {}", t.ty);
    }

    #[test]
    fn test_recovers_known_similarity() {
        let truth = SimilarityTransform {
            a: 1.8 * 0.3f64.cos(),
            b: 1.8 * 0.3f64.sin(),
            tx: 120.0,
            ty: -35.0,
        };
        let src = Landmarks::from(FACE);
        let dst = map_all(&truth, &src);

        let t = estimate_landmark_transform(&src, &dst).unwrap();
        for (s, d) in src.points().iter().zip(dst.points()) {
            let p = t.apply(*s);
            assert!(p.distance(d) < 1e-2, "{p:?} vs {d:?}");
        }
        assert!((t.scale() - 1.8).abs() < 1e-4);
        assert!((t.rotation() - 0.3).abs() < 1e-4);
    }

    #[test]
    fn test_three_point_fit_reproduces_destination() {
        let src = [Point2::new(10.0, 10.0), Point2::new(50.0, 12.0), Point2::new(30.0, 40.0)];
        let truth = SimilarityTransform { a: 0.5, b: -0.25, tx: 7.0, ty: 3.0 };
        let dst = src.map(|p| truth.apply(p));

        let t = estimate_partial_affine(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(&dst) {
            assert!(t.apply(*s).distance(d) < 1e-3);
        }
    }

    #[test]
    fn test_outlier_is_rejected() {
        let src = Landmarks::from(FACE);
        let truth = SimilarityTransform { a: 2.0, b: 0.0, tx: 10.0, ty: 10.0 };
        let mut dst = map_all(&truth, &src);
        dst.0[4] = Point2::new(500.0, 500.0);

        let t = estimate_partial_affine(src.points(), dst.points()).unwrap();
        assert!((t.a - 2.0).abs() < 1e-4, "a = {}", t.a);
        assert!((t.tx - 10.0).abs() < 1e-2, "tx = {}", t.tx);
    }

    #[test]
    fn test_collinear_destination_fails() {
        let src = Landmarks::from(FACE);
        let dst =
            Landmarks::from([(0.0, 0.0), (10.0, 10.0), (20.0, 20.0), (30.0, 30.0), (40.0, 40.0)]);
        assert_eq!(estimate_landmark_transform(&src, &dst), Err(TransformError::Degenerate));
    }

    #[test]
    fn test_identical_destination_fails() {
        let src = Landmarks::from(FACE);
        let dst = Landmarks::from([(5.0, 5.0); 5]);
        assert_eq!(estimate_landmark_transform(&src, &dst), Err(TransformError::Degenerate));
    }

    #[test]
    fn test_collinear_eyes_nose_falls_back_to_all_points() {
        // Eyes and nose on one line; mouth corners break the collinearity.
        let src =
            Landmarks::from([(10.0, 10.0), (30.0, 10.0), (20.0, 10.0), (12.0, 30.0), (28.0, 30.0)]);
        let truth = SimilarityTransform { a: 1.5, b: 0.0, tx: 4.0, ty: -2.0 };
        let dst = map_all(&truth, &src);

        let t = estimate_landmark_transform(&src, &dst).unwrap();
        assert!((t.a - 1.5).abs() < 1e-4);
        assert!(t.b.abs() < 1e-4);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let t = SimilarityTransform { a: 0.7, b: 0.4, tx: 12.0, ty: -8.0 };
        let inv = t.inverse().unwrap();
        let p = Point2::new(33.0, 71.0);
        assert!(inv.apply(t.apply(p)).distance(&p) < 1e-3);
    }

    #[test]
    fn test_matrix_layout() {
        let t = SimilarityTransform { a: 0.7, b: 0.4, tx: 12.0, ty: -8.0 };
        assert_eq!(t.matrix(), [[0.7, -0.4, 12.0], [0.4, 0.7, -8.0]]);

        // Row-by-row application agrees with `apply`.
        let m = t.matrix();
        let p = t.apply(Point2::new(3.0, 5.0));
        assert!((f64::from(p.x) - (m[0][0] * 3.0 + m[0][1] * 5.0 + m[0][2])).abs() < 1e-5);
        assert!((f64::from(p.y) - (m[1][0] * 3.0 + m[1][1] * 5.0 + m[1][2])).abs() < 1e-5);
    }

    #[test]
    fn test_warp_output_size() {
        let src = RgbImage::from_pixel(64, 48, Rgb([10, 20, 30]));
        let out = warp_similarity(&src, &SimilarityTransform::IDENTITY, 100, 80).unwrap();
        assert_eq!(out.dimensions(), (100, 80));
    }

    #[test]
    fn test_warp_identity_preserves_pixels() {
        let src = RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 7]));
        let out = warp_similarity(&src, &SimilarityTransform::IDENTITY, 16, 16).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn test_warp_replicates_edges() {
        // Shifting right by 5 exposes the left border; it must copy column 0, not go black.
        let src = RgbImage::from_fn(10, 10, |x, _| {
            if x == 0 {
                Rgb([200, 100, 50])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let shift = SimilarityTransform { a: 1.0, b: 0.0, tx: 5.0, ty: 0.0 };
        let out = warp_similarity(&src, &shift, 10, 10).unwrap();
        for x in 0..5 {
            assert_eq!(*out.get_pixel(x, 3), Rgb([200, 100, 50]), "x = {x}");
        }
        assert_eq!(*out.get_pixel(5, 3), Rgb([200, 100, 50]));
        assert_eq!(*out.get_pixel(6, 3), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_warp_half_pixel_shift_averages_neighbours() {
        let src =
            RgbImage::from_fn(12, 3, |x, y| Rgb([(x * 21) as u8, (x * x) as u8, (y * 40) as u8]));
        let shift = SimilarityTransform { a: 1.0, b: 0.0, tx: 0.5, ty: 0.0 };
        let out = warp_similarity(&src, &shift, 12, 3).unwrap();

        for y in 0..3 {
            for x in 0..12u32 {
                // Output x samples source x - 0.5; column -1 replicates column 0.
                let left = src.get_pixel(x.saturating_sub(1), y);
                let right = src.get_pixel(x, y);
                let expected: [u8; 3] = std::array::from_fn(|c| {
                    ((f64::from(left[c]) + f64::from(right[c])) / 2.0).round() as u8
                });
                assert_eq!(out.get_pixel(x, y).0, expected, "({x}, {y})");
            }
        }
    }

    #[test]
    fn test_warp_rejects_collapsed_transform() {
        let src = RgbImage::new(4, 4);
        let collapsed = SimilarityTransform { a: 0.0, b: 0.0, tx: 1.0, ty: 1.0 };
        assert!(warp_similarity(&src, &collapsed, 4, 4).is_none());
    }

    #[test]
    fn test_landmark_roundtrip() {
        // A bright patch at the source left eye must land near the destination left eye.
        let src_lm = Landmarks::from([
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ]);
        let dst_lm = Landmarks::from(FACE);
        let mut frame = RgbImage::new(200, 200);
        for dy in 0..5 {
            for dx in 0..5 {
                frame.put_pixel(78 + dx, 58 + dy, Rgb([255, 255, 255]));
            }
        }

        let t = estimate_landmark_transform(&src_lm, &dst_lm).unwrap();
        let aligned = warp_similarity(&frame, &t, 112, 112).unwrap();

        let left_eye = FACE[Landmarks::LEFT_EYE];
        let (ref_x, ref_y) = (left_eye.0.round() as u32, left_eye.1.round() as u32);
        let mut max_val = 0u8;
        for y in ref_y - 1..=ref_y + 1 {
            for x in ref_x - 1..=ref_x + 1 {
                max_val = max_val.max(aligned.get_pixel(x, y)[0]);
            }
        }
        assert!(max_val > 100, "expected bright patch near ({ref_x}, {ref_y}), max={max_val}");
    }
}
