//! Four-corner projective transform with Hartley normalization.
//!
//! The ground mapper pairs the four ROI pixel corners with four ground-plane
//! corners; that pairing fixes the homography exactly, so it is solved as an
//! 8×8 linear system (h33 = 1) in normalized coordinates.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

// ── Error type ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum HomographyError {
    /// Three corners of the named quad are (nearly) collinear.
    DegenerateQuad(&'static str),
    NumericalFailure(String),
}

impl std::fmt::Display for HomographyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DegenerateQuad(which) => {
                write!(f, "{} corners are degenerate (three collinear points)", which)
            }
            Self::NumericalFailure(msg) => write!(f, "numerical failure: {}", msg),
        }
    }
}

impl std::error::Error for HomographyError {}

// ── Projection ───────────────────────────────────────────────────────────

/// Project a 2D point through a 3×3 homography: H * [x, y, 1]^T → [u, v].
///
/// Points that land on the line at infinity come back as NaN.
pub fn project(h: &Matrix3<f64>, x: f64, y: f64) -> [f64; 2] {
    let p = h * Vector3::new(x, y, 1.0);
    if p[2].abs() < 1e-15 {
        return [f64::NAN, f64::NAN];
    }
    [p[0] / p[2], p[1] / p[2]]
}

/// Reprojection error: ||project(H, src) - dst||.
pub fn reprojection_error(h: &Matrix3<f64>, src: &[f64; 2], dst: &[f64; 2]) -> f64 {
    let p = project(h, src[0], src[1]);
    let dx = p[0] - dst[0];
    let dy = p[1] - dst[1];
    (dx * dx + dy * dy).sqrt()
}

// ── Hartley normalization ────────────────────────────────────────────────

/// Translate the centroid to the origin and scale the mean distance to sqrt(2).
fn normalize_quad(pts: &[[f64; 2]; 4]) -> (Matrix3<f64>, [[f64; 2]; 4]) {
    let cx = pts.iter().map(|p| p[0]).sum::<f64>() / 4.0;
    let cy = pts.iter().map(|p| p[1]).sum::<f64>() / 4.0;
    let mean_dist = pts
        .iter()
        .map(|p| (p[0] - cx).hypot(p[1] - cy))
        .sum::<f64>()
        / 4.0;
    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    (t, pts.map(|p| [s * (p[0] - cx), s * (p[1] - cy)]))
}

// ── Degeneracy ───────────────────────────────────────────────────────────

/// Twice the signed area of triangle (a, b, c).
fn cross3(a: &[f64; 2], b: &[f64; 2], c: &[f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

/// Reject quads where any three corners are (nearly) collinear.
///
/// A projective transform through such a quad is not unique.
fn check_quad(pts: &[[f64; 2]; 4], which: &'static str) -> Result<(), HomographyError> {
    let scale = pts
        .iter()
        .flat_map(|p| [p[0].abs(), p[1].abs()])
        .fold(1.0f64, f64::max);
    let eps = 1e-9 * scale * scale;
    for skip in 0..4 {
        let [a, b, c] = [(skip + 1) % 4, (skip + 2) % 4, (skip + 3) % 4].map(|i| &pts[i]);
        if cross3(a, b, c).abs() <= eps {
            return Err(HomographyError::DegenerateQuad(which));
        }
    }
    Ok(())
}

// ── Solve ────────────────────────────────────────────────────────────────

/// Homography mapping the four `src` corners exactly onto the four `dst` corners.
///
/// Corners must be given in the same order on both sides. Returns H with
/// `H[(2, 2)] = 1` such that `dst[i] == project(H, src[i])`.
pub fn homography_from_quad(
    src: &[[f64; 2]; 4],
    dst: &[[f64; 2]; 4],
) -> Result<Matrix3<f64>, HomographyError> {
    if src.iter().chain(dst).any(|p| !p[0].is_finite() || !p[1].is_finite()) {
        return Err(HomographyError::NumericalFailure(
            "corners must be finite".into(),
        ));
    }
    check_quad(src, "source")?;
    check_quad(dst, "destination")?;

    let (t_src, src_n) = normalize_quad(src);
    let (t_dst, dst_n) = normalize_quad(dst);

    // u * (h31 x + h32 y + 1) = h11 x + h12 y + h13, likewise for v.
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for (i, (s, d)) in src_n.iter().zip(&dst_n).enumerate() {
        let ([x, y], [u, v]) = (*s, *d);
        let (ru, rv) = (2 * i, 2 * i + 1);
        a[(ru, 0)] = x;
        a[(ru, 1)] = y;
        a[(ru, 2)] = 1.0;
        a[(ru, 6)] = -u * x;
        a[(ru, 7)] = -u * y;
        b[ru] = u;
        a[(rv, 3)] = x;
        a[(rv, 4)] = y;
        a[(rv, 5)] = 1.0;
        a[(rv, 6)] = -v * x;
        a[(rv, 7)] = -v * y;
        b[rv] = v;
    }
    let h = a
        .lu()
        .solve(&b)
        .ok_or_else(|| HomographyError::NumericalFailure("corner system is singular".into()))?;
    #[rustfmt::skip]
    let h_norm = Matrix3::new(
        h[0], h[1], h[2],
        h[3], h[4], h[5],
        h[6], h[7], 1.0,
    );

    // H = T_dst^-1 * H_norm * T_src
    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or_else(|| HomographyError::NumericalFailure("T_dst not invertible".into()))?;
    let h = t_dst_inv * h_norm * t_src;

    let scale = h[(2, 2)];
    if !h.iter().all(|v| v.is_finite()) || scale.abs() < 1e-15 || h.determinant().abs() < 1e-15 {
        return Err(HomographyError::NumericalFailure(
            "estimated homography is singular".into(),
        ));
    }
    Ok(h / scale)
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_test_homography() -> Matrix3<f64> {
        // Scale + translate + mild perspective
        #[rustfmt::skip]
        let h = Matrix3::new(
            0.08, 0.01, 12.0,
            -0.005, -0.06, 40.0,
            0.0001, 0.0008, 1.0,
        );
        h
    }

    #[test]
    fn quad_fit_is_exact() {
        let h_true = make_test_homography();
        let src = [[0.0, 0.0], [640.0, 0.0], [640.0, 480.0], [0.0, 480.0]];
        let dst = src.map(|s| project(&h_true, s[0], s[1]));

        let h_est = homography_from_quad(&src, &dst).unwrap();

        for (s, d) in src.iter().zip(&dst) {
            let err = reprojection_error(&h_est, s, d);
            assert!(err < 1e-6, "reprojection error too large: {}", err);
        }

        // Interior points follow the true transform too.
        let q = project(&h_est, 320.0, 200.0);
        let q_true = project(&h_true, 320.0, 200.0);
        assert_relative_eq!(q[0], q_true[0], epsilon = 1e-6);
        assert_relative_eq!(q[1], q_true[1], epsilon = 1e-6);
    }

    #[test]
    fn quad_maps_rectangle_to_trapezoid() {
        // Wide far edge, narrow near edge: not a parallelogram.
        let src = [[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0]];
        let dst = [[10.0, 5.0], [50.0, 5.0], [35.0, 40.0], [25.0, 40.0]];

        let h = homography_from_quad(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(&dst) {
            let p = project(&h, s[0], s[1]);
            assert_relative_eq!(p[0], d[0], epsilon = 1e-8);
            assert_relative_eq!(p[1], d[1], epsilon = 1e-8);
        }

        // Projective: the image of the source centre is not the centroid of dst.
        let c = project(&h, 50.0, 50.0);
        assert!((c[1] - 22.5).abs() > 1e-3, "transform collapsed to affine");
    }

    #[test]
    fn project_roundtrip() {
        let h = make_test_homography();
        let h_inv = h.try_inverse().unwrap();

        let p = [50.0, 75.0];
        let q = project(&h, p[0], p[1]);
        let p_back = project(&h_inv, q[0], q[1]);

        assert_relative_eq!(p[0], p_back[0], epsilon = 1e-8);
        assert_relative_eq!(p[1], p_back[1], epsilon = 1e-8);
    }

    #[test]
    fn collinear_destination_is_rejected() {
        let src = [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];
        let dst = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [0.0, 5.0]];
        assert_eq!(
            homography_from_quad(&src, &dst).unwrap_err(),
            HomographyError::DegenerateQuad("destination")
        );
        assert_eq!(
            homography_from_quad(&dst, &src).unwrap_err(),
            HomographyError::DegenerateQuad("source")
        );
    }

    #[test]
    fn non_finite_corners_are_rejected() {
        let src = [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, f64::NAN]];
        let dst = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        assert!(matches!(
            homography_from_quad(&src, &dst),
            Err(HomographyError::NumericalFailure(_))
        ));
    }
}
