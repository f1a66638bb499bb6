//! Per-pixel admissible distance bands around the calibration baseline.
//!
//! Two policies are available:
//!
//! - **Flat**: `[d - close, d + far]` with constant tolerances in metres.
//! - **Geometry corrected**: the tolerances are interpreted as heights above
//!   and below the ground plane. With camera height `h` and baseline `d`, the
//!   viewing ray makes an angle `alpha` with the vertical where
//!   `cos(alpha) = h / d`, so the band becomes
//!   `[(h - close) / cos(alpha), (h + far) / cos(alpha)]`. Oblique pixels far
//!   down the field of view get a proportionally wider band.

use crate::calibration::CalibrationMatrix;
use crate::roi::PixelBounds;

/// How the tolerance band is derived from the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToleranceMode {
    /// Constant offsets around the baseline distance.
    Flat,
    /// Offsets scaled by the viewing angle of each baseline ray.
    #[default]
    GeometryCorrected,
}

/// Tolerance settings.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToleranceConfig {
    pub mode: ToleranceMode,
    /// Tolerated approach towards the camera (obstacle height) in metres.
    pub close_m: f32,
    /// Tolerated recession from the camera (hole depth) in metres.
    pub far_m: f32,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            mode: ToleranceMode::GeometryCorrected,
            close_m: 0.1,
            far_m: 0.1,
        }
    }
}

impl ToleranceConfig {
    /// Smallest admissible live distance for a pixel with baseline `baseline`.
    pub fn min_tolerated(&self, baseline: f32, camera_height_m: f32) -> f32 {
        match self.mode {
            ToleranceMode::Flat => baseline - self.close_m,
            ToleranceMode::GeometryCorrected => {
                (camera_height_m - self.close_m) / cos_from_vertical(baseline, camera_height_m)
            }
        }
    }

    /// Largest admissible live distance for a pixel with baseline `baseline`.
    pub fn max_tolerated(&self, baseline: f32, camera_height_m: f32) -> f32 {
        match self.mode {
            ToleranceMode::Flat => baseline + self.far_m,
            ToleranceMode::GeometryCorrected => {
                (camera_height_m + self.far_m) / cos_from_vertical(baseline, camera_height_m)
            }
        }
    }

    pub(crate) fn validate(&self, camera_height_m: f32) -> Result<(), String> {
        if !self.close_m.is_finite() || self.close_m < 0.0 {
            return Err("tolerance.close_m must be finite and >= 0".to_string());
        }
        if !self.far_m.is_finite() || self.far_m < 0.0 {
            return Err("tolerance.far_m must be finite and >= 0".to_string());
        }
        if self.mode == ToleranceMode::GeometryCorrected
            && (!camera_height_m.is_finite() || camera_height_m <= 0.0)
        {
            return Err(
                "camera_height_m must be finite and > 0 for geometry-corrected tolerances"
                    .to_string(),
            );
        }
        Ok(())
    }
}

/// Cosine of the angle between the baseline ray and the vertical.
///
/// NaN for non-positive baselines, which propagates into a NaN band.
fn cos_from_vertical(baseline: f32, camera_height_m: f32) -> f32 {
    if baseline > 0.0 {
        camera_height_m / baseline
    } else {
        f32::NAN
    }
}

/// Cached per-pixel `(min, max)` band, same shape as the calibration matrix.
///
/// Only pixels inside the ROI it was computed for are populated; the rest
/// hold NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct ToleranceBand {
    rows: usize,
    cols: usize,
    min: Vec<f32>,
    max: Vec<f32>,
}

impl ToleranceBand {
    pub fn compute(
        calibration: &CalibrationMatrix,
        roi: &PixelBounds,
        config: &ToleranceConfig,
        camera_height_m: f32,
    ) -> Self {
        let (rows, cols) = (calibration.rows(), calibration.cols());
        let mut min = vec![f32::NAN; rows * cols];
        let mut max = vec![f32::NAN; rows * cols];

        for y in roi.min_y..roi.max_y.min(rows) {
            let baseline_row = calibration.row(y);
            for x in roi.min_x..roi.max_x.min(cols) {
                let d = baseline_row[x];
                if d.is_nan() {
                    continue;
                }
                let idx = y * cols + x;
                min[idx] = config.min_tolerated(d, camera_height_m);
                max[idx] = config.max_tolerated(d, camera_height_m);
            }
        }

        Self {
            rows,
            cols,
            min,
            max,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(min_tolerated, max_tolerated)` at pixel `(x, y)`.
    ///
    /// `None` outside the band's shape; NaN components for pixels that were
    /// not populated.
    pub fn get(&self, x: usize, y: usize) -> Option<(f32, f32)> {
        if x >= self.cols || y >= self.rows {
            return None;
        }
        let idx = y * self.cols + x;
        Some((self.min[idx], self.max[idx]))
    }

    pub fn min_tolerated(&self, x: usize, y: usize) -> f32 {
        self.get(x, y).map_or(f32::NAN, |b| b.0)
    }

    pub fn max_tolerated(&self, x: usize, y: usize) -> f32 {
        self.get(x, y).map_or(f32::NAN, |b| b.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn full_bounds(rows: usize, cols: usize) -> PixelBounds {
        PixelBounds {
            min_x: 0,
            max_x: cols,
            min_y: 0,
            max_y: rows,
        }
    }

    #[test]
    fn flat_band_offsets_baseline() {
        let cfg = ToleranceConfig {
            mode: ToleranceMode::Flat,
            close_m: 0.4,
            far_m: 0.3,
        };
        assert_relative_eq!(cfg.min_tolerated(2.0, 0.8), 1.6);
        assert_relative_eq!(cfg.max_tolerated(2.0, 0.8), 2.3);
    }

    #[test]
    fn geometry_band_matches_closed_form() {
        let cfg = ToleranceConfig {
            mode: ToleranceMode::GeometryCorrected,
            close_m: 0.1,
            far_m: 0.2,
        };
        // cos(alpha) = 0.5 / 2.0 = 0.25
        assert_relative_eq!(cfg.min_tolerated(2.0, 0.5), 1.6, epsilon = 1e-6);
        assert_relative_eq!(cfg.max_tolerated(2.0, 0.5), 2.8, epsilon = 1e-6);
        // Looking straight down the band is just the height tolerance.
        assert_relative_eq!(cfg.min_tolerated(0.5, 0.5), 0.4, epsilon = 1e-6);
        assert!(cfg.min_tolerated(0.0, 0.5).is_nan());
    }

    #[test]
    fn geometry_min_decreases_with_close_tolerance() {
        let height = 0.9;
        for baseline in [0.95f32, 1.5, 3.0, 7.25] {
            let mut previous = f32::INFINITY;
            for close in [0.0f32, 0.05, 0.1, 0.2, 0.4] {
                let cfg = ToleranceConfig {
                    mode: ToleranceMode::GeometryCorrected,
                    close_m: close,
                    far_m: 0.1,
                };
                let min = cfg.min_tolerated(baseline, height);
                assert!(
                    min < previous,
                    "baseline {baseline}: close {close} gave {min}, previous {previous}"
                );
                previous = min;
            }
        }
    }

    #[test]
    fn band_is_nan_outside_roi_and_for_nan_baseline() {
        let mut calib = CalibrationMatrix::filled(4, 6, 2.0);
        calib.set(2, 1, f32::NAN);
        let roi = PixelBounds {
            min_x: 1,
            max_x: 5,
            min_y: 1,
            max_y: 3,
        };
        let cfg = ToleranceConfig {
            mode: ToleranceMode::Flat,
            close_m: 0.5,
            far_m: 0.5,
        };
        let band = ToleranceBand::compute(&calib, &roi, &cfg, 1.0);

        assert_eq!((band.rows(), band.cols()), (4, 6));
        assert!(band.min_tolerated(0, 0).is_nan());
        assert!(band.max_tolerated(5, 1).is_nan());
        assert!(band.min_tolerated(2, 1).is_nan());
        assert_eq!(band.get(1, 1), Some((1.5, 2.5)));
        assert_eq!(band.get(4, 2), Some((1.5, 2.5)));
        assert!(band.get(6, 0).is_none());
    }

    #[test]
    fn band_covers_full_extent() {
        let calib = CalibrationMatrix::filled(3, 3, 1.0);
        let band = ToleranceBand::compute(
            &calib,
            &full_bounds(3, 3),
            &ToleranceConfig::default(),
            0.5,
        );
        for y in 0..3 {
            for x in 0..3 {
                let (lo, hi) = band.get(x, y).unwrap();
                assert!(lo < 1.0 && hi > 1.0);
            }
        }
    }

    #[test]
    fn geometry_mode_requires_camera_height() {
        let cfg = ToleranceConfig::default();
        assert!(cfg.validate(0.0).is_err());
        assert!(cfg.validate(0.8).is_ok());
        let flat = ToleranceConfig {
            mode: ToleranceMode::Flat,
            ..cfg
        };
        assert!(flat.validate(0.0).is_ok());
    }
}
