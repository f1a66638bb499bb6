//! High-level detection API.
//!
//! [`HazardDetector`] owns the calibration baseline, the tolerance band, the
//! cached ground transform and the traversability grid. Create it once,
//! calibrate it once, then call [`HazardDetector::analyze`] per frame.
//!
//! # Examples
//!
//! ```no_run
//! use hazard_detector::{DepthFrame, DetectorConfig, HazardDetector};
//! use image::RgbImage;
//! use std::path::Path;
//!
//! let mut detector = HazardDetector::new(DetectorConfig::default()).unwrap();
//! detector.read_calibration_file(Path::new("calibration.csv")).unwrap();
//!
//! let depth = vec![2.0f32; 640 * 480];
//! let mut visual = RgbImage::new(640, 480);
//! if detector.analyze(&DepthFrame::new(&depth, 480, 640), &mut visual) {
//!     println!("{} hazard cells", detector.traversability_map().hazard_cell_count());
//! }
//! ```

use std::ops::Range;
use std::path::Path;

use image::RgbImage;

use crate::calibration::{CalibrationError, CalibrationMatrix};
use crate::config::{ConfigError, DetectorConfig};
use crate::grid::TraversabilityGrid;
use crate::mapper::GeometryMapper;
use crate::overlay;
use crate::roi::{PixelBounds, RegionOfInterest, RoiController};
use crate::tolerance::ToleranceBand;

/// Borrowed row-major depth frame (metres).
///
/// NaN and non-positive values denote unknown range.
#[derive(Debug, Clone, Copy)]
pub struct DepthFrame<'a> {
    data: &'a [f32],
    height: usize,
    width: usize,
}

impl<'a> DepthFrame<'a> {
    pub fn new(data: &'a [f32], height: usize, width: usize) -> Self {
        Self {
            data,
            height,
            width,
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Distance at pixel `(x, y)`, or `None` outside the frame or buffer.
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y * self.width + x).copied()
    }
}

/// Per-frame statistics of the latest [`HazardDetector::analyze`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScanSummary {
    /// Pixels with valid baseline and live range inside the scan window.
    pub pixels_considered: usize,
    /// Pixels closer than their tolerated minimum.
    pub too_close: usize,
    /// Pixels farther than their tolerated maximum.
    pub too_far: usize,
    /// Distinct hazard pixels (a pixel failing both checks counts once).
    pub hazard_pixels: usize,
    /// Grid cells marked as hazard.
    pub hazard_cells: usize,
    /// Hazard pixels whose projection fell outside the grid.
    pub dropped_points: usize,
    /// Whether the frame met the hazard pixel limit.
    pub hazardous: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leftmost_hazard_x: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rightmost_hazard_x: Option<usize>,
}

/// Raw result of walking the scan window.
struct WindowScan {
    hazard_points: Vec<[f64; 2]>,
    pixels_considered: usize,
    too_close: usize,
    too_far: usize,
    span: Option<[usize; 2]>,
}

/// Primary detection interface.
///
/// Lifecycle: uncalibrated → calibrated (transform unbuilt) → calibrated
/// (transform built). Replacing the calibration keeps a built transform;
/// call [`invalidate_transform`](Self::invalidate_transform) when the ROI
/// geometry changed.
///
/// Not synchronized: serialize access externally or use one instance per thread.
#[derive(Debug, Clone)]
pub struct HazardDetector {
    config: DetectorConfig,
    calibration: CalibrationMatrix,
    roi: Option<RoiController>,
    tolerances: Option<ToleranceBand>,
    mapper: GeometryMapper,
    grid: TraversabilityGrid,
    last_scan: ScanSummary,
}

impl HazardDetector {
    /// Create an uncalibrated detector. Fails on an invalid configuration.
    pub fn new(config: DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let grid = TraversabilityGrid::new(&config.traversability_map);
        Ok(Self {
            config,
            calibration: CalibrationMatrix::default(),
            roi: None,
            tolerances: None,
            mapper: GeometryMapper::new(),
            grid,
            last_scan: ScanSummary::default(),
        })
    }

    /// Load the configuration from JSON and create a detector in one step.
    pub fn from_config_file(path: &Path) -> Result<Self, ConfigError> {
        Self::new(DetectorConfig::from_json_file(path)?)
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn is_calibrated(&self) -> bool {
        self.roi.is_some()
    }

    pub fn calibration(&self) -> &CalibrationMatrix {
        &self.calibration
    }

    // ── Calibration ──────────────────────────────────────────────────────

    /// Replace the baseline and re-derive the ROI.
    ///
    /// Returns `false` (and leaves the detector uncalibrated) for an empty
    /// matrix or a ROI that does not fit it.
    pub fn set_calibration(&mut self, calibration: CalibrationMatrix) -> bool {
        self.calibration = calibration;
        self.tolerances = None;
        self.calculate_region_of_interest()
    }

    /// Load the baseline from a comma-separated file and re-derive the ROI.
    ///
    /// On a read or parse error the current calibration is kept. An empty file
    /// yields `Ok(false)`.
    pub fn read_calibration_file(&mut self, path: &Path) -> Result<bool, CalibrationError> {
        let calibration = CalibrationMatrix::read_csv_file(path)?;
        tracing::info!(
            "calibration loaded from {}: {}x{} ({} valid pixels)",
            path.display(),
            calibration.cols(),
            calibration.rows(),
            calibration.valid_count()
        );
        Ok(self.set_calibration(calibration))
    }

    /// Write the current baseline to a comma-separated file.
    pub fn save_calibration_file(&self, path: &Path) -> Result<(), CalibrationError> {
        self.calibration.write_csv_file(path)?;
        tracing::info!("calibration saved to {}", path.display());
        Ok(())
    }

    /// Resolve the configured ROI against the calibration extent.
    ///
    /// Success marks the detector calibrated and resets any scan window
    /// restriction.
    pub fn calculate_region_of_interest(&mut self) -> bool {
        self.roi = None;
        if self.calibration.is_empty() {
            tracing::warn!("calibration is empty; detector stays uncalibrated");
            return false;
        }
        let Some(bounds) = self
            .config
            .roi
            .resolve(self.calibration.rows(), self.calibration.cols())
        else {
            tracing::warn!(
                "ROI {:?} is empty for a {}x{} calibration",
                self.config.roi,
                self.calibration.cols(),
                self.calibration.rows()
            );
            return false;
        };
        tracing::info!(
            "calibrated: ROI x=[{}, {}) y=[{}, {})",
            bounds.min_x,
            bounds.max_x,
            bounds.min_y,
            bounds.max_y
        );
        self.roi = Some(RoiController::new(bounds));
        true
    }

    /// Resolved ROI, once calibrated.
    pub fn region_of_interest(&self) -> Option<&PixelBounds> {
        self.roi.as_ref().map(RoiController::bounds)
    }

    /// Replace the configured ROI and, if calibrated, re-derive bounds and
    /// tolerances.
    ///
    /// A transform that was already built is kept: call
    /// [`invalidate_transform`](Self::invalidate_transform) to rebuild it.
    pub fn set_region_of_interest(&mut self, roi: RegionOfInterest) -> bool {
        self.config.roi = roi;
        if self.mapper.is_built() {
            tracing::warn!("ROI changed after the ground transform was built; it stays stale until invalidate_transform()");
        }
        if self.calibration.is_empty() {
            return false;
        }
        self.tolerances = None;
        self.calculate_region_of_interest()
    }

    // ── Tolerances and transform ─────────────────────────────────────────

    /// Precompute the per-pixel tolerance band for the calibrated ROI.
    ///
    /// # Panics
    ///
    /// Panics when the detector is not calibrated: without a baseline there
    /// is nothing to tolerate and every later scan would silently pass.
    pub fn compute_tolerances(&mut self) {
        let roi = self
            .roi
            .as_ref()
            .map(|r| *r.bounds())
            .unwrap_or_else(|| panic!("compute_tolerances() called before calibration"));
        let band = ToleranceBand::compute(
            &self.calibration,
            &roi,
            &self.config.tolerance,
            self.config.camera_height_m,
        );
        tracing::info!(
            "tolerance band computed ({:?}, close={} m, far={} m)",
            self.config.tolerance.mode,
            self.config.tolerance.close_m,
            self.config.tolerance.far_m
        );
        self.tolerances = Some(band);
    }

    pub fn tolerance_band(&self) -> Option<&ToleranceBand> {
        self.tolerances.as_ref()
    }

    pub fn transform_is_built(&self) -> bool {
        self.mapper.is_built()
    }

    /// Forget the cached ground transform; the next scan rebuilds it.
    pub fn invalidate_transform(&mut self) {
        self.mapper.invalidate();
    }

    /// Project pixel coordinates into continuous grid coordinates.
    ///
    /// Builds the transform if needed. `None` when uncalibrated or when the
    /// ground corners are degenerate.
    pub fn map_to_grid_coordinates(&mut self, pixels: &[[f64; 2]]) -> Option<Vec<[f64; 2]>> {
        self.ensure_transform()?;
        self.mapper.map_to_grid_coordinates(pixels)
    }

    fn ensure_transform(&mut self) -> Option<()> {
        let bounds = *self.roi.as_ref()?.bounds();
        match self.mapper.ensure_built(
            &bounds,
            &self.config.roi.ground_corners,
            &self.config.traversability_map,
        ) {
            Ok(_) => Some(()),
            Err(e) => {
                tracing::warn!("ground transform failed: {}", e);
                None
            }
        }
    }

    // ── Scan window ──────────────────────────────────────────────────────

    /// Calibrated ROI with its current restriction and last hazard span.
    pub fn roi_controller(&self) -> Option<&RoiController> {
        self.roi.as_ref()
    }

    /// Columns the next scan visits, once calibrated.
    pub fn active_columns(&self) -> Option<Range<usize>> {
        self.roi.as_ref().map(RoiController::active_columns)
    }

    /// Skip everything left of the leftmost hazard of the last hazardous scan.
    pub fn restrict_to_right_of_last_hazard(&mut self) -> bool {
        self.roi
            .as_mut()
            .is_some_and(RoiController::restrict_to_right_of_last_hazard)
    }

    /// Skip everything right of the rightmost hazard of the last hazardous scan.
    pub fn restrict_to_left_of_last_hazard(&mut self) -> bool {
        self.roi
            .as_mut()
            .is_some_and(RoiController::restrict_to_left_of_last_hazard)
    }

    /// Scan the whole calibrated ROI again.
    pub fn clear_restriction(&mut self) {
        if let Some(roi) = self.roi.as_mut() {
            roi.clear_restriction();
        }
    }

    // ── Per-frame analysis ───────────────────────────────────────────────

    /// Scan one frame, tint `visual`, and rebuild the traversability grid.
    ///
    /// Returns `true` when at least `hazard_pixel_limit` pixels fall outside
    /// their tolerance band. Returns `false` without touching anything when
    /// uncalibrated.
    pub fn analyze(&mut self, depth: &DepthFrame<'_>, visual: &mut RgbImage) -> bool {
        let Some(roi) = self.roi.as_ref() else {
            tracing::debug!("analyze called on an uncalibrated detector");
            return false;
        };
        let rows = roi.rows();
        let cols = roi.active_columns();

        if self.tolerances.is_none() {
            self.compute_tolerances();
        }

        self.grid.clear();
        self.last_scan = ScanSummary::default();

        if self.ensure_transform().is_none() {
            return false;
        }

        let Some(band) = self.tolerances.as_ref() else {
            return false;
        };
        let scan = scan_window(
            rows,
            cols,
            depth,
            &self.calibration,
            band,
            self.config.min_valid_distance_m,
            visual,
        );

        if let (Some([left, right]), Some(roi)) = (scan.span, self.roi.as_mut()) {
            roi.record_hazard_span(left, right);
        }

        let mut summary = ScanSummary {
            pixels_considered: scan.pixels_considered,
            too_close: scan.too_close,
            too_far: scan.too_far,
            hazard_pixels: scan.hazard_points.len(),
            leftmost_hazard_x: scan.span.map(|s| s[0]),
            rightmost_hazard_x: scan.span.map(|s| s[1]),
            ..Default::default()
        };

        if scan.hazard_points.len() >= self.config.hazard_pixel_limit {
            let cells = self
                .mapper
                .map_to_grid_coordinates(&scan.hazard_points)
                .unwrap_or_default();
            for xy in cells {
                if !self.grid.mark_hazard_at(xy) {
                    summary.dropped_points += 1;
                }
            }
            summary.hazard_cells = self.grid.hazard_cell_count();
            summary.hazardous = true;
        }

        tracing::debug!(
            "scan: {} considered, {} close, {} far, {} hazard px, {} cells marked",
            summary.pixels_considered,
            summary.too_close,
            summary.too_far,
            summary.hazard_pixels,
            summary.hazard_cells
        );
        if summary.dropped_points > 0 {
            tracing::debug!(
                "{} hazard points projected outside the traversability map",
                summary.dropped_points
            );
        }

        let hazardous = summary.hazardous;
        self.last_scan = summary;
        hazardous
    }

    /// Statistics of the latest scan.
    pub fn last_scan(&self) -> &ScanSummary {
        &self.last_scan
    }

    // ── Traversability map ───────────────────────────────────────────────

    pub fn traversability_map(&self) -> &TraversabilityGrid {
        &self.grid
    }

    pub fn trav_map_width(&self) -> usize {
        self.grid.width()
    }

    pub fn trav_map_height(&self) -> usize {
        self.grid.height()
    }

    pub fn value_for_hazard(&self) -> u8 {
        self.grid.hazard_value()
    }

    pub fn value_for_traversable(&self) -> u8 {
        self.grid.traversable_value()
    }

    pub fn hazard_pixel_limit(&self) -> usize {
        self.config.hazard_pixel_limit
    }
}

/// Walk the scan window, tint `visual`, and collect hazard pixels.
///
/// The window is intersected with the visual image, the depth frame and the
/// tolerance band; nothing outside all four is ever indexed.
fn scan_window(
    rows: Range<usize>,
    cols: Range<usize>,
    depth: &DepthFrame<'_>,
    calibration: &CalibrationMatrix,
    band: &ToleranceBand,
    min_valid_distance: f32,
    visual: &mut RgbImage,
) -> WindowScan {
    let max_y = rows
        .end
        .min(visual.height() as usize)
        .min(depth.height())
        .min(band.rows());
    let max_x = cols
        .end
        .min(visual.width() as usize)
        .min(depth.width())
        .min(band.cols());

    let mut scan = WindowScan {
        hazard_points: Vec::new(),
        pixels_considered: 0,
        too_close: 0,
        too_far: 0,
        span: None,
    };

    for y in rows.start..max_y {
        for x in cols.start..max_x {
            let Some(distance) = depth.get(x, y) else {
                continue;
            };
            let Some(baseline) = calibration.get(x, y) else {
                continue;
            };
            if baseline.is_nan() || distance.is_nan() || distance <= min_valid_distance {
                continue;
            }
            let Some((min_tolerated, max_tolerated)) = band.get(x, y) else {
                continue;
            };
            if min_tolerated.is_nan() || max_tolerated.is_nan() {
                continue;
            }

            let px = visual.get_pixel_mut(x as u32, y as u32);
            let original_green = px[1];
            overlay::mark_considered(px);
            scan.pixels_considered += 1;

            // Both checks run; with an inverted band the far tint wins.
            let too_close = distance < min_tolerated;
            let too_far = distance > max_tolerated;
            if too_close {
                overlay::mark_too_close(px, original_green);
                scan.too_close += 1;
            }
            if too_far {
                overlay::mark_too_far(px, original_green);
                scan.too_far += 1;
            }

            if too_close || too_far {
                scan.hazard_points.push([x as f64, y as f64]);
                scan.span = Some(match scan.span {
                    None => [x, x],
                    Some([left, right]) => [left.min(x), right.max(x)],
                });
            }
        }
    }

    scan
}
