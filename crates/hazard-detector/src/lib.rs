//! hazard-detector: terrain hazard detection from a fixed, downward-tilted
//! depth camera on a ground rover.
//!
//! A baseline depth image of flat ground is recorded once. Every live frame
//! is compared to it pixel by pixel; pixels that come significantly closer
//! (obstacles) or recede significantly (holes, drop-offs) are hazards. The
//! stages are:
//!
//! 1. **Calibration** – baseline matrix, loaded from or saved to CSV.
//! 2. **ROI** – the scanned pixel window, resolved against the calibration
//!    extent, plus a steerable horizontal restriction.
//! 3. **Tolerance** – per-pixel admissible distance band (flat or corrected
//!    for the viewing angle).
//! 4. **Scan** – classify each pixel, tint the visual overlay.
//! 5. **Mapping** – project hazard pixels through a ground homography into
//!    an occupancy-style traversability grid.
//!
//! # Public API
//! - [`HazardDetector`] and [`DetectorConfig`] as primary entry points
//! - [`CalibrationMatrix`] for baseline I/O
//! - [`TraversabilityGrid`] and [`ScanSummary`] as per-frame outputs

mod calibration;
mod config;
mod detector;
mod grid;
mod homography;
mod mapper;
mod overlay;
mod roi;
mod tolerance;

#[cfg(test)]
pub(crate) mod test_utils;

pub use calibration::{CalibrationError, CalibrationMatrix};
pub use config::{ConfigError, DetectorConfig};
pub use detector::{DepthFrame, HazardDetector, ScanSummary};
pub use grid::{CellState, TraversabilityGrid, TraversabilityMapConfig, HAZARD, TRAVERSABLE};
pub use homography::HomographyError;
pub use mapper::distances_to_grid_coordinates;
pub use roi::{GroundCorners, PixelBounds, RegionOfInterest, RoiController, DERIVE_FROM_CALIBRATION};
pub use tolerance::{ToleranceBand, ToleranceConfig, ToleranceMode};
