//! Shared helpers for unit tests: temp paths, test configurations and
//! synthetic depth scenes.

use std::ops::Range;
use std::path::PathBuf;

use crate::config::DetectorConfig;
use crate::grid::TraversabilityMapConfig;
use crate::roi::GroundCorners;
use crate::tolerance::{ToleranceConfig, ToleranceMode};

/// Per-process scratch path, so parallel test runs do not collide.
pub(crate) fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("hazard_detector_{}_{}", std::process::id(), name))
}

/// Flat `±tolerance` band, an 8 m × 8 m map at 0.125 m (65 × 65 cells) and a
/// trapezoid footprint from 0.5 m to 3 m ahead of the rover.
pub(crate) fn flat_config(tolerance: f32, hazard_pixel_limit: usize) -> DetectorConfig {
    DetectorConfig {
        tolerance: ToleranceConfig {
            mode: ToleranceMode::Flat,
            close_m: tolerance,
            far_m: tolerance,
        },
        hazard_pixel_limit,
        roi: crate::roi::RegionOfInterest {
            ground_corners: GroundCorners {
                upper_left: [-1.0, 3.0],
                upper_right: [1.0, 3.0],
                bottom_right: [0.5, 0.5],
                bottom_left: [-0.5, 0.5],
            },
            ..Default::default()
        },
        traversability_map: TraversabilityMapConfig {
            width_m: 8.0,
            height_m: 8.0,
            resolution_m: 0.125,
        },
        ..Default::default()
    }
}

/// Uniform `background` depth frame with a rectangular block at `block`
/// distance. Returns the row-major frame and the block's pixel coordinates.
pub(crate) fn synthetic_scene(
    rows: usize,
    cols: usize,
    background: f32,
    block: f32,
    xs: Range<usize>,
    ys: Range<usize>,
) -> (Vec<f32>, Vec<[f64; 2]>) {
    let mut depth = vec![background; rows * cols];
    let mut pixels = Vec::new();
    for y in ys {
        for x in xs.clone() {
            depth[y * cols + x] = block;
            pixels.push([x as f64, y as f64]);
        }
    }
    (depth, pixels)
}
