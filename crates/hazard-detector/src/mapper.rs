//! Pixel → traversability-grid projection.
//!
//! The four ROI pixel corners are paired with the ground-plane offsets of the
//! same corners (converted to grid cells) and a homography is fitted through
//! them. The transform is built once and then reused for every frame; it is
//! only rebuilt after [`GeometryMapper::invalidate`]. Reconfiguring the ROI
//! after the first scan therefore requires an explicit invalidation.

use nalgebra::Matrix3;

use crate::grid::TraversabilityMapConfig;
use crate::homography::{homography_from_quad, project, reprojection_error, HomographyError};
use crate::roi::{GroundCorners, PixelBounds};

#[derive(Debug, Clone, Copy, PartialEq)]
enum TransformState {
    Unbuilt,
    Built(Matrix3<f64>),
}

/// Convert a rover-frame ground offset (metres) to continuous grid coordinates.
///
/// The rover sits at the grid centre. Forward distance grows towards the top
/// edge of the grid, hence the inverted y axis.
pub fn distances_to_grid_coordinates(offset: [f64; 2], map: &TraversabilityMapConfig) -> [f64; 2] {
    [
        offset[0] / map.resolution_m + map.cells_wide() as f64 / 2.0,
        -offset[1] / map.resolution_m + map.cells_high() as f64 / 2.0,
    ]
}

/// Lazily built, cached perspective transform from ROI pixels to grid cells.
#[derive(Debug, Clone)]
pub struct GeometryMapper {
    state: TransformState,
}

impl Default for GeometryMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl GeometryMapper {
    pub fn new() -> Self {
        Self {
            state: TransformState::Unbuilt,
        }
    }

    pub fn is_built(&self) -> bool {
        matches!(self.state, TransformState::Built(_))
    }

    /// Cached transform, if built.
    pub fn transform(&self) -> Option<&Matrix3<f64>> {
        match &self.state {
            TransformState::Built(h) => Some(h),
            TransformState::Unbuilt => None,
        }
    }

    /// Drop the cached transform so the next scan rebuilds it.
    pub fn invalidate(&mut self) {
        self.state = TransformState::Unbuilt;
    }

    /// Build the transform unless it is already cached.
    ///
    /// An existing transform is returned as is, even if `roi` or `corners`
    /// changed since it was built.
    pub fn ensure_built(
        &mut self,
        roi: &PixelBounds,
        corners: &GroundCorners,
        map: &TraversabilityMapConfig,
    ) -> Result<&Matrix3<f64>, HomographyError> {
        if let TransformState::Unbuilt = self.state {
            let src = roi.corners();
            let dst = corners
                .ordered()
                .map(|offset| distances_to_grid_coordinates(offset, map));
            let h = homography_from_quad(&src, &dst)?;
            tracing::info!(
                "ground transform built for ROI x=[{}, {}) y=[{}, {})",
                roi.min_x,
                roi.max_x,
                roi.min_y,
                roi.max_y
            );
            let max_err = src
                .iter()
                .zip(&dst)
                .map(|(s, d)| reprojection_error(&h, s, d))
                .fold(0.0f64, f64::max);
            tracing::debug!("ground transform: {:?} (corner error {:.2e} cells)", h, max_err);
            self.state = TransformState::Built(h);
        }
        match &self.state {
            TransformState::Built(h) => Ok(h),
            TransformState::Unbuilt => Err(HomographyError::NumericalFailure(
                "transform missing after build".into(),
            )),
        }
    }

    /// Project pixel coordinates into continuous grid coordinates.
    ///
    /// Returns `None` while the transform is unbuilt.
    pub fn map_to_grid_coordinates(&self, pixels: &[[f64; 2]]) -> Option<Vec<[f64; 2]>> {
        let h = self.transform()?;
        Some(pixels.iter().map(|p| project(h, p[0], p[1])).collect())
    }
}
