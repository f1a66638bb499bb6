//! Region of interest: configured bounds, resolved pixel bounds, and the
//! active horizontal window used for steering avoidance.

use std::ops::Range;

/// Bound value meaning "take this bound from the calibration extent".
pub const DERIVE_FROM_CALIBRATION: i32 = -1;

/// Ground-plane offsets (metres, rover frame) of the four ROI corners.
///
/// `[x, y]` with `x` lateral (positive to the right) and `y` forward.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GroundCorners {
    pub upper_left: [f64; 2],
    pub upper_right: [f64; 2],
    pub bottom_right: [f64; 2],
    pub bottom_left: [f64; 2],
}

impl Default for GroundCorners {
    fn default() -> Self {
        Self {
            upper_left: [-1.0, 1.8],
            upper_right: [1.0, 1.8],
            bottom_right: [0.4, 0.5],
            bottom_left: [-0.4, 0.5],
        }
    }
}

impl GroundCorners {
    /// Corners in upper-left, upper-right, bottom-right, bottom-left order.
    pub fn ordered(&self) -> [[f64; 2]; 4] {
        [
            self.upper_left,
            self.upper_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }
}

/// Configured pixel window (x = 0 left, y = 0 top, max bounds exclusive).
///
/// A negative max bound is replaced by the calibration extent when the
/// detector is calibrated; negative min bounds clamp to zero.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegionOfInterest {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
    pub ground_corners: GroundCorners,
}

impl Default for RegionOfInterest {
    fn default() -> Self {
        Self {
            min_x: DERIVE_FROM_CALIBRATION,
            max_x: DERIVE_FROM_CALIBRATION,
            min_y: DERIVE_FROM_CALIBRATION,
            max_y: DERIVE_FROM_CALIBRATION,
            ground_corners: GroundCorners::default(),
        }
    }
}

impl RegionOfInterest {
    /// Resolve against a calibration of `rows × cols` pixels.
    ///
    /// Returns `None` when the resulting window is empty on either axis.
    pub fn resolve(&self, rows: usize, cols: usize) -> Option<PixelBounds> {
        let max_x = resolve_max(self.max_x, cols);
        let max_y = resolve_max(self.max_y, rows);
        let min_x = self.min_x.max(0) as usize;
        let min_y = self.min_y.max(0) as usize;
        if min_x >= max_x || min_y >= max_y {
            return None;
        }
        Some(PixelBounds {
            min_x,
            max_x,
            min_y,
            max_y,
        })
    }
}

fn resolve_max(bound: i32, extent: usize) -> usize {
    if bound < 0 {
        extent
    } else {
        (bound as usize).min(extent)
    }
}

/// Non-negative pixel window, max bounds exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PixelBounds {
    pub min_x: usize,
    pub max_x: usize,
    pub min_y: usize,
    pub max_y: usize,
}

impl PixelBounds {
    pub fn width(&self) -> usize {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> usize {
        self.max_y - self.min_y
    }

    /// Pixel corners in upper-left, upper-right, bottom-right, bottom-left order.
    pub fn corners(&self) -> [[f64; 2]; 4] {
        let (x0, x1) = (self.min_x as f64, self.max_x as f64);
        let (y0, y1) = (self.min_y as f64, self.max_y as f64);
        [[x0, y0], [x1, y0], [x1, y1], [x0, y1]]
    }
}

/// Calibrated ROI plus the horizontal sub-window the next scan visits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoiController {
    bounds: PixelBounds,
    active_min_x: usize,
    active_max_x: usize,
    /// Leftmost and rightmost hazard x of the latest scan that saw any hazard.
    last_hazard_span: Option<[usize; 2]>,
}

impl RoiController {
    pub fn new(bounds: PixelBounds) -> Self {
        Self {
            bounds,
            active_min_x: bounds.min_x,
            active_max_x: bounds.max_x,
            last_hazard_span: None,
        }
    }

    pub fn bounds(&self) -> &PixelBounds {
        &self.bounds
    }

    /// Columns the next scan visits.
    pub fn active_columns(&self) -> Range<usize> {
        self.active_min_x..self.active_max_x
    }

    /// Rows the next scan visits.
    pub fn rows(&self) -> Range<usize> {
        self.bounds.min_y..self.bounds.max_y
    }

    pub fn is_restricted(&self) -> bool {
        self.active_min_x != self.bounds.min_x || self.active_max_x != self.bounds.max_x
    }

    pub fn last_hazard_span(&self) -> Option<[usize; 2]> {
        self.last_hazard_span
    }

    pub(crate) fn record_hazard_span(&mut self, leftmost: usize, rightmost: usize) {
        self.last_hazard_span = Some([leftmost, rightmost]);
    }

    /// Ignore everything left of the leftmost hazard of the last hazardous scan.
    pub fn restrict_to_right_of_last_hazard(&mut self) -> bool {
        let Some([leftmost, _]) = self.last_hazard_span else {
            tracing::debug!("no hazard recorded yet; right-side restriction ignored");
            return false;
        };
        let new_min = leftmost.max(self.bounds.min_x);
        if new_min >= self.active_max_x {
            tracing::debug!(
                "right-side restriction at x={} would empty the window; ignored",
                new_min
            );
            return false;
        }
        self.active_min_x = new_min;
        tracing::debug!("scan window restricted to x in [{}, {})", new_min, self.active_max_x);
        true
    }

    /// Ignore everything right of the rightmost hazard of the last hazardous scan.
    pub fn restrict_to_left_of_last_hazard(&mut self) -> bool {
        let Some([_, rightmost]) = self.last_hazard_span else {
            tracing::debug!("no hazard recorded yet; left-side restriction ignored");
            return false;
        };
        let new_max = (rightmost + 1).min(self.bounds.max_x);
        if new_max <= self.active_min_x {
            tracing::debug!(
                "left-side restriction at x={} would empty the window; ignored",
                new_max
            );
            return false;
        }
        self.active_max_x = new_max;
        tracing::debug!("scan window restricted to x in [{}, {})", self.active_min_x, new_max);
        true
    }

    /// Scan the full calibrated ROI again.
    pub fn clear_restriction(&mut self) {
        self.active_min_x = self.bounds.min_x;
        self.active_max_x = self.bounds.max_x;
    }
}
