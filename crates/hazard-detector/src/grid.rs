//! Ground-plane traversability grid.
//!
//! One byte per cell, row-major (`y * width + x`). The grid is always odd-sized
//! on both axes so that the rover sits on a unique centre cell.

use image::{GrayImage, Luma};

/// Cell value for ground that must not be driven over.
pub const HAZARD: u8 = 255;
/// Cell value for ground with no detected hazard.
pub const TRAVERSABLE: u8 = 0;

/// Largest cell count accepted along one axis.
pub const MAX_CELLS_PER_AXIS: usize = 20_001;
/// Largest total cell count accepted for one grid.
pub const MAX_GRID_CELLS: usize = 1 << 24;

/// State of a single traversability cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
    Traversable,
    Hazard,
}

impl CellState {
    /// Byte stored in the grid buffer for this state.
    pub const fn value(self) -> u8 {
        match self {
            Self::Traversable => TRAVERSABLE,
            Self::Hazard => HAZARD,
        }
    }

    /// Decode a buffer byte. Anything other than [`HAZARD`] is traversable.
    pub const fn from_value(value: u8) -> Self {
        if value == HAZARD {
            Self::Hazard
        } else {
            Self::Traversable
        }
    }
}

/// Physical extent and resolution of the traversability map.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraversabilityMapConfig {
    /// Lateral extent of the map in metres.
    pub width_m: f64,
    /// Forward extent of the map in metres.
    pub height_m: f64,
    /// Edge length of one cell in metres.
    pub resolution_m: f64,
}

impl Default for TraversabilityMapConfig {
    fn default() -> Self {
        Self {
            width_m: 4.0,
            height_m: 4.0,
            resolution_m: 0.05,
        }
    }
}

impl TraversabilityMapConfig {
    /// Number of cells along x.
    pub fn cells_wide(&self) -> usize {
        odd_cell_count(self.width_m, self.resolution_m)
    }

    /// Number of cells along y.
    pub fn cells_high(&self) -> usize {
        odd_cell_count(self.height_m, self.resolution_m)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if !self.resolution_m.is_finite() || self.resolution_m <= 0.0 {
            return Err("traversability_map.resolution_m must be finite and > 0".to_string());
        }
        if !self.width_m.is_finite() || self.width_m <= 0.0 {
            return Err("traversability_map.width_m must be finite and > 0".to_string());
        }
        if !self.height_m.is_finite() || self.height_m <= 0.0 {
            return Err("traversability_map.height_m must be finite and > 0".to_string());
        }
        for (axis, size) in [("width_m", self.width_m), ("height_m", self.height_m)] {
            if (size / self.resolution_m).floor() >= MAX_CELLS_PER_AXIS as f64 {
                return Err(format!(
                    "traversability_map.{} / resolution_m exceeds {} cells",
                    axis, MAX_CELLS_PER_AXIS
                ));
            }
        }
        let total = self.cells_wide().checked_mul(self.cells_high());
        if total.map_or(true, |n| n > MAX_GRID_CELLS) {
            return Err(format!(
                "traversability_map exceeds {} cells in total",
                MAX_GRID_CELLS
            ));
        }
        Ok(())
    }
}

/// `floor(size / resolution)`, bumped to the next odd integer.
///
/// Saturates at `usize::MAX` (odd) for ratios validation would reject.
fn odd_cell_count(size_m: f64, resolution_m: f64) -> usize {
    let n = (size_m / resolution_m).floor().max(0.0) as usize;
    if n % 2 == 1 {
        n
    } else {
        n.checked_add(1).unwrap_or(usize::MAX)
    }
}

/// Fixed-size occupancy buffer rebuilt on every analysed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversabilityGrid {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

impl TraversabilityGrid {
    /// Create an all-traversable grid sized from `config`.
    pub fn new(config: &TraversabilityMapConfig) -> Self {
        let width = config.cells_wide();
        let height = config.cells_high();
        Self {
            width,
            height,
            cells: vec![TRAVERSABLE; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Raw row-major cell buffer.
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn hazard_value(&self) -> u8 {
        HAZARD
    }

    pub fn traversable_value(&self) -> u8 {
        TRAVERSABLE
    }

    /// Cell value at `(x, y)`, or `None` outside the grid.
    pub fn cell(&self, x: usize, y: usize) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.cells[y * self.width + x])
    }

    pub fn cell_state(&self, x: usize, y: usize) -> Option<CellState> {
        self.cell(x, y).map(CellState::from_value)
    }

    /// Cell the rover projects onto.
    pub fn center(&self) -> [usize; 2] {
        [self.width / 2, self.height / 2]
    }

    pub fn hazard_cell_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c == HAZARD).count()
    }

    pub(crate) fn clear(&mut self) {
        self.cells.fill(TRAVERSABLE);
    }

    /// Mark the cell containing continuous grid coordinate `xy` as hazardous.
    ///
    /// Returns `false` when the coordinate is non-finite or falls outside the grid.
    pub(crate) fn mark_hazard_at(&mut self, xy: [f64; 2]) -> bool {
        let [x, y] = xy;
        if !x.is_finite() || !y.is_finite() {
            return false;
        }
        let (cx, cy) = (x.floor(), y.floor());
        if cx < 0.0 || cy < 0.0 || cx >= self.width as f64 || cy >= self.height as f64 {
            return false;
        }
        let idx = cy as usize * self.width + cx as usize;
        self.cells[idx] = HAZARD;
        true
    }

    /// Render the grid as a grayscale image (one pixel per cell).
    pub fn to_gray_image(&self) -> GrayImage {
        let mut img = GrayImage::new(self.width as u32, self.height as u32);
        for (i, &v) in self.cells.iter().enumerate() {
            let x = (i % self.width) as u32;
            let y = (i / self.width) as u32;
            img.put_pixel(x, y, Luma([v]));
        }
        img
    }
}
