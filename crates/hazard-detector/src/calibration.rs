//! Per-pixel baseline distances and their comma-separated file format.
//!
//! The file holds one image row per line and one distance (metres) per
//! column, each value followed by a comma:
//!
//! ```text
//! 2.01,2.0,NaN,1.98,
//! 2.02,2.01,2.0,1.99,
//! ```
//!
//! Parsing is strict. A single trailing comma per line is accepted, blank
//! lines are ignored, and everything else that is not an `f32` fails the
//! whole load so that rows can never end up shifted against the image.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

// ── Error type ───────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum CalibrationError {
    /// The file could not be read or written.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A cell is empty or not a decimal floating point number.
    InvalidNumber {
        line: usize,
        column: usize,
        token: String,
    },
    /// A row has a different number of columns than the first row.
    RaggedRow {
        line: usize,
        expected: usize,
        found: usize,
    },
    /// A flat depth buffer is shorter than its stated dimensions.
    ShapeMismatch { expected: usize, found: usize },
}

impl std::fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "calibration file {}: {}", path.display(), source)
            }
            Self::InvalidNumber {
                line,
                column,
                token,
            } => write!(
                f,
                "line {}, column {}: '{}' is not a number",
                line, column, token
            ),
            Self::RaggedRow {
                line,
                expected,
                found,
            } => write!(
                f,
                "line {}: expected {} columns, found {}",
                line, expected, found
            ),
            Self::ShapeMismatch { expected, found } => write!(
                f,
                "depth buffer holds {} values, dimensions require {}",
                found, expected
            ),
        }
    }
}

impl std::error::Error for CalibrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ── Matrix ───────────────────────────────────────────────────────────────

/// Rectangular matrix of baseline distances, indexed like the depth image.
///
/// NaN marks pixels without a valid baseline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl CalibrationMatrix {
    /// Build from nested rows. All rows must have the first row's length.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, CalibrationError> {
        let n_rows = rows.len();
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(n_rows * cols);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != cols {
                return Err(CalibrationError::RaggedRow {
                    line: i + 1,
                    expected: cols,
                    found: row.len(),
                });
            }
            data.extend(row);
        }
        Ok(Self {
            rows: n_rows,
            cols,
            data,
        })
    }

    /// Record a baseline from a flat row-major depth frame.
    ///
    /// NaN and non-positive readings are stored as NaN.
    pub fn from_depth(data: &[f32], height: usize, width: usize) -> Result<Self, CalibrationError> {
        let expected = height * width;
        if data.len() < expected {
            return Err(CalibrationError::ShapeMismatch {
                expected,
                found: data.len(),
            });
        }
        let data = data[..expected]
            .iter()
            .map(|&d| if d > 0.0 { d } else { f32::NAN })
            .collect();
        Ok(Self {
            rows: height,
            cols: width,
            data,
        })
    }

    /// Uniform matrix, mostly useful for synthetic setups.
    pub fn filled(rows: usize, cols: usize, value: f32) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `true` when there is no row or the first row has no column.
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Baseline at pixel `(x, y)`.
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x >= self.cols || y >= self.rows {
            return None;
        }
        Some(self.data[y * self.cols + x])
    }

    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        assert!(x < self.cols && y < self.rows, "pixel ({x}, {y}) outside calibration");
        self.data[y * self.cols + x] = value;
    }

    pub fn row(&self, y: usize) -> &[f32] {
        &self.data[y * self.cols..(y + 1) * self.cols]
    }

    /// Row-major values, `rows × cols` long.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Number of pixels with a usable (non-NaN) baseline.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    /// Parse the comma-separated text layout.
    pub fn parse_csv(text: &str) -> Result<Self, CalibrationError> {
        let mut rows: Vec<Vec<f32>> = Vec::new();
        let mut cols: Option<usize> = None;

        for (line_idx, line) in text.lines().enumerate() {
            let line_no = line_idx + 1;
            if line.trim().is_empty() {
                continue;
            }

            let mut tokens: Vec<&str> = line.split(',').map(str::trim).collect();
            if tokens.len() > 1 && tokens.last().is_some_and(|t| t.is_empty()) {
                tokens.pop();
            }

            let mut row = Vec::with_capacity(tokens.len());
            for (col_idx, token) in tokens.iter().enumerate() {
                let value = token
                    .parse::<f32>()
                    .map_err(|_| CalibrationError::InvalidNumber {
                        line: line_no,
                        column: col_idx + 1,
                        token: (*token).to_string(),
                    })?;
                row.push(value);
            }

            match cols {
                None => cols = Some(row.len()),
                Some(expected) if expected != row.len() => {
                    return Err(CalibrationError::RaggedRow {
                        line: line_no,
                        expected,
                        found: row.len(),
                    });
                }
                Some(_) => {}
            }
            rows.push(row);
        }

        Self::from_rows(rows)
    }

    /// Serialize to the comma-separated text layout (trailing comma per row).
    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(self.data.len() * 6);
        for y in 0..self.rows {
            for v in self.row(y) {
                // f32 Display is the shortest string that parses back to the same value.
                let _ = write!(out, "{},", v);
            }
            out.push('\n');
        }
        out
    }

    /// Read a calibration file.
    pub fn read_csv_file(path: &Path) -> Result<Self, CalibrationError> {
        let text = std::fs::read_to_string(path).map_err(|source| CalibrationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_csv(&text)
    }

    /// Write a calibration file, replacing any existing one.
    pub fn write_csv_file(&self, path: &Path) -> Result<(), CalibrationError> {
        std::fs::write(path, self.to_csv()).map_err(|source| CalibrationError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::temp_path;

    fn assert_same_matrix(a: &CalibrationMatrix, b: &CalibrationMatrix) {
        assert_eq!((a.rows(), a.cols()), (b.rows(), b.cols()));
        for y in 0..a.rows() {
            for x in 0..a.cols() {
                let (va, vb) = (a.get(x, y).unwrap(), b.get(x, y).unwrap());
                if va.is_nan() {
                    assert!(vb.is_nan(), "({x}, {y}) lost its NaN");
                } else {
                    approx::assert_relative_eq!(va, vb, epsilon = 1e-6);
                }
            }
        }
    }

    #[test]
    fn file_roundtrip_preserves_values() {
        let m = CalibrationMatrix::from_rows(vec![
            vec![2.0, 1.987_654_3, 0.1],
            vec![3.25, 12.5, 1e-3],
        ])
        .unwrap();
        let path = temp_path("roundtrip.csv");
        m.write_csv_file(&path).unwrap();
        let back = CalibrationMatrix::read_csv_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_same_matrix(&m, &back);
    }

    #[test]
    fn file_roundtrip_preserves_nan() {
        let mut m = CalibrationMatrix::filled(4, 5, 2.5);
        m.set(0, 0, f32::NAN);
        m.set(3, 2, f32::NAN);
        let path = temp_path("roundtrip_nan.csv");
        m.write_csv_file(&path).unwrap();
        let back = CalibrationMatrix::read_csv_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_same_matrix(&m, &back);
        assert_eq!(back.valid_count(), 18);
    }

    #[test]
    fn csv_has_one_trailing_comma_per_row() {
        let m = CalibrationMatrix::from_rows(vec![vec![1.5, f32::NAN], vec![2.0, 0.25]]).unwrap();
        assert_eq!(m.to_csv(), "1.5,NaN,\n2,0.25,\n");
    }

    #[test]
    fn parse_accepts_missing_trailing_comma_and_blank_lines() {
        let m = CalibrationMatrix::parse_csv("1.0, 2.0 ,nan\n\n3,4,5,\n\n").unwrap();
        assert_eq!((m.rows(), m.cols()), (2, 3));
        assert!(m.get(2, 0).unwrap().is_nan());
        assert_eq!(m.get(1, 1), Some(4.0));
    }

    #[test]
    fn parse_rejects_non_numeric_token() {
        let err = CalibrationMatrix::parse_csv("1.0,2.0,\n1.0,abc,\n").unwrap_err();
        match err {
            CalibrationError::InvalidNumber {
                line,
                column,
                token,
            } => {
                assert_eq!((line, column), (2, 2));
                assert_eq!(token, "abc");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parse_rejects_empty_interior_cell() {
        let err = CalibrationMatrix::parse_csv("1.0,,2.0,\n").unwrap_err();
        assert!(matches!(
            err,
            CalibrationError::InvalidNumber { line: 1, column: 2, .. }
        ));
    }

    #[test]
    fn parse_rejects_ragged_rows() {
        let err = CalibrationMatrix::parse_csv("1,2,3,\n1,2,\n").unwrap_err();
        assert!(matches!(
            err,
            CalibrationError::RaggedRow {
                line: 2,
                expected: 3,
                found: 2
            }
        ));
    }

    #[test]
    fn empty_text_gives_empty_matrix() {
        let m = CalibrationMatrix::parse_csv("").unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = CalibrationMatrix::read_csv_file(&temp_path("does_not_exist.csv")).unwrap_err();
        assert!(matches!(err, CalibrationError::Io { .. }));
    }

    #[test]
    fn from_depth_masks_invalid_readings() {
        let depth = [1.0, -1.0, 0.0, f32::NAN, 2.0, 3.0];
        let m = CalibrationMatrix::from_depth(&depth, 2, 3).unwrap();
        assert_eq!(m.valid_count(), 3);
        assert!(m.get(1, 0).unwrap().is_nan());
        assert_eq!(m.get(2, 1), Some(3.0));

        assert!(matches!(
            CalibrationMatrix::from_depth(&depth, 3, 3),
            Err(CalibrationError::ShapeMismatch {
                expected: 9,
                found: 6
            })
        ));
    }
}
