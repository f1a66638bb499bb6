use std::path::Path;

use crate::grid::TraversabilityMapConfig;
use crate::roi::RegionOfInterest;
use crate::tolerance::ToleranceConfig;

// ── Error type ───────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config: {}", e),
            Self::Parse(e) => write!(f, "failed to parse config: {}", e),
            Self::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
            Self::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e)
    }
}

// ── Detector configuration ───────────────────────────────────────────────

/// Full detector configuration.
///
/// Fixed at construction; only the scan window restriction changes at runtime.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
    /// Tolerance band policy and offsets.
    pub tolerance: ToleranceConfig,
    /// Camera mounting height above the ground plane in metres.
    pub camera_height_m: f32,
    /// Scanned pixel window and its ground-plane footprint.
    pub roi: RegionOfInterest,
    /// Minimum number of hazard pixels for a frame to count as hazardous.
    pub hazard_pixel_limit: usize,
    /// Live readings at or below this distance (metres) are treated as invalid.
    pub min_valid_distance_m: f32,
    /// Extent and resolution of the output grid.
    pub traversability_map: TraversabilityMapConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            tolerance: ToleranceConfig::default(),
            camera_height_m: 0.8,
            roi: RegionOfInterest::default(),
            hazard_pixel_limit: 20,
            min_valid_distance_m: 0.25,
            traversability_map: TraversabilityMapConfig::default(),
        }
    }
}

impl DetectorConfig {
    /// Load and validate a JSON configuration file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json_str(data: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tolerance
            .validate(self.camera_height_m)
            .map_err(ConfigError::Invalid)?;
        self.traversability_map
            .validate()
            .map_err(ConfigError::Invalid)?;
        if self.hazard_pixel_limit == 0 {
            return Err(ConfigError::Invalid(
                "hazard_pixel_limit must be >= 1".to_string(),
            ));
        }
        if !self.min_valid_distance_m.is_finite() || self.min_valid_distance_m < 0.0 {
            return Err(ConfigError::Invalid(
                "min_valid_distance_m must be finite and >= 0".to_string(),
            ));
        }
        let corners = self.roi.ground_corners.ordered();
        if corners.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ConfigError::Invalid(
                "roi.ground_corners must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tolerance::ToleranceMode;

    #[test]
    fn default_config_is_valid() {
        assert!(DetectorConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = DetectorConfig::from_json_str(
            r#"{
                "tolerance": { "mode": "flat", "close_m": 0.4 },
                "hazard_pixel_limit": 50,
                "roi": { "min_y": 120 }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.tolerance.mode, ToleranceMode::Flat);
        assert_eq!(cfg.tolerance.close_m, 0.4);
        assert_eq!(cfg.tolerance.far_m, ToleranceConfig::default().far_m);
        assert_eq!(cfg.hazard_pixel_limit, 50);
        assert_eq!(cfg.roi.min_y, 120);
        assert_eq!(cfg.roi.max_x, crate::roi::DERIVE_FROM_CALIBRATION);
        assert_eq!(cfg.camera_height_m, 0.8);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = DetectorConfig::from_json_str(r#"{ "hazard_pixel_limt": 5 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = DetectorConfig::from_json_str(r#"{ "hazard_pixel_limit": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = DetectorConfig::from_json_str(
            r#"{ "traversability_map": { "resolution_m": -0.1 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn json_roundtrip() {
        let cfg = DetectorConfig::default();
        let json = serde_json::to_string_pretty(&cfg).unwrap();
        let back = DetectorConfig::from_json_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
