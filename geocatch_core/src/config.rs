//! Session configuration, loadable from JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Configuration for a tracking session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Compass smoothing
    pub heading: HeadingConfig,

    /// Radar widget geometry
    pub radar: RadarConfig,

    /// Visibility policy tuning
    pub proximity: ProximityConfig,

    /// Model scale as a function of distance
    pub scale: DistanceScale,

    /// GPS poll interval while tracking (default: 5000 ms)
    pub location_poll_interval_ms: u64,

    /// How long to wait for the first GPS fix (default: 30 s)
    pub fix_timeout_ms: u64,

    /// How long to wait for a hit-test anchor (default: 15 s)
    pub anchor_timeout_ms: u64,

    /// Request an immersive session with hit-test placement
    pub immersive: bool,

    /// Placed models are not repositioned for smaller user movements (meters)
    pub min_placement_movement_m: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heading: HeadingConfig::default(),
            radar: RadarConfig::default(),
            proximity: ProximityConfig::default(),
            scale: DistanceScale::default(),
            location_poll_interval_ms: 5_000,
            fix_timeout_ms: 30_000,
            anchor_timeout_ms: 15_000,
            immersive: false,
            min_placement_movement_m: 0.5,
        }
    }
}

impl SessionConfig {
    /// Parses and validates a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a JSON config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Checks value ranges the math relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let h = &self.heading;
        if !(h.smoothing_factor > 0.0 && h.smoothing_factor <= 1.0) {
            return Err(ConfigError::invalid(
                "heading.smoothing_factor",
                format!("{} not in (0, 1]", h.smoothing_factor),
            ));
        }
        if !(h.dead_band_deg >= 0.0 && h.dead_band_deg < 180.0) {
            return Err(ConfigError::invalid(
                "heading.dead_band_deg",
                format!("{} not in [0, 180)", h.dead_band_deg),
            ));
        }
        if !(self.radar.range_m > 0.0) {
            return Err(ConfigError::invalid("radar.range_m", "must be positive"));
        }
        if !(self.radar.pixel_radius > 0.0) {
            return Err(ConfigError::invalid("radar.pixel_radius", "must be positive"));
        }
        if !(self.proximity.visibility_exit_margin_m >= 0.0) {
            return Err(ConfigError::invalid(
                "proximity.visibility_exit_margin_m",
                "must not be negative",
            ));
        }
        let s = &self.scale;
        if !(s.min_distance_m < s.max_distance_m) {
            return Err(ConfigError::invalid(
                "scale",
                "min_distance_m must be below max_distance_m",
            ));
        }
        if !(s.min_scale > 0.0 && s.min_scale <= s.max_scale) {
            return Err(ConfigError::invalid(
                "scale",
                "need 0 < min_scale <= max_scale",
            ));
        }
        if self.location_poll_interval_ms == 0 {
            return Err(ConfigError::invalid("location_poll_interval_ms", "must be positive"));
        }
        if !(self.min_placement_movement_m >= 0.0) {
            return Err(ConfigError::invalid(
                "min_placement_movement_m",
                "must not be negative",
            ));
        }
        Ok(())
    }

    pub fn location_poll_interval(&self) -> Duration {
        Duration::from_millis(self.location_poll_interval_ms)
    }

    pub fn fix_timeout(&self) -> Duration {
        Duration::from_millis(self.fix_timeout_ms)
    }

    pub fn anchor_timeout(&self) -> Duration {
        Duration::from_millis(self.anchor_timeout_ms)
    }
}

/// Compass smoothing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadingConfig {
    /// Fraction of the angular delta applied per sample (default: 0.1)
    pub smoothing_factor: f64,

    /// Deltas below this snap to the raw value (default: 0.5°)
    pub dead_band_deg: f64,
}

impl Default for HeadingConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.1,
            dead_band_deg: 0.5,
        }
    }
}

/// Radar widget geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    /// Range covered by the radar edge in meters (default: 50)
    pub range_m: f64,

    /// Radar radius in pixels (default: 70, a 140 px widget)
    pub pixel_radius: f64,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            range_m: 50.0,
            pixel_radius: 70.0,
        }
    }
}

/// Visibility policy tuning.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    /// Extra distance past the visibility radius before a visible target is
    /// hidden again. 0 toggles exactly at the radius.
    pub visibility_exit_margin_m: f64,
}

/// Model scale as a function of distance.
///
/// Near models are drawn large, far ones small, so a model stays readable
/// while the user walks towards it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceScale {
    pub min_distance_m: f64,
    pub max_distance_m: f64,
    pub min_scale: f64,
    pub max_scale: f64,
}

impl Default for DistanceScale {
    fn default() -> Self {
        Self {
            min_distance_m: 0.5,
            max_distance_m: 10.0,
            min_scale: 8.0,
            max_scale: 30.0,
        }
    }
}

impl DistanceScale {
    /// `max_scale` at or below `min_distance_m`, `min_scale` at or beyond
    /// `max_distance_m`, linear in between.
    pub fn scale_for(&self, distance_m: f64) -> f64 {
        if distance_m <= self.min_distance_m {
            return self.max_scale;
        }
        if distance_m >= self.max_distance_m {
            return self.min_scale;
        }
        let n = (distance_m - self.min_distance_m) / (self.max_distance_m - self.min_distance_m);
        self.max_scale - n * (self.max_scale - self.min_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.location_poll_interval_ms, 5_000);
        assert_eq!(config.radar.range_m, 50.0);
        assert_eq!(config.radar.pixel_radius, 70.0);
        assert_eq!(config.heading.smoothing_factor, 0.1);
        assert!(!config.immersive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = SessionConfig::from_json_str(
            r#"{ "radar": { "range_m": 100.0 }, "immersive": true }"#,
        )
        .unwrap();
        assert_eq!(config.radar.range_m, 100.0);
        assert_eq!(config.radar.pixel_radius, 70.0);
        assert!(config.immersive);
        assert_eq!(config.fix_timeout_ms, 30_000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = SessionConfig::from_json_str(r#"{ "heading": { "smoothing_factor": 0.0 } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "heading.smoothing_factor", .. }));

        let err = SessionConfig::from_json_str(r#"{ "radar": { "range_m": -5.0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "radar.range_m", .. }));

        let err = SessionConfig::from_json_str(
            r#"{ "scale": { "min_distance_m": 10.0, "max_distance_m": 1.0 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "scale", .. }));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = SessionConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = SessionConfig::from_file("/nonexistent/geocatch.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_distance_scale_interpolates() {
        let scale = DistanceScale::default();
        assert_eq!(scale.scale_for(0.2), 30.0);
        assert_eq!(scale.scale_for(0.5), 30.0);
        assert_eq!(scale.scale_for(10.0), 8.0);
        assert_eq!(scale.scale_for(50.0), 8.0);
        // Halfway: 0.5 + 4.75
        assert_relative_eq!(scale.scale_for(5.25), 19.0, epsilon = 1e-9);
    }
}
