//! JSON exporter for offline inspection of a walk.
//!
//! Exports one frame per GPS fix: where the user really was, where the
//! GPS said they were, and what the session made of it.

use geocatch_core::{GeoPoint, TargetRuntimeState};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Failure while writing an export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Export serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Export I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl From<GeoPoint> for LatLon {
    fn from(p: GeoPoint) -> Self {
        Self {
            lat: p.lat(),
            lon: p.lon(),
        }
    }
}

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    /// Ground truth position
    pub true_position: LatLon,

    /// Position the session believes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_position: Option<LatLon>,

    /// Smoothed heading
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_deg: Option<f64>,

    pub targets: Vec<TargetFrame>,

    /// Events (catches, visibility changes)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

/// Per-target state in a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetFrame {
    pub target_id: String,
    pub distance_m: f64,
    pub visible: bool,
    pub caught: bool,
}

impl From<&TargetRuntimeState> for TargetFrame {
    fn from(state: &TargetRuntimeState) -> Self {
        Self {
            target_id: state.target_id.clone(),
            distance_m: state.distance_m,
            visible: state.visible,
            caught: state.caught,
        }
    }
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ExportError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_tracks_last_frame() {
        let origin = GeoPoint::new(10.0, 78.0).unwrap();
        let mut export = SimExport::new("approach", 42);
        for t in [0.0, 5.0, 10.0] {
            export.add_frame(SimFrame {
                time_sec: t,
                true_position: origin.into(),
                observed_position: None,
                heading_deg: None,
                targets: vec![],
                events: vec![],
            });
        }
        export.finalize(true, None);

        assert_eq!(export.duration_sec, 10.0);
        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["frames"].as_array().unwrap().len(), 3);
        assert!(json["frames"][0].get("events").is_none());
        assert!(json.get("failure_reason").is_none());
    }
}
