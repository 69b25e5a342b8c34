//! Common types for the GeoCatch environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one session attempt.
///
/// Uses UUID v4 for global uniqueness without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Creates a new random SessionId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic SessionId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// A raw GPS fix as delivered by the platform.
///
/// Coordinates are not validated here; the core rejects out-of-range values
/// when it converts the sample into a `GeoPoint`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    /// Latitude in degrees
    pub lat: f64,

    /// Longitude in degrees
    pub lon: f64,

    /// Reported horizontal accuracy in meters
    pub accuracy_m: f64,

    /// Fix time (Unix milliseconds)
    pub timestamp_ms: u64,
}

impl LocationSample {
    pub fn new(lat: f64, lon: f64, accuracy_m: f64, timestamp_ms: u64) -> Self {
        Self {
            lat,
            lon,
            accuracy_m,
            timestamp_ms,
        }
    }
}

/// A raw orientation event.
///
/// Platforms report heading in one of two conventions: a vendor compass
/// heading (degrees clockwise from north) or an `alpha` rotation that needs
/// `360 - alpha` to become a heading. Either, both or neither may be present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OrientationSample {
    /// Rotation about the z axis in degrees (counter-clockwise)
    pub alpha: Option<f64>,

    /// Vendor compass heading in degrees (clockwise from north)
    pub webkit_compass_heading: Option<f64>,

    /// Event time (Unix milliseconds)
    pub timestamp_ms: u64,
}

impl OrientationSample {
    /// Creates a sample carrying only an `alpha` reading.
    pub fn from_alpha(alpha: f64, timestamp_ms: u64) -> Self {
        Self {
            alpha: Some(alpha),
            webkit_compass_heading: None,
            timestamp_ms,
        }
    }

    /// Creates a sample carrying only a vendor compass heading.
    pub fn from_compass(heading: f64, timestamp_ms: u64) -> Self {
        Self {
            alpha: None,
            webkit_compass_heading: Some(heading),
            timestamp_ms,
        }
    }
}

/// Pose of a hit-test result in the immersive session's local space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorSample {
    /// Translation [x, y, z] in meters
    pub position: [f64; 3],

    /// Orientation quaternion [i, j, k, w]
    pub orientation: [f64; 4],
}

impl AnchorSample {
    /// An anchor at the session origin with identity orientation.
    pub fn origin() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            orientation: [0.0, 0.0, 0.0, 1.0],
        }
    }
}
