//! Error types for the GeoCatch core.

use geocatch_env::SensorError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid coordinates, rejected when a `GeoPoint` is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum GeoError {
    #[error("Latitude {0} outside [-90, 90]")]
    InvalidLatitude(f64),

    #[error("Longitude {0} outside [-180, 180]")]
    InvalidLongitude(f64),
}

/// Why a session attempt ended in `Failed`.
///
/// All variants are terminal: the controller never retries on its own,
/// the user has to reset and start again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum FailureReason {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("No GPS fix: {0}")]
    FixTimeout(String),

    #[error("Immersive session unsupported: {0}")]
    SessionUnsupported(String),

    #[error("Anchor unavailable: {0}")]
    AnchorUnavailable(String),
}

impl From<SensorError> for FailureReason {
    fn from(err: SensorError) -> Self {
        match err {
            SensorError::PermissionDenied(what) => Self::PermissionDenied(what),
            SensorError::Timeout(ms) => Self::FixTimeout(format!("no fix within {}ms", ms)),
            SensorError::Unsupported(what) => Self::SessionUnsupported(what),
            SensorError::AnchorNotFound => {
                Self::AnchorUnavailable("no hit-test surface found".to_string())
            }
            SensorError::Unavailable(what) => Self::SensorUnavailable(what),
            SensorError::SampleMissed => Self::SensorUnavailable("sample missed".to_string()),
        }
    }
}

/// Errors returned by the session controller and proximity tracker.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// The requested event is not valid in the current state
    #[error("Invalid transition: {event} while {from}")]
    InvalidTransition { from: String, event: &'static str },

    /// A proximity update was requested before the first GPS fix
    #[error("No GPS fix yet")]
    NoFix,

    /// A sensor sample carried unusable coordinates
    #[error("Rejected sample: {0}")]
    InvalidSample(#[from] GeoError),
}

/// Why `TrackingAgent::establish` stopped short of `Active`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// A sensor or platform failure; the session is now `Failed`
    #[error(transparent)]
    Failed(#[from] FailureReason),

    /// The controller refused a transition (e.g. a session is already running)
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Errors raised while loading the target catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Duplicate target id: {0}")]
    DuplicateId(String),

    #[error("Target {id}: {reason}")]
    InvalidTarget { id: String, reason: String },

    #[error("Target {id}: {source}")]
    InvalidAnchor {
        id: String,
        #[source]
        source: GeoError,
    },

    #[error("Catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Catalog I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading or validating a `SessionConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config value {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
