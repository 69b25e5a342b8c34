//! Error types for the GeoCatch environment abstraction.

use thiserror::Error;

/// Errors reported by sensor and platform providers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    /// The user refused access
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The sensor does not exist or stopped delivering
    #[error("Sensor unavailable: {0}")]
    Unavailable(String),

    /// The platform gave up waiting for a reading
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// A single poll produced no reading
    #[error("Sample missed")]
    SampleMissed,

    /// The platform lacks the requested capability
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// No hit-test surface was found
    #[error("No anchor surface found")]
    AnchorNotFound,
}

impl SensorError {
    /// Creates a permission error.
    pub fn denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Creates an unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Returns true for errors the runtime absorbs by keeping the last known value.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SampleMissed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_missed_samples_are_transient() {
        assert!(SensorError::SampleMissed.is_transient());
        assert!(!SensorError::Timeout(5000).is_transient());
        assert!(!SensorError::denied("location").is_transient());
        assert!(!SensorError::unavailable("compass").is_transient());
        assert!(!SensorError::AnchorNotFound.is_transient());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(SensorError::Timeout(250).to_string(), "Timeout after 250ms");
        assert_eq!(
            SensorError::denied("camera").to_string(),
            "Permission denied: camera"
        );
    }
}
