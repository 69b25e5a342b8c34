//! Sensor and platform abstractions consumed by the tracking runtime.

use async_trait::async_trait;

use crate::error::SensorError;
use crate::types::{AnchorSample, LocationSample, OrientationSample};

/// Source of GPS fixes.
///
/// # Implementations
///
/// - **Production**: Wraps the platform geolocation API
/// - **Simulation**: Noisy fixes generated from a ground-truth walker
///
/// # Sample Flow
///
/// ```text
/// Runtime                    Provider                   Platform
///   |                           |                          |
///   |-- current_fix() --------->|                          |
///   |                           |-- getCurrentPosition --->|
///   |                           |<-------- fix / error ----|
///   |<-- Ok(sample) / Err(e) ---|                          |
/// ```
#[async_trait]
pub trait LocationProvider: Send + Sync + 'static {
    /// Asks the user for location access.
    ///
    /// # Returns
    /// * `Ok(())` - Access granted
    /// * `Err(SensorError::PermissionDenied)` - The user refused
    async fn request_permission(&self) -> Result<(), SensorError>;

    /// Reads the current position.
    ///
    /// # Returns
    /// * `Ok(sample)` - A fresh fix
    /// * `Err(SensorError::SampleMissed)` - This poll produced nothing; try again next interval
    /// * `Err(_)` - Any other error ends the session attempt
    async fn current_fix(&self) -> Result<LocationSample, SensorError>;
}

/// Source of raw compass / device orientation samples.
#[async_trait]
pub trait OrientationProvider: Send + Sync + 'static {
    /// Asks for motion sensor access (required on some platforms, a no-op elsewhere).
    async fn request_permission(&self) -> Result<(), SensorError>;

    /// Waits for the next orientation event.
    ///
    /// # Blocking
    /// This method waits until the device delivers a sample. A closed
    /// sensor stream is reported as `SensorError::Unavailable`.
    async fn next_sample(&self) -> Result<OrientationSample, SensorError>;
}

/// Camera access, needed for the see-through view behind placed objects.
#[async_trait]
pub trait CameraProvider: Send + Sync + 'static {
    async fn request_permission(&self) -> Result<(), SensorError>;
}

/// An immersive rendering session (hit-test capable AR).
#[async_trait]
pub trait ImmersiveSession: Send + Sync + 'static {
    /// Starts the session.
    ///
    /// # Returns
    /// * `Err(SensorError::Unsupported)` - The device cannot run immersive sessions
    async fn start(&self) -> Result<(), SensorError>;

    /// Waits for the first hit-test result usable as a placement anchor.
    async fn hit_test_anchor(&self) -> Result<AnchorSample, SensorError>;

    /// Ends the session. Idempotent.
    async fn end(&self);
}
