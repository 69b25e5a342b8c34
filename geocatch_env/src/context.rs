//! Core environment context trait for GeoCatch sessions.

use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, SystemTime};

use crate::task::TaskGuard;
use crate::types::SessionId;

/// The central interface for clock and task interaction.
///
/// This trait abstracts the "real world" so that the tracking runtime can run
/// both on a device (tokio) and inside the deterministic simulation harness.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`, random session ids
/// - **Simulation**: `SimContext` - virtual clock, session ids derived from the seed
#[async_trait]
pub trait GeoCatchContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time, used to stamp pose updates.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task and hands back its guard.
    ///
    /// The task stops when the guard is cancelled or dropped. Sensor
    /// subscriptions are spawned through here so that teardown can never
    /// leave a GPS poll loop running.
    fn spawn<F>(&self, name: &str, future: F) -> TaskGuard
    where
        F: Future<Output = ()> + Send + 'static;

    /// Derives the identifier for a session attempt.
    ///
    /// # Arguments
    /// * `attempt` - Monotonic attempt counter (a reset starts a new attempt)
    fn derive_session_id(&self, attempt: u64) -> SessionId;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;
}
