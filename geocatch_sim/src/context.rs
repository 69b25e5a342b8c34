//! Simulation context implementing GeoCatchContext for deterministic testing.

use async_trait::async_trait;
use geocatch_env::{GeoCatchContext, SessionId, TaskGuard};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Simulation context backed by a virtual clock.
///
/// This implements `GeoCatchContext` using:
/// - A virtual clock that only moves when advanced (or slept on)
/// - Session ids and RNG streams derived from the master seed
///
/// A context made with [`SimContext::new`] is stepped by hand and its
/// `sleep` simply jumps the clock forward, which is only sound for a single
/// task. Concurrent code (timeouts raced against sensor reads) needs
/// [`SimContext::paused`], whose clock is tokio's paused clock: every sleep
/// is a real timer, and the runtime jumps straight to the earliest pending
/// deadline once all tasks are idle.
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Manually advanced time (nanoseconds)
    offset_ns: Arc<AtomicU64>,

    /// Paused-clock instant that maps to virtual time zero
    origin: Option<tokio::time::Instant>,

    /// Epoch offset (virtual time 0 maps to this wall-clock time)
    epoch: SystemTime,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            offset_ns: Arc::new(AtomicU64::new(0)),
            origin: None,
            epoch: UNIX_EPOCH + Duration::from_secs(1704067200), // 2024-01-01 00:00:00 UTC
        }
    }

    /// Creates a context that follows tokio's paused clock.
    ///
    /// Must be called inside a runtime built with `start_paused(true)`.
    pub fn paused(seed: u64) -> Self {
        Self {
            origin: Some(tokio::time::Instant::now()),
            ..Self::new(seed)
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        self.offset_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        let slept = self
            .origin
            .map_or(0, |origin| origin.elapsed().as_nanos() as u64);
        self.offset_ns.load(Ordering::SeqCst) + slept
    }

    /// Virtual wall-clock time in Unix milliseconds, for sample timestamps.
    pub fn unix_ms(&self) -> u64 {
        self.system_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Derives an independent RNG stream from the master seed.
    ///
    /// Different streams never share state, so adding noise to the compass
    /// does not shift the GPS noise sequence.
    pub fn derive_rng(&self, stream: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed.wrapping_mul(0x9e3779b97f4a7c15) ^ stream)
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            offset_ns: Arc::clone(&self.offset_ns),
            origin: self.origin,
            epoch: self.epoch,
        }
    }
}

#[async_trait]
impl GeoCatchContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    fn system_time(&self) -> SystemTime {
        self.epoch + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        match self.origin {
            Some(_) => tokio::time::sleep(duration).await,
            None => {
                self.advance_time(duration);
                tokio::task::yield_now().await;
            }
        }
    }

    fn spawn<F>(&self, name: &str, future: F) -> TaskGuard
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        TaskGuard::new(name, tokio::spawn(future))
    }

    fn derive_session_id(&self, attempt: u64) -> SessionId {
        SessionId::from_seed(self.seed.wrapping_mul(0x517cc1b727220a95) ^ attempt)
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}
