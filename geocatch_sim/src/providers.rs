//! Simulated sensors backed by the Oracle and the virtual clock.
//!
//! Each provider implements one `geocatch_env` trait, so a `TrackingAgent`
//! can run against them exactly as it would against device adapters.

use async_trait::async_trait;
use geocatch_core::{CatchEvent, SessionObserver, SessionState, TargetRuntimeState, UserPose};
use geocatch_env::{
    AnchorSample, CameraProvider, GeoCatchContext, ImmersiveSession, LocationProvider,
    LocationSample, OrientationProvider, OrientationSample, SensorError,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::context::SimContext;
use crate::oracle::Oracle;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Oracle shared between providers and the runner.
pub type SharedOracle = Arc<Mutex<Oracle>>;

/// Moves the oracle forward to the context's virtual time.
fn catch_up(oracle: &mut Oracle, ctx: &SimContext) {
    let dt = ctx.now().as_secs_f64() - oracle.time();
    if dt > 0.0 {
        oracle.step(dt);
    }
}

/// How the simulated GPS behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationMode {
    /// Permission granted, fixes follow the oracle
    Normal,

    /// The user refuses location access
    Denied,

    /// Permission granted but no fix ever arrives
    Silent,
}

/// GPS backed by the oracle.
pub struct SimLocationProvider {
    ctx: SimContext,
    oracle: SharedOracle,
    mode: LocationMode,
    polls: AtomicUsize,
}

impl SimLocationProvider {
    pub fn new(ctx: SimContext, oracle: SharedOracle, mode: LocationMode) -> Self {
        Self {
            ctx,
            oracle,
            mode,
            polls: AtomicUsize::new(0),
        }
    }

    /// Number of `current_fix` calls so far.
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationProvider for SimLocationProvider {
    async fn request_permission(&self) -> Result<(), SensorError> {
        match self.mode {
            LocationMode::Denied => Err(SensorError::denied("location")),
            _ => Ok(()),
        }
    }

    async fn current_fix(&self) -> Result<LocationSample, SensorError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.mode == LocationMode::Silent {
            return std::future::pending().await;
        }

        let reading = {
            let mut oracle = lock(&self.oracle);
            catch_up(&mut oracle, &self.ctx);
            oracle.gps_sample(self.ctx.unix_ms())
        };
        reading.ok_or(SensorError::SampleMissed)
    }
}

/// Compass backed by the oracle, delivering one sample per period.
pub struct SimOrientationProvider {
    ctx: SimContext,
    oracle: SharedOracle,
    period: Duration,
    samples: AtomicUsize,
}

impl SimOrientationProvider {
    pub fn new(ctx: SimContext, oracle: SharedOracle, period: Duration) -> Self {
        Self {
            ctx,
            oracle,
            period,
            samples: AtomicUsize::new(0),
        }
    }

    /// Number of `next_sample` calls so far.
    pub fn samples(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrientationProvider for SimOrientationProvider {
    async fn request_permission(&self) -> Result<(), SensorError> {
        Ok(())
    }

    async fn next_sample(&self) -> Result<OrientationSample, SensorError> {
        self.samples.fetch_add(1, Ordering::SeqCst);
        self.ctx.sleep(self.period).await;
        let mut oracle = lock(&self.oracle);
        catch_up(&mut oracle, &self.ctx);
        Ok(oracle.compass_sample(self.ctx.unix_ms()))
    }
}

/// Camera that always grants (or always refuses) access.
pub struct SimCameraProvider {
    granted: bool,
}

impl SimCameraProvider {
    pub fn new(granted: bool) -> Self {
        Self { granted }
    }
}

#[async_trait]
impl CameraProvider for SimCameraProvider {
    async fn request_permission(&self) -> Result<(), SensorError> {
        if self.granted {
            Ok(())
        } else {
            Err(SensorError::denied("camera"))
        }
    }
}

/// Immersive session that finds a surface after a fixed search time.
pub struct SimImmersive {
    ctx: SimContext,
    supported: bool,
    search_time: Duration,
    ended: AtomicBool,
}

impl SimImmersive {
    pub fn new(ctx: SimContext, supported: bool, search_time: Duration) -> Self {
        Self {
            ctx,
            supported,
            search_time,
            ended: AtomicBool::new(false),
        }
    }

    /// True once `end()` has been called.
    pub fn ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImmersiveSession for SimImmersive {
    async fn start(&self) -> Result<(), SensorError> {
        if self.supported {
            Ok(())
        } else {
            Err(SensorError::Unsupported("immersive-ar".to_string()))
        }
    }

    async fn hit_test_anchor(&self) -> Result<AnchorSample, SensorError> {
        self.ctx.sleep(self.search_time).await;
        Ok(AnchorSample::origin())
    }

    async fn end(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }
}

/// Everything the simulated UI was told.
#[derive(Debug, Clone, Default)]
pub struct ObserverLog {
    pub states: Vec<SessionState>,
    pub catches: Vec<CatchEvent>,
    pub updates: usize,
    pub radar_frames: usize,
    pub last_states: Vec<TargetRuntimeState>,
}

/// Observer that records into a shared `ObserverLog`.
///
/// Clones share the same log, so the runner keeps one while the controller
/// owns the other.
#[derive(Debug, Clone, Default)]
pub struct SimObserver {
    log: Arc<Mutex<ObserverLog>>,
}

impl SimObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ObserverLog {
        lock(&self.log).clone()
    }
}

impl SessionObserver for SimObserver {
    fn on_state(&mut self, state: &SessionState) {
        lock(&self.log).states.push(state.clone());
    }

    fn on_update(&mut self, _pose: &UserPose, states: &[TargetRuntimeState]) {
        let mut log = lock(&self.log);
        log.updates += 1;
        log.last_states = states.to_vec();
    }

    fn on_caught(&mut self, event: &CatchEvent) {
        lock(&self.log).catches.push(event.clone());
    }

    fn on_radar(&mut self, _frame: &geocatch_core::RadarFrame) {
        lock(&self.log).radar_frames += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geocatch_core::GeoPoint;

    fn shared_oracle(ctx: &SimContext) -> SharedOracle {
        let origin = GeoPoint::new(10.767406, 78.813385).unwrap();
        Arc::new(Mutex::new(Oracle::new(origin, ctx.derive_rng(1))))
    }

    #[tokio::test]
    async fn test_location_follows_virtual_time() {
        let ctx = SimContext::new(3);
        let oracle = shared_oracle(&ctx);
        {
            let mut o = oracle.lock().unwrap();
            o.set_speed(1.0);
            o.push_waypoint(0.0, 20.0);
        }
        let gps = SimLocationProvider::new(ctx.clone(), oracle.clone(), LocationMode::Normal);

        gps.request_permission().await.unwrap();
        ctx.advance_time(Duration::from_secs(5));
        let fix = gps.current_fix().await.unwrap();

        assert_eq!(gps.polls(), 1);
        assert_eq!(fix.timestamp_ms, ctx.unix_ms());
        assert!((oracle.lock().unwrap().offset().y - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_denied_location() {
        let ctx = SimContext::new(3);
        let gps = SimLocationProvider::new(ctx.clone(), shared_oracle(&ctx), LocationMode::Denied);
        assert!(matches!(
            gps.request_permission().await,
            Err(SensorError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_immersive_search_takes_virtual_time() {
        let ctx = SimContext::new(3);
        let session = SimImmersive::new(ctx.clone(), true, Duration::from_secs(2));

        session.start().await.unwrap();
        let anchor = session.hit_test_anchor().await.unwrap();
        assert_eq!(anchor, AnchorSample::origin());
        assert_eq!(ctx.now(), Duration::from_secs(2));

        session.end().await;
        assert!(session.ended());
    }

    #[tokio::test]
    async fn test_unsupported_immersive() {
        let ctx = SimContext::new(3);
        let session = SimImmersive::new(ctx, false, Duration::ZERO);
        assert!(matches!(session.start().await, Err(SensorError::Unsupported(_))));
    }

    #[test]
    fn test_observer_clones_share_log() {
        let observer = SimObserver::new();
        let mut handle: Box<dyn SessionObserver> = Box::new(observer.clone());
        handle.on_state(&SessionState::Ready);
        assert_eq!(observer.snapshot().states, vec![SessionState::Ready]);
    }
}
