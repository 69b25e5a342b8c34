//! Tracking Runtime - drives a `SessionController` from live sensors.
//!
//! This module is the integration layer between the synchronous controller
//! and the environment abstraction (`GeoCatchContext` plus sensor providers).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       TrackingAgent                          │
//! │                                                              │
//! │  ┌────────────────┐   ┌────────────────────┐                 │
//! │  │ location-poll  │──►│                    │                 │
//! │  │  (TaskGuard)   │   │   mpsc<SensorEvent>│──► Session      │
//! │  └────────────────┘   │                    │    Controller   │
//! │  ┌────────────────┐   │                    │    (single      │
//! │  │ orientation    │──►│                    │     writer)     │
//! │  │  (TaskGuard)   │   └────────────────────┘                 │
//! │  └────────────────┘                                          │
//! │          ▲ cancelled by teardown() on every exit path        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use geocatch_core::runtime::{SensorSuite, SessionCommand, TrackingAgent};
//! use geocatch_env::TokioContext;
//!
//! let ctx = TokioContext::shared();
//! let controller = SessionController::new(config, catalog);
//! let mut agent = TrackingAgent::new(ctx, controller, sensors);
//!
//! let (tx, rx) = tokio::sync::mpsc::channel(4);
//! let outcome = agent.run(rx).await;
//! ```

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use geocatch_env::{
    CameraProvider, GeoCatchContext, ImmersiveSession, LocationProvider, LocationSample,
    OrientationProvider, OrientationSample, SensorError, SessionId, TaskGuard,
};

use crate::error::{FailureReason, RuntimeError};
use crate::render::AnchorPose;
use crate::session::{SessionController, SessionState, SessionStats};

/// Sensor events buffered between the pumps and the controller
const EVENT_BUFFER: usize = 64;

/// The external collaborators a session needs.
#[derive(Clone)]
pub struct SensorSuite {
    pub location: Arc<dyn LocationProvider>,
    pub camera: Arc<dyn CameraProvider>,

    /// Compass; without it the radar has no needle
    pub orientation: Option<Arc<dyn OrientationProvider>>,

    /// Required when `SessionConfig::immersive` is set
    pub immersive: Option<Arc<dyn ImmersiveSession>>,
}

/// Commands from the UI to a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// User closed the experience
    End,
}

/// What a pump delivers to the controller.
#[derive(Debug)]
enum SensorEvent {
    Fix(LocationSample),
    Orientation(OrientationSample),
    Missed(&'static str),
    Failed(SensorError),
    /// The compass stopped for good; tracking goes on without heading
    CompassLost(SensorError),
}

impl SensorEvent {
    fn from_fix(result: Result<LocationSample, SensorError>) -> Self {
        match result {
            Ok(sample) => SensorEvent::Fix(sample),
            Err(e) if e.is_transient() => SensorEvent::Missed("location"),
            Err(e) => SensorEvent::Failed(e),
        }
    }

    fn from_orientation(result: Result<OrientationSample, SensorError>) -> Self {
        match result {
            Ok(sample) => SensorEvent::Orientation(sample),
            Err(e) if e.is_transient() => SensorEvent::Missed("orientation"),
            Err(e) => SensorEvent::CompassLost(e),
        }
    }
}

/// Summary of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionOutcome {
    pub session_id: Option<SessionId>,
    pub state: SessionState,
    pub catches: usize,
    pub stats: SessionStats,
    pub elapsed: Duration,
}

/// Runs one session at a time against live (or simulated) sensors.
///
/// Generic over the context, so the same agent runs on a device (tokio) or
/// inside the simulation harness.
pub struct TrackingAgent<Ctx: GeoCatchContext> {
    context: Arc<Ctx>,
    controller: SessionController,
    sensors: SensorSuite,

    /// Live sensor subscriptions
    guards: Vec<TaskGuard>,

    attempt: u64,
    immersive_started: bool,
    started_at: Duration,
}

impl<Ctx: GeoCatchContext> TrackingAgent<Ctx> {
    pub fn new(context: Arc<Ctx>, controller: SessionController, sensors: SensorSuite) -> Self {
        Self {
            context,
            controller,
            sensors,
            guards: Vec::new(),
            attempt: 0,
            immersive_started: false,
            started_at: Duration::ZERO,
        }
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Number of sensor subscriptions whose task is still running.
    ///
    /// Cancelled subscriptions are kept until the next session starts, so
    /// this reports tasks that outlived `teardown`.
    pub fn active_subscriptions(&self) -> usize {
        self.guards.iter().filter(|g| g.is_active()).count()
    }

    /// Establishes then tracks a session until it ends.
    pub async fn run(&mut self, control: mpsc::Receiver<SessionCommand>) -> SessionOutcome {
        match self.establish().await {
            Ok(()) => self.track(control).await,
            Err(e) => {
                warn!(error = %e, "Session not established");
                self.teardown().await;
                self.outcome()
            }
        }
    }

    /// Walks the controller from `Idle` to `Active`.
    ///
    /// Permissions, then the first fix (raced against `fix_timeout_ms`),
    /// then, for immersive sessions, the hit-test anchor (raced against
    /// `anchor_timeout_ms`). Any failure leaves the controller in `Failed`.
    pub async fn establish(&mut self) -> Result<(), RuntimeError> {
        if self.controller.state().is_terminal() {
            self.controller.reset()?;
        }

        self.attempt += 1;
        self.started_at = self.context.now();
        let session_id = self.context.derive_session_id(self.attempt);
        self.controller.begin(session_id)?;

        let config = self.controller.config().clone();
        let location = self.sensors.location.clone();
        let camera = self.sensors.camera.clone();

        // Permissions
        if let Err(e) = location.request_permission().await {
            return Err(self.abort(e.into()));
        }
        if let Err(e) = camera.request_permission().await {
            return Err(self.abort(e.into()));
        }
        if let Some(orientation) = self.sensors.orientation.clone() {
            if let Err(e) = orientation.request_permission().await {
                warn!(error = %e, "Compass unavailable, continuing without heading");
                self.sensors.orientation = None;
            }
        }
        self.controller.permissions_granted()?;

        // First fix
        let ctx = self.context.clone();
        let poll = config.location_poll_interval();
        let acquire = async {
            loop {
                match location.current_fix().await {
                    Ok(sample) => return Ok(sample),
                    Err(e) if e.is_transient() => ctx.sleep(poll).await,
                    Err(e) => return Err(e),
                }
            }
        };
        let first_fix = tokio::select! {
            biased;
            result = acquire => result,
            _ = ctx.sleep(config.fix_timeout()) => Err(SensorError::Timeout(config.fix_timeout_ms)),
        };
        let sample = match first_fix {
            Ok(sample) => sample,
            Err(e) => return Err(self.abort(e.into())),
        };
        if let Err(e) = self.controller.on_location(&sample) {
            return Err(self.abort(FailureReason::SensorUnavailable(e.to_string())));
        }

        if !config.immersive {
            self.controller.start_tracking()?;
            return Ok(());
        }

        // Immersive placement
        let Some(session) = self.sensors.immersive.clone() else {
            return Err(self.abort(FailureReason::SessionUnsupported(
                "no immersive session available".to_string(),
            )));
        };
        if let Err(e) = session.start().await {
            return Err(self.abort(e.into()));
        }
        self.immersive_started = true;
        self.controller.request_placement()?;

        let mut orientation = self.sensors.orientation.clone();
        let hit_test = session.hit_test_anchor();
        tokio::pin!(hit_test);
        let deadline = ctx.sleep(config.anchor_timeout());
        tokio::pin!(deadline);

        // The compass keeps feeding the pose while the user looks for a surface
        let anchor = loop {
            tokio::select! {
                biased;
                result = &mut hit_test => break result.map_err(FailureReason::from),
                result = next_orientation(orientation.as_ref()) => {
                    match result {
                        Ok(sample) => {
                            self.controller.on_orientation(&sample);
                        }
                        Err(e) if e.is_transient() => self.controller.on_sample_missed("orientation"),
                        Err(e) => {
                            self.drop_compass(&e);
                            orientation = None;
                        }
                    }
                }
                _ = &mut deadline => {
                    break Err(FailureReason::AnchorUnavailable(format!(
                        "no hit-test surface within {}ms",
                        config.anchor_timeout_ms
                    )));
                }
            }
        };

        match anchor {
            Ok(sample) => {
                let heading = self.controller.pose().heading.unwrap_or(0.0);
                self.controller
                    .anchor_established(AnchorPose::from_sample(&sample, heading))?;
                Ok(())
            }
            Err(reason) => Err(self.abort(reason)),
        }
    }

    /// Runs the tracking loop on an `Active` session.
    ///
    /// Returns when `SessionCommand::End` arrives, the control channel
    /// closes, or a sensor fails for good. Sensor subscriptions are torn
    /// down before returning, whatever the cause.
    pub async fn track(&mut self, mut control: mpsc::Receiver<SessionCommand>) -> SessionOutcome {
        if self.controller.state() != &SessionState::Active {
            warn!(state = %self.controller.state(), "Cannot track, session not active");
            self.teardown().await;
            return self.outcome();
        }

        let (tx, mut events) = mpsc::channel(EVENT_BUFFER);
        self.spawn_pumps(tx);
        info!(subscriptions = self.guards.len(), "Tracking started");

        loop {
            tokio::select! {
                command = control.recv() => {
                    match command {
                        Some(SessionCommand::End) => info!("End requested"),
                        None => debug!("Control channel closed"),
                    }
                    break;
                }
                Some(event) = events.recv() => {
                    if !self.apply(event) {
                        break;
                    }
                }
            }
        }

        self.teardown().await;
        self.outcome()
    }

    /// Stops every subscription, ends the immersive session and clears the
    /// scene. Idempotent.
    pub async fn teardown(&mut self) {
        for guard in &mut self.guards {
            debug!(task = guard.name(), "Cancelling subscription");
            guard.shutdown().await;
        }

        if self.immersive_started {
            if let Some(session) = &self.sensors.immersive {
                session.end().await;
            }
            self.immersive_started = false;
        }

        let state = self.controller.state();
        if *state != SessionState::Idle && !state.is_terminal() {
            if let Err(e) = self.controller.end() {
                debug!(error = %e, "End during teardown");
            }
        }

        info!(
            state = %self.controller.state(),
            catches = self.controller.caught_count(),
            "Session torn down"
        );
    }

    fn spawn_pumps(&mut self, tx: mpsc::Sender<SensorEvent>) {
        self.guards.retain(TaskGuard::is_active);
        let interval = self.controller.config().location_poll_interval();

        let ctx = self.context.clone();
        let location = self.sensors.location.clone();
        let location_tx = tx.clone();
        let guard = self.context.spawn("location-poll", async move {
            loop {
                ctx.sleep(interval).await;
                let event = SensorEvent::from_fix(location.current_fix().await);
                let fatal = matches!(event, SensorEvent::Failed(_));
                if location_tx.send(event).await.is_err() || fatal {
                    break;
                }
            }
        });
        self.guards.push(guard);

        if let Some(orientation) = self.sensors.orientation.clone() {
            let guard = self.context.spawn("orientation", async move {
                loop {
                    let event = SensorEvent::from_orientation(orientation.next_sample().await);
                    let fatal = matches!(event, SensorEvent::CompassLost(_));
                    if tx.send(event).await.is_err() || fatal {
                        break;
                    }
                }
            });
            self.guards.push(guard);
        }
    }

    /// Applies one event; returns false when the session can't go on.
    fn apply(&mut self, event: SensorEvent) -> bool {
        match event {
            SensorEvent::Fix(sample) => {
                if let Err(e) = self.controller.on_location(&sample) {
                    debug!(error = %e, "Fix not applied");
                }
                true
            }
            SensorEvent::Orientation(sample) => {
                self.controller.on_orientation(&sample);
                true
            }
            SensorEvent::Missed(source) => {
                self.controller.on_sample_missed(source);
                true
            }
            SensorEvent::Failed(e) => {
                if let Err(err) = self.controller.fail(e.into()) {
                    debug!(error = %err, "Failure after session end");
                }
                false
            }
            SensorEvent::CompassLost(e) => {
                self.drop_compass(&e);
                true
            }
        }
    }

    /// The compass is optional: losing it mid-session is handled like a
    /// refused compass permission at start.
    fn drop_compass(&mut self, error: &SensorError) {
        warn!(error = %error, "Compass lost, continuing without heading");
        self.controller.on_sample_missed("orientation");
        self.sensors.orientation = None;
    }

    fn abort(&mut self, reason: FailureReason) -> RuntimeError {
        if let Err(e) = self.controller.fail(reason.clone()) {
            debug!(error = %e, "Abort on a finished session");
        }
        RuntimeError::Failed(reason)
    }

    fn outcome(&self) -> SessionOutcome {
        SessionOutcome {
            session_id: self.controller.session_id(),
            state: self.controller.state().clone(),
            catches: self.controller.caught_count(),
            stats: *self.controller.stats(),
            elapsed: self.context.now().saturating_sub(self.started_at),
        }
    }
}

async fn next_orientation(
    provider: Option<&Arc<dyn OrientationProvider>>,
) -> Result<OrientationSample, SensorError> {
    match provider {
        Some(p) => p.next_sample().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TargetCatalog;
    use crate::config::SessionConfig;
    use crate::render::{RecordingRenderer, RenderCommand};
    use async_trait::async_trait;
    use geocatch_env::{AnchorSample, TokioContext};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedLocation {
        permission: Result<(), SensorError>,
        script: Mutex<VecDeque<Result<LocationSample, SensorError>>>,
        /// Returned once the script runs out; `None` never answers
        fallback: Option<LocationSample>,
        polls: AtomicUsize,
    }

    impl ScriptedLocation {
        fn new(script: Vec<Result<LocationSample, SensorError>>, fallback: Option<LocationSample>) -> Self {
            Self {
                permission: Ok(()),
                script: Mutex::new(script.into()),
                fallback,
                polls: AtomicUsize::new(0),
            }
        }

        fn denied() -> Self {
            Self {
                permission: Err(SensorError::denied("location")),
                ..Self::new(vec![], None)
            }
        }

        fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LocationProvider for ScriptedLocation {
        async fn request_permission(&self) -> Result<(), SensorError> {
            self.permission.clone()
        }

        async fn current_fix(&self) -> Result<LocationSample, SensorError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match (next, self.fallback) {
                (Some(result), _) => result,
                (None, Some(sample)) => Ok(sample),
                (None, None) => std::future::pending().await,
            }
        }
    }

    struct AllowCamera;

    #[async_trait]
    impl CameraProvider for AllowCamera {
        async fn request_permission(&self) -> Result<(), SensorError> {
            Ok(())
        }
    }

    struct SteadyCompass {
        heading: f64,
        /// Call on which the compass fails for good
        lost_on: Option<usize>,
        samples: AtomicUsize,
    }

    impl SteadyCompass {
        fn new(heading: f64) -> Self {
            Self {
                heading,
                lost_on: None,
                samples: AtomicUsize::new(0),
            }
        }

        fn lost_on(heading: f64, call: usize) -> Self {
            Self {
                lost_on: Some(call),
                ..Self::new(heading)
            }
        }

        fn samples(&self) -> usize {
            self.samples.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OrientationProvider for SteadyCompass {
        async fn request_permission(&self) -> Result<(), SensorError> {
            Ok(())
        }

        async fn next_sample(&self) -> Result<OrientationSample, SensorError> {
            let call = self.samples.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(100)).await;
            if self.lost_on == Some(call) {
                return Err(SensorError::unavailable("compass lost"));
            }
            Ok(OrientationSample::from_compass(self.heading, 0))
        }
    }

    struct FakeImmersive {
        supported: bool,
        anchor_after: Option<Duration>,
        ended: AtomicBool,
    }

    #[async_trait]
    impl ImmersiveSession for FakeImmersive {
        async fn start(&self) -> Result<(), SensorError> {
            if self.supported {
                Ok(())
            } else {
                Err(SensorError::Unsupported("immersive-ar".into()))
            }
        }

        async fn hit_test_anchor(&self) -> Result<AnchorSample, SensorError> {
            match self.anchor_after {
                Some(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(AnchorSample::origin())
                }
                None => std::future::pending().await,
            }
        }

        async fn end(&self) {
            self.ended.store(true, Ordering::SeqCst);
        }
    }

    fn fix(lat: f64) -> LocationSample {
        LocationSample::new(lat, 78.813385, 4.0, 0)
    }

    fn cottage_only() -> Arc<TargetCatalog> {
        let cottage = TargetCatalog::demo().get("cottage-blender").unwrap().clone();
        Arc::new(TargetCatalog::new(vec![cottage]).unwrap())
    }

    fn sensors(location: Arc<ScriptedLocation>) -> SensorSuite {
        SensorSuite {
            location,
            camera: Arc::new(AllowCamera),
            orientation: None,
            immersive: None,
        }
    }

    fn agent(config: SessionConfig, sensors: SensorSuite) -> TrackingAgent<TokioContext> {
        let controller = SessionController::new(config, cottage_only());
        TrackingAgent::new(TokioContext::shared(), controller, sensors)
    }

    fn end_after(delay: Duration) -> mpsc::Receiver<SessionCommand> {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tx.send(SessionCommand::End).await.unwrap();
        });
        rx
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_fails_before_polling() {
        let location = Arc::new(ScriptedLocation::denied());
        let mut agent = agent(SessionConfig::default(), sensors(location.clone()));
        let (_tx, rx) = mpsc::channel(1);

        let outcome = agent.run(rx).await;
        assert!(matches!(outcome.state, SessionState::Failed(FailureReason::PermissionDenied(_))));
        assert_eq!(location.polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fix_timeout() {
        let location = Arc::new(ScriptedLocation::new(vec![], None));
        let mut agent = agent(SessionConfig::default(), sensors(location));
        let (_tx, rx) = mpsc::channel(1);

        let outcome = agent.run(rx).await;
        assert_eq!(
            outcome.state,
            SessionState::Failed(FailureReason::FixTimeout("no fix within 30000ms".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_miss_during_acquisition_is_retried() {
        let location = Arc::new(ScriptedLocation::new(
            vec![Err(SensorError::SampleMissed)],
            Some(fix(10.767406)),
        ));
        let mut agent = agent(SessionConfig::default(), sensors(location));

        agent.establish().await.unwrap();
        assert_eq!(agent.controller().state(), &SessionState::Active);
        agent.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_stops_polling() {
        let location = Arc::new(ScriptedLocation::new(vec![], Some(fix(10.767406))));
        let mut agent = agent(SessionConfig::default(), sensors(location.clone()));

        let outcome = agent.run(end_after(Duration::from_secs(12))).await;
        assert_eq!(outcome.state, SessionState::Ended);
        // Initial fix, then polls at 5 s and 10 s
        assert_eq!(location.polls(), 3);
        assert_eq!(agent.active_subscriptions(), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(location.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_catch_during_tracking() {
        let location = Arc::new(ScriptedLocation::new(
            vec![Ok(fix(10.767406)), Ok(fix(10.767448))],
            Some(fix(10.767406)),
        ));
        let renderer = RecordingRenderer::new();
        let controller = SessionController::new(SessionConfig::default(), cottage_only())
            .with_renderer(Box::new(renderer.clone()));
        let mut agent = TrackingAgent::new(TokioContext::shared(), controller, sensors(location));

        let outcome = agent.run(end_after(Duration::from_secs(16))).await;
        assert_eq!(outcome.state, SessionState::Ended);
        assert_eq!(outcome.catches, 1);
        assert_eq!(outcome.stats.catches, 1);
        assert_eq!(outcome.stats.fixes_applied, 4);
        assert_eq!(renderer.commands().last(), Some(&RenderCommand::Clear));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_miss_keeps_session_alive() {
        let location = Arc::new(ScriptedLocation::new(
            vec![Ok(fix(10.767406)), Err(SensorError::SampleMissed)],
            Some(fix(10.767410)),
        ));
        let mut agent = agent(SessionConfig::default(), sensors(location));

        let outcome = agent.run(end_after(Duration::from_secs(11))).await;
        assert_eq!(outcome.state, SessionState::Ended);
        assert_eq!(outcome.stats.samples_missed, 1);
        assert_eq!(outcome.stats.fixes_applied, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_loss_fails_session() {
        let location = Arc::new(ScriptedLocation::new(
            vec![Ok(fix(10.767406)), Err(SensorError::unavailable("gps lost"))],
            None,
        ));
        let mut agent = agent(SessionConfig::default(), sensors(location));
        let (_tx, rx) = mpsc::channel(1);

        let outcome = agent.run(rx).await;
        assert_eq!(
            outcome.state,
            SessionState::Failed(FailureReason::SensorUnavailable("gps lost".into()))
        );
        assert_eq!(agent.active_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_compass_feeds_heading() {
        let location = Arc::new(ScriptedLocation::new(vec![], Some(fix(10.767406))));
        let mut suite = sensors(location);
        suite.orientation = Some(Arc::new(SteadyCompass::new(123.0)));
        let mut agent = agent(SessionConfig::default(), suite);

        let outcome = agent.run(end_after(Duration::from_secs(2))).await;
        assert_eq!(outcome.state, SessionState::Ended);
        assert!(outcome.stats.orientation_applied > 10);
        assert_eq!(agent.controller().pose().heading, Some(123.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_stops_compass() {
        let location = Arc::new(ScriptedLocation::new(vec![], Some(fix(10.767406))));
        let compass = Arc::new(SteadyCompass::new(45.0));
        let mut suite = sensors(location.clone());
        suite.orientation = Some(compass.clone());
        let mut agent = agent(SessionConfig::default(), suite);

        let outcome = agent.run(end_after(Duration::from_secs(12))).await;
        assert_eq!(outcome.state, SessionState::Ended);
        assert_eq!(agent.active_subscriptions(), 0);
        let samples = compass.samples();
        assert!(samples > 100);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(compass.samples(), samples);
        assert_eq!(location.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_compass_loss_keeps_tracking() {
        let location = Arc::new(ScriptedLocation::new(vec![], Some(fix(10.767406))));
        let compass = Arc::new(SteadyCompass::lost_on(123.0, 5));
        let mut suite = sensors(location.clone());
        suite.orientation = Some(compass.clone());
        let mut agent = agent(SessionConfig::default(), suite);

        let outcome = agent.run(end_after(Duration::from_secs(12))).await;
        assert_eq!(outcome.state, SessionState::Ended);
        assert_eq!(outcome.stats.orientation_applied, 4);
        assert_eq!(outcome.stats.samples_missed, 1);
        assert_eq!(compass.samples(), 5);
        assert_eq!(location.polls(), 3);
        assert_eq!(agent.controller().pose().heading, Some(123.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_compass_loss_while_placing_keeps_searching() {
        let location = Arc::new(ScriptedLocation::new(vec![], Some(fix(10.767406))));
        let immersive = Arc::new(FakeImmersive {
            supported: true,
            anchor_after: Some(Duration::from_secs(2)),
            ended: AtomicBool::new(false),
        });
        let compass = Arc::new(SteadyCompass::lost_on(60.0, 3));
        let mut suite = sensors(location);
        suite.immersive = Some(immersive);
        suite.orientation = Some(compass.clone());
        let config = SessionConfig {
            immersive: true,
            ..SessionConfig::default()
        };
        let mut agent = agent(config, suite);

        agent.establish().await.unwrap();
        assert_eq!(agent.controller().state(), &SessionState::Active);
        assert_eq!(agent.controller().anchor().unwrap().heading_deg(), 60.0);
        assert_eq!(compass.samples(), 3);

        agent.teardown().await;
        assert_eq!(agent.controller().state(), &SessionState::Ended);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immersive_unsupported() {
        let location = Arc::new(ScriptedLocation::new(vec![], Some(fix(10.767406))));
        let immersive = Arc::new(FakeImmersive {
            supported: false,
            anchor_after: None,
            ended: AtomicBool::new(false),
        });
        let mut suite = sensors(location);
        suite.immersive = Some(immersive.clone());
        let config = SessionConfig {
            immersive: true,
            ..SessionConfig::default()
        };
        let mut agent = agent(config, suite);
        let (_tx, rx) = mpsc::channel(1);

        let outcome = agent.run(rx).await;
        assert!(matches!(outcome.state, SessionState::Failed(FailureReason::SessionUnsupported(_))));
        assert!(!immersive.ended.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_anchor_timeout() {
        let location = Arc::new(ScriptedLocation::new(vec![], Some(fix(10.767406))));
        let immersive = Arc::new(FakeImmersive {
            supported: true,
            anchor_after: None,
            ended: AtomicBool::new(false),
        });
        let mut suite = sensors(location);
        suite.immersive = Some(immersive.clone());
        let config = SessionConfig {
            immersive: true,
            ..SessionConfig::default()
        };
        let mut agent = agent(config, suite);
        let (_tx, rx) = mpsc::channel(1);

        let outcome = agent.run(rx).await;
        assert!(matches!(outcome.state, SessionState::Failed(FailureReason::AnchorUnavailable(_))));
        assert!(immersive.ended.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immersive_placement_reaches_active() {
        let location = Arc::new(ScriptedLocation::new(vec![], Some(fix(10.767406))));
        let immersive = Arc::new(FakeImmersive {
            supported: true,
            anchor_after: Some(Duration::from_secs(2)),
            ended: AtomicBool::new(false),
        });
        let mut suite = sensors(location);
        suite.immersive = Some(immersive.clone());
        suite.orientation = Some(Arc::new(SteadyCompass::new(90.0)));
        let config = SessionConfig {
            immersive: true,
            ..SessionConfig::default()
        };
        let mut agent = agent(config, suite);

        agent.establish().await.unwrap();
        assert_eq!(agent.controller().state(), &SessionState::Active);
        let anchor = agent.controller().anchor().unwrap();
        assert_eq!(anchor.heading_deg(), 90.0);

        agent.teardown().await;
        assert_eq!(agent.controller().state(), &SessionState::Ended);
        assert!(immersive.ended.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_agent_can_run_again_after_failure() {
        let location = Arc::new(ScriptedLocation::new(vec![], None));
        let mut agent = agent(SessionConfig::default(), sensors(location));
        let (_tx, rx) = mpsc::channel(1);
        let first = agent.run(rx).await;
        assert!(first.state.is_terminal());

        // A second attempt resets and begins again
        let err = agent.establish().await.unwrap_err();
        assert!(matches!(err, RuntimeError::Failed(FailureReason::FixTimeout(_))));
        assert_ne!(agent.controller().session_id(), first.session_id);
    }
}
