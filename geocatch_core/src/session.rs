//! Session Controller - the single writer of `SessionState` and `UserPose`
//!
//! ```text
//! Idle -> RequestingPermissions -> AcquiringFix -> Ready -+-> Active -> Ended
//!                                                         |      ^
//!                                                         +-> Placing
//!
//! any non-terminal state --fail--> Failed(reason)
//! Ended | Failed --reset--> Idle
//! ```
//!
//! GPS and compass samples arrive independently. Each one is merged into the
//! pose on its own: a pose with only a heading or only a position is valid.
//! GPS fixes drive proximity; compass samples only move the radar needle and
//! the renderer heading. Samples that arrive while the session is not
//! listening (Idle, Ended, Failed) are dropped.
//!
//! Proximity runs from `Ready` onwards; renderer commands are issued only in
//! `Active`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use geocatch_env::{LocationSample, OrientationSample, SessionId};

use crate::catalog::TargetCatalog;
use crate::config::SessionConfig;
use crate::error::{FailureReason, SessionError};
use crate::geodesy::GeoPoint;
use crate::heading::HeadingFilter;
use crate::observer::{NoopObserver, SessionObserver, StatusSnapshot};
use crate::proximity::{ProximityEvent, ProximityTracker, ProximityUpdate, TargetRuntimeState};
use crate::radar::{RadarFrame, RadarProjector};
use crate::render::{AnchorPose, PlacementPlanner, Renderer};

/// Lifecycle of one session attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    RequestingPermissions,
    AcquiringFix,
    Ready,
    Placing,
    Active,
    Ended,
    Failed(FailureReason),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::RequestingPermissions => "RequestingPermissions",
            SessionState::AcquiringFix => "AcquiringFix",
            SessionState::Ready => "Ready",
            SessionState::Placing => "Placing",
            SessionState::Active => "Active",
            SessionState::Ended => "Ended",
            SessionState::Failed(_) => "Failed",
        }
    }

    /// `Ended` or `Failed`: only a reset leaves these.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Ended | SessionState::Failed(_))
    }

    /// States in which GPS fixes drive proximity.
    pub fn is_tracking(&self) -> bool {
        matches!(
            self,
            SessionState::Ready | SessionState::Placing | SessionState::Active
        )
    }

    fn accepts_samples(&self) -> bool {
        matches!(self, SessionState::AcquiringFix) || self.is_tracking()
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Failed(reason) => write!(f, "Failed({})", reason),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Where the user is and which way they face.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPose {
    /// `None` until the first GPS fix
    pub position: Option<GeoPoint>,

    /// Smoothed heading in [0, 360); `None` until the first compass sample
    pub heading: Option<f64>,

    /// Reported accuracy of the last fix (meters)
    pub accuracy_m: Option<f64>,

    /// Timestamp of the last accepted fix (Unix milliseconds)
    pub last_fix_timestamp_ms: Option<u64>,
}

/// Per-session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub fixes_applied: u64,
    pub orientation_applied: u64,
    pub samples_missed: u64,
    pub samples_rejected: u64,
    pub catches: u64,
    pub shown_events: u64,
    pub hidden_events: u64,
    pub render_commands: u64,
}

/// Orchestrates one session: owns the pose, the heading filter, the
/// proximity tracker and the placement planner, and forwards results to the
/// observer and renderer.
pub struct SessionController {
    config: SessionConfig,
    catalog: Arc<TargetCatalog>,
    state: SessionState,
    session_id: Option<SessionId>,
    pose: UserPose,
    heading: HeadingFilter,
    tracker: ProximityTracker,
    radar: RadarProjector,
    planner: PlacementPlanner,
    anchor: Option<AnchorPose>,
    renderer: Option<Box<dyn Renderer>>,
    observer: Box<dyn SessionObserver>,
    stats: SessionStats,
}

impl SessionController {
    pub fn new(config: SessionConfig, catalog: Arc<TargetCatalog>) -> Self {
        Self {
            heading: HeadingFilter::new(&config.heading),
            tracker: ProximityTracker::new(&config.proximity),
            radar: RadarProjector::new(&config.radar),
            planner: PlacementPlanner::new(config.scale.clone(), config.min_placement_movement_m),
            config,
            catalog,
            state: SessionState::Idle,
            session_id: None,
            pose: UserPose::default(),
            anchor: None,
            renderer: None,
            observer: Box::new(NoopObserver),
            stats: SessionStats::default(),
        }
    }

    /// Attaches the 3D renderer fed while `Active`.
    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Attaches the UI observer.
    pub fn with_observer(mut self, observer: Box<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    // ---- Lifecycle -------------------------------------------------------

    /// `Idle -> RequestingPermissions`
    pub fn begin(&mut self, session_id: SessionId) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(self.invalid("begin"));
        }
        self.session_id = Some(session_id);
        self.transition(SessionState::RequestingPermissions);
        Ok(())
    }

    /// `RequestingPermissions -> AcquiringFix`
    pub fn permissions_granted(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::RequestingPermissions {
            return Err(self.invalid("permissions_granted"));
        }
        self.transition(SessionState::AcquiringFix);
        Ok(())
    }

    /// `Ready -> Placing`, for immersive sessions waiting on a hit-test anchor.
    pub fn request_placement(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Ready {
            return Err(self.invalid("request_placement"));
        }
        self.transition(SessionState::Placing);
        Ok(())
    }

    /// `Placing -> Active` with the anchor used for session-space placement.
    pub fn anchor_established(&mut self, anchor: AnchorPose) -> Result<(), SessionError> {
        if self.state != SessionState::Placing {
            return Err(self.invalid("anchor_established"));
        }
        debug!(heading = anchor.heading_deg(), "Anchor established");
        self.anchor = Some(anchor);
        self.transition(SessionState::Active);
        self.place_visible();
        Ok(())
    }

    /// `Ready -> Active` without an immersive session.
    pub fn start_tracking(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Ready {
            return Err(self.invalid("start_tracking"));
        }
        self.transition(SessionState::Active);
        self.place_visible();
        Ok(())
    }

    /// Ends a running session and clears the scene.
    pub fn end(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Idle || self.state.is_terminal() {
            return Err(self.invalid("end"));
        }
        self.transition(SessionState::Ended);
        self.clear_scene();
        Ok(())
    }

    /// Moves to `Failed(reason)` from any non-terminal state.
    pub fn fail(&mut self, reason: FailureReason) -> Result<(), SessionError> {
        if self.state.is_terminal() {
            return Err(self.invalid("fail"));
        }
        warn!(from = %self.state, reason = %reason, "Session failed");
        self.transition(SessionState::Failed(reason));
        self.clear_scene();
        Ok(())
    }

    /// `Ended | Failed -> Idle`, discarding all session state.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        if !(self.state == SessionState::Idle || self.state.is_terminal()) {
            return Err(self.invalid("reset"));
        }
        self.session_id = None;
        self.pose = UserPose::default();
        self.heading.reset();
        self.tracker.reset();
        self.planner.reset();
        self.anchor = None;
        self.stats = SessionStats::default();
        if self.state != SessionState::Idle {
            self.transition(SessionState::Idle);
        }
        Ok(())
    }

    // ---- Sensor input ----------------------------------------------------

    /// Merges a GPS fix into the pose and, once tracking, recomputes proximity.
    ///
    /// # Returns
    /// * `Ok(Some(update))` - Proximity was recomputed
    /// * `Ok(None)` - The session is not listening; the fix was dropped
    /// * `Err(SessionError::InvalidSample)` - Out-of-range coordinates; the
    ///   previous position is kept
    pub fn on_location(
        &mut self,
        sample: &LocationSample,
    ) -> Result<Option<ProximityUpdate>, SessionError> {
        if !self.state.accepts_samples() {
            debug!(state = %self.state, "Dropping GPS fix");
            return Ok(None);
        }

        let position = match GeoPoint::new(sample.lat, sample.lon) {
            Ok(p) => p,
            Err(e) => {
                self.stats.samples_rejected += 1;
                debug!(error = %e, "Rejected GPS fix");
                return Err(e.into());
            }
        };

        self.pose.position = Some(position);
        self.pose.accuracy_m = Some(sample.accuracy_m);
        self.pose.last_fix_timestamp_ms = Some(sample.timestamp_ms);
        self.stats.fixes_applied += 1;

        if self.state == SessionState::AcquiringFix {
            info!(position = %position, accuracy_m = sample.accuracy_m, "First GPS fix");
            self.transition(SessionState::Ready);
        }

        let update = self.tracker.update(&self.pose, self.catalog.targets())?;

        for event in &update.events {
            match event {
                ProximityEvent::Shown { target_id } => {
                    self.stats.shown_events += 1;
                    debug!(target = %target_id, "Target in view");
                }
                ProximityEvent::Hidden { target_id } => {
                    self.stats.hidden_events += 1;
                    debug!(target = %target_id, "Target out of view");
                }
                ProximityEvent::Caught(catch) => {
                    self.stats.catches += 1;
                    info!(
                        target = %catch.target_id,
                        distance_m = catch.distance_m,
                        "Target caught"
                    );
                    self.observer.on_caught(catch);
                }
            }
        }

        self.observer.on_update(&self.pose, &update.states);
        let frame = self.radar_frame();
        self.observer.on_radar(&frame);

        if self.state == SessionState::Active {
            self.place_visible();
        }

        Ok(Some(update))
    }

    /// Merges a compass sample into the pose.
    ///
    /// Only the needle and the renderer heading follow; target visibility is
    /// left alone.
    ///
    /// # Returns
    /// The new smoothed heading, or `None` if the sample was dropped or
    /// carried no usable reading.
    pub fn on_orientation(&mut self, sample: &OrientationSample) -> Option<f64> {
        if !self.state.accepts_samples() {
            debug!(state = %self.state, "Dropping orientation sample");
            return None;
        }

        let heading = self.heading.update_from_sample(sample)?;
        self.pose.heading = Some(heading);
        self.stats.orientation_applied += 1;

        if self.state.is_tracking() {
            let frame = self.radar_frame();
            self.observer.on_radar(&frame);
        }

        if self.state == SessionState::Active {
            if let Some(renderer) = self.renderer.as_deref_mut() {
                renderer.set_heading(heading);
                self.stats.render_commands += 1;
            }
        }

        Some(heading)
    }

    /// Records a poll that produced nothing. The last pose stays in effect.
    pub fn on_sample_missed(&mut self, source: &str) {
        self.stats.samples_missed += 1;
        debug!(source, "Sample missed, keeping last pose");
    }

    // ---- Accessors -------------------------------------------------------

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    pub fn pose(&self) -> &UserPose {
        &self.pose
    }

    pub fn states(&self) -> &[TargetRuntimeState] {
        self.tracker.states()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn catalog(&self) -> &TargetCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn anchor(&self) -> Option<&AnchorPose> {
        self.anchor.as_ref()
    }

    pub fn caught_count(&self) -> usize {
        self.tracker.caught_count()
    }

    /// Current radar draw list.
    pub fn radar_frame(&self) -> RadarFrame {
        self.radar
            .frame(&self.pose, self.catalog.targets(), self.tracker.states())
    }

    /// Current status panel contents.
    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot::build(&self.pose, &self.catalog, self.tracker.states())
    }

    // ---- Internals -------------------------------------------------------

    fn transition(&mut self, next: SessionState) {
        let session = self
            .session_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        info!(session = %session, from = %self.state, to = %next, "Session state change");
        self.state = next;
        self.observer.on_state(&self.state);
    }

    fn invalid(&self, event: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            from: self.state.to_string(),
            event,
        }
    }

    fn place_visible(&mut self) {
        let Some(renderer) = self.renderer.as_deref_mut() else {
            return;
        };
        let actions = self.planner.plan(
            &self.pose,
            self.catalog.targets(),
            self.tracker.states(),
            self.anchor.as_ref(),
        );
        for action in &actions {
            action.apply(renderer);
            self.stats.render_commands += 1;
        }
    }

    fn clear_scene(&mut self) {
        self.planner.reset();
        if let Some(renderer) = self.renderer.as_deref_mut() {
            renderer.clear();
            self.stats.render_commands += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proximity::CatchEvent;
    use crate::render::{RecordingRenderer, RenderCommand};
    use geocatch_env::AnchorSample;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Recorder {
        states: Arc<Mutex<Vec<String>>>,
        catches: Arc<Mutex<Vec<CatchEvent>>>,
        radar_frames: Arc<Mutex<usize>>,
    }

    impl SessionObserver for Recorder {
        fn on_state(&mut self, state: &SessionState) {
            self.states.lock().unwrap().push(state.name().to_string());
        }

        fn on_caught(&mut self, event: &CatchEvent) {
            self.catches.lock().unwrap().push(event.clone());
        }

        fn on_radar(&mut self, _frame: &RadarFrame) {
            *self.radar_frames.lock().unwrap() += 1;
        }
    }

    fn fix(lat: f64, lon: f64) -> LocationSample {
        LocationSample::new(lat, lon, 5.0, 1_700_000_000_000)
    }

    fn controller() -> SessionController {
        SessionController::new(SessionConfig::default(), Arc::new(TargetCatalog::demo()))
    }

    fn ready(ctrl: &mut SessionController) {
        ctrl.begin(SessionId::from_seed(1)).unwrap();
        ctrl.permissions_granted().unwrap();
        ctrl.on_location(&fix(10.767380, 78.813385)).unwrap();
        assert_eq!(ctrl.state(), &SessionState::Ready);
    }

    #[test]
    fn test_happy_path_transitions() {
        let recorder = Recorder::default();
        let mut ctrl = controller().with_observer(Box::new(recorder.clone()));

        ready(&mut ctrl);
        ctrl.start_tracking().unwrap();
        ctrl.end().unwrap();
        ctrl.reset().unwrap();

        assert_eq!(
            *recorder.states.lock().unwrap(),
            vec!["RequestingPermissions", "AcquiringFix", "Ready", "Active", "Ended", "Idle"]
        );
        assert_eq!(ctrl.pose(), &UserPose::default());
        assert!(ctrl.session_id().is_none());
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut ctrl = controller();
        assert!(matches!(
            ctrl.start_tracking(),
            Err(SessionError::InvalidTransition { event: "start_tracking", .. })
        ));
        assert!(ctrl.end().is_err());

        ctrl.begin(SessionId::from_seed(1)).unwrap();
        assert!(ctrl.begin(SessionId::from_seed(2)).is_err());
        assert!(ctrl.reset().is_err());
        assert_eq!(ctrl.state(), &SessionState::RequestingPermissions);
    }

    #[test]
    fn test_failure_is_terminal_until_reset() {
        let mut ctrl = controller();
        ctrl.begin(SessionId::from_seed(1)).unwrap();
        ctrl.fail(FailureReason::PermissionDenied("location".into())).unwrap();

        assert!(ctrl.state().is_terminal());
        assert!(ctrl.permissions_granted().is_err());
        assert!(ctrl.fail(FailureReason::FixTimeout("again".into())).is_err());
        assert_eq!(ctrl.on_location(&fix(10.0, 78.0)).unwrap(), None);
        assert_eq!(ctrl.pose().position, None);

        ctrl.reset().unwrap();
        assert_eq!(ctrl.state(), &SessionState::Idle);
        assert!(ctrl.begin(SessionId::from_seed(2)).is_ok());
    }

    #[test]
    fn test_samples_dropped_while_idle() {
        let mut ctrl = controller();
        assert_eq!(ctrl.on_location(&fix(10.0, 78.0)).unwrap(), None);
        assert_eq!(ctrl.on_orientation(&OrientationSample::from_compass(90.0, 0)), None);
        assert_eq!(ctrl.pose(), &UserPose::default());
    }

    #[test]
    fn test_partial_pose_updates_merge() {
        let mut ctrl = controller();
        ctrl.begin(SessionId::from_seed(1)).unwrap();
        ctrl.permissions_granted().unwrap();

        // Heading before any fix
        assert_eq!(ctrl.on_orientation(&OrientationSample::from_compass(45.0, 0)), Some(45.0));
        assert_eq!(ctrl.pose().heading, Some(45.0));
        assert_eq!(ctrl.pose().position, None);
        assert_eq!(ctrl.state(), &SessionState::AcquiringFix);

        // Fix keeps the heading
        ctrl.on_location(&fix(10.767380, 78.813385)).unwrap();
        assert_eq!(ctrl.pose().heading, Some(45.0));
        assert!(ctrl.pose().position.is_some());

        // Unusable compass sample leaves the heading
        assert_eq!(ctrl.on_orientation(&OrientationSample::default()), None);
        assert_eq!(ctrl.pose().heading, Some(45.0));
    }

    #[test]
    fn test_heading_does_not_recompute_proximity() {
        let recorder = Recorder::default();
        let mut ctrl = controller().with_observer(Box::new(recorder.clone()));
        ready(&mut ctrl);
        let states = ctrl.states().to_vec();
        let radar_before = *recorder.radar_frames.lock().unwrap();

        ctrl.on_orientation(&OrientationSample::from_alpha(90.0, 0));
        assert_eq!(ctrl.states(), states.as_slice());
        assert_eq!(*recorder.radar_frames.lock().unwrap(), radar_before + 1);
        assert_eq!(ctrl.radar_frame().needle_deg, Some(270.0));
    }

    #[test]
    fn test_invalid_fix_keeps_last_position() {
        let mut ctrl = controller();
        ready(&mut ctrl);
        let before = ctrl.pose().position;

        let err = ctrl.on_location(&fix(f64::NAN, 78.0)).unwrap_err();
        assert!(matches!(err, SessionError::InvalidSample(_)));
        assert_eq!(ctrl.pose().position, before);
        assert_eq!(ctrl.stats().samples_rejected, 1);
    }

    #[test]
    fn test_sample_missed_keeps_pose() {
        let mut ctrl = controller();
        ready(&mut ctrl);
        let pose = *ctrl.pose();
        ctrl.on_sample_missed("gps");
        assert_eq!(ctrl.pose(), &pose);
        assert_eq!(ctrl.stats().samples_missed, 1);
    }

    #[test]
    fn test_renderer_fed_only_while_active() {
        let renderer = RecordingRenderer::new();
        let mut ctrl = controller().with_renderer(Box::new(renderer.clone()));

        ready(&mut ctrl);
        ctrl.on_orientation(&OrientationSample::from_compass(10.0, 0));
        assert!(renderer.is_empty());

        ctrl.start_tracking().unwrap();
        let placed = renderer
            .commands()
            .iter()
            .filter(|c| matches!(c, RenderCommand::Place(_)))
            .count();
        assert_eq!(placed, 2);

        ctrl.on_orientation(&OrientationSample::from_compass(10.0, 0));
        assert!(matches!(renderer.commands().last(), Some(RenderCommand::SetHeading(_))));

        ctrl.end().unwrap();
        assert_eq!(renderer.commands().last(), Some(&RenderCommand::Clear));
        let count = renderer.len();

        ctrl.on_location(&fix(10.767406, 78.813385)).unwrap();
        assert_eq!(renderer.len(), count);
    }

    #[test]
    fn test_immersive_placement_uses_anchor() {
        let renderer = RecordingRenderer::new();
        let mut ctrl = controller().with_renderer(Box::new(renderer.clone()));
        ready(&mut ctrl);

        assert!(ctrl.anchor_established(AnchorPose::from_sample(&AnchorSample::origin(), 0.0)).is_err());
        ctrl.request_placement().unwrap();
        assert!(renderer.is_empty());

        ctrl.anchor_established(AnchorPose::from_sample(&AnchorSample::origin(), 0.0))
            .unwrap();
        assert_eq!(ctrl.state(), &SessionState::Active);
        assert!(renderer.commands().iter().all(|c| match c {
            RenderCommand::Place(cmd) => cmd.local_position.is_some(),
            _ => true,
        }));
    }

    #[test]
    fn test_end_to_end_catch_fires_once() {
        let recorder = Recorder::default();
        let catalog = TargetCatalog::new(vec![TargetCatalog::demo()
            .get("cottage-blender")
            .unwrap()
            .clone()])
        .unwrap();
        let mut ctrl = SessionController::new(SessionConfig::default(), Arc::new(catalog))
            .with_observer(Box::new(recorder.clone()));

        ctrl.begin(SessionId::from_seed(7)).unwrap();
        ctrl.permissions_granted().unwrap();

        let first = ctrl.on_location(&fix(10.767406, 78.813385)).unwrap().unwrap();
        assert!(first.states[0].visible);
        assert!(!first.states[0].caught);
        ctrl.start_tracking().unwrap();

        for lat in [10.767448, 10.767430, 10.767449, 10.767300, 10.767450] {
            ctrl.on_location(&fix(lat, 78.813385)).unwrap();
        }

        let catches = recorder.catches.lock().unwrap();
        assert_eq!(catches.len(), 1);
        assert_eq!(catches[0].target_id, "cottage-blender");
        assert!(ctrl.states()[0].caught);
        assert_eq!(ctrl.stats().catches, 1);
        assert_eq!(ctrl.status().targets[0].label.to_string(), "Caught");
    }
}
