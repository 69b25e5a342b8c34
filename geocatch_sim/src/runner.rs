//! Scenario runner - executes end-to-end session scenarios.
//!
//! Walking scenarios drive a `SessionController` tick by tick from the
//! Oracle. Lifecycle scenarios run the real `TrackingAgent` on a
//! single-threaded tokio runtime against simulated providers.

use crate::context::SimContext;
use crate::exporter::{SimEvent, SimExport, SimFrame, TargetFrame};
use crate::oracle::{CompassConvention, Oracle};
use crate::providers::{
    LocationMode, ObserverLog, SimCameraProvider, SimImmersive, SimLocationProvider, SimObserver,
    SimOrientationProvider,
};
use crate::scenarios::ScenarioId;

use geocatch_core::geodesy::shortest_delta_degrees;
use geocatch_core::{
    FailureReason, ProximityEvent, ProximityUpdate, RecordingRenderer, RenderCommand,
    SensorSuite, SessionCommand, SessionConfig, SessionController, SessionState, TargetCatalog,
    TargetObject, TrackingAgent,
};
use geocatch_env::GeoCatchContext;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Walking simulation step
const TICK: Duration = Duration::from_millis(100);

/// RNG stream for walker noise
const WALKER_STREAM: u64 = 1;

/// Virtual time a finished agent is watched for stray sensor calls
const QUIET_WINDOW: Duration = Duration::from_secs(60);

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Session state at the end of the run
    pub final_state: String,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScenarioMetrics {
    /// GPS fixes merged into the pose
    pub fixes_applied: u64,

    /// Compass samples merged into the pose
    pub orientation_applied: u64,

    /// Polls that produced nothing
    pub samples_missed: u64,

    /// Catch notifications delivered to the UI
    pub catch_notifications: u64,

    pub shown_events: u64,
    pub hidden_events: u64,

    /// Calls made on the renderer
    pub render_commands: u64,

    /// Radar redraws requested
    pub radar_frames: u64,
}

impl ScenarioMetrics {
    fn collect(controller: &SessionController, log: &ObserverLog) -> Self {
        let stats = controller.stats();
        Self {
            fixes_applied: stats.fixes_applied,
            orientation_applied: stats.orientation_applied,
            samples_missed: stats.samples_missed,
            catch_notifications: log.catches.len() as u64,
            shown_events: stats.shown_events,
            hidden_events: stats.hidden_events,
            render_commands: stats.render_commands,
            radar_frames: log.radar_frames as u64,
        }
    }
}

/// A finished walk, ready for assertions.
struct Walked {
    controller: SessionController,
    log: ObserverLog,
    headings: Vec<f64>,
    final_time_secs: f64,
}

/// Runs session scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Minimum walk duration in seconds
    max_duration_secs: f64,

    config: SessionConfig,
    catalog: Arc<TargetCatalog>,
}

impl ScenarioRunner {
    /// Creates a runner over the demo catalog with default configuration.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            max_duration_secs: 60.0,
            config: SessionConfig::default(),
            catalog: Arc::new(TargetCatalog::demo()),
        }
    }

    /// Sets the duration. Walks that need longer run longer.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs.max(0.0);
        self
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_catalog(mut self, catalog: TargetCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_with_export(scenario).0
    }

    /// Runs a scenario, also returning the per-fix frame log.
    pub fn run_with_export(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let mut export = SimExport::new(scenario.name(), self.seed);

        let Some(goal) = self.catalog.targets().first().cloned() else {
            let result = self.failed(scenario, "catalog has no targets".to_string());
            export.finalize(false, result.failure_reason.clone());
            return (result, export);
        };

        let result = match scenario {
            ScenarioId::Approach => self.run_approach(&goal, &mut export),
            ScenarioId::Pacing => self.run_pacing(&goal, &mut export),
            ScenarioId::GpsOutlier => self.run_gps_outlier(&goal, &mut export),
            ScenarioId::CompassWrap => self.run_compass_wrap(&goal, &mut export),
            ScenarioId::PermissionDenied => self.run_permission_denied(&goal),
            ScenarioId::FixTimeout => self.run_fix_timeout(&goal),
            ScenarioId::ImmersiveUnsupported => self.run_immersive_unsupported(&goal),
            ScenarioId::ImmersivePlacement => self.run_immersive_placement(&goal),
            ScenarioId::AnchorTimeout => self.run_anchor_timeout(&goal),
        };

        if result.passed {
            info!("Scenario {} passed", scenario.name());
        } else {
            warn!(
                "Scenario {} failed: {}",
                scenario.name(),
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
        }

        export.finalize(result.passed, result.failure_reason.clone());
        (result, export)
    }

    // ---- Walking scenarios -----------------------------------------------

    /// Walk 20 m onto the goal and stand there.
    ///
    /// **Assertion**: the goal is caught with exactly one notification, and
    /// no target is ever notified twice.
    fn run_approach(&self, goal: &TargetObject, export: &mut SimExport) -> ScenarioResult {
        let mut oracle = self.oracle(goal);
        oracle.set_gps_noise(0.3);
        oracle.set_compass_noise(2.0);
        oracle.place_at(0.0, -20.0);
        oracle.push_waypoint(0.0, 0.0);

        let duration = self.max_duration_secs.max(oracle.remaining_walk_secs() + 60.0);
        let walked = self.walk(oracle, true, duration, export, |_, _| {});

        let check = at_most_one_notification(&walked.log)
            .and_then(|_| expect_caught_once(&walked, goal));
        self.finish(ScenarioId::Approach, &walked, check)
    }

    /// Pace back and forth across the goal's catch radius.
    ///
    /// **Assertion**: the goal is entered repeatedly, caught stays true
    /// once set, and the UI is notified exactly once.
    fn run_pacing(&self, goal: &TargetObject, export: &mut SimExport) -> ScenarioResult {
        let amplitude = (goal.catch_radius_m * 3.0).max(1.0);
        let poll_secs = self.config.location_poll_interval().as_secs_f64().max(0.1);

        let mut oracle = self.oracle(goal);
        oracle.set_gps_noise(0.05);
        // About one fix per catch radius walked
        oracle.set_speed((goal.catch_radius_m / poll_secs).max(0.05));
        oracle.place_at(0.0, -amplitude);
        for _ in 0..2 {
            oracle.push_waypoint(0.0, amplitude);
            oracle.push_waypoint(0.0, -amplitude);
        }

        let duration = self.max_duration_secs.max(oracle.remaining_walk_secs() + 10.0);
        let mut tracker = CatchWatch::new(goal);
        let walked = self.walk(oracle, false, duration, export, |_, update| {
            tracker.observe(update)
        });

        let check = at_most_one_notification(&walked.log)
            .and_then(|_| expect_caught_once(&walked, goal))
            .and_then(|_| tracker.verify())
            .and_then(|_| {
                if tracker.entries >= 2 {
                    Ok(())
                } else {
                    Err(format!(
                        "Expected at least 2 entries into the catch radius, saw {}",
                        tracker.entries
                    ))
                }
            });
        self.finish(ScenarioId::Pacing, &walked, check)
    }

    /// Stand well outside the catch radius; one fix reports the goal itself.
    ///
    /// **Assertion**: the outlier catches the goal, and later (honest) fixes
    /// far from it never revert the catch.
    fn run_gps_outlier(&self, goal: &TargetObject, export: &mut SimExport) -> ScenarioResult {
        let standoff = (goal.catch_radius_m * 3.0).max(10.0);

        let mut oracle = self.oracle(goal);
        oracle.set_gps_noise(0.3);
        oracle.place_at(0.0, -standoff);
        oracle.inject_outlier(12.0, goal.anchor);

        let duration = self.max_duration_secs.max(40.0);
        let mut tracker = CatchWatch::new(goal);
        let walked = self.walk(oracle, false, duration, export, |_, update| {
            tracker.observe(update)
        });

        let check = at_most_one_notification(&walked.log)
            .and_then(|_| expect_caught_once(&walked, goal))
            .and_then(|_| tracker.verify())
            .and_then(|_| match tracker.last_distance {
                Some(d) if d > goal.catch_radius_m => Ok(()),
                other => Err(format!(
                    "Expected to end outside the catch radius, last distance {:?}",
                    other
                )),
            });
        self.finish(ScenarioId::GpsOutlier, &walked, check)
    }

    /// Face 355°, then turn to 5°.
    ///
    /// **Assertion**: the smoothed heading stays within the short arc
    /// through north and settles on 5°.
    fn run_compass_wrap(&self, goal: &TargetObject, export: &mut SimExport) -> ScenarioResult {
        let mut oracle = self.oracle(goal);
        oracle.set_convention(CompassConvention::Alpha);
        oracle.place_at(0.0, -10.0);
        oracle.set_facing(355.0);
        oracle.schedule_facing(5.0, 5.0);

        let duration = self.max_duration_secs.max(20.0);
        let walked = self.walk(oracle, true, duration, export, |_, _| {});

        let check = check_short_arc(&walked.headings, 355.0, 5.0).and_then(|_| {
            let needle = walked.controller.radar_frame().needle_deg;
            if needle == walked.controller.pose().heading {
                Ok(())
            } else {
                Err(format!("Radar needle {:?} does not follow heading", needle))
            }
        });
        self.finish(ScenarioId::CompassWrap, &walked, check)
    }

    /// Drives a controller from the oracle until `duration_secs`.
    ///
    /// The compass (when enabled) reports every tick, the GPS once per poll
    /// interval. Tracking starts on the first fix.
    fn walk<F>(
        &self,
        mut oracle: Oracle,
        compass: bool,
        duration_secs: f64,
        export: &mut SimExport,
        mut inspect: F,
    ) -> Walked
    where
        F: FnMut(&SessionController, &ProximityUpdate),
    {
        let ctx = SimContext::new(self.seed);
        let observer = SimObserver::new();
        let mut controller = SessionController::new(self.config.clone(), self.catalog.clone())
            .with_renderer(Box::new(RecordingRenderer::new()))
            .with_observer(Box::new(observer.clone()));

        let mut headings = Vec::new();

        let started = controller
            .begin(ctx.derive_session_id(1))
            .and_then(|_| controller.permissions_granted());
        if let Err(e) = started {
            warn!(error = %e, "Session did not start");
        }

        let dt = TICK.as_secs_f64();
        let poll_ticks = (self.config.location_poll_interval_ms / TICK.as_millis() as u64).max(1);
        let total_ticks = (duration_secs / dt).ceil() as u64;

        for tick in 1..=total_ticks {
            oracle.step(dt);
            ctx.advance_time(TICK);
            let now_ms = ctx.unix_ms();

            if compass {
                let sample = oracle.compass_sample(now_ms);
                if let Some(heading) = controller.on_orientation(&sample) {
                    headings.push(heading);
                }
            }

            if tick % poll_ticks != 0 {
                continue;
            }

            let Some(sample) = oracle.gps_sample(now_ms) else {
                controller.on_sample_missed("location");
                continue;
            };

            match controller.on_location(&sample) {
                Ok(Some(update)) => {
                    inspect(&controller, &update);
                    export.add_frame(frame(&ctx, &oracle, &controller, &update));
                }
                Ok(None) => {}
                Err(e) => debug!(error = %e, "Fix rejected"),
            }

            if controller.state() == &SessionState::Ready {
                if let Err(e) = controller.start_tracking() {
                    warn!(error = %e, "Could not start tracking");
                }
            }
        }

        if let Err(e) = controller.end() {
            debug!(error = %e, "End after walk");
        }

        Walked {
            controller,
            log: observer.snapshot(),
            headings,
            final_time_secs: ctx.now().as_secs_f64(),
        }
    }

    fn oracle(&self, goal: &TargetObject) -> Oracle {
        let ctx = SimContext::new(self.seed);
        Oracle::new(goal.anchor, ctx.derive_rng(WALKER_STREAM))
    }

    fn finish(&self, scenario: ScenarioId, walked: &Walked, check: Result<(), String>) -> ScenarioResult {
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: check.is_ok(),
            final_time_secs: walked.final_time_secs,
            final_state: walked.controller.state().to_string(),
            failure_reason: check.err(),
            metrics: ScenarioMetrics::collect(&walked.controller, &walked.log),
        }
    }

    fn failed(&self, scenario: ScenarioId, reason: String) -> ScenarioResult {
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            final_time_secs: 0.0,
            final_state: SessionState::Idle.to_string(),
            failure_reason: Some(reason),
            metrics: ScenarioMetrics::default(),
        }
    }

    // ---- Lifecycle scenarios ---------------------------------------------

    /// **Assertion**: the session fails with `PermissionDenied`, the GPS is
    /// never polled and no subscription survives.
    fn run_permission_denied(&self, goal: &TargetObject) -> ScenarioResult {
        self.run_agent(
            ScenarioId::PermissionDenied,
            goal,
            AgentSetup {
                location: LocationMode::Denied,
                ..AgentSetup::default()
            },
            |run| match &run.state {
                SessionState::Failed(FailureReason::PermissionDenied(_)) if run.polls == 0 => {
                    Ok(())
                }
                other => Err(format!(
                    "Expected Failed(PermissionDenied) with no polls, got {} after {} polls",
                    other, run.polls
                )),
            },
        )
    }

    /// **Assertion**: the session fails with `FixTimeout`, no earlier than
    /// the configured timeout.
    fn run_fix_timeout(&self, goal: &TargetObject) -> ScenarioResult {
        let timeout = self.config.fix_timeout();
        self.run_agent(
            ScenarioId::FixTimeout,
            goal,
            AgentSetup {
                location: LocationMode::Silent,
                ..AgentSetup::default()
            },
            move |run| match &run.state {
                SessionState::Failed(FailureReason::FixTimeout(_)) if run.elapsed >= timeout => {
                    Ok(())
                }
                other => Err(format!(
                    "Expected Failed(FixTimeout) after {:?}, got {} after {:?}",
                    timeout, other, run.elapsed
                )),
            },
        )
    }

    /// **Assertion**: the session fails with `SessionUnsupported`.
    fn run_immersive_unsupported(&self, goal: &TargetObject) -> ScenarioResult {
        self.run_agent(
            ScenarioId::ImmersiveUnsupported,
            goal,
            AgentSetup {
                immersive: true,
                immersive_supported: false,
                ..AgentSetup::default()
            },
            |run| match &run.state {
                SessionState::Failed(FailureReason::SessionUnsupported(_)) => Ok(()),
                other => Err(format!("Expected Failed(SessionUnsupported), got {}", other)),
            },
        )
    }

    /// **Assertion**: an anchor is established, every placement carries an
    /// anchor-space position, and ending the session clears the scene and
    /// closes the immersive session.
    fn run_immersive_placement(&self, goal: &TargetObject) -> ScenarioResult {
        self.run_agent(
            ScenarioId::ImmersivePlacement,
            goal,
            AgentSetup {
                immersive: true,
                immersive_supported: true,
                ..AgentSetup::default()
            },
            |run| {
                if run.state != SessionState::Ended {
                    return Err(format!("Expected Ended, got {}", run.state));
                }
                if !run.anchored {
                    return Err("No anchor established".to_string());
                }
                if !run.immersive_ended {
                    return Err("Immersive session left open".to_string());
                }
                let places: Vec<_> = run
                    .commands
                    .iter()
                    .filter_map(|c| match c {
                        RenderCommand::Place(p) => Some(p),
                        _ => None,
                    })
                    .collect();
                if places.is_empty() {
                    return Err("Nothing was placed".to_string());
                }
                if let Some(p) = places.iter().find(|p| p.local_position.is_none()) {
                    return Err(format!("{} placed without an anchor-space pose", p.target_id));
                }
                match run.commands.last() {
                    Some(RenderCommand::Clear) => Ok(()),
                    other => Err(format!("Expected the scene cleared last, got {:?}", other)),
                }
            },
        )
    }

    /// **Assertion**: a hit-test slower than `anchor_timeout_ms` fails the
    /// session with `AnchorUnavailable` at the deadline, not when the search
    /// finally returns, and the immersive session is closed.
    fn run_anchor_timeout(&self, goal: &TargetObject) -> ScenarioResult {
        let timeout = self.config.anchor_timeout();
        let search_time = timeout * 4;
        self.run_agent(
            ScenarioId::AnchorTimeout,
            goal,
            AgentSetup {
                immersive: true,
                immersive_supported: true,
                search_time,
                ..AgentSetup::default()
            },
            move |run| {
                match &run.state {
                    SessionState::Failed(FailureReason::AnchorUnavailable(_))
                        if run.elapsed >= timeout && run.elapsed < search_time => {}
                    other => {
                        return Err(format!(
                            "Expected Failed(AnchorUnavailable) after {:?}, got {} after {:?}",
                            timeout, other, run.elapsed
                        ))
                    }
                }
                if run.anchored {
                    return Err("Anchor established past the deadline".to_string());
                }
                if !run.immersive_ended {
                    return Err("Immersive session left open".to_string());
                }
                Ok(())
            },
        )
    }

    /// Runs a `TrackingAgent` to completion against simulated providers.
    ///
    /// The runtime starts with tokio's clock paused, so every timeout and
    /// poll interval elapses in virtual time and races resolve by deadline.
    /// `End` is queued before the run starts, so a session that reaches
    /// `Active` ends on its first tracking iteration.
    fn run_agent<F>(
        &self,
        scenario: ScenarioId,
        goal: &TargetObject,
        setup: AgentSetup,
        check: F,
    ) -> ScenarioResult
    where
        F: FnOnce(&AgentRun) -> Result<(), String>,
    {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => return self.failed(scenario, format!("Could not build runtime: {}", e)),
        };

        let mut config = self.config.clone();
        config.immersive = setup.immersive;

        let observer = SimObserver::new();
        let renderer = RecordingRenderer::new();
        let controller = SessionController::new(config, self.catalog.clone())
            .with_renderer(Box::new(renderer.clone()))
            .with_observer(Box::new(observer.clone()));

        runtime.block_on(async {
            // The paused clock lives in the runtime
            let ctx = SimContext::paused(self.seed);
            let mut oracle = Oracle::new(goal.anchor, ctx.derive_rng(WALKER_STREAM));
            oracle.place_at(0.0, -(goal.visibility_radius_m / 2.0));
            let oracle = Arc::new(Mutex::new(oracle));

            let location = Arc::new(SimLocationProvider::new(
                ctx.clone(),
                oracle.clone(),
                setup.location,
            ));
            let compass = Arc::new(SimOrientationProvider::new(ctx.clone(), oracle, TICK));
            let immersive = Arc::new(SimImmersive::new(
                ctx.clone(),
                setup.immersive_supported,
                setup.search_time,
            ));
            let sensors = SensorSuite {
                location: location.clone(),
                camera: Arc::new(SimCameraProvider::new(true)),
                orientation: Some(compass.clone()),
                immersive: Some(immersive.clone()),
            };

            let mut agent = TrackingAgent::new(Arc::new(ctx.clone()), controller, sensors);
            let (tx, rx) = mpsc::channel(1);
            if let Err(e) = tx.try_send(SessionCommand::End) {
                return self.failed(scenario, format!("Could not queue end: {}", e));
            }

            let outcome = agent.run(rx).await;
            drop(tx);
            let finished_at = ctx.now();
            debug!(?outcome, "Agent finished");

            let run = AgentRun {
                state: outcome.state.clone(),
                elapsed: outcome.elapsed,
                polls: location.polls(),
                anchored: agent.controller().anchor().is_some(),
                immersive_ended: immersive.ended(),
                commands: renderer.commands(),
            };

            let quiet = check_quiet(&agent, &ctx, &location, &compass).await;
            let check = quiet.and_then(|()| check(&run));

            ScenarioResult {
                scenario,
                seed: self.seed,
                passed: check.is_ok(),
                final_time_secs: finished_at.as_secs_f64(),
                final_state: run.state.to_string(),
                failure_reason: check.err(),
                metrics: ScenarioMetrics::collect(agent.controller(), &observer.snapshot()),
            }
        })
    }
}

/// A finished agent must leave no sensor task running: nothing may call
/// either provider during another `QUIET_WINDOW` of virtual time.
async fn check_quiet(
    agent: &TrackingAgent<SimContext>,
    ctx: &SimContext,
    location: &SimLocationProvider,
    compass: &SimOrientationProvider,
) -> Result<(), String> {
    let live = agent.active_subscriptions();
    if live > 0 {
        return Err(format!("{} subscriptions still live after teardown", live));
    }

    let (polls, samples) = (location.polls(), compass.samples());
    ctx.sleep(QUIET_WINDOW).await;
    let (late_polls, late_samples) = (location.polls() - polls, compass.samples() - samples);
    if late_polls > 0 || late_samples > 0 {
        return Err(format!(
            "Sensors used after teardown: {} GPS polls, {} compass samples",
            late_polls, late_samples
        ));
    }
    Ok(())
}

/// Provider behavior for a lifecycle scenario.
struct AgentSetup {
    location: LocationMode,
    immersive: bool,
    immersive_supported: bool,
    /// How long the hit-test takes to find a surface
    search_time: Duration,
}

impl Default for AgentSetup {
    fn default() -> Self {
        Self {
            location: LocationMode::Normal,
            immersive: false,
            immersive_supported: true,
            search_time: Duration::from_secs(2),
        }
    }
}

/// What a lifecycle scenario observed.
struct AgentRun {
    state: SessionState,
    elapsed: Duration,
    polls: usize,
    anchored: bool,
    immersive_ended: bool,
    commands: Vec<RenderCommand>,
}

/// Follows one target across fixes.
struct CatchWatch {
    target_id: String,
    catch_radius_m: f64,
    caught: bool,
    inside: bool,
    entries: u32,
    reverted: bool,
    last_distance: Option<f64>,
}

impl CatchWatch {
    fn new(goal: &TargetObject) -> Self {
        Self {
            target_id: goal.id.clone(),
            catch_radius_m: goal.catch_radius_m,
            caught: false,
            inside: false,
            entries: 0,
            reverted: false,
            last_distance: None,
        }
    }

    fn observe(&mut self, update: &ProximityUpdate) {
        let Some(state) = update.states.iter().find(|s| s.target_id == self.target_id) else {
            return;
        };

        let inside = state.distance_m <= self.catch_radius_m;
        if inside && !self.inside {
            self.entries += 1;
        }
        self.inside = inside;

        if self.caught && !state.caught {
            self.reverted = true;
        }
        self.caught |= state.caught;
        self.last_distance = Some(state.distance_m);
    }

    fn verify(&self) -> Result<(), String> {
        if self.reverted {
            return Err(format!("{} was un-caught", self.target_id));
        }
        if !self.caught {
            return Err(format!("{} was never caught", self.target_id));
        }
        Ok(())
    }
}

fn at_most_one_notification(log: &ObserverLog) -> Result<(), String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for catch in &log.catches {
        *counts.entry(catch.target_id.as_str()).or_default() += 1;
    }
    match counts.iter().find(|(_, n)| **n > 1) {
        Some((id, n)) => Err(format!("{} notified {} times", id, n)),
        None => Ok(()),
    }
}

fn expect_caught_once(walked: &Walked, goal: &TargetObject) -> Result<(), String> {
    let caught = walked
        .controller
        .states()
        .iter()
        .any(|s| s.target_id == goal.id && s.caught);
    if !caught {
        return Err(format!("{} not caught", goal.id));
    }

    let notifications = walked
        .log
        .catches
        .iter()
        .filter(|c| c.target_id == goal.id)
        .count();
    if notifications != 1 {
        return Err(format!(
            "{} notified {} times, expected once",
            goal.id, notifications
        ));
    }
    Ok(())
}

/// Every heading must lie on the short arc from `from` to `to`, and the
/// last one must have settled on `to`.
fn check_short_arc(headings: &[f64], from: f64, to: f64) -> Result<(), String> {
    let span = shortest_delta_degrees(from, to);
    for h in headings {
        let progress = shortest_delta_degrees(from, *h);
        if progress * span.signum() < -1e-9 || progress.abs() > span.abs() + 1e-9 {
            return Err(format!("Heading {:.2} left the short arc {} -> {}", h, from, to));
        }
    }

    match headings.last() {
        Some(last) if shortest_delta_degrees(*last, to).abs() < 0.5 => Ok(()),
        last => Err(format!("Heading settled at {:?}, expected {}", last, to)),
    }
}

fn frame(
    ctx: &SimContext,
    oracle: &Oracle,
    controller: &SessionController,
    update: &ProximityUpdate,
) -> SimFrame {
    let events = update
        .events
        .iter()
        .map(|e| match e {
            ProximityEvent::Shown { target_id } => SimEvent::info(format!("{} shown", target_id)),
            ProximityEvent::Hidden { target_id } => SimEvent::info(format!("{} hidden", target_id)),
            ProximityEvent::Caught(c) => {
                SimEvent::info(format!("{} caught at {:.2}m", c.target_id, c.distance_m))
            }
        })
        .collect();

    SimFrame {
        time_sec: ctx.now().as_secs_f64(),
        true_position: oracle.true_position().into(),
        observed_position: controller.pose().position.map(Into::into),
        heading_deg: controller.pose().heading,
        targets: update.states.iter().map(TargetFrame::from).collect(),
        events,
    }
}
