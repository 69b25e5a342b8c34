//! GeoCatch Deterministic Simulation Harness
//!
//! Replays whole catch sessions from a single 64-bit seed:
//! - **Time**: a virtual clock that only moves when the simulation says so
//! - **User**: an Oracle that walks waypoints and emits noisy GPS and compass readings
//! - **Device**: scripted permission, immersive and hit-test behavior
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    ScenarioRunner                       │
//! │                                                         │
//! │  ┌──────────┐  samples  ┌───────────────────┐           │
//! │  │  Oracle  │──────────►│ SessionController │──► checks │
//! │  │ (truth)  │           │ (or TrackingAgent │           │
//! │  └──────────┘           │  + Sim providers) │           │
//! │       ▲                 └───────────────────┘           │
//! │       │ virtual time                                    │
//! │  ┌────┴───────┐                                         │
//! │  │ SimContext │                                         │
//! │  └────────────┘                                         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use geocatch_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::Pacing);
//! assert!(result.passed);
//! ```

mod context;
mod exporter;
mod oracle;
mod providers;
mod runner;
pub mod scenarios;

pub use context::SimContext;
pub use exporter::{ExportError, LatLon, SimEvent, SimExport, SimFrame, TargetFrame};
pub use oracle::{CompassConvention, Oracle};
pub use providers::{
    LocationMode, ObserverLog, SharedOracle, SimCameraProvider, SimImmersive, SimLocationProvider,
    SimObserver, SimOrientationProvider,
};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
