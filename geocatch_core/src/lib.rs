//! GeoCatch Core - Geospatial Tracking & Radar for location-anchored objects
//!
//! Turns a stream of GPS fixes and compass samples into everything a
//! "walk to the object" experience needs:
//! 1. **Geodesy**: haversine distance, bearing and East/North offsets
//! 2. **Heading**: circular smoothing of noisy compass readings
//! 3. **Proximity**: per-target visibility and a latching catch with a one-shot notification
//! 4. **Radar**: north-up 2D projection for the HUD widget
//! 5. **Session**: the permission → fix → placement → tracking state machine
//!
//! Rendering and UI stay outside: the core emits `PlacementCommand`s to a
//! `Renderer` and state to a `SessionObserver`, and never draws anything.

pub mod catalog;
pub mod config;
pub mod error;
pub mod geodesy;
pub mod heading;
pub mod observer;
pub mod proximity;
pub mod radar;
pub mod render;
pub mod runtime;
pub mod session;

// Re-export key types for convenience
pub use catalog::{AssetRef, TargetCatalog, TargetObject, TargetRecord};
pub use config::{DistanceScale, HeadingConfig, ProximityConfig, RadarConfig, SessionConfig};
pub use error::{CatalogError, ConfigError, FailureReason, GeoError, RuntimeError, SessionError};
pub use geodesy::{
    bearing_degrees, distance_meters, local_offset_meters, GeoPoint, LocalOffset, EARTH_RADIUS_M,
};
pub use heading::HeadingFilter;
pub use observer::{NoopObserver, SessionObserver, StatusSnapshot, TargetLabel, TargetStatus};
pub use proximity::{CatchEvent, ProximityEvent, ProximityTracker, ProximityUpdate, TargetRuntimeState};
pub use radar::{RadarBlip, RadarFrame, RadarPoint, RadarProjector};
pub use render::{
    AnchorPose, PlacementAction, PlacementCommand, PlacementPlanner, RecordingRenderer,
    RenderCommand, Renderer,
};
pub use runtime::{SensorSuite, SessionCommand, SessionOutcome, TrackingAgent};
pub use session::{SessionController, SessionState, SessionStats, UserPose};
