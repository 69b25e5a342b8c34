//! GeoCatch Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" boundary between the GeoCatch tracking
//! core and the device it runs on. Everything the core needs from the outside
//! world goes through a trait defined here:
//!
//! - Time and task spawning (`GeoCatchContext`)
//! - GPS fixes (`LocationProvider`)
//! - Compass / device orientation (`OrientationProvider`)
//! - Camera permission (`CameraProvider`)
//! - Immersive rendering sessions and hit-test anchors (`ImmersiveSession`)
//!
//! Production code plugs in platform adapters and `TokioContext`; the
//! simulation harness plugs in scripted providers and a virtual clock, so a
//! whole walking session can be replayed from a single seed.
//!
//! # Example
//!
//! ```ignore
//! use geocatch_env::{GeoCatchContext, LocationProvider};
//!
//! async fn poll_loop<Ctx: GeoCatchContext, Loc: LocationProvider>(ctx: &Ctx, loc: &Loc) {
//!     loop {
//!         match loc.current_fix().await {
//!             Ok(sample) => handle_fix(sample),
//!             Err(e) if e.is_transient() => {}
//!             Err(e) => return fail(e),
//!         }
//!         ctx.sleep(Duration::from_secs(5)).await;
//!     }
//! }
//! ```

mod context;
mod sensors;
mod types;
mod error;
mod task;
mod tokio_impl;

pub use context::GeoCatchContext;
pub use sensors::{CameraProvider, ImmersiveSession, LocationProvider, OrientationProvider};
pub use types::{AnchorSample, LocationSample, OrientationSample, SessionId};
pub use error::SensorError;
pub use task::TaskGuard;
pub use tokio_impl::TokioContext;
