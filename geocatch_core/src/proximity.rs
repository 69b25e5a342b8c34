//! Proximity Tracker - per-target distance, visibility and catch state
//!
//! Recomputed on every accepted GPS fix. Visibility follows the user in both
//! directions; catch is a latch: once a target has been reached it stays
//! caught for the rest of the session, and the caught notification fires on
//! the false→true flip only.
//!
//! Visibility may be given an exit margin (`ProximityConfig`): a visible
//! target is hidden again only past `visibility_radius + margin`. With the
//! default margin of 0 the target toggles exactly at the radius.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::catalog::TargetObject;
use crate::config::ProximityConfig;
use crate::error::SessionError;
use crate::geodesy::{bearing_degrees, distance_meters};
use crate::session::UserPose;

/// Live state of one target, recomputed every pose update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRuntimeState {
    /// Id of the `TargetObject` this state describes (lookup only)
    pub target_id: String,

    /// Haversine distance from the user (meters)
    pub distance_m: f64,

    /// Bearing from the user, clockwise from north; 0 when standing on it
    pub bearing_deg: f64,

    /// Within the visibility radius
    pub visible: bool,

    /// Reached at least once this session (never reverts)
    pub caught: bool,
}

/// One-shot notification that a target has been reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchEvent {
    pub target_id: String,
    pub display_name: String,

    /// Distance of the fix that caught it (meters)
    pub distance_m: f64,

    /// Timestamp of that fix, if known (Unix milliseconds)
    pub timestamp_ms: Option<u64>,
}

/// Lifecycle transitions produced by an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProximityEvent {
    Shown { target_id: String },
    Hidden { target_id: String },
    Caught(CatchEvent),
}

/// Result of one `ProximityTracker::update`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProximityUpdate {
    /// States in catalog order
    pub states: Vec<TargetRuntimeState>,

    /// Transitions caused by this update, in catalog order
    pub events: Vec<ProximityEvent>,
}

impl ProximityUpdate {
    /// Catch notifications contained in this update.
    pub fn catches(&self) -> impl Iterator<Item = &CatchEvent> {
        self.events.iter().filter_map(|e| match e {
            ProximityEvent::Caught(c) => Some(c),
            _ => None,
        })
    }
}

/// Owns the `TargetRuntimeState` of every target for one session.
#[derive(Debug, Clone, Default)]
pub struct ProximityTracker {
    states: Vec<TargetRuntimeState>,
    exit_margin_m: f64,
}

impl ProximityTracker {
    pub fn new(config: &ProximityConfig) -> Self {
        Self {
            states: Vec::new(),
            exit_margin_m: config.visibility_exit_margin_m.max(0.0),
        }
    }

    /// Recomputes every target against the pose.
    ///
    /// # Returns
    /// * `Ok(update)` - Fresh states plus the transitions they caused
    /// * `Err(SessionError::NoFix)` - `pose.position` is unknown; previous
    ///   states are kept untouched
    pub fn update(
        &mut self,
        pose: &UserPose,
        targets: &[TargetObject],
    ) -> Result<ProximityUpdate, SessionError> {
        let position = pose.position.ok_or(SessionError::NoFix)?;

        let previous: HashMap<&str, &TargetRuntimeState> = self
            .states
            .iter()
            .map(|s| (s.target_id.as_str(), s))
            .collect();

        let mut states = Vec::with_capacity(targets.len());
        let mut events = Vec::new();

        for target in targets {
            let prev = previous.get(target.id.as_str()).copied();
            let was_visible = prev.map_or(false, |p| p.visible);
            let was_caught = prev.map_or(false, |p| p.caught);

            let distance_m = distance_meters(position, target.anchor);
            let bearing_deg = if distance_m > 0.0 {
                bearing_degrees(position, target.anchor)
            } else {
                0.0
            };

            let visible_limit = if was_visible {
                target.visibility_radius_m + self.exit_margin_m
            } else {
                target.visibility_radius_m
            };
            let visible = distance_m <= visible_limit;
            let caught = was_caught || distance_m <= target.catch_radius_m;

            if visible && !was_visible {
                events.push(ProximityEvent::Shown {
                    target_id: target.id.clone(),
                });
            } else if !visible && was_visible {
                events.push(ProximityEvent::Hidden {
                    target_id: target.id.clone(),
                });
            }

            if caught && !was_caught {
                events.push(ProximityEvent::Caught(CatchEvent {
                    target_id: target.id.clone(),
                    display_name: target.display_name.clone(),
                    distance_m,
                    timestamp_ms: pose.last_fix_timestamp_ms,
                }));
            }

            states.push(TargetRuntimeState {
                target_id: target.id.clone(),
                distance_m,
                bearing_deg,
                visible,
                caught,
            });
        }

        self.states = states.clone();
        Ok(ProximityUpdate { states, events })
    }

    /// Latest states in catalog order (empty before the first fix).
    pub fn states(&self) -> &[TargetRuntimeState] {
        &self.states
    }

    pub fn state(&self, target_id: &str) -> Option<&TargetRuntimeState> {
        self.states.iter().find(|s| s.target_id == target_id)
    }

    /// Number of targets caught so far.
    pub fn caught_count(&self) -> usize {
        self.states.iter().filter(|s| s.caught).count()
    }

    /// Forgets all state. Only a new session may clear a catch.
    pub fn reset(&mut self) {
        self.states.clear();
    }
}
