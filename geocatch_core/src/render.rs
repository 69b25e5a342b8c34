//! Rendering boundary - placement commands for an external 3D renderer
//!
//! The core never touches a scene graph. It tells a `Renderer` where each
//! visible target sits relative to the user (East/North meters, plus an
//! anchor-space position in immersive sessions) and when to drop it.

use nalgebra::{Isometry3, Point3, Quaternion, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use geocatch_env::AnchorSample;

use crate::catalog::{AssetRef, TargetObject};
use crate::config::DistanceScale;
use crate::geodesy::{distance_meters, local_offset_meters, GeoPoint, LocalOffset};
use crate::proximity::TargetRuntimeState;
use crate::session::UserPose;

/// Add or reposition one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementCommand {
    pub target_id: String,
    pub display_name: String,
    pub asset_ref: AssetRef,

    /// Offset from the user on the local tangent plane
    pub offset: LocalOffset,

    /// Position in immersive-session space, once an anchor is established
    pub local_position: Option<[f64; 3]>,

    /// Model scale for the current distance
    pub scale: f64,

    pub visible: bool,
}

/// Scene operations the core issues.
///
/// Calls arrive serialized from the session controller.
pub trait Renderer: Send {
    /// Adds the target, or moves it if already present.
    fn place(&mut self, command: &PlacementCommand);

    /// Removes the target. Unknown ids are ignored.
    fn remove(&mut self, target_id: &str);

    /// Rotates heading-dependent content (compass-aligned models).
    fn set_heading(&mut self, heading_deg: f64);

    /// Drops everything from the scene.
    fn clear(&mut self);
}

/// One recorded renderer call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RenderCommand {
    Place(PlacementCommand),
    Remove(String),
    SetHeading(f64),
    Clear,
}

/// Renderer that records every call, for headless runs and tests.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    log: Arc<Mutex<Vec<RenderCommand>>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, command: RenderCommand) {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(command);
    }

    /// Snapshot of everything recorded so far.
    pub fn commands(&self) -> Vec<RenderCommand> {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Renderer for RecordingRenderer {
    fn place(&mut self, command: &PlacementCommand) {
        self.push(RenderCommand::Place(command.clone()));
    }

    fn remove(&mut self, target_id: &str) {
        self.push(RenderCommand::Remove(target_id.to_string()));
    }

    fn set_heading(&mut self, heading_deg: f64) {
        self.push(RenderCommand::SetHeading(heading_deg));
    }

    fn clear(&mut self) {
        self.push(RenderCommand::Clear);
    }
}

/// Hit-test anchor in immersive-session space, with the compass heading the
/// device had when the anchor was established.
///
/// Session space: x = right, y = up, -z = forward (the direction the device
/// faced at `heading_deg`).
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorPose {
    isometry: Isometry3<f64>,
    heading_deg: f64,
}

impl AnchorPose {
    pub fn new(isometry: Isometry3<f64>, heading_deg: f64) -> Self {
        Self {
            isometry,
            heading_deg,
        }
    }

    /// Builds the pose from a raw hit-test result.
    pub fn from_sample(sample: &AnchorSample, heading_deg: f64) -> Self {
        let [x, y, z] = sample.position;
        let [i, j, k, w] = sample.orientation;
        let rotation = UnitQuaternion::from_quaternion(Quaternion::new(w, i, j, k));
        Self::new(
            Isometry3::from_parts(Translation3::new(x, y, z), rotation),
            heading_deg,
        )
    }

    pub fn isometry(&self) -> &Isometry3<f64> {
        &self.isometry
    }

    pub fn heading_deg(&self) -> f64 {
        self.heading_deg
    }

    /// Maps an East/North offset from the user into session space.
    ///
    /// The offset is rotated about +y by the anchor heading so that the
    /// device's forward direction at anchor time lines up with -z, then
    /// carried by the anchor transform.
    pub fn to_local(&self, offset: LocalOffset) -> [f64; 3] {
        let heading = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), self.heading_deg.to_radians());
        let planar = Point3::new(offset.east, 0.0, -offset.north);
        let p = self.isometry * (heading * planar);
        [p.x, p.y, p.z]
    }
}

/// What the planner decided for one target.
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementAction {
    Place(PlacementCommand),
    Remove(String),
}

impl PlacementAction {
    /// Forwards the action to a renderer.
    pub fn apply(&self, renderer: &mut dyn Renderer) {
        match self {
            PlacementAction::Place(cmd) => renderer.place(cmd),
            PlacementAction::Remove(id) => renderer.remove(id),
        }
    }
}

/// Turns runtime states into renderer actions.
///
/// Remembers where the user stood when each target was last placed, so small
/// GPS jitter does not keep moving models around.
#[derive(Debug, Clone)]
pub struct PlacementPlanner {
    scale: DistanceScale,
    min_movement_m: f64,
    placed: HashMap<String, GeoPoint>,
}

impl PlacementPlanner {
    pub fn new(scale: DistanceScale, min_movement_m: f64) -> Self {
        Self {
            scale,
            min_movement_m,
            placed: HashMap::new(),
        }
    }

    /// Plans placements for one pose.
    ///
    /// Visible targets are placed (or repositioned once the user moved at
    /// least `min_movement_m` since the last placement); a target that stops
    /// being visible gets exactly one remove.
    pub fn plan(
        &mut self,
        pose: &UserPose,
        targets: &[TargetObject],
        states: &[TargetRuntimeState],
        anchor: Option<&AnchorPose>,
    ) -> Vec<PlacementAction> {
        let Some(position) = pose.position else {
            return Vec::new();
        };

        let mut actions = Vec::new();
        for state in states {
            let Some(target) = targets.iter().find(|t| t.id == state.target_id) else {
                continue;
            };

            if !state.visible {
                if self.placed.remove(&target.id).is_some() {
                    actions.push(PlacementAction::Remove(target.id.clone()));
                }
                continue;
            }

            if let Some(last) = self.placed.get(&target.id) {
                if distance_meters(*last, position) < self.min_movement_m {
                    continue;
                }
            }

            let offset = local_offset_meters(position, target.anchor);
            actions.push(PlacementAction::Place(PlacementCommand {
                target_id: target.id.clone(),
                display_name: target.display_name.clone(),
                asset_ref: target.asset_ref.clone(),
                offset,
                local_position: anchor.map(|a| a.to_local(offset)),
                scale: self.scale.scale_for(state.distance_m),
                visible: true,
            }));
            self.placed.insert(target.id.clone(), position);
        }
        actions
    }

    /// Forgets all placements (the renderer is being cleared).
    pub fn reset(&mut self) {
        self.placed.clear();
    }
}
