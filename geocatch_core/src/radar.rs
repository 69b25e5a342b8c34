//! Radar Projector - targets to 2D widget coordinates
//!
//! North-up convention: the radar background (rings, cardinal labels) is
//! fixed with +y pointing to geographic north and +x to east. Only the
//! heading needle rotates. Target positions never depend on the heading.
//!
//! The projector is stateless; the same pose and targets always give the
//! same frame.

use serde::{Deserialize, Serialize};

use crate::catalog::TargetObject;
use crate::config::RadarConfig;
use crate::geodesy::{local_offset_meters, GeoPoint};
use crate::proximity::TargetRuntimeState;
use crate::session::UserPose;

/// Slack for floating-point error at the range boundary (meters)
const RANGE_EPSILON_M: f64 = 1e-6;

/// A projected point, origin at the radar center, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadarPoint {
    /// East (pixels)
    pub x: f64,

    /// North (pixels)
    pub y: f64,

    /// Inside the radar range; points outside are never drawn
    pub within_range: bool,
}

/// A target drawn on the radar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarBlip {
    pub target_id: String,
    pub x: f64,
    pub y: f64,
    pub distance_m: f64,
    pub caught: bool,
}

/// Everything the radar widget needs for one redraw.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RadarFrame {
    /// Needle direction, clockwise from north; `None` before the first compass sample
    pub needle_deg: Option<f64>,

    /// In-range targets only
    pub blips: Vec<RadarBlip>,
}

/// Maps East/North offsets into a circular widget of `pixel_radius` pixels
/// covering `range_m` meters.
#[derive(Debug, Clone, PartialEq)]
pub struct RadarProjector {
    range_m: f64,
    pixel_radius: f64,
}

impl RadarProjector {
    pub fn new(config: &RadarConfig) -> Self {
        Self {
            range_m: config.range_m,
            pixel_radius: config.pixel_radius,
        }
    }

    pub fn range_m(&self) -> f64 {
        self.range_m
    }

    pub fn pixel_radius(&self) -> f64 {
        self.pixel_radius
    }

    /// Pixels per meter
    fn scale(&self) -> f64 {
        self.pixel_radius / self.range_m
    }

    /// Projects one coordinate relative to the user.
    ///
    /// Returns `None` while the user position is unknown.
    pub fn project(&self, pose: &UserPose, target: GeoPoint) -> Option<RadarPoint> {
        let origin = pose.position?;
        let offset = local_offset_meters(origin, target);
        let s = self.scale();

        Some(RadarPoint {
            x: offset.east * s,
            y: offset.north * s,
            within_range: offset.magnitude() <= self.range_m + RANGE_EPSILON_M,
        })
    }

    /// Builds the draw list for the widget.
    ///
    /// Targets out of range (or all of them, before the first fix) are
    /// omitted. `states` only supplies the caught flag and the haversine
    /// distance and may be empty.
    pub fn frame(
        &self,
        pose: &UserPose,
        targets: &[TargetObject],
        states: &[TargetRuntimeState],
    ) -> RadarFrame {
        let blips = targets
            .iter()
            .filter_map(|target| {
                let point = self.project(pose, target.anchor)?;
                if !point.within_range {
                    return None;
                }
                let state = states.iter().find(|s| s.target_id == target.id);
                let distance_m = match (state, pose.position) {
                    (Some(s), _) => s.distance_m,
                    (None, Some(p)) => local_offset_meters(p, target.anchor).magnitude(),
                    (None, None) => return None,
                };
                Some(RadarBlip {
                    target_id: target.id.clone(),
                    x: point.x,
                    y: point.y,
                    distance_m,
                    caught: state.map_or(false, |s| s.caught),
                })
            })
            .collect();

        RadarFrame {
            needle_deg: pose.heading,
            blips,
        }
    }

    /// Converts center-origin, north-up coordinates into top-left-origin
    /// widget pixels `(left, top)`.
    pub fn to_screen(&self, x: f64, y: f64) -> (f64, f64) {
        (self.pixel_radius + x, self.pixel_radius - y)
    }
}

impl Default for RadarProjector {
    fn default() -> Self {
        Self::new(&RadarConfig::default())
    }
}
