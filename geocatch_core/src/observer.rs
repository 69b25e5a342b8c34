//! UI boundary - what the presentation layer gets told, and a ready-made
//! status readout for it.

use serde::{Deserialize, Serialize};

use crate::catalog::TargetCatalog;
use crate::proximity::{CatchEvent, TargetRuntimeState};
use crate::radar::RadarFrame;
use crate::session::{SessionState, UserPose};

/// Receives session output. Every method defaults to a no-op, so a UI
/// implements only what it draws.
pub trait SessionObserver: Send {
    /// The session moved to a new state.
    fn on_state(&mut self, _state: &SessionState) {}

    /// A GPS fix was applied and proximity recomputed.
    fn on_update(&mut self, _pose: &UserPose, _states: &[TargetRuntimeState]) {}

    /// A target was reached for the first time this session.
    fn on_caught(&mut self, _event: &CatchEvent) {}

    /// The radar needs a redraw.
    fn on_radar(&mut self, _frame: &RadarFrame) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Label shown next to each target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetLabel {
    Searching,
    Caught,
}

impl std::fmt::Display for TargetLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetLabel::Searching => write!(f, "Searching"),
            TargetLabel::Caught => write!(f, "Caught"),
        }
    }
}

/// One row of the status panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetStatus {
    pub target_id: String,
    pub display_name: String,

    /// Rounded to whole meters
    pub distance_m: u64,

    pub label: TargetLabel,
}

/// Text-ready status panel contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Six decimals, `None` before the first fix
    pub latitude: Option<String>,
    pub longitude: Option<String>,

    /// Whole degrees, `None` before the first compass sample
    pub heading_deg: Option<u32>,

    pub targets: Vec<TargetStatus>,
}

impl StatusSnapshot {
    pub fn build(pose: &UserPose, catalog: &TargetCatalog, states: &[TargetRuntimeState]) -> Self {
        let targets = states
            .iter()
            .filter_map(|state| {
                let target = catalog.get(&state.target_id)?;
                Some(TargetStatus {
                    target_id: target.id.clone(),
                    display_name: target.display_name.clone(),
                    distance_m: state.distance_m.round().max(0.0) as u64,
                    label: if state.caught {
                        TargetLabel::Caught
                    } else {
                        TargetLabel::Searching
                    },
                })
            })
            .collect();

        Self {
            latitude: pose.position.map(|p| format!("{:.6}", p.lat())),
            longitude: pose.position.map(|p| format!("{:.6}", p.lon())),
            heading_deg: pose.heading.map(|h| (h.round() as u32) % 360),
            targets,
        }
    }
}

impl std::fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.latitude, &self.longitude) {
            (Some(lat), Some(lon)) => writeln!(f, "Lat: {} Lon: {}", lat, lon)?,
            _ => writeln!(f, "Waiting for GPS...")?,
        }
        if let Some(h) = self.heading_deg {
            writeln!(f, "Heading: {}°", h)?;
        }
        for t in &self.targets {
            writeln!(f, "{}: {}m - {}", t.display_name, t.distance_m, t.label)?;
        }
        Ok(())
    }
}
