//! Named end-to-end scenarios.

use serde::Serialize;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// Walk onto a target; exactly one catch
    Approach,

    /// Cross a catch radius back and forth; still one notification
    Pacing,

    /// One spurious fix lands inside the catch radius
    GpsOutlier,

    /// Compass turns across north
    CompassWrap,

    /// User refuses location access
    PermissionDenied,

    /// GPS never answers
    FixTimeout,

    /// Device has no immersive mode
    ImmersiveUnsupported,

    /// Anchor found, targets placed in anchor space
    ImmersivePlacement,

    /// Hit-test outlasts the anchor deadline
    AnchorTimeout,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Approach,
            ScenarioId::Pacing,
            ScenarioId::GpsOutlier,
            ScenarioId::CompassWrap,
            ScenarioId::PermissionDenied,
            ScenarioId::FixTimeout,
            ScenarioId::ImmersiveUnsupported,
            ScenarioId::ImmersivePlacement,
            ScenarioId::AnchorTimeout,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Approach => "approach",
            ScenarioId::Pacing => "pacing",
            ScenarioId::GpsOutlier => "gps_outlier",
            ScenarioId::CompassWrap => "compass_wrap",
            ScenarioId::PermissionDenied => "permission_denied",
            ScenarioId::FixTimeout => "fix_timeout",
            ScenarioId::ImmersiveUnsupported => "immersive_unsupported",
            ScenarioId::ImmersivePlacement => "immersive_placement",
            ScenarioId::AnchorTimeout => "anchor_timeout",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Approach => "Walk 20m onto a target with noisy GPS, expect one catch",
            ScenarioId::Pacing => "Pace across the catch radius 3 times, expect one notification",
            ScenarioId::GpsOutlier => "Single outlier fix inside the radius catches for good",
            ScenarioId::CompassWrap => "Turn from 355 to 5 degrees, needle takes the short way",
            ScenarioId::PermissionDenied => "Location refused, session fails without polling",
            ScenarioId::FixTimeout => "No fix within the timeout, session fails",
            ScenarioId::ImmersiveUnsupported => "Immersive mode missing, session fails",
            ScenarioId::ImmersivePlacement => "Anchor found, placements carry anchor-space poses",
            ScenarioId::AnchorTimeout => "Hit-test slower than the anchor deadline, session fails",
        }
    }

    /// Returns true if the scenario runs through the async `TrackingAgent`.
    pub fn uses_runtime(&self) -> bool {
        matches!(
            self,
            ScenarioId::PermissionDenied
                | ScenarioId::FixTimeout
                | ScenarioId::ImmersiveUnsupported
                | ScenarioId::ImmersivePlacement
                | ScenarioId::AnchorTimeout
        )
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "approach" => Ok(ScenarioId::Approach),
            "pacing" => Ok(ScenarioId::Pacing),
            "gps_outlier" | "outlier" => Ok(ScenarioId::GpsOutlier),
            "compass_wrap" | "wrap" => Ok(ScenarioId::CompassWrap),
            "permission_denied" | "denied" => Ok(ScenarioId::PermissionDenied),
            "fix_timeout" | "timeout" => Ok(ScenarioId::FixTimeout),
            "immersive_unsupported" => Ok(ScenarioId::ImmersiveUnsupported),
            "immersive_placement" | "immersive" => Ok(ScenarioId::ImmersivePlacement),
            "anchor_timeout" => Ok(ScenarioId::AnchorTimeout),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>(), Ok(id));
        }
        assert_eq!("GPS-Outlier".parse::<ScenarioId>(), Ok(ScenarioId::GpsOutlier));
        assert!("swarm".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_runtime_split() {
        let runtime = ScenarioId::all().into_iter().filter(|s| s.uses_runtime()).count();
        assert_eq!(runtime, 5);
    }
}
