// Emergency dispatch simulation: lifecycle, route animation and orchestration

pub mod animator;
pub mod controller;
pub mod events;
pub mod session;
pub mod state;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

pub use animator::{AnimationFrame, AnimatorTick, RouteAnimator, sampling_step, straight_line};
pub use controller::{DispatchController, DispatchSnapshot};
pub use events::DispatchEvent;
pub use session::DispatchSession;
pub use state::{CancelReason, DispatchAction, DispatchState, IdleReason, StateKind};

/// Central emergency room the ambulance leaves from.
pub const HOSPITAL_ORIGIN: GeoPoint = GeoPoint::new(-24.005618, -46.4241265);

/// Free-form label chosen by the user during triage.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EmergencyKind(String);

impl EmergencyKind {
    pub const DEFAULT_LABEL: &'static str = "General";

    /// Triage presets offered before the call is placed.
    pub const PRESETS: [&'static str; 4] = [
        "Imminent life risk",
        "Traffic accident",
        "Sudden illness",
        "Quick call (panic)",
    ];

    /// Blank labels fall back to [`EmergencyKind::DEFAULT_LABEL`].
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let trimmed = label.trim();
        if trimmed.is_empty() {
            Self(Self::DEFAULT_LABEL.to_string())
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn label(&self) -> &str {
        &self.0
    }
}

impl Default for EmergencyKind {
    fn default() -> Self {
        Self(Self::DEFAULT_LABEL.to_string())
    }
}

impl fmt::Display for EmergencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
