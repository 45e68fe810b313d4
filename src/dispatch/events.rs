use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

use super::state::{CancelReason, StateKind};

/// Notifications published by the [`DispatchController`](super::DispatchController)
/// for whatever is rendering the call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum DispatchEvent {
    StatusChanged {
        session_id: u64,
        state: StateKind,
        title: String,
        text: String,
    },
    RouteReady {
        session_id: u64,
        points: Vec<GeoPoint>,
        /// True when the straight-line fallback replaced the provider's route.
        fallback: bool,
    },
    VehicleMoved {
        session_id: u64,
        index: usize,
        position: GeoPoint,
        heading: f64,
    },
    Arrived {
        session_id: u64,
    },
    Cancelled {
        session_id: u64,
        reason: CancelReason,
    },
    Reset {
        session_id: u64,
    },
    LocationUnavailable {
        reason: String,
    },
}

impl DispatchEvent {
    pub fn session_id(&self) -> Option<u64> {
        match self {
            DispatchEvent::StatusChanged { session_id, .. }
            | DispatchEvent::RouteReady { session_id, .. }
            | DispatchEvent::VehicleMoved { session_id, .. }
            | DispatchEvent::Arrived { session_id }
            | DispatchEvent::Cancelled { session_id, .. }
            | DispatchEvent::Reset { session_id } => Some(*session_id),
            DispatchEvent::LocationUnavailable { .. } => None,
        }
    }
}
