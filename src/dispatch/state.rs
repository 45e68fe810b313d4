// Dispatch lifecycle states and the text shown for each of them

use serde::{Deserialize, Serialize};

use super::EmergencyKind;

/// Why the user called off an emergency while the unit was on its way.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    FalseAlarm,
    Resolved,
}

impl CancelReason {
    pub fn description(&self) -> &'static str {
        match self {
            CancelReason::FalseAlarm => "false alarm",
            CancelReason::Resolved => "situation resolved",
        }
    }
}

/// How the dispatcher came to rest in `Idle`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum IdleReason {
    /// Nothing has been requested yet.
    #[default]
    Awaiting,
    Cancelled(CancelReason),
    /// The cooldown after a finished incident elapsed.
    Reset,
}

/// The single source of truth for where an emergency call stands.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchState {
    Idle(IdleReason),
    Requested,
    Routing,
    EnRoute,
    Arrived,
    InCare,
    Finished,
    Cooldown,
}

impl Default for DispatchState {
    fn default() -> Self {
        DispatchState::Idle(IdleReason::Awaiting)
    }
}

/// Fieldless mirror of [`DispatchState`], used in errors and events.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateKind {
    Idle,
    Requested,
    Routing,
    EnRoute,
    Arrived,
    InCare,
    Finished,
    Cooldown,
}

/// Everything that can move a session from one state to another.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchAction {
    // user actions
    Request,
    Cancel,
    ConfirmArrival,
    Finish,

    // timer and provider driven
    BeginRouting,
    StartRoute,
    AdvanceVehicle,
    Arrive,
    BeginCooldown,
    CompleteCooldown,
}

impl DispatchState {
    pub fn kind(&self) -> StateKind {
        match self {
            DispatchState::Idle(_) => StateKind::Idle,
            DispatchState::Requested => StateKind::Requested,
            DispatchState::Routing => StateKind::Routing,
            DispatchState::EnRoute => StateKind::EnRoute,
            DispatchState::Arrived => StateKind::Arrived,
            DispatchState::InCare => StateKind::InCare,
            DispatchState::Finished => StateKind::Finished,
            DispatchState::Cooldown => StateKind::Cooldown,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, DispatchState::Idle(_))
    }

    /// Status line for the panel. Depends only on the state and the emergency kind.
    pub fn status_text(&self, kind: Option<&EmergencyKind>) -> String {
        match self {
            DispatchState::Idle(IdleReason::Awaiting) => "Awaiting request...".to_string(),
            DispatchState::Idle(IdleReason::Cancelled(reason)) => {
                format!("Cancelled: {}", reason.description())
            }
            DispatchState::Idle(IdleReason::Reset) => "Ready for a new request".to_string(),
            DispatchState::Requested => format!(
                "Requesting: {}...",
                kind.map(EmergencyKind::label).unwrap_or(EmergencyKind::DEFAULT_LABEL)
            ),
            DispatchState::Routing => "Calculating rescue route...".to_string(),
            DispatchState::EnRoute => "Unit en route - maximum priority".to_string(),
            DispatchState::Arrived => "The unit has arrived at your location!".to_string(),
            DispatchState::InCare => "Team providing care.".to_string(),
            DispatchState::Finished => "Incident closed successfully".to_string(),
            DispatchState::Cooldown => "Incident closed. Resetting system...".to_string(),
        }
    }

    /// Heading of the status panel.
    pub fn status_title(&self, kind: Option<&EmergencyKind>) -> String {
        match (self, kind) {
            (DispatchState::Idle(_), _) | (_, None) => "STATUS".to_string(),
            (_, Some(kind)) => format!("EMERGENCY: {}", kind.label().to_uppercase()),
        }
    }

    /// The buttons the status panel offers in this state.
    pub fn available_actions(&self) -> &'static [DispatchAction] {
        match self {
            DispatchState::Idle(_) => &[DispatchAction::Request],
            DispatchState::EnRoute => &[DispatchAction::Cancel],
            DispatchState::Arrived => &[DispatchAction::ConfirmArrival],
            DispatchState::InCare => &[DispatchAction::Finish],
            DispatchState::Requested
            | DispatchState::Routing
            | DispatchState::Finished
            | DispatchState::Cooldown => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text_per_state() {
        let kind = EmergencyKind::new("Traffic accident");
        let kind = Some(&kind);

        assert_eq!(
            DispatchState::default().status_text(kind),
            "Awaiting request..."
        );
        assert_eq!(
            DispatchState::Requested.status_text(kind),
            "Requesting: Traffic accident..."
        );
        assert_eq!(
            DispatchState::Routing.status_text(kind),
            "Calculating rescue route..."
        );
        assert_eq!(
            DispatchState::EnRoute.status_text(kind),
            "Unit en route - maximum priority"
        );
        assert_eq!(
            DispatchState::Arrived.status_text(kind),
            "The unit has arrived at your location!"
        );
        assert_eq!(DispatchState::InCare.status_text(kind), "Team providing care.");
        assert_eq!(
            DispatchState::Cooldown.status_text(kind),
            "Incident closed. Resetting system..."
        );
        assert_eq!(
            DispatchState::Idle(IdleReason::Reset).status_text(None),
            "Ready for a new request"
        );
    }

    #[test]
    fn test_cancelled_status_reflects_reason() {
        assert_eq!(
            DispatchState::Idle(IdleReason::Cancelled(CancelReason::FalseAlarm)).status_text(None),
            "Cancelled: false alarm"
        );
        assert_eq!(
            DispatchState::Idle(IdleReason::Cancelled(CancelReason::Resolved)).status_text(None),
            "Cancelled: situation resolved"
        );
    }

    #[test]
    fn test_requested_without_kind_uses_default_label() {
        assert_eq!(
            DispatchState::Requested.status_text(None),
            "Requesting: General..."
        );
    }

    #[test]
    fn test_status_title() {
        let kind = EmergencyKind::new("Sudden illness");
        assert_eq!(
            DispatchState::EnRoute.status_title(Some(&kind)),
            "EMERGENCY: SUDDEN ILLNESS"
        );
        assert_eq!(
            DispatchState::Idle(IdleReason::Reset).status_title(Some(&kind)),
            "STATUS"
        );
        assert_eq!(DispatchState::EnRoute.status_title(None), "STATUS");
    }

    #[test]
    fn test_only_en_route_can_be_cancelled() {
        let states = [
            DispatchState::default(),
            DispatchState::Requested,
            DispatchState::Routing,
            DispatchState::EnRoute,
            DispatchState::Arrived,
            DispatchState::InCare,
            DispatchState::Finished,
            DispatchState::Cooldown,
        ];
        for state in states {
            let cancellable = state.available_actions().contains(&DispatchAction::Cancel);
            assert_eq!(cancellable, state == DispatchState::EnRoute, "{:?}", state);
        }
    }
}
