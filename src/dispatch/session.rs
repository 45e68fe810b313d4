// The live state of a single emergency call and its transition rules

use log::debug;

use crate::errors::DispatchError;
use crate::geo::GeoPoint;

use super::{
    EmergencyKind,
    animator::{AnimationFrame, RouteAnimator},
    state::{CancelReason, DispatchAction, DispatchState, IdleReason},
};

/// One emergency call from request to reset.
///
/// Every transition checks the current state and returns
/// [`DispatchError::InvalidTransition`] without touching the session when the action
/// is not allowed. Timers live outside the session, see
/// [`DispatchController`](super::DispatchController).
#[derive(Clone, Debug)]
pub struct DispatchSession {
    id: u64,
    state: DispatchState,
    origin: GeoPoint,
    emergency_kind: Option<EmergencyKind>,
    destination: Option<GeoPoint>,
    route: Vec<GeoPoint>,
    route_is_fallback: bool,
    vehicle_position: GeoPoint,
    vehicle_heading: f64,
    animation_cursor: usize,
}

impl DispatchSession {
    /// A resting session with the vehicle parked at `origin`.
    pub fn idle(origin: GeoPoint) -> Self {
        Self {
            id: 0,
            state: DispatchState::default(),
            origin,
            emergency_kind: None,
            destination: None,
            route: Vec::new(),
            route_is_fallback: false,
            vehicle_position: origin,
            vehicle_heading: 0.,
            animation_cursor: 0,
        }
    }

    /// A freshly requested call. The caller owns id allocation.
    pub fn requested(
        id: u64,
        origin: GeoPoint,
        kind: EmergencyKind,
        destination: GeoPoint,
    ) -> Result<Self, DispatchError> {
        if !origin.is_finite() || !destination.is_finite() {
            return Err(DispatchError::InvalidInput {
                reason: format!(
                    "dispatch endpoints must be finite, got {:?} -> {:?}",
                    origin, destination
                ),
            });
        }
        Ok(Self {
            id,
            state: DispatchState::Requested,
            emergency_kind: Some(kind),
            destination: Some(destination),
            ..Self::idle(origin)
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn origin(&self) -> GeoPoint {
        self.origin
    }

    pub fn emergency_kind(&self) -> Option<&EmergencyKind> {
        self.emergency_kind.as_ref()
    }

    pub fn destination(&self) -> Option<GeoPoint> {
        self.destination
    }

    pub fn route(&self) -> &[GeoPoint] {
        &self.route
    }

    pub fn route_is_fallback(&self) -> bool {
        self.route_is_fallback
    }

    pub fn vehicle_position(&self) -> GeoPoint {
        self.vehicle_position
    }

    pub fn vehicle_heading(&self) -> f64 {
        self.vehicle_heading
    }

    pub fn animation_cursor(&self) -> usize {
        self.animation_cursor
    }

    pub fn status_text(&self) -> String {
        self.state.status_text(self.emergency_kind.as_ref())
    }

    pub fn status_title(&self) -> String {
        self.state.status_title(self.emergency_kind.as_ref())
    }

    fn ensure(&self, expected: DispatchState, action: DispatchAction) -> Result<(), DispatchError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(DispatchError::InvalidTransition {
                state: self.state.kind(),
                action,
            })
        }
    }

    fn transition(&mut self, to: DispatchState) {
        debug!(
            "Dispatch session {}: {:?} -> {:?}",
            self.id, self.state, to
        );
        self.state = to;
    }

    /// Return to `Idle`, dropping the route and parking the vehicle at the origin.
    fn reset(&mut self, reason: IdleReason) {
        self.transition(DispatchState::Idle(reason));
        self.emergency_kind = None;
        self.destination = None;
        self.route.clear();
        self.route_is_fallback = false;
        self.vehicle_position = self.origin;
        self.vehicle_heading = 0.;
        self.animation_cursor = 0;
    }

    /// Requested -> Routing. Returns the endpoints to hand to the route provider.
    pub fn begin_routing(&mut self) -> Result<(GeoPoint, GeoPoint), DispatchError> {
        self.ensure(DispatchState::Requested, DispatchAction::BeginRouting)?;
        let destination = self.destination.ok_or(DispatchError::InvalidTransition {
            state: self.state.kind(),
            action: DispatchAction::BeginRouting,
        })?;
        self.transition(DispatchState::Routing);
        Ok((self.origin, destination))
    }

    /// Routing -> EnRoute. An empty `route` switches to the straight-line fallback.
    pub fn start_route(
        &mut self,
        route: Vec<GeoPoint>,
        max_ticks: usize,
    ) -> Result<RouteAnimator, DispatchError> {
        self.ensure(DispatchState::Routing, DispatchAction::StartRoute)?;
        let destination = self.destination.ok_or(DispatchError::InvalidTransition {
            state: self.state.kind(),
            action: DispatchAction::StartRoute,
        })?;

        let fallback = route.is_empty();
        let animator = RouteAnimator::with_fallback(route, self.origin, destination, max_ticks)?;

        self.route = animator.route().to_vec();
        self.route_is_fallback = fallback;
        self.animation_cursor = 0;
        self.transition(DispatchState::EnRoute);
        Ok(animator)
    }

    pub fn apply_frame(&mut self, frame: &AnimationFrame) -> Result<(), DispatchError> {
        self.ensure(DispatchState::EnRoute, DispatchAction::AdvanceVehicle)?;
        self.vehicle_position = frame.position;
        self.vehicle_heading = frame.heading;
        self.animation_cursor = frame.index;
        Ok(())
    }

    /// EnRoute -> Arrived.
    pub fn arrive(&mut self) -> Result<(), DispatchError> {
        self.ensure(DispatchState::EnRoute, DispatchAction::Arrive)?;
        self.transition(DispatchState::Arrived);
        Ok(())
    }

    /// EnRoute -> Idle. No other state can be cancelled.
    pub fn cancel(&mut self, reason: CancelReason) -> Result<(), DispatchError> {
        self.ensure(DispatchState::EnRoute, DispatchAction::Cancel)?;
        self.reset(IdleReason::Cancelled(reason));
        Ok(())
    }

    /// Arrived -> InCare.
    pub fn confirm_arrival(&mut self) -> Result<(), DispatchError> {
        self.ensure(DispatchState::Arrived, DispatchAction::ConfirmArrival)?;
        self.transition(DispatchState::InCare);
        Ok(())
    }

    /// InCare -> Finished.
    pub fn finish(&mut self) -> Result<(), DispatchError> {
        self.ensure(DispatchState::InCare, DispatchAction::Finish)?;
        self.transition(DispatchState::Finished);
        Ok(())
    }

    /// Finished -> Cooldown.
    pub fn begin_cooldown(&mut self) -> Result<(), DispatchError> {
        self.ensure(DispatchState::Finished, DispatchAction::BeginCooldown)?;
        self.transition(DispatchState::Cooldown);
        Ok(())
    }

    /// Cooldown -> Idle, with everything reset.
    pub fn complete_cooldown(&mut self) -> Result<(), DispatchError> {
        self.ensure(DispatchState::Cooldown, DispatchAction::CompleteCooldown)?;
        self.reset(IdleReason::Reset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{AnimatorTick, HOSPITAL_ORIGIN, StateKind};

    const PATIENT: GeoPoint = GeoPoint::new(-24.01, -46.43);

    fn requested() -> DispatchSession {
        DispatchSession::requested(1, HOSPITAL_ORIGIN, EmergencyKind::new("Sudden illness"), PATIENT)
            .unwrap()
    }

    fn en_route() -> (DispatchSession, RouteAnimator) {
        let mut session = requested();
        session.begin_routing().unwrap();
        let animator = session.start_route(vec![], 100).unwrap();
        (session, animator)
    }

    fn assert_invalid(result: Result<(), DispatchError>, state: StateKind, action: DispatchAction) {
        match result {
            Err(DispatchError::InvalidTransition {
                state: s,
                action: a,
            }) => {
                assert_eq!(s, state);
                assert_eq!(a, action);
            }
            other => panic!("expected InvalidTransition, got {:?}", other),
        }
    }

    #[test]
    fn test_idle_defaults() {
        let session = DispatchSession::idle(HOSPITAL_ORIGIN);
        assert_eq!(session.state(), DispatchState::Idle(IdleReason::Awaiting));
        assert_eq!(session.vehicle_position(), HOSPITAL_ORIGIN);
        assert_eq!(session.vehicle_heading(), 0.);
        assert!(session.route().is_empty());
        assert_eq!(session.status_text(), "Awaiting request...");
    }

    #[test]
    fn test_requested_rejects_non_finite_destination() {
        let result = DispatchSession::requested(
            1,
            HOSPITAL_ORIGIN,
            EmergencyKind::default(),
            GeoPoint::new(f64::NAN, 0.),
        );
        assert!(matches!(result, Err(DispatchError::InvalidInput { .. })));
    }

    #[test]
    fn test_full_lifecycle() {
        let mut session = requested();
        assert_eq!(session.status_text(), "Requesting: Sudden illness...");

        let (origin, destination) = session.begin_routing().unwrap();
        assert_eq!(origin, HOSPITAL_ORIGIN);
        assert_eq!(destination, PATIENT);
        assert_eq!(session.state(), DispatchState::Routing);

        let mut animator = session.start_route(vec![], 100).unwrap();
        assert_eq!(session.state(), DispatchState::EnRoute);
        assert!(session.route_is_fallback());
        assert_eq!(session.route(), &[HOSPITAL_ORIGIN, PATIENT]);

        while let AnimatorTick::Moved(frame) = animator.tick() {
            session.apply_frame(&frame).unwrap();
        }
        assert_eq!(session.vehicle_position(), PATIENT);
        assert_eq!(session.animation_cursor(), 1);

        session.arrive().unwrap();
        session.confirm_arrival().unwrap();
        assert_eq!(session.status_text(), "Team providing care.");
        session.finish().unwrap();
        session.begin_cooldown().unwrap();
        assert_eq!(session.state(), DispatchState::Cooldown);
        session.complete_cooldown().unwrap();

        assert_eq!(session.state(), DispatchState::Idle(IdleReason::Reset));
        assert_eq!(session.vehicle_position(), HOSPITAL_ORIGIN);
        assert!(session.route().is_empty());
        assert!(session.emergency_kind().is_none());
    }

    #[test]
    fn test_provider_route_is_kept() {
        let mut session = requested();
        session.begin_routing().unwrap();
        let route = vec![HOSPITAL_ORIGIN, GeoPoint::new(-24.007, -46.426), PATIENT];
        session.start_route(route.clone(), 100).unwrap();
        assert_eq!(session.route(), route.as_slice());
        assert!(!session.route_is_fallback());
    }

    #[test]
    fn test_cancel_resets_to_origin() {
        let (mut session, mut animator) = en_route();
        if let AnimatorTick::Moved(frame) = animator.tick() {
            session.apply_frame(&frame).unwrap();
        }
        if let AnimatorTick::Moved(frame) = animator.tick() {
            session.apply_frame(&frame).unwrap();
        }
        assert_eq!(session.vehicle_position(), PATIENT);

        session.cancel(CancelReason::FalseAlarm).unwrap();
        assert_eq!(
            session.state(),
            DispatchState::Idle(IdleReason::Cancelled(CancelReason::FalseAlarm))
        );
        assert_eq!(session.status_text(), "Cancelled: false alarm");
        assert_eq!(session.vehicle_position(), HOSPITAL_ORIGIN);
        assert_eq!(session.vehicle_heading(), 0.);
        assert_eq!(session.animation_cursor(), 0);
        assert!(session.route().is_empty());
        assert!(!session.route_is_fallback());
    }

    #[test]
    fn test_cancel_only_while_en_route() {
        let mut session = requested();
        assert_invalid(
            session.cancel(CancelReason::Resolved),
            StateKind::Requested,
            DispatchAction::Cancel,
        );

        let (mut session, _) = en_route();
        session.arrive().unwrap();
        assert_invalid(
            session.cancel(CancelReason::Resolved),
            StateKind::Arrived,
            DispatchAction::Cancel,
        );
        session.confirm_arrival().unwrap();
        assert_invalid(
            session.cancel(CancelReason::Resolved),
            StateKind::InCare,
            DispatchAction::Cancel,
        );
        session.finish().unwrap();
        session.begin_cooldown().unwrap();
        assert_invalid(
            session.cancel(CancelReason::Resolved),
            StateKind::Cooldown,
            DispatchAction::Cancel,
        );
    }

    #[test]
    fn test_out_of_order_actions_leave_state_untouched() {
        let mut session = DispatchSession::idle(HOSPITAL_ORIGIN);
        assert_invalid(session.arrive(), StateKind::Idle, DispatchAction::Arrive);
        assert_invalid(
            session.confirm_arrival(),
            StateKind::Idle,
            DispatchAction::ConfirmArrival,
        );
        assert_invalid(session.finish(), StateKind::Idle, DispatchAction::Finish);
        assert!(session.begin_routing().is_err());
        assert_eq!(session.state(), DispatchState::Idle(IdleReason::Awaiting));

        let (mut session, _) = en_route();
        assert_invalid(session.finish(), StateKind::EnRoute, DispatchAction::Finish);
        assert_eq!(session.state(), DispatchState::EnRoute);
    }

    #[test]
    fn test_frames_rejected_outside_en_route() {
        let mut session = requested();
        let frame = AnimationFrame {
            index: 0,
            position: PATIENT,
            heading: 12.,
        };
        assert!(session.apply_frame(&frame).is_err());
        assert_eq!(session.vehicle_position(), HOSPITAL_ORIGIN);
    }
}
