// Drives dispatch sessions on tokio timers

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    time::{Instant, MissedTickBehavior, interval_at, sleep, timeout},
};
use tokio_util::sync::CancellationToken;

use crate::{
    DispatchError,
    config::DispatchConfig,
    geo::GeoPoint,
    positioning::PositionSource,
    routing::RouteProvider,
};

use super::{
    EmergencyKind,
    animator::AnimatorTick,
    events::DispatchEvent,
    session::DispatchSession,
    state::{CancelReason, DispatchAction, DispatchState, StateKind},
};

/// Read-only view of the active session, as a status panel would show it.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct DispatchSnapshot {
    pub session_id: u64,
    pub state: DispatchState,
    pub title: String,
    pub status: String,
    pub emergency_kind: Option<EmergencyKind>,
    pub origin: GeoPoint,
    pub destination: Option<GeoPoint>,
    pub route: Vec<GeoPoint>,
    pub route_is_fallback: bool,
    pub vehicle_position: GeoPoint,
    pub vehicle_heading: f64,
    pub animation_cursor: usize,
    pub actions: Vec<DispatchAction>,
}

impl From<&DispatchSession> for DispatchSnapshot {
    fn from(session: &DispatchSession) -> Self {
        Self {
            session_id: session.id(),
            state: session.state(),
            title: session.status_title(),
            status: session.status_text(),
            emergency_kind: session.emergency_kind().cloned(),
            origin: session.origin(),
            destination: session.destination(),
            route: session.route().to_vec(),
            route_is_fallback: session.route_is_fallback(),
            vehicle_position: session.vehicle_position(),
            vehicle_heading: session.vehicle_heading(),
            animation_cursor: session.animation_cursor(),
            actions: session.state().available_actions().to_vec(),
        }
    }
}

/// The active session plus the cancellation tokens of its timers.
///
/// `session_token` is the parent of `animation` and `cooldown`, so cancelling it tears
/// down every timer the session owns.
struct Slot {
    session: DispatchSession,
    next_id: u64,
    session_token: CancellationToken,
    animation: Option<CancellationToken>,
    cooldown: Option<CancellationToken>,
}

impl Slot {
    fn cancel_timers(&mut self) {
        self.session_token.cancel();
        if let Some(token) = self.animation.take() {
            token.cancel();
        }
        if let Some(token) = self.cooldown.take() {
            token.cancel();
        }
    }

    /// True when a continuation scheduled for `session_id` under `token` may still run.
    fn is_current(&self, session_id: u64, token: &CancellationToken) -> bool {
        !token.is_cancelled() && self.session.id() == session_id
    }
}

struct Inner {
    config: DispatchConfig,
    route_provider: Arc<dyn RouteProvider>,
    position_source: Arc<dyn PositionSource>,
    events: UnboundedSender<DispatchEvent>,
    slot: Mutex<Slot>,
}

/// Owns the single active [`DispatchSession`] and schedules everything that happens to
/// it over time: the dispatch delay, the route lookup, the animation ticks and the
/// post-incident cooldown.
///
/// Must be used from within a tokio runtime. Dropping the controller cancels every
/// outstanding timer.
pub struct DispatchController {
    inner: Arc<Inner>,
}

impl DispatchController {
    /// Create a controller and the receiving end of its event stream.
    pub fn new(
        config: DispatchConfig,
        route_provider: Arc<dyn RouteProvider>,
        position_source: Arc<dyn PositionSource>,
    ) -> (Self, UnboundedReceiver<DispatchEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let session = DispatchSession::idle(config.origin);
        let inner = Inner {
            config,
            route_provider,
            position_source,
            events,
            slot: Mutex::new(Slot {
                session,
                next_id: 1,
                session_token: CancellationToken::new(),
                animation: None,
                cooldown: None,
            }),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            events_rx,
        )
    }

    pub fn snapshot(&self) -> DispatchSnapshot {
        self.inner.with_slot(|slot| DispatchSnapshot::from(&slot.session))
    }

    pub fn state(&self) -> DispatchState {
        self.inner.with_slot(|slot| slot.session.state())
    }

    /// True while an animation timer of the active session is scheduled.
    pub fn has_live_animation(&self) -> bool {
        self.inner.with_slot(|slot| {
            slot.animation
                .as_ref()
                .is_some_and(|token| !token.is_cancelled())
        })
    }

    /// True while a cooldown timer of the active session is scheduled.
    pub fn has_live_cooldown(&self) -> bool {
        self.inner.with_slot(|slot| {
            slot.cooldown
                .as_ref()
                .is_some_and(|token| !token.is_cancelled())
        })
    }

    /// Place an emergency call for the user's current location.
    ///
    /// Replaces any active session, cancelling its timers, except during the
    /// post-incident cooldown. Returns the new session id.
    pub async fn request(&self, kind: EmergencyKind) -> Result<u64, DispatchError> {
        self.inner.with_slot(|slot| slot.ensure_accepts_request())?;

        let destination = match self.inner.position_source.current_position().await {
            Ok(position) => position,
            Err(e) => {
                warn!("Cannot place emergency call: {}", e);
                self.inner.emit(DispatchEvent::LocationUnavailable {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let (session_id, token) = self.inner.with_slot(|slot| {
            // the cooldown may have started while the position was being fetched
            slot.ensure_accepts_request()?;
            let session = DispatchSession::requested(
                slot.next_id,
                self.inner.config.origin,
                kind,
                destination,
            )?;

            if !slot.session.state().is_idle() {
                info!(
                    "Emergency call {} superseded by call {}",
                    slot.session.id(),
                    session.id()
                );
            }
            slot.cancel_timers();
            slot.next_id += 1;
            slot.session = session;
            slot.session_token = CancellationToken::new();

            self.inner.emit_status(&slot.session);
            Ok::<_, DispatchError>((slot.session.id(), slot.session_token.clone()))
        })?;

        info!(
            "Emergency call {} placed for {}",
            session_id, destination
        );
        tokio::spawn(Arc::clone(&self.inner).run_session(session_id, token));
        Ok(session_id)
    }

    /// Call off the unit while it is on its way.
    pub fn cancel(&self, reason: CancelReason) -> Result<(), DispatchError> {
        self.inner.with_slot(|slot| {
            slot.session.cancel(reason)?;
            slot.cancel_timers();
            info!(
                "Emergency call {} cancelled: {}",
                slot.session.id(),
                reason.description()
            );
            self.inner.emit(DispatchEvent::Cancelled {
                session_id: slot.session.id(),
                reason,
            });
            self.inner.emit_status(&slot.session);
            Ok(())
        })
    }

    /// The user confirms the rescue team is with them.
    pub fn confirm_arrival(&self) -> Result<(), DispatchError> {
        self.inner.with_slot(|slot| {
            slot.session.confirm_arrival()?;
            self.inner.emit_status(&slot.session);
            Ok(())
        })
    }

    /// The user confirms care is complete. Starts the cooldown that resets the dispatcher.
    pub fn finish(&self) -> Result<(), DispatchError> {
        let (session_id, token) = self.inner.with_slot(|slot| {
            slot.session.finish()?;
            self.inner.emit_status(&slot.session);
            slot.session.begin_cooldown()?;
            self.inner.emit_status(&slot.session);

            if let Some(previous) = slot.cooldown.take() {
                previous.cancel();
            }
            let token = slot.session_token.child_token();
            slot.cooldown = Some(token.clone());
            Ok::<_, DispatchError>((slot.session.id(), token))
        })?;

        tokio::spawn(Arc::clone(&self.inner).run_cooldown(session_id, token));
        Ok(())
    }

    /// Cancel every outstanding timer. The session state is left as it is.
    pub fn shutdown(&self) {
        self.inner.with_slot(|slot| slot.cancel_timers());
    }
}

impl Drop for DispatchController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Slot {
    fn ensure_accepts_request(&self) -> Result<(), DispatchError> {
        match self.session.state().kind() {
            StateKind::Cooldown | StateKind::Finished => Err(DispatchError::InvalidTransition {
                state: self.session.state().kind(),
                action: DispatchAction::Request,
            }),
            _ => Ok(()),
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with the slot locked. Keeps guards out of async state machines.
    fn with_slot<R>(&self, f: impl FnOnce(&mut Slot) -> R) -> R {
        let mut slot = self.lock();
        f(&mut slot)
    }

    fn emit(&self, event: DispatchEvent) {
        if self.events.send(event).is_err() {
            debug!("Dispatch event dropped, no receiver");
        }
    }

    fn emit_status(&self, session: &DispatchSession) {
        self.emit(DispatchEvent::StatusChanged {
            session_id: session.id(),
            state: session.state().kind(),
            title: session.status_title(),
            text: session.status_text(),
        });
    }

    async fn run_session(self: Arc<Self>, session_id: u64, token: CancellationToken) {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = sleep(self.config.dispatch_delay()) => {}
        }

        let endpoints = self.with_slot(|slot| {
            if !slot.is_current(session_id, &token) {
                return None;
            }
            match slot.session.begin_routing() {
                Ok(endpoints) => {
                    self.emit_status(&slot.session);
                    Some(endpoints)
                }
                Err(e) => {
                    debug!("Session {} not routed: {}", session_id, e);
                    None
                }
            }
        });
        let Some((origin, destination)) = endpoints else {
            return;
        };

        let route = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            route = self.lookup_route(origin, destination) => route,
        };

        self.run_animation(session_id, token, route).await;
    }

    /// Ask the provider for a path. Every failure, including a timeout or a path with
    /// non-finite waypoints, yields an empty path so the caller falls back to the straight
    /// line. No retries.
    async fn lookup_route(&self, origin: GeoPoint, destination: GeoPoint) -> Vec<GeoPoint> {
        let provider = self.route_provider.name();
        match timeout(
            self.config.route_timeout(),
            self.route_provider.route(origin, destination),
        )
        .await
        {
            Ok(Ok(route)) if route.is_empty() => {
                warn!("Route provider {} found no path, using straight line", provider);
                Vec::new()
            }
            Ok(Ok(route)) if !route.iter().all(GeoPoint::is_finite) => {
                warn!(
                    "Route provider {} returned non-finite waypoints, using straight line",
                    provider
                );
                Vec::new()
            }
            Ok(Ok(route)) => route,
            Ok(Err(e)) if e.is_route_lookup() => {
                warn!(
                    "Route provider {} failed, using straight line: {}",
                    provider, e
                );
                Vec::new()
            }
            Ok(Err(e)) => {
                error!(
                    "Route provider {} raised an unexpected error, using straight line: {}",
                    provider, e
                );
                Vec::new()
            }
            Err(_) => {
                let e = DispatchError::RouteLookupTimeout {
                    timeout_ms: self.config.route_timeout_ms,
                };
                warn!("Route provider {}: {}, using straight line", provider, e);
                Vec::new()
            }
        }
    }

    async fn run_animation(
        self: Arc<Self>,
        session_id: u64,
        session_token: CancellationToken,
        route: Vec<GeoPoint>,
    ) {
        let started = self.with_slot(|slot| {
            if !slot.is_current(session_id, &session_token) {
                return None;
            }
            let animator = match slot
                .session
                .start_route(route, self.config.max_animation_ticks)
            {
                Ok(animator) => animator,
                Err(e) => {
                    warn!("Session {} cannot start its route: {}", session_id, e);
                    return None;
                }
            };

            // at most one animation timer per session
            if let Some(previous) = slot.animation.take() {
                previous.cancel();
            }
            let token = session_token.child_token();
            slot.animation = Some(token.clone());

            self.emit(DispatchEvent::RouteReady {
                session_id,
                points: animator.route().to_vec(),
                fallback: slot.session.route_is_fallback(),
            });
            self.emit_status(&slot.session);
            Some((animator, token))
        });
        let Some((mut animator, token)) = started else {
            return;
        };

        debug!(
            "Animating session {} over {} waypoints, step {}",
            session_id,
            animator.route().len(),
            animator.step()
        );

        let period = self.config.tick_period();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    animator.cancel();
                    return;
                }
                _ = ticker.tick() => {}
            }

            let finished = self.with_slot(|slot| {
                if !slot.is_current(session_id, &token) {
                    animator.cancel();
                    return true;
                }
                match animator.tick() {
                    AnimatorTick::Moved(frame) => {
                        if let Err(e) = slot.session.apply_frame(&frame) {
                            debug!("Dropping frame for session {}: {}", session_id, e);
                            animator.cancel();
                            return true;
                        }
                        self.emit(DispatchEvent::VehicleMoved {
                            session_id,
                            index: frame.index,
                            position: frame.position,
                            heading: frame.heading,
                        });
                        false
                    }
                    AnimatorTick::Arrived => {
                        token.cancel();
                        slot.animation = None;
                        if let Err(e) = slot.session.arrive() {
                            debug!("Session {} cannot arrive: {}", session_id, e);
                            return true;
                        }
                        info!("Emergency call {}: unit arrived", session_id);
                        self.emit(DispatchEvent::Arrived { session_id });
                        self.emit_status(&slot.session);
                        true
                    }
                    AnimatorTick::Stopped => true,
                }
            });
            if finished {
                return;
            }
        }
    }

    async fn run_cooldown(self: Arc<Self>, session_id: u64, token: CancellationToken) {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = sleep(self.config.cooldown()) => {}
        }

        self.with_slot(|slot| {
            if !slot.is_current(session_id, &token) {
                return;
            }
            slot.cooldown = None;
            match slot.session.complete_cooldown() {
                Ok(()) => {
                    info!("Emergency call {} closed, dispatcher ready", session_id);
                    self.emit(DispatchEvent::Reset { session_id });
                    self.emit_status(&slot.session);
                }
                Err(e) => debug!("Session {} cooldown ignored: {}", session_id, e),
            }
        });
    }
}
