// Samples a route down to a bounded number of animation ticks

use serde::{Deserialize, Serialize};

use crate::errors::DispatchError;
use crate::geo::GeoPoint;

/// Upper bound on ticks used to sweep a route, regardless of its waypoint density.
pub const DEFAULT_MAX_TICKS: usize = 100;

/// One animation step: where the vehicle is and which way it faces.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct AnimationFrame {
    /// Index into the route that produced this frame.
    pub index: usize,
    pub position: GeoPoint,
    pub heading: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnimatorTick {
    Moved(AnimationFrame),
    /// The route is exhausted. Returned exactly once.
    Arrived,
    /// Already arrived or cancelled; nothing left to do.
    Stopped,
}

/// Stride between sampled waypoints: `max(1, ceil(len / max_ticks))`.
pub fn sampling_step(route_len: usize, max_ticks: usize) -> usize {
    route_len.div_ceil(max_ticks.max(1)).max(1)
}

/// Synthetic two-point route used when no drivable path is available.
pub fn straight_line(origin: GeoPoint, destination: GeoPoint) -> Vec<GeoPoint> {
    vec![origin, destination]
}

/// Walks a vehicle along a route one sampled waypoint per tick.
///
/// The animator does not own a timer; the caller decides when to call [`RouteAnimator::tick`].
#[derive(Clone, Debug)]
pub struct RouteAnimator {
    route: Vec<GeoPoint>,
    step: usize,
    cursor: usize,
    arrived: bool,
    cancelled: bool,
}

impl RouteAnimator {
    /// Create an animator over a non-empty route of finite points.
    pub fn new(route: Vec<GeoPoint>, max_ticks: usize) -> Result<Self, DispatchError> {
        if route.is_empty() {
            return Err(DispatchError::InvalidInput {
                reason: "cannot animate an empty route".to_string(),
            });
        }
        if let Some(bad) = route.iter().find(|p| !p.is_finite()) {
            return Err(DispatchError::InvalidInput {
                reason: format!("route contains non-finite point {:?}", bad),
            });
        }

        let step = sampling_step(route.len(), max_ticks);
        Ok(Self {
            route,
            step,
            cursor: 0,
            arrived: false,
            cancelled: false,
        })
    }

    /// Like [`RouteAnimator::new`], but an empty route is replaced by the straight line
    /// from `origin` to `destination`.
    pub fn with_fallback(
        route: Vec<GeoPoint>,
        origin: GeoPoint,
        destination: GeoPoint,
        max_ticks: usize,
    ) -> Result<Self, DispatchError> {
        if route.is_empty() {
            Self::new(straight_line(origin, destination), max_ticks)
        } else {
            Self::new(route, max_ticks)
        }
    }

    pub fn route(&self) -> &[GeoPoint] {
        &self.route
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of position frames a full run produces.
    pub fn frame_count(&self) -> usize {
        self.route.len().div_ceil(self.step)
    }

    pub fn is_finished(&self) -> bool {
        self.arrived || self.cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Stop the animation. Safe to call any number of times, in any state.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn tick(&mut self) -> AnimatorTick {
        if self.is_finished() {
            return AnimatorTick::Stopped;
        }

        let index = self.cursor;
        let Some(current) = self.route.get(index).copied() else {
            self.arrived = true;
            return AnimatorTick::Arrived;
        };

        let last = self.route[self.route.len() - 1];
        let next = self.route.get(index + self.step).copied().unwrap_or(last);
        // points were checked to be finite at construction
        let heading = current.bearing_to(&next).unwrap_or_default();

        self.cursor += self.step;
        AnimatorTick::Moved(AnimationFrame {
            index,
            position: current,
            heading,
        })
    }
}
