// Route providers: where the ambulance's path comes from

pub mod openrouteservice;

use async_trait::async_trait;
use log::debug;

use crate::{DispatchError, geo::GeoPoint};

pub use openrouteservice::OpenRouteServiceProvider;

/// Looks up a drivable path between two points.
///
/// An `Ok` with an empty path means "no path found"; the dispatcher treats it the same
/// way as an error and falls back to a straight line.
#[async_trait]
pub trait RouteProvider: Send + Sync {
    async fn route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<Vec<GeoPoint>, DispatchError>;

    fn name(&self) -> &'static str;
}

/// Returns a preset answer. Used for offline runs and tests.
#[derive(Clone, Debug)]
pub struct StaticRouteProvider {
    answer: Result<Vec<GeoPoint>, String>,
}

impl StaticRouteProvider {
    pub fn new(points: Vec<GeoPoint>) -> Self {
        Self { answer: Ok(points) }
    }

    /// Always answers with no path, forcing the straight-line fallback.
    pub fn no_path() -> Self {
        Self::new(Vec::new())
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            answer: Err(reason.into()),
        }
    }
}

#[async_trait]
impl RouteProvider for StaticRouteProvider {
    async fn route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<Vec<GeoPoint>, DispatchError> {
        debug!("Static route lookup {} -> {}", origin, destination);
        match &self.answer {
            Ok(points) => Ok(points.clone()),
            Err(reason) => Err(DispatchError::RouteLookupRejected {
                reason: reason.clone(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
