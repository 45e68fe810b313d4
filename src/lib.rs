// Library interface for samu-dispatch
// This allows integration tests and the benches to access internal modules

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod geo;
pub mod positioning;
pub mod routing;
pub mod store;
pub mod writer;

// Re-export commonly used types
pub use config::{AppConfig, DispatchConfig, RoutingConfig};
pub use dispatch::{
    CancelReason, DispatchController, DispatchEvent, DispatchSnapshot, DispatchState,
    EmergencyKind, IdleReason, StateKind,
};
pub use errors::DispatchError;
pub use geo::{CompassPoint, GeoPoint, bearing, route_length};
pub use positioning::{FixedPosition, PositionSource};
pub use routing::{OpenRouteServiceProvider, RouteProvider, StaticRouteProvider};
pub use store::{FileBasedStore, ProfileStore, UserSession};
