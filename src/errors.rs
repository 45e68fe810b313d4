// Error types for samu-dispatch

use snafu::Snafu;
use std::io;

use crate::dispatch::{DispatchAction, StateKind};

#[derive(Debug, Snafu)]
pub enum DispatchError {
    // Geometry and user input
    #[snafu(display("Invalid input: {reason}"))]
    InvalidInput { reason: String },
    #[snafu(display("Invalid user input: {field} - {reason}"))]
    InvalidUserInput { field: String, reason: String },

    // Positioning errors
    #[snafu(display("Current location unavailable: {reason}"))]
    LocationUnavailable { reason: String },

    // Routing errors, always recovered by the straight-line fallback
    #[snafu(display("Route lookup failed"))]
    RouteLookupFailed { source: reqwest::Error },
    #[snafu(display("Route lookup failed: {reason}"))]
    RouteLookupRejected { reason: String },
    #[snafu(display("Route lookup timed out after {timeout_ms}ms"))]
    RouteLookupTimeout { timeout_ms: u64 },

    // Dispatch lifecycle errors
    #[snafu(display("Action {action:?} is not allowed while {state:?}"))]
    InvalidTransition {
        state: StateKind,
        action: DispatchAction,
    },

    // Profile and contacts store errors
    #[snafu(display("Error accessing the profile store"))]
    StoreIO { source: io::Error },
    #[snafu(display("Error serializing the profile store"))]
    StoreSerialize { source: serde_json::Error },
    #[snafu(display("Profile store operation failed: {operation} - {reason}"))]
    StoreOperation { operation: String, reason: String },
    #[snafu(display("E-mail already registered: {email}"))]
    DuplicateEmail { email: String },
    #[snafu(display("Incorrect e-mail or password"))]
    InvalidCredentials,
    #[snafu(display("No user is logged in"))]
    NotLoggedIn,
    #[snafu(display("Emergency contact {id} not found"))]
    ContactNotFound { id: u64 },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },

    // Errors for the event writer
    #[snafu(display("Error writing dispatch event file"))]
    WriterError { source: io::Error },

    // Command line errors
    #[snafu(display("Unable to start the async runtime"))]
    RuntimeError { source: io::Error },
}

impl DispatchError {
    /// True for the routing failures that the dispatch flow recovers from on its own.
    pub fn is_route_lookup(&self) -> bool {
        matches!(
            self,
            DispatchError::RouteLookupFailed { .. }
                | DispatchError::RouteLookupRejected { .. }
                | DispatchError::RouteLookupTimeout { .. }
        )
    }
}
