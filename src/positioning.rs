// One-shot current location behind a permission gate

use async_trait::async_trait;
use log::debug;

use crate::{DispatchError, geo::GeoPoint};

/// Source of the patient's current location.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Fetch one fix. Permission denial or a failed fix is
    /// [`DispatchError::LocationUnavailable`].
    async fn current_position(&self) -> Result<GeoPoint, DispatchError>;
}

/// A position known up front, e.g. typed on the command line. `None` behaves like a
/// denied location permission.
#[derive(Clone, Debug, Default)]
pub struct FixedPosition {
    fix: Option<GeoPoint>,
}

impl FixedPosition {
    pub fn new(fix: GeoPoint) -> Self {
        Self { fix: Some(fix) }
    }

    pub fn denied() -> Self {
        Self { fix: None }
    }
}

#[async_trait]
impl PositionSource for FixedPosition {
    async fn current_position(&self) -> Result<GeoPoint, DispatchError> {
        match self.fix {
            Some(fix) if fix.is_finite() => {
                debug!("Position fix: {}", fix);
                Ok(fix)
            }
            Some(fix) => Err(DispatchError::LocationUnavailable {
                reason: format!("invalid fix {:?}", fix),
            }),
            None => Err(DispatchError::LocationUnavailable {
                reason: "location permission denied".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_position() {
        let fix = GeoPoint::new(-24.01, -46.43);
        assert_eq!(FixedPosition::new(fix).current_position().await.unwrap(), fix);
    }

    #[tokio::test]
    async fn test_denied_position() {
        assert!(matches!(
            FixedPosition::denied().current_position().await,
            Err(DispatchError::LocationUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_non_finite_fix_is_unavailable() {
        let source = FixedPosition::new(GeoPoint::new(f64::NAN, 0.));
        assert!(matches!(
            source.current_position().await,
            Err(DispatchError::LocationUnavailable { .. })
        ));
    }
}
