// Geographic primitives: points, headings and distances

pub mod compass;

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use uom::si::{f64::Length, length::meter};

use crate::errors::DispatchError;

pub use compass::CompassPoint;

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A latitude/longitude pair in decimal degrees.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}°, {:.6}°)", self.latitude, self.longitude)
    }
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Build a point from a `[longitude, latitude]` pair, the order used by GeoJSON.
    pub fn from_lng_lat(pair: [f64; 2]) -> Self {
        Self::new(pair[1], pair[0])
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    fn ensure_finite(&self) -> Result<(), DispatchError> {
        if self.is_finite() {
            Ok(())
        } else {
            Err(DispatchError::InvalidInput {
                reason: format!("non-finite coordinate {:?}", self),
            })
        }
    }

    /// Initial great-circle bearing from this point to `other`, in degrees `[0, 360)`.
    pub fn bearing_to(&self, other: &GeoPoint) -> Result<f64, DispatchError> {
        bearing(*self, *other)
    }

    /// Haversine distance to another point, in meters.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        let lat_from = self.latitude.to_radians();
        let lat_to = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat_from.cos() * lat_to.cos() * (delta_lon / 2.0).sin().powi(2);

        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }
}

/// Compass heading from `from` towards `to`.
///
/// Uses the great-circle initial-bearing formula and normalizes the result into
/// `[0, 360)`. Identical points yield `0.0`. Any NaN or infinite coordinate is
/// rejected with [`DispatchError::InvalidInput`].
pub fn bearing(from: GeoPoint, to: GeoPoint) -> Result<f64, DispatchError> {
    from.ensure_finite()?;
    to.ensure_finite()?;

    if from == to {
        return Ok(0.0);
    }

    let lat_from = from.latitude.to_radians();
    let lat_to = to.latitude.to_radians();
    let delta_lon = (to.longitude - from.longitude).to_radians();

    let y = delta_lon.sin() * lat_to.cos();
    let x = lat_from.cos() * lat_to.sin() - lat_from.sin() * lat_to.cos() * delta_lon.cos();

    let heading = y.atan2(x).to_degrees();
    let normalized = (heading + 360.0) % 360.0;

    // (x + 360) % 360 can round up to exactly 360 for tiny negative headings
    if normalized >= 360.0 {
        Ok(0.0)
    } else {
        Ok(normalized)
    }
}

/// Total length of a polyline, summing the haversine distance of each leg.
pub fn route_length(points: &[GeoPoint]) -> Length {
    let meters: f64 = points
        .iter()
        .tuple_windows()
        .map(|(a, b)| a.distance_to(b))
        .sum();
    Length::new::<meter>(meters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use uom::si::length::kilometer;

    const HOSPITAL: GeoPoint = GeoPoint::new(-24.005618, -46.4241265);

    fn angular_difference(a: f64, b: f64) -> f64 {
        let diff = (a - b).rem_euclid(360.0);
        diff.min(360.0 - diff)
    }

    #[test]
    fn test_display() {
        let pos = GeoPoint::new(-24.005618, -46.43);
        assert_eq!(format!("{}", pos), "(-24.005618°, -46.430000°)");
    }

    #[test]
    fn test_from_lng_lat_swaps_order() {
        let point = GeoPoint::from_lng_lat([-46.43, -24.01]);
        assert_eq!(point.latitude, -24.01);
        assert_eq!(point.longitude, -46.43);
    }

    #[test]
    fn test_cardinal_bearings() {
        let origin = GeoPoint::new(0.0, 0.0);
        let north = bearing(origin, GeoPoint::new(1.0, 0.0)).unwrap();
        let east = bearing(origin, GeoPoint::new(0.0, 1.0)).unwrap();
        let south = bearing(origin, GeoPoint::new(-1.0, 0.0)).unwrap();
        let west = bearing(origin, GeoPoint::new(0.0, -1.0)).unwrap();

        assert!(north.abs() < 1e-9);
        assert!((east - 90.0).abs() < 1e-9);
        assert!((south - 180.0).abs() < 1e-9);
        assert!((west - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_bearing_same_point_is_zero() {
        assert_eq!(bearing(HOSPITAL, HOSPITAL).unwrap(), 0.0);
    }

    #[test]
    fn test_bearing_towards_patient() {
        // patient is south-west of the hospital
        let patient = GeoPoint::new(-24.01, -46.43);
        let heading = bearing(HOSPITAL, patient).unwrap();
        assert!(heading > 180.0 && heading < 270.0, "heading {}", heading);
        assert_eq!(HOSPITAL.bearing_to(&patient).unwrap(), heading);
    }

    #[test]
    fn test_bearing_rejects_non_finite() {
        let bad = GeoPoint::new(f64::NAN, 10.0);
        assert!(matches!(
            bearing(bad, HOSPITAL),
            Err(DispatchError::InvalidInput { .. })
        ));
        let bad = GeoPoint::new(10.0, f64::INFINITY);
        assert!(matches!(
            bearing(HOSPITAL, bad),
            Err(DispatchError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_distance_one_degree_latitude() {
        let d = GeoPoint::new(0.0, 0.0).distance_to(&GeoPoint::new(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 10.0, "distance {}", d);
    }

    #[test]
    fn test_route_length() {
        let route = [
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(1.0, 0.0),
            GeoPoint::new(2.0, 0.0),
        ];
        let km = route_length(&route).get::<kilometer>();
        assert!((km - 222.39).abs() < 0.1, "length {}", km);

        assert_eq!(route_length(&[]).get::<meter>(), 0.0);
        assert_eq!(route_length(&[HOSPITAL]).get::<meter>(), 0.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_bearing_in_range(
            lat1 in -89.0f64..89.0, lng1 in -180.0f64..180.0,
            lat2 in -89.0f64..89.0, lng2 in -180.0f64..180.0,
        ) {
            let heading = bearing(GeoPoint::new(lat1, lng1), GeoPoint::new(lat2, lng2)).unwrap();
            prop_assert!(!heading.is_nan());
            prop_assert!((0.0..360.0).contains(&heading), "heading {}", heading);
        }

        #[test]
        fn prop_bearing_same_point_is_zero(lat in -90.0f64..90.0, lng in -180.0f64..180.0) {
            let p = GeoPoint::new(lat, lng);
            prop_assert_eq!(bearing(p, p).unwrap(), 0.0);
        }

        #[test]
        fn prop_reverse_bearing_differs_by_half_turn(
            lat in -60.0f64..60.0,
            lng in -170.0f64..170.0,
            d_lat in 0.0001f64..0.1,
            d_lng in 0.0001f64..0.1,
            flip_lat in any::<bool>(),
            flip_lng in any::<bool>(),
        ) {
            // short urban-scale legs, where meridian convergence stays well below the tolerance
            let a = GeoPoint::new(lat, lng);
            let b = GeoPoint::new(
                lat + if flip_lat { -d_lat } else { d_lat },
                lng + if flip_lng { -d_lng } else { d_lng },
            );
            let forward = bearing(a, b).unwrap();
            let backward = bearing(b, a).unwrap();
            prop_assert!(
                angular_difference(forward + 180.0, backward) < 0.5,
                "forward {} backward {}", forward, backward
            );
        }
    }
}
