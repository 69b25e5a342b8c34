//! Geodesy - great-circle distance, bearing and local tangent-plane offsets
//!
//! Pure, stateless functions on validated `GeoPoint`s. Nothing here fails:
//! malformed coordinates are rejected when the `GeoPoint` is built.
//!
//! Two distance models live side by side:
//! - **Haversine** for the authoritative distance used by catch/visibility
//! - **Equirectangular** (mean-latitude) East/North offsets for radar and
//!   placement; within 200 m the two agree to better than 0.1%, the error
//!   grows with range and the approximation should not be used past a few km

use serde::{Deserialize, Serialize};

use crate::error::GeoError;

/// Mean Earth radius in meters (spherical model)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A validated WGS84 coordinate in degrees.
///
/// Immutable once constructed: fields are private and every constructor
/// checks the ranges lat ∈ [-90, 90], lon ∈ [-180, 180].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeoPoint", into = "RawGeoPoint")]
pub struct GeoPoint {
    lat: f64,
    lon: f64,
}

/// Unchecked wire form of a `GeoPoint`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawGeoPoint {
    lat: f64,
    lon: f64,
}

impl GeoPoint {
    /// Creates a point, rejecting NaN, infinities and out-of-range values.
    pub fn new(lat: f64, lon: f64) -> Result<Self, GeoError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(GeoError::InvalidLatitude(lat));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(GeoError::InvalidLongitude(lon));
        }
        Ok(Self { lat, lon })
    }

    /// Latitude in degrees
    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Longitude in degrees
    pub fn lon(&self) -> f64 {
        self.lon
    }

    /// Returns the point `east`/`north` meters away, using the inverse of the
    /// equirectangular projection. Only meaningful for short offsets.
    pub fn offset_by(&self, east: f64, north: f64) -> Result<Self, GeoError> {
        let lat = self.lat + (north / EARTH_RADIUS_M).to_degrees();
        let mean_lat = ((self.lat + lat) / 2.0).to_radians();
        let lon = self.lon + (east / (EARTH_RADIUS_M * mean_lat.cos())).to_degrees();
        Self::new(lat, lon)
    }
}

impl TryFrom<RawGeoPoint> for GeoPoint {
    type Error = GeoError;

    fn try_from(raw: RawGeoPoint) -> Result<Self, Self::Error> {
        GeoPoint::new(raw.lat, raw.lon)
    }
}

impl From<GeoPoint> for RawGeoPoint {
    fn from(p: GeoPoint) -> Self {
        Self { lat: p.lat, lon: p.lon }
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// Offset of one point from another on the local tangent plane, in meters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalOffset {
    pub east: f64,
    pub north: f64,
}

impl LocalOffset {
    pub fn new(east: f64, north: f64) -> Self {
        Self { east, north }
    }

    /// Planar distance sqrt(east² + north²)
    pub fn magnitude(&self) -> f64 {
        self.east.hypot(self.north)
    }
}

/// Great-circle distance between `a` and `b` in meters (haversine).
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair outside [0, 1] for antipodal points
    let h = h.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Initial bearing from `a` to `b`, degrees clockwise from north in [0, 360).
///
/// Undefined for `a == b`; returns 0 there. Callers must check the distance
/// is positive before trusting the value.
pub fn bearing_degrees(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let x = d_lon.sin() * lat_b.cos();
    let y = lat_a.cos() * lat_b.sin() - lat_a.sin() * lat_b.cos() * d_lon.cos();

    wrap_degrees(x.atan2(y).to_degrees())
}

/// East/North offset of `target` from `origin` (equirectangular, mean latitude).
pub fn local_offset_meters(origin: GeoPoint, target: GeoPoint) -> LocalOffset {
    let d_lat = (target.lat - origin.lat).to_radians();
    let d_lon = (target.lon - origin.lon).to_radians();
    let mean_lat = ((target.lat + origin.lat) / 2.0).to_radians();

    LocalOffset {
        east: d_lon * mean_lat.cos() * EARTH_RADIUS_M,
        north: d_lat * EARTH_RADIUS_M,
    }
}

/// Normalizes an angle in degrees into [0, 360).
pub fn wrap_degrees(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can return 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Signed shortest rotation from `from` to `to`, in [-180, 180).
pub fn shortest_delta_degrees(from: f64, to: f64) -> f64 {
    (to - from + 540.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn p(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn test_geopoint_rejects_out_of_range() {
        assert_eq!(GeoPoint::new(90.1, 0.0), Err(GeoError::InvalidLatitude(90.1)));
        assert_eq!(GeoPoint::new(0.0, -180.5), Err(GeoError::InvalidLongitude(-180.5)));
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(0.0, f64::INFINITY).is_err());
        assert!(GeoPoint::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn test_geopoint_deserialize_validates() {
        let ok: GeoPoint = serde_json::from_str(r#"{"lat": 10.5, "lon": 78.8}"#).unwrap();
        assert_eq!(ok.lat(), 10.5);

        let bad: Result<GeoPoint, _> = serde_json::from_str(r#"{"lat": 123.0, "lon": 0.0}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_one_degree_longitude_at_equator() {
        let d = distance_meters(p(0.0, 0.0), p(0.0, 1.0));
        assert_relative_eq!(d, 111_195.0, max_relative = 0.01);
    }

    #[test]
    fn test_small_northward_offset() {
        let d = distance_meters(p(10.767406, 78.813385), p(10.767450, 78.813385));
        assert_relative_eq!(d, 4.9, epsilon = 0.05);
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let a = p(48.8584, 2.2945);
        assert_eq!(distance_meters(a, a), 0.0);
    }

    #[test]
    fn test_cardinal_bearings() {
        let origin = p(10.0, 20.0);
        assert_relative_eq!(bearing_degrees(origin, p(10.001, 20.0)), 0.0, epsilon = 1e-6);
        assert_relative_eq!(bearing_degrees(origin, p(10.0, 20.001)), 90.0, epsilon = 1e-3);
        assert_relative_eq!(bearing_degrees(origin, p(9.999, 20.0)), 180.0, epsilon = 1e-6);
        assert_relative_eq!(bearing_degrees(origin, p(10.0, 19.999)), 270.0, epsilon = 1e-3);
    }

    #[test]
    fn test_bearing_stays_in_range() {
        // Due north crosses into the [0, 360) wrap
        let b = bearing_degrees(p(0.0, 0.0), p(1.0, -1e-12));
        assert!((0.0..360.0).contains(&b));
    }

    #[test]
    fn test_local_offset_axes() {
        let origin = p(10.767406, 78.813385);
        let north = local_offset_meters(origin, p(10.767450, 78.813385));
        assert_relative_eq!(north.east, 0.0);
        assert!(north.north > 4.8 && north.north < 5.0);

        let west = local_offset_meters(origin, p(10.767406, 78.813300));
        assert!(west.east < 0.0);
        assert_relative_eq!(west.north, 0.0);
    }

    #[test]
    fn test_offset_by_round_trips_through_local_offset() {
        let origin = p(10.767406, 78.813385);
        let moved = origin.offset_by(30.0, -40.0).unwrap();
        let offset = local_offset_meters(origin, moved);
        assert_relative_eq!(offset.east, 30.0, epsilon = 1e-6);
        assert_relative_eq!(offset.north, -40.0, epsilon = 1e-6);
    }

    #[test]
    fn test_wrap_and_shortest_delta() {
        assert_eq!(wrap_degrees(360.0), 0.0);
        assert_eq!(wrap_degrees(-90.0), 270.0);
        assert_eq!(wrap_degrees(725.0), 5.0);
        assert_relative_eq!(shortest_delta_degrees(355.0, 5.0), 10.0);
        assert_relative_eq!(shortest_delta_degrees(5.0, 355.0), -10.0);
        assert_relative_eq!(shortest_delta_degrees(90.0, 90.0), 0.0);
    }

    proptest! {
        #[test]
        fn prop_distance_is_non_negative_and_symmetric(
            lat_a in -90.0f64..=90.0, lon_a in -180.0f64..=180.0,
            lat_b in -90.0f64..=90.0, lon_b in -180.0f64..=180.0,
        ) {
            let a = p(lat_a, lon_a);
            let b = p(lat_b, lon_b);
            let ab = distance_meters(a, b);
            let ba = distance_meters(b, a);
            prop_assert!(ab >= 0.0);
            prop_assert!((ab - ba).abs() <= 1e-6 * ab.max(1.0));
            prop_assert_eq!(distance_meters(a, a), 0.0);
        }

        #[test]
        fn prop_bearing_in_range(
            lat_a in -89.0f64..=89.0, lon_a in -180.0f64..=180.0,
            lat_b in -89.0f64..=89.0, lon_b in -180.0f64..=180.0,
        ) {
            let b = bearing_degrees(p(lat_a, lon_a), p(lat_b, lon_b));
            prop_assert!((0.0..360.0).contains(&b));
        }

        #[test]
        fn prop_local_offset_matches_haversine_within_200m(
            lat in -85.0f64..=85.0, lon in -179.0f64..=179.0,
            range in 1.0f64..=200.0, angle in 0.0f64..360.0,
        ) {
            let origin = p(lat, lon);
            let (sin, cos) = angle.to_radians().sin_cos();
            let target = origin.offset_by(range * sin, range * cos).unwrap();

            let haversine = distance_meters(origin, target);
            let planar = local_offset_meters(origin, target).magnitude();
            prop_assert!(
                (planar - haversine).abs() <= haversine * 0.001,
                "planar {} vs haversine {}", planar, haversine
            );
        }
    }
}
