use serde::Serialize;
use std::fmt;

use crate::NavError;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Validated WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    lat: f64,
    lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Result<Self, NavError> {
        let ok = lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0;
        if !ok {
            return Err(NavError::InvalidCoordinate { lat, lon });
        }
        Ok(Self { lat, lon })
    }

    pub fn lat(&self) -> f64 { self.lat }
    pub fn lon(&self) -> f64 { self.lon }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// Haversine great-circle distance in meters.
pub fn distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    // rounding can push h marginally past 1 for antipodal points
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial great-circle bearing from `a` to `b`, degrees clockwise from true north in [0, 360).
/// Coincident points have no direction and yield 0.
pub fn bearing(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlon = (b.lon - a.lon).to_radians();
    let x = dlon.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    normalize_deg(x.atan2(y).to_degrees())
}

/// Wrap any finite angle into [0, 360).
pub fn normalize_deg(deg: f64) -> f64 {
    let a = deg.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360
    if a >= 360.0 { 0.0 } else { a + 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(GeoPoint::new(90.5, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -180.1).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn warsaw_to_poznan() {
        let d = distance(p(52.2296756, 21.0122287), p(52.406374, 16.9251681));
        assert!((d - 278_458.0).abs() <= 1.0, "d={}", d);
        let b = bearing(p(52.2296756, 21.0122287), p(52.406374, 16.9251681));
        assert!((b - 275.66).abs() < 0.01, "b={}", b);
    }

    #[test]
    fn cardinal_bearings() {
        assert!((bearing(p(0.0, 0.0), p(0.0, 90.0)) - 90.0).abs() < 1e-9);
        assert_eq!(bearing(p(0.0, 0.0), p(90.0, 0.0)), 0.0);
        assert!((bearing(p(0.0, 0.0), p(-10.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((bearing(p(0.0, 0.0), p(0.0, -10.0)) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn coincident_points() {
        let a = p(48.1173, 11.5167);
        assert_eq!(distance(a, a), 0.0);
        assert_eq!(bearing(a, a), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let pts = [p(0.0, 0.0), p(52.1, 13.4), p(-33.87, 151.21), p(89.9, -179.9), p(-45.0, 179.5)];
        for a in pts {
            for b in pts {
                assert!((distance(a, b) - distance(b, a)).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn bearing_always_in_range() {
        let mut lat = -89.0;
        while lat <= 89.0 {
            let mut lon = -179.0;
            while lon <= 179.0 {
                let b = bearing(p(12.5, -3.25), p(lat, lon));
                assert!((0.0..360.0).contains(&b), "bearing {} for ({}, {})", b, lat, lon);
                lon += 17.0;
            }
            lat += 11.0;
        }
    }

    #[test]
    fn antipodal_distance_is_half_circumference() {
        let d = distance(p(0.0, 0.0), p(0.0, 180.0));
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1e-3);
    }

    #[test]
    fn normalize_wraps() {
        assert_eq!(normalize_deg(720.0), 0.0);
        assert_eq!(normalize_deg(-90.0), 270.0);
        assert_eq!(normalize_deg(359.5), 359.5);
        assert!(normalize_deg(-1e-20) < 360.0);
        assert!(normalize_deg(-0.0).is_sign_positive());
    }
}
