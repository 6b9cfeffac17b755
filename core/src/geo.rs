//! Great-circle distance

use crate::types::GeoPoint;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two points, in kilometers.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude().to_radians();
    let lat2 = b.latitude().to_radians();
    let dlat = (b.latitude() - a.latitude()).to_radians();
    let dlon = (b.longitude() - a.longitude()).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push h just outside [0, 1] near the poles and antipodes.
    let h = h.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn test_identical_points_are_zero() {
        for p in [point(40.7, -73.99), point(90.0, 0.0), point(-90.0, 180.0), point(0.0, 0.0)] {
            assert_eq!(haversine_km(p, p), 0.0);
        }
    }

    #[test]
    fn test_symmetric() {
        let pairs = [
            (point(40.70, -73.99), point(40.85, -73.86)),
            (point(-33.86, 151.21), point(51.50, -0.12)),
            (point(89.9, 10.0), point(-89.9, -170.0)),
        ];
        for (a, b) in pairs {
            assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_known_distance() {
        // Times Square to the Brooklyn Bridge is roughly 6 km.
        let d = haversine_km(point(40.7580, -73.9855), point(40.7061, -73.9969));
        assert!((d - 5.85).abs() < 0.1, "got {d}");
    }

    #[test]
    fn test_antipodal_points() {
        let d = haversine_km(point(0.0, 0.0), point(0.0, 180.0));
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);

        let d = haversine_km(point(90.0, 0.0), point(-90.0, 0.0));
        assert!(d.is_finite());
    }
}
