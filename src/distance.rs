// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::LatLon;

/// Mean radius of Earth, in meters.
/// Source: https://en.wikipedia.org/wiki/Earth_radius#Arithmetic_mean_radius
const EARTH_RADIUS: f64 = 6_371_008.8;

/// Mean diameter of Earth, in meters.
const EARTH_DIAMETER: f64 = EARTH_RADIUS + EARTH_RADIUS;

/// Calculates the great-circle distance between two positions
/// on Earth using the `haversine formula <https://en.wikipedia.org/wiki/Haversine_formula>`_.
/// Returns the result in meters.
pub fn earth_distance(a: LatLon, b: LatLon) -> f64 {
    let lat1 = a.lat.to_radians();
    let lon1 = a.lon.to_radians();
    let lat2 = b.lat.to_radians();
    let lon2 = b.lon.to_radians();

    let sin_dlat_half = ((lat2 - lat1) * 0.5).sin();
    let sin_dlon_half = ((lon2 - lon1) * 0.5).sin();

    let h = sin_dlat_half * sin_dlat_half + lat1.cos() * lat2.cos() * sin_dlon_half * sin_dlon_half;

    EARTH_DIAMETER * h.sqrt().min(1.0).asin()
}

/// Initial bearing from `a` towards `b`, in degrees clockwise from north, in `[0, 360)`.
pub(crate) fn bearing(a: LatLon, b: LatLon) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance() {
        // One degree along a meridian
        let d = earth_distance(LatLon::new(0.0, 0.0), LatLon::new(1.0, 0.0));
        assert!((d - 111_195.08).abs() < 1.0, "got {}", d);

        let d = earth_distance(LatLon::new(52.2287, 21.0030), LatLon::new(52.2513, 21.0525));
        assert!((d - 4_200.0).abs() < 50.0, "got {}", d);
        assert_eq!(earth_distance(LatLon::new(1.0, 1.0), LatLon::new(1.0, 1.0)), 0.0);
    }

    #[test]
    fn bearings() {
        let origin = LatLon::new(0.0, 0.0);
        assert!((bearing(origin, LatLon::new(1.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((bearing(origin, LatLon::new(0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((bearing(origin, LatLon::new(-1.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((bearing(origin, LatLon::new(0.0, -1.0)) - 270.0).abs() < 1e-9);
    }
}
