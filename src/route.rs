// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::BTreeSet;

use crate::LatLon;

/// Maneuver to perform at a [RouteSegment] junction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    Start,
    GoStraight,
    TurnSlightLeft,
    TurnSlightRight,
    TurnLeft,
    TurnRight,
    TurnSharpLeft,
    TurnSharpRight,
    UTurn,
    ReachedIntermediatePoint,
    ReachedYourDestination,
}

impl Turn {
    /// Classifies a change of heading, in degrees (positive is clockwise),
    /// into a maneuver.
    pub fn from_heading_change(delta: f64) -> Self {
        // Normalize to (-180, 180]
        let mut delta = delta % 360.0;
        if delta > 180.0 {
            delta -= 360.0;
        } else if delta <= -180.0 {
            delta += 360.0;
        }

        let magnitude = delta.abs();
        let right = delta > 0.0;
        match magnitude {
            m if m < 20.0 => Self::GoStraight,
            m if m < 45.0 => pick(right, Self::TurnSlightRight, Self::TurnSlightLeft),
            m if m < 120.0 => pick(right, Self::TurnRight, Self::TurnLeft),
            m if m < 170.0 => pick(right, Self::TurnSharpRight, Self::TurnSharpLeft),
            _ => Self::UTurn,
        }
    }
}

#[inline]
fn pick(right: bool, r: Turn, l: Turn) -> Turn {
    if right {
        r
    } else {
        l
    }
}

/// A junction of a [Route] together with the maneuver to perform there.
///
/// Distances and times are cumulative, counted from the start of the route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteSegment {
    pub junction: LatLon,
    pub turn: Turn,
    pub distance_from_start_m: f64,
    pub time_from_start_sec: f64,
}

/// Result of a route calculation.
///
/// Filled in by a [Router](crate::Router) on the worker thread,
/// then handed over to the UI thread as an `Arc<Route>`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Route {
    router_name: String,
    id: u64,
    polyline: Vec<LatLon>,
    segments: Vec<RouteSegment>,
    absent_countries: BTreeSet<String>,
}

impl Route {
    pub fn new<S: Into<String>>(router_name: S, id: u64) -> Self {
        Self {
            router_name: router_name.into(),
            id,
            ..Default::default()
        }
    }

    pub fn router_name(&self) -> &str {
        &self.router_name
    }

    /// Identifier assigned by the [AsyncRouter](crate::AsyncRouter), increasing with every calculation.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn polyline(&self) -> &[LatLon] {
        &self.polyline
    }

    pub fn set_polyline(&mut self, polyline: Vec<LatLon>) {
        self.polyline = polyline;
    }

    pub fn segments(&self) -> &[RouteSegment] {
        &self.segments
    }

    pub fn set_segments(&mut self, segments: Vec<RouteSegment>) {
        self.segments = segments;
    }

    pub fn is_valid(&self) -> bool {
        self.polyline.len() > 1
    }

    pub fn total_distance_meters(&self) -> f64 {
        self.segments
            .last()
            .map(|s| s.distance_from_start_m)
            .unwrap_or(0.0)
    }

    pub fn total_time_sec(&self) -> f64 {
        self.segments
            .last()
            .map(|s| s.time_from_start_sec)
            .unwrap_or(0.0)
    }

    /// Countries whose maps were found missing while calculating this route.
    pub fn absent_countries(&self) -> &BTreeSet<String> {
        &self.absent_countries
    }

    pub fn add_absent_country<S: Into<String>>(&mut self, country: S) {
        self.absent_countries.insert(country.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns() {
        assert_eq!(Turn::from_heading_change(5.0), Turn::GoStraight);
        assert_eq!(Turn::from_heading_change(-30.0), Turn::TurnSlightLeft);
        assert_eq!(Turn::from_heading_change(90.0), Turn::TurnRight);
        assert_eq!(Turn::from_heading_change(270.0), Turn::TurnLeft);
        assert_eq!(Turn::from_heading_change(-150.0), Turn::TurnSharpLeft);
        assert_eq!(Turn::from_heading_change(180.0), Turn::UTurn);
    }

    #[test]
    fn totals() {
        let mut r = Route::new("test", 7);
        assert_eq!(r.total_distance_meters(), 0.0);
        assert!(!r.is_valid());

        r.set_segments(vec![
            RouteSegment {
                junction: LatLon::new(0.0, 0.0),
                turn: Turn::Start,
                distance_from_start_m: 0.0,
                time_from_start_sec: 0.0,
            },
            RouteSegment {
                junction: LatLon::new(0.0, 0.01),
                turn: Turn::ReachedYourDestination,
                distance_from_start_m: 1112.0,
                time_from_start_sec: 80.0,
            },
        ]);
        r.add_absent_country("Poland");
        r.add_absent_country("Poland");

        assert_eq!(r.id(), 7);
        assert_eq!(r.total_distance_meters(), 1112.0);
        assert_eq!(r.total_time_sec(), 80.0);
        assert_eq!(r.absent_countries().len(), 1);
    }
}
