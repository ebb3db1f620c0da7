// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Per-calculation telemetry.
//!
//! Every calculation produces one flat key/value map. Coordinates are rounded
//! to [PRECISION] digits after the decimal point (about a meter) before they
//! leave the crate.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{Direction, LatLon, RouterResultCode};

/// Digits after the decimal point kept in reported coordinates.
pub const PRECISION: usize = 5;

pub type Statistics = BTreeMap<String, String>;
pub type StatisticsCallback = Arc<dyn Fn(&Statistics) + Send + Sync>;

/// Formats `value` with at most `digits` digits after the decimal point,
/// without trailing zeros.
pub fn round_to_string(value: f64, digits: usize) -> String {
    let s = format!("{:.*}", digits, value);
    let s = if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s.as_str()
    };

    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

fn base(router_name: &str, start: LatLon, direction: Direction, finish: LatLon) -> Statistics {
    let mut s = Statistics::new();
    s.insert("name".into(), router_name.to_string());
    s.insert("startLat".into(), round_to_string(start.lat, PRECISION));
    s.insert("startLon".into(), round_to_string(start.lon, PRECISION));
    s.insert("startDirectionX".into(), round_to_string(direction.x, PRECISION));
    s.insert("startDirectionY".into(), round_to_string(direction.y, PRECISION));
    s.insert("finalLat".into(), round_to_string(finish.lat, PRECISION));
    s.insert("finalLon".into(), round_to_string(finish.lon, PRECISION));
    s
}

/// Statistics of a calculation which has finished with `code`.
/// The route length is only reported for [RouterResultCode::NoError].
pub fn calculation_statistics(
    router_name: &str,
    start: LatLon,
    direction: Direction,
    finish: LatLon,
    code: RouterResultCode,
    route_length_m: f64,
    elapsed_sec: f64,
) -> Statistics {
    let mut s = base(router_name, start, direction, finish);
    s.insert("result".into(), code.to_string());
    s.insert("elapsed".into(), elapsed_sec.to_string());
    if code == RouterResultCode::NoError {
        s.insert("distance".into(), route_length_m.to_string());
    }
    s
}

/// Statistics of a calculation in which the router has failed.
pub fn failure_statistics(
    router_name: &str,
    start: LatLon,
    direction: Direction,
    finish: LatLon,
    message: &str,
) -> Statistics {
    let mut s = base(router_name, start, direction, finish);
    s.insert("exception".into(), message.to_string());
    s
}
