// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

/// Outcome of a route calculation.
///
/// These are values, not errors: they cross the worker/UI thread boundary
/// and are shown to the user (after localization, which is not done here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouterResultCode {
    NoError,

    /// A newer request superseded this one, or its timeout elapsed.
    Cancelled,

    StartPointNotFound,
    EndPointNotFound,
    IntermediatePointNotFound,
    PointsInDifferentMWM,
    RouteNotFound,

    /// Correcting an already computed route has failed.
    RouteNotFoundRedressRouteError,

    RouteFileNotExist,

    /// The route is valid, but maps of some crossed countries are missing
    /// and a better route could be found with them.
    NeedMoreMaps,

    NoCurrentPosition,
    InconsistentMWMandRoute,

    /// The router has failed unexpectedly.
    InternalError,

    FileTooOld,
    TransitRouteNotFoundNoNetwork,
    TransitRouteNotFoundTooLongPedestrian,
    HasWarnings,
}

impl RouterResultCode {
    pub const ALL: [Self; 17] = [
        Self::NoError,
        Self::Cancelled,
        Self::StartPointNotFound,
        Self::EndPointNotFound,
        Self::IntermediatePointNotFound,
        Self::PointsInDifferentMWM,
        Self::RouteNotFound,
        Self::RouteNotFoundRedressRouteError,
        Self::RouteFileNotExist,
        Self::NeedMoreMaps,
        Self::NoCurrentPosition,
        Self::InconsistentMWMandRoute,
        Self::InternalError,
        Self::FileTooOld,
        Self::TransitRouteNotFoundNoNetwork,
        Self::TransitRouteNotFoundTooLongPedestrian,
        Self::HasWarnings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoError => "NoError",
            Self::Cancelled => "Cancelled",
            Self::StartPointNotFound => "StartPointNotFound",
            Self::EndPointNotFound => "EndPointNotFound",
            Self::IntermediatePointNotFound => "IntermediatePointNotFound",
            Self::PointsInDifferentMWM => "PointsInDifferentMWM",
            Self::RouteNotFound => "RouteNotFound",
            Self::RouteNotFoundRedressRouteError => "RouteNotFoundRedressRouteError",
            Self::RouteFileNotExist => "RouteFileNotExist",
            Self::NeedMoreMaps => "NeedMoreMaps",
            Self::NoCurrentPosition => "NoCurrentPosition",
            Self::InconsistentMWMandRoute => "InconsistentMWMandRoute",
            Self::InternalError => "InternalError",
            Self::FileTooOld => "FileTooOld",
            Self::TransitRouteNotFoundNoNetwork => "TransitRouteNotFoundNoNetwork",
            Self::TransitRouteNotFoundTooLongPedestrian => "TransitRouteNotFoundTooLongPedestrian",
            Self::HasWarnings => "HasWarnings",
        }
    }
}

impl std::fmt::Display for RouterResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logs the outcome of a calculation which took `elapsed_sec` seconds.
///
/// Failures a user can run into are logged as warnings, everything else as info.
pub fn log_code(code: RouterResultCode, elapsed_sec: f64) {
    use RouterResultCode::*;

    match code {
        StartPointNotFound => log::warn!("Can't find start or end node"),
        EndPointNotFound => log::warn!("Can't find end point node"),
        IntermediatePointNotFound => log::warn!("Can't find intermediate point node"),
        PointsInDifferentMWM => log::warn!("Points are in different maps"),
        RouteNotFound => log::warn!("Route not found"),
        RouteFileNotExist => log::warn!("There is no routing file"),
        TransitRouteNotFoundNoNetwork => log::warn!(
            "No transit route is found because there's no transit network in the map of the route point"
        ),
        TransitRouteNotFoundTooLongPedestrian => {
            log::warn!("No transit route is found because pedestrian way is too long")
        }
        RouteNotFoundRedressRouteError => {
            log::warn!("Route not found because of a redress route error")
        }
        NeedMoreMaps => log::info!(
            "Routing can find a better way with additional maps, elapsed seconds: {:.3}",
            elapsed_sec
        ),
        Cancelled => log::info!("Route calculation cancelled, elapsed seconds: {:.3}", elapsed_sec),
        NoError => log::info!("Route found, elapsed seconds: {:.3}", elapsed_sec),
        HasWarnings => log::info!("Route has warnings, elapsed seconds: {:.3}", elapsed_sec),
        NoCurrentPosition => log::info!("No current position"),
        InconsistentMWMandRoute => log::info!("Inconsistent map and route"),
        InternalError => log::info!("Internal error"),
        FileTooOld => log::info!("File too old"),
    }
}
