// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::{BTreeSet, HashMap};

use crate::{Checkpoints, Direction, LatLon, Route, RouterDelegate, RouterResultCode};

/// Auxiliary tracks (by guide id) a router may prefer during the next calculation.
pub type GuidesTracks = HashMap<u64, Vec<Vec<LatLon>>>;

/// Unexpected failure of a [Router]. The [AsyncRouter](crate::AsyncRouter)
/// converts it into [RouterResultCode::InternalError].
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("{0}")]
    Internal(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("map data: {0}")]
    Container(#[from] crate::container::Error),
}

/// Closest point of the road network to some position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoadProjection {
    pub node_id: i64,
    pub point: LatLon,
    pub distance_m: f64,
}

/// A route calculation strategy.
///
/// Implementations are called from the [AsyncRouter](crate::AsyncRouter) worker thread,
/// must poll [RouterDelegate::is_cancelled](crate::TimeoutCancellable::is_cancelled)
/// often enough to abort within a fraction of a second (see [PeriodicPoll](crate::PeriodicPoll)),
/// and should return `Err` (or panic) only as a last resort.
pub trait Router: Send + Sync {
    /// Stable identifier, used for statistics.
    fn name(&self) -> &str;

    /// Drops internal caches. Must be idempotent and fast.
    fn clear_state(&self);

    /// Attaches guide tracks for the next calculation; an empty map detaches them.
    fn set_guides(&self, guides: GuidesTracks);

    /// Calculates a route through all `checkpoints` into `route`.
    ///
    /// Countries whose maps were found missing while walking the graph
    /// must be added to the route with [Route::add_absent_country].
    fn calculate_route(
        &self,
        checkpoints: &Checkpoints,
        start_direction: Direction,
        adjust_to_prev_route: bool,
        delegate: &RouterDelegate,
        route: &mut Route,
    ) -> Result<RouterResultCode, RouterError>;

    /// Finds the road closest to `point`, at most `radius_m` meters away.
    fn find_closest_projection_to_road(
        &self,
        _point: LatLon,
        _direction: Direction,
        _radius_m: f64,
    ) -> Option<RoadProjection> {
        None
    }
}

/// Asks a remote service which maps are needed for a route.
///
/// Both methods are called from the [AsyncRouter](crate::AsyncRouter) worker thread
/// and must not block on network I/O.
pub trait OnlineFetcher: Send + Sync {
    /// Starts an asynchronous request for the given checkpoints.
    fn generate_request(&self, checkpoints: &Checkpoints);

    /// Returns the countries received so far, possibly none.
    fn absent_countries(&self) -> BTreeSet<String>;
}
