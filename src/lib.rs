// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Asynchronous route calculation for offline maps.
//!
//! The heart of the crate is [AsyncRouter]: it owns a single worker thread,
//! accepts route requests from the UI thread without ever blocking it, and
//! cooperatively cancels a request in flight as soon as a newer one arrives.
//! Route computation itself is delegated to a pluggable [Router] which polls
//! a [RouterDelegate] for cancellation and reports progress into it.
//! An optional [OnlineFetcher] can report countries whose maps are missing
//! for the full route, which turns the outcome into
//! [RouterResultCode::NeedMoreMaps].
//!
//! Results are delivered through a [TaskRunner], the abstraction over the
//! platform's "run this on the main thread" primitive.
//!
//! The crate also ships [GraphRouter], an A* router over an in-memory
//! [Graph], and [CityBoundariesChecker], a spatial index over city polygons
//! loaded from a [Container] section.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use waypath::{AsyncRouter, Checkpoints, Container, Graph, GraphRouter, LatLon, RouteRequest};
//!
//! let container = Container::from_file("path/to/monaco.wpmc").expect("failed to open container");
//! let graph = Graph::load(&container).expect("failed to load the road graph");
//!
//! let router = AsyncRouter::new(Arc::new(waypath::ThreadRunner::new()), Default::default())
//!     .expect("failed to spawn the routing thread");
//! router.set_router(Arc::new(GraphRouter::new(graph, Default::default())), None);
//!
//! let checkpoints = Checkpoints::new(vec![
//!     LatLon::new(43.7384, 7.4246),
//!     LatLon::new(43.7478, 7.4323),
//! ])
//! .unwrap();
//!
//! router.calculate_route(RouteRequest::new(checkpoints, |route, code| {
//!     println!("{}: {} m", code, route.total_distance_meters());
//! }));
//! ```

mod astar;
pub mod async_router;
mod cancellable;
mod checkpoints;
pub mod city_boundaries;
pub mod container;
mod delegate;
mod distance;
pub mod graph;
pub mod graph_router;
mod kd;
mod result_code;
mod route;
mod router;
pub mod statistics;
pub mod task;

pub use astar::{find_route, AStarError, AStarOptions, AStarOutcome, DEFAULT_STEP_LIMIT};
pub use async_router::{AsyncRouter, RouteRequest};
pub use cancellable::{CancellableStatus, TimeoutCancellable};
pub use checkpoints::{Checkpoints, CheckpointsError};
pub use city_boundaries::CityBoundariesChecker;
pub use container::{Compression, Container, SectionSource};
pub use delegate::{
    PeriodicPoll, PointCheckCallback, ProgressCallback, RouterDelegate, POINT_CHECK_PERIOD,
    POLL_PERIOD, PROGRESS_STEP,
};
pub use distance::earth_distance;
pub use graph::Graph;
pub use graph_router::GraphRouter;
pub use kd::KDTree;
pub use result_code::{log_code, RouterResultCode};
pub use route::{Route, RouteSegment, Turn};
pub use router::{GuidesTracks, OnlineFetcher, RoadProjection, Router, RouterError};
pub use task::{ImmediateRunner, QueueRunner, Task, TaskRunner, Thread, ThreadRunner};

/// A geographic position, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub const ZERO: Self = Self { lat: 0.0, lon: 0.0 };

    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl std::fmt::Display for LatLon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.lat, self.lon)
    }
}

/// Direction of movement at the start of a route, as a vector in the
/// (east, north) plane. [Direction::ZERO] means the direction is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Direction {
    pub x: f64,
    pub y: f64,
}

impl Direction {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

/// Represents an element of the [Graph].
///
/// Nodes with `id == 0` are disallowed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub id: i64,
    pub position: LatLon,
}

impl Node {
    pub const ZERO: Self = Self {
        id: 0,
        position: LatLon::ZERO,
    };
}

/// Represents an outgoing (one-way) connection from a specific [Node].
///
/// `cost` is expressed in meters and must not be smaller than the crow-flies
/// distance between the two nodes.
///
/// `to` might not exist in the [Graph]: it may refer to a foreign node
/// (see [Graph::set_foreign_node]) or to nothing at all. Routers must not
/// traverse such edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub to: i64,
    pub cost: f32,
}
