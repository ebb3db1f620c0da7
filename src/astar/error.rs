// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

/// Recommended number of allowed node expansions in [find_route](crate::find_route)
/// before [AStarError::StepLimitExceeded] is returned.
pub const DEFAULT_STEP_LIMIT: usize = 1_000_000;

/// Regular outcomes of [find_route](crate::find_route).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AStarOutcome {
    /// Node ids of the cheapest route, including both ends.
    Found(Vec<i64>),

    /// All nodes reachable from the start were expanded without reaching the end.
    NotFound,

    /// The [RouterDelegate](crate::RouterDelegate) was cancelled mid-search.
    Cancelled,
}

/// Error conditions which may occur during [find_route](crate::find_route).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AStarError {
    /// The start or end nodes don't exist in a graph.
    #[error("invalid node: {0}")]
    InvalidReference(i64),

    /// Route search has exceeded its limit of steps.
    /// Either the nodes are really far apart, or no route exists.
    ///
    /// Concluding that no route exists requires traversing the whole graph;
    /// the step limit bounds the time spent on a single leg.
    #[error("step limit exceeded")]
    StepLimitExceeded,
}
