// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::LatLon;

/// Error conditions which may occur when building [Checkpoints].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CheckpointsError {
    #[error("a route needs at least 2 checkpoints, got {0}")]
    TooFewPoints(usize),

    #[error("checkpoint {0} has a non-finite or out-of-range position")]
    InvalidPoint(usize),
}

/// Points a route must visit, in order: the start, any number of
/// intermediate stops and the finish.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoints(Vec<LatLon>);

impl Checkpoints {
    pub fn new(points: Vec<LatLon>) -> Result<Self, CheckpointsError> {
        if points.len() < 2 {
            return Err(CheckpointsError::TooFewPoints(points.len()));
        }

        if let Some(idx) = points.iter().position(|p| !is_valid(*p)) {
            return Err(CheckpointsError::InvalidPoint(idx));
        }

        Ok(Self(points))
    }

    /// Shorthand for a route without intermediate stops.
    pub fn from_start_finish(start: LatLon, finish: LatLon) -> Result<Self, CheckpointsError> {
        Self::new(vec![start, finish])
    }

    pub fn start(&self) -> LatLon {
        self.0[0]
    }

    pub fn finish(&self) -> LatLon {
        self.0[self.0.len() - 1]
    }

    pub fn points(&self) -> &[LatLon] {
        &self.0
    }

    pub fn intermediate(&self) -> &[LatLon] {
        &self.0[1..self.0.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Number of legs (pairs of consecutive checkpoints) of the route.
    pub fn leg_count(&self) -> usize {
        self.0.len() - 1
    }
}

fn is_valid(p: LatLon) -> bool {
    p.lat.is_finite() && p.lon.is_finite() && p.lat.abs() <= 90.0 && p.lon.abs() <= 180.0
}

impl std::fmt::Display for Checkpoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[")?;
        for (idx, p) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", p)?;
        }
        f.write_str("]")
    }
}
