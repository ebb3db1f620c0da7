// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::{earth_distance, LatLon, Node};

/// KDTree implements the [k-d tree data structure](https://en.wikipedia.org/wiki/K-d_tree),
/// used to snap checkpoints onto the road network without scanning every node
/// of the [Graph](crate::Graph).
///
/// Splits are done in (lat, lon) space while distances are measured with
/// [earth_distance], so results are unreliable near the antimeridian or the poles.
#[derive(Debug, Clone)]
pub struct KDTree {
    pivot: Node,
    left: Option<Box<KDTree>>,
    right: Option<Box<KDTree>>,
}

impl KDTree {
    /// Finds the closest [Node] to the given position, together with
    /// the distance to it in meters.
    pub fn find_nearest_node(&self, position: LatLon) -> (Node, f64) {
        self.find_nearest_node_impl(position, false)
    }

    fn find_nearest_node_impl(&self, position: LatLon, lon_divides: bool) -> (Node, f64) {
        let mut best = self.pivot;
        let mut best_dist = earth_distance(position, best.position);

        let first_left = if lon_divides {
            position.lon < best.position.lon
        } else {
            position.lat < best.position.lat
        };
        let (first, second) = if first_left {
            (&self.left, &self.right)
        } else {
            (&self.right, &self.left)
        };

        if let Some(branch) = first {
            let (alt, alt_dist) = branch.find_nearest_node_impl(position, !lon_divides);
            if alt_dist < best_dist {
                best = alt;
                best_dist = alt_dist;
            }
        }

        if let Some(branch) = second {
            // The other side can only hold a closer node if the splitting
            // axis is closer than the current best.
            let on_axis = if lon_divides {
                LatLon::new(position.lat, self.pivot.position.lon)
            } else {
                LatLon::new(self.pivot.position.lat, position.lon)
            };

            if earth_distance(position, on_axis) < best_dist {
                let (alt, alt_dist) = branch.find_nearest_node_impl(position, !lon_divides);
                if alt_dist < best_dist {
                    best = alt;
                    best_dist = alt_dist;
                }
            }
        }

        (best, best_dist)
    }

    /// Builds a k-d tree from an iterable of [Nodes](Node).
    /// Returns `None` if there are no nodes.
    pub fn from_nodes<I: IntoIterator<Item = Node>>(nodes: I) -> Option<Self> {
        let mut nodes = nodes.into_iter().collect::<Vec<_>>();
        Self::build(&mut nodes)
    }

    /// Builds a k-d tree from a mutable slice of [Nodes](Node),
    /// reordering the slice in the process.
    pub fn build(nodes: &mut [Node]) -> Option<Self> {
        Self::build_impl(nodes, false)
    }

    fn build_impl(nodes: &mut [Node], lon_divides: bool) -> Option<Self> {
        if nodes.is_empty() {
            return None;
        }

        if lon_divides {
            nodes.sort_by(|a, b| a.position.lon.total_cmp(&b.position.lon));
        } else {
            nodes.sort_by(|a, b| a.position.lat.total_cmp(&b.position.lat));
        }

        let median = nodes.len() / 2;
        let pivot = nodes[median];
        let (left, right_and_pivot) = nodes.split_at_mut(median);
        Some(Self {
            pivot,
            left: Self::build_impl(left, !lon_divides).map(Box::new),
            right: Self::build_impl(&mut right_and_pivot[1..], !lon_divides).map(Box::new),
        })
    }
}
