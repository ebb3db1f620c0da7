// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::ops::Range;

use crate::{earth_distance, AStarError, AStarOutcome, Edge, Graph, PeriodicPoll, RouterDelegate};

use super::DEFAULT_STEP_LIMIT;

/// Tuning of a single [find_route] call.
#[derive(Debug, Clone, PartialEq)]
pub struct AStarOptions {
    /// Max number of node expansions, see [AStarError::StepLimitExceeded].
    pub step_limit: usize,

    /// Span of the overall calculation progress (in percent) covered by this
    /// search. Multi-leg routers split 0..100 between their legs.
    pub progress: Range<f32>,
}

impl Default for AStarOptions {
    fn default() -> Self {
        Self {
            step_limit: DEFAULT_STEP_LIMIT,
            progress: 0.0..100.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct QueueItem {
    at: i64,
    cost: f32,
    score: f32,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score
    }
}

impl Eq for QueueItem {}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Lower scores are better, and BinaryHeap is a max-heap.
        other.score.total_cmp(&self.score)
    }
}

fn reconstruct_path(came_from: &HashMap<i64, i64>, mut last: i64) -> Vec<i64> {
    let mut path = vec![last];
    while let Some(&nd) = came_from.get(&last) {
        path.push(nd);
        last = nd;
    }
    path.reverse();
    path
}

/// Uses the [A* algorithm](https://en.wikipedia.org/wiki/A*_search_algorithm)
/// to find the cheapest route between two nodes in the provided graph.
///
/// The search cooperates with the `delegate`:
/// - cancellation is polled through a [PeriodicPoll] on every expansion,
///   yielding [AStarOutcome::Cancelled],
/// - every expanded node is reported with [RouterDelegate::on_point_check],
/// - progress, measured as the share of the crow-flies distance already
///   covered by the best expanded node, is mapped onto `options.progress`
///   and reported with [RouterDelegate::on_progress].
///
/// Edges leading to foreign nodes are never traversed; the countries of those
/// nodes are added to `absent_countries` instead.
pub fn find_route(
    g: &Graph,
    from_id: i64,
    to_id: i64,
    delegate: &RouterDelegate,
    options: &AStarOptions,
    absent_countries: &mut BTreeSet<String>,
) -> Result<AStarOutcome, AStarError> {
    let to_node = g.get_node(to_id).ok_or(AStarError::InvalidReference(to_id))?;
    let from_node = g
        .get_node(from_id)
        .ok_or(AStarError::InvalidReference(from_id))?;

    let mut poll = PeriodicPoll::new(delegate);
    let mut queue: BinaryHeap<QueueItem> = BinaryHeap::default();
    let mut came_from: HashMap<i64, i64> = HashMap::default();
    let mut known_costs: HashMap<i64, f32> = HashMap::default();
    let mut steps: usize = 0;

    let initial_distance = earth_distance(from_node.position, to_node.position) as f32;
    let mut closest_remaining = initial_distance;
    delegate.on_progress(options.progress.start);

    queue.push(QueueItem {
        at: from_id,
        cost: 0.0,
        score: initial_distance,
    });
    known_costs.insert(from_id, 0.0);

    while let Some(item) = queue.pop() {
        if poll.is_cancelled() {
            return Ok(AStarOutcome::Cancelled);
        }

        if item.at == to_id {
            delegate.on_progress(options.progress.end);
            return Ok(AStarOutcome::Found(reconstruct_path(&came_from, to_id)));
        }

        // The queue may hold stale entries for already improved nodes.
        if item.cost > known_costs.get(&item.at).copied().unwrap_or(f32::INFINITY) {
            continue;
        }

        steps += 1;
        if steps > options.step_limit {
            return Err(AStarError::StepLimitExceeded);
        }

        let remaining = item.score - item.cost;
        if remaining < closest_remaining && initial_distance > 0.0 {
            closest_remaining = remaining;
            let done = 1.0 - remaining / initial_distance;
            let span = options.progress.end - options.progress.start;
            delegate.on_progress(options.progress.start + span * done);
        }

        for &Edge {
            to: neighbor_id,
            cost: edge_cost,
        } in g.get_edges(item.at)
        {
            let Some(neighbor) = g.get_node(neighbor_id) else {
                if let Some(country) = g.foreign_country(neighbor_id) {
                    if !absent_countries.contains(country) {
                        log::debug!("Route search reached {} via node {}", country, neighbor_id);
                        absent_countries.insert(country.to_string());
                    }
                }
                continue;
            };

            let neighbor_cost = item.cost + edge_cost;
            if neighbor_cost >= known_costs.get(&neighbor_id).copied().unwrap_or(f32::INFINITY) {
                continue;
            }

            delegate.on_point_check(neighbor.position);
            came_from.insert(neighbor_id, item.at);
            known_costs.insert(neighbor_id, neighbor_cost);
            queue.push(QueueItem {
                at: neighbor_id,
                cost: neighbor_cost,
                score: neighbor_cost + earth_distance(neighbor.position, to_node.position) as f32,
            });
        }
    }

    Ok(AStarOutcome::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LatLon, Node};
    use std::sync::{Arc, Mutex};

    fn node(id: i64, lat: f64, lon: f64) -> Node {
        Node {
            id,
            position: LatLon::new(lat, lon),
        }
    }

    //  1───2───3
    //  │       │
    //  4───────5───(6: Czechia)
    fn simple_graph() -> Graph {
        let mut g = Graph::default();
        g.set_node(node(1, 0.01, 0.00));
        g.set_node(node(2, 0.01, 0.01));
        g.set_node(node(3, 0.01, 0.02));
        g.set_node(node(4, 0.00, 0.00));
        g.set_node(node(5, 0.00, 0.02));
        g.connect(1, 2, 1.0);
        g.connect(2, 3, 1.0);
        g.connect(1, 4, 1.0);
        g.connect(3, 5, 1.0);
        g.connect(4, 5, 1.5);
        g.set_edge(5, Edge { to: 6, cost: 1000.0 });
        g.set_foreign_node(6, "Czechia");
        g
    }

    fn search(g: &Graph, from: i64, to: i64) -> (Result<AStarOutcome, AStarError>, BTreeSet<String>) {
        let mut absent = BTreeSet::new();
        let delegate = RouterDelegate::new();
        let r = find_route(g, from, to, &delegate, &AStarOptions::default(), &mut absent);
        (r, absent)
    }

    #[test]
    fn finds_cheapest_route() {
        let g = simple_graph();
        let (r, _) = search(&g, 4, 3);
        assert_eq!(r, Ok(AStarOutcome::Found(vec![4, 1, 2, 3])));

        let (r, _) = search(&g, 2, 2);
        assert_eq!(r, Ok(AStarOutcome::Found(vec![2])));
    }

    #[test]
    fn not_found_and_invalid() {
        let mut g = simple_graph();
        g.set_node(node(7, 0.05, 0.05));
        let (r, absent) = search(&g, 1, 7);
        assert_eq!(r, Ok(AStarOutcome::NotFound));
        assert!(absent.contains("Czechia"));

        let (r, _) = search(&g, 1, 42);
        assert_eq!(r, Err(AStarError::InvalidReference(42)));
        let (r, _) = search(&g, 6, 1);
        assert_eq!(r, Err(AStarError::InvalidReference(6)));
    }

    #[test]
    fn step_limit() {
        let g = simple_graph();
        let mut absent = BTreeSet::new();
        let options = AStarOptions {
            step_limit: 1,
            ..Default::default()
        };
        let r = find_route(&g, 4, 3, &RouterDelegate::new(), &options, &mut absent);
        assert_eq!(r, Err(AStarError::StepLimitExceeded));
    }

    #[test]
    fn cancelled() {
        let g = simple_graph();
        let delegate = RouterDelegate::new();
        delegate.cancel();
        let r = find_route(&g, 4, 3, &delegate, &AStarOptions::default(), &mut BTreeSet::new());
        assert_eq!(r, Ok(AStarOutcome::Cancelled));
    }

    #[test]
    fn reports_progress() {
        let g = simple_graph();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut delegate = RouterDelegate::new();
        {
            let seen = Arc::clone(&seen);
            delegate.set_progress_callback(Arc::new(move |p| seen.lock().unwrap().push(p)));
        }

        let options = AStarOptions {
            progress: 50.0..100.0,
            ..Default::default()
        };
        let r = find_route(&g, 4, 3, &delegate, &options, &mut BTreeSet::new());
        assert!(matches!(r, Ok(AStarOutcome::Found(_))));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.first(), Some(&50.0));
        assert_eq!(seen.last(), Some(&100.0));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }
}
