// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! A [Router] running [find_route] over an in-memory [Graph].

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::distance::bearing;
use crate::{
    earth_distance, find_route, AStarError, AStarOptions, AStarOutcome, Checkpoints,
    CityBoundariesChecker, Direction, Graph, GuidesTracks, KDTree, LatLon, RoadProjection, Route,
    RouteSegment, Router, RouterDelegate, RouterError, RouterResultCode, Turn, DEFAULT_STEP_LIMIT,
};

/// Configuration of a [GraphRouter].
#[derive(Debug, Clone)]
pub struct Options {
    /// Name reported in statistics and on every [Route].
    pub name: String,

    /// Max number of node expansions of every leg.
    pub step_limit: usize,

    /// Max distance between a checkpoint and the node it snaps to, in meters.
    pub snap_radius_m: f64,

    /// Speed used for the ETA on edges within a city.
    pub in_city_speed_kmph: f64,

    /// Speed used for the ETA on all other edges.
    pub out_city_speed_kmph: f64,

    /// Tells which edges are within a city. Without it, every edge is
    /// considered to be outside of cities.
    pub city_boundaries: Option<Arc<CityBoundariesChecker>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            name: "graph".to_string(),
            step_limit: DEFAULT_STEP_LIMIT,
            snap_radius_m: 1000.0,
            in_city_speed_kmph: 30.0,
            out_city_speed_kmph: 70.0,
            city_boundaries: None,
        }
    }
}

/// Routes over a [Graph] with A*, one search per leg between consecutive checkpoints.
///
/// Checkpoints snap to the nearest graph node, found with a [KDTree] built
/// on first use and dropped by [clear_state](Router::clear_state).
#[derive(Debug)]
pub struct GraphRouter {
    graph: Graph,
    options: Options,
    tree: Mutex<Option<Arc<KDTree>>>,
    guides: Mutex<GuidesTracks>,
}

impl GraphRouter {
    pub fn new(graph: Graph, options: Options) -> Self {
        Self {
            graph,
            options,
            tree: Mutex::default(),
            guides: Mutex::default(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    fn kd_tree(&self) -> Option<Arc<KDTree>> {
        let mut tree = lock(&self.tree);
        if tree.is_none() {
            log::debug!("Building the k-d tree over {} nodes", self.graph.len());
            *tree = KDTree::from_nodes(self.graph.iter().copied()).map(Arc::new);
        }
        tree.clone()
    }

    /// Snaps every checkpoint onto a graph node, or returns the code
    /// describing the first checkpoint too far from the road network.
    fn snap(&self, tree: &KDTree, checkpoints: &Checkpoints) -> Result<Vec<i64>, RouterResultCode> {
        let last = checkpoints.len() - 1;
        checkpoints
            .points()
            .iter()
            .enumerate()
            .map(|(idx, &point)| {
                let (node, distance) = tree.find_nearest_node(point);
                if distance <= self.options.snap_radius_m {
                    Ok(node.id)
                } else if idx == 0 {
                    Err(RouterResultCode::StartPointNotFound)
                } else if idx == last {
                    Err(RouterResultCode::EndPointNotFound)
                } else {
                    Err(RouterResultCode::IntermediatePointNotFound)
                }
            })
            .collect()
    }

    fn speed_mps(&self, a: LatLon, b: LatLon) -> f64 {
        let mid = LatLon::new((a.lat + b.lat) * 0.5, (a.lon + b.lon) * 0.5);
        let in_city = self
            .options
            .city_boundaries
            .as_ref()
            .is_some_and(|c| c.in_city(mid));

        let kmph = if in_city {
            self.options.in_city_speed_kmph
        } else {
            self.options.out_city_speed_kmph
        };
        kmph / 3.6
    }

    /// Turns node ids of all legs into a polyline with turn instructions.
    /// `leg_ends` holds polyline indices of intermediate checkpoints.
    fn build_route(&self, path: &[i64], leg_ends: &[usize], route: &mut Route) -> Result<(), RouterError> {
        let polyline = path
            .iter()
            .map(|&id| {
                self.graph
                    .get_node(id)
                    .map(|n| n.position)
                    .ok_or_else(|| RouterError::Internal(format!("route refers to missing node {}", id)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut segments = vec![RouteSegment {
            junction: polyline[0],
            turn: Turn::Start,
            distance_from_start_m: 0.0,
            time_from_start_sec: 0.0,
        }];
        let mut distance = 0.0;
        let mut time = 0.0;

        for i in 1..polyline.len() {
            let (prev, here) = (polyline[i - 1], polyline[i]);
            let d = earth_distance(prev, here);
            distance += d;
            time += d / self.speed_mps(prev, here);

            let turn = if i == polyline.len() - 1 {
                Turn::ReachedYourDestination
            } else if leg_ends.contains(&i) {
                Turn::ReachedIntermediatePoint
            } else {
                let next = polyline[i + 1];
                match Turn::from_heading_change(bearing(here, next) - bearing(prev, here)) {
                    Turn::GoStraight => continue,
                    turn => turn,
                }
            };

            segments.push(RouteSegment {
                junction: here,
                turn,
                distance_from_start_m: distance,
                time_from_start_sec: time,
            });
        }

        // A route between checkpoints snapped onto the same node
        if polyline.len() == 1 {
            segments.push(RouteSegment {
                turn: Turn::ReachedYourDestination,
                ..segments[0]
            });
        }

        route.set_polyline(polyline);
        route.set_segments(segments);
        Ok(())
    }
}

impl Router for GraphRouter {
    fn name(&self) -> &str {
        &self.options.name
    }

    fn clear_state(&self) {
        lock(&self.tree).take();
    }

    fn set_guides(&self, guides: GuidesTracks) {
        *lock(&self.guides) = guides;
    }

    fn calculate_route(
        &self,
        checkpoints: &Checkpoints,
        start_direction: Direction,
        adjust_to_prev_route: bool,
        delegate: &RouterDelegate,
        route: &mut Route,
    ) -> Result<RouterResultCode, RouterError> {
        let Some(tree) = self.kd_tree() else {
            return Ok(RouterResultCode::RouteFileNotExist);
        };

        if !start_direction.is_zero() || adjust_to_prev_route {
            log::debug!("Start direction and previous route are not taken into account");
        }
        let guides = lock(&self.guides).len();
        if guides > 0 {
            log::debug!("{} guides attached, but routing ignores them", guides);
        }

        let nodes = match self.snap(&tree, checkpoints) {
            Ok(nodes) => nodes,
            Err(code) => return Ok(code),
        };

        let legs = nodes.len() - 1;
        let mut path: Vec<i64> = Vec::new();
        let mut leg_ends = Vec::with_capacity(legs.saturating_sub(1));
        let mut absent = BTreeSet::new();

        for (leg, pair) in nodes.windows(2).enumerate() {
            let options = AStarOptions {
                step_limit: self.options.step_limit,
                progress: (100.0 * leg as f32 / legs as f32)..(100.0 * (leg + 1) as f32 / legs as f32),
            };

            match find_route(&self.graph, pair[0], pair[1], delegate, &options, &mut absent) {
                Ok(AStarOutcome::Found(leg_path)) => {
                    let skip = if path.is_empty() { 0 } else { 1 };
                    path.extend_from_slice(&leg_path[skip..]);
                    if leg + 1 < legs {
                        leg_ends.push(path.len() - 1);
                    }
                }

                Ok(AStarOutcome::Cancelled) => return Ok(RouterResultCode::Cancelled),

                Ok(AStarOutcome::NotFound) | Err(AStarError::StepLimitExceeded) => {
                    log::debug!("No route on leg {} ({} -> {})", leg, pair[0], pair[1]);
                    add_absent_countries(route, absent);
                    return Ok(RouterResultCode::RouteNotFound);
                }

                Err(e @ AStarError::InvalidReference(_)) => {
                    return Err(RouterError::Internal(e.to_string()));
                }
            }
        }

        self.build_route(&path, &leg_ends, route)?;

        // A shorter route might lead through countries without maps
        add_absent_countries(route, absent);
        Ok(RouterResultCode::NoError)
    }

    fn find_closest_projection_to_road(
        &self,
        point: LatLon,
        _direction: Direction,
        radius_m: f64,
    ) -> Option<RoadProjection> {
        let (node, distance_m) = self.kd_tree()?.find_nearest_node(point);
        (distance_m <= radius_m).then_some(RoadProjection {
            node_id: node.id,
            point: node.position,
            distance_m,
        })
    }
}

fn add_absent_countries(route: &mut Route, countries: BTreeSet<String>) {
    for country in countries {
        route.add_absent_country(country);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::city_boundaries::boundary_polygon;
    use crate::{Edge, Node};

    macro_rules! assert_almost_eq {
        ($a:expr, $b:expr, $eps:expr) => {
            assert!(
                (($a - $b).abs() < $eps),
                "assertion failed: {} ≈ {}",
                $a,
                $b
            )
        };
    }

    fn node(id: i64, lat: f64, lon: f64) -> Node {
        Node {
            id,
            position: LatLon::new(lat, lon),
        }
    }

    //  1───2───3
    //      │
    //      4───5───(6: Slovakia)
    fn sample_graph() -> Graph {
        let mut g = Graph::default();
        g.set_node(node(1, 0.02, 0.00));
        g.set_node(node(2, 0.02, 0.01));
        g.set_node(node(3, 0.02, 0.02));
        g.set_node(node(4, 0.01, 0.01));
        g.set_node(node(5, 0.01, 0.02));
        g.connect(1, 2, 1.0);
        g.connect(2, 3, 1.0);
        g.connect(2, 4, 1.0);
        g.connect(4, 5, 1.0);
        g.set_edge(5, Edge { to: 6, cost: 1000.0 });
        g.set_foreign_node(6, "Slovakia");
        g
    }

    fn calculate(router: &GraphRouter, points: Vec<LatLon>) -> (RouterResultCode, Route) {
        let mut route = Route::new(router.name(), 1);
        let code = router
            .calculate_route(
                &Checkpoints::new(points).unwrap(),
                Direction::ZERO,
                false,
                &RouterDelegate::new(),
                &mut route,
            )
            .unwrap();
        (code, route)
    }

    #[test]
    fn route_with_turns() {
        let router = GraphRouter::new(sample_graph(), Options::default());
        let (code, route) = calculate(&router, vec![LatLon::new(0.0201, 0.0), LatLon::new(0.0099, 0.0201)]);

        assert_eq!(code, RouterResultCode::NoError);
        assert_eq!(route.polyline().len(), 4);

        let turns = route.segments().iter().map(|s| s.turn).collect::<Vec<_>>();
        assert_eq!(
            turns,
            vec![Turn::Start, Turn::TurnRight, Turn::TurnLeft, Turn::ReachedYourDestination]
        );

        assert_almost_eq!(route.total_distance_meters(), 3.0 * 1111.95, 1.0);
        let expected_time = route.total_distance_meters() / (70.0 / 3.6);
        assert_almost_eq!(route.total_time_sec(), expected_time, 0.01);
    }

    #[test]
    fn intermediate_points() {
        let router = GraphRouter::new(sample_graph(), Options::default());
        let (code, route) = calculate(
            &router,
            vec![LatLon::new(0.02, 0.0), LatLon::new(0.02, 0.02), LatLon::new(0.01, 0.02)],
        );

        assert_eq!(code, RouterResultCode::NoError);
        // 1-2-3, then 3-2-4-5
        assert_eq!(route.polyline().len(), 6);
        assert!(route
            .segments()
            .iter()
            .any(|s| s.turn == Turn::ReachedIntermediatePoint && s.junction == LatLon::new(0.02, 0.02)));
    }

    #[test]
    fn city_speed() {
        let checker = CityBoundariesChecker::from_boundaries(vec![boundary_polygon(&[
            LatLon::new(-1.0, -1.0),
            LatLon::new(-1.0, 1.0),
            LatLon::new(1.0, 1.0),
            LatLon::new(1.0, -1.0),
        ])]);
        let options = Options {
            city_boundaries: Some(Arc::new(checker)),
            ..Default::default()
        };
        let router = GraphRouter::new(sample_graph(), options);
        let (code, route) = calculate(&router, vec![LatLon::new(0.02, 0.0), LatLon::new(0.02, 0.02)]);

        assert_eq!(code, RouterResultCode::NoError);
        let expected_time = route.total_distance_meters() / (30.0 / 3.6);
        assert_almost_eq!(route.total_time_sec(), expected_time, 0.01);
    }

    #[test]
    fn snapping_failures() {
        let router = GraphRouter::new(sample_graph(), Options::default());
        let far = LatLon::new(10.0, 10.0);
        let near = LatLon::new(0.02, 0.0);

        assert_eq!(calculate(&router, vec![far, near]).0, RouterResultCode::StartPointNotFound);
        assert_eq!(calculate(&router, vec![near, far]).0, RouterResultCode::EndPointNotFound);
        assert_eq!(
            calculate(&router, vec![near, far, near]).0,
            RouterResultCode::IntermediatePointNotFound
        );
    }

    #[test]
    fn empty_graph() {
        let router = GraphRouter::new(Graph::default(), Options::default());
        let (code, _) = calculate(&router, vec![LatLon::ZERO, LatLon::new(0.01, 0.01)]);
        assert_eq!(code, RouterResultCode::RouteFileNotExist);
        assert!(router.find_closest_projection_to_road(LatLon::ZERO, Direction::ZERO, 1e6).is_none());
    }

    #[test]
    fn unreachable_with_absent_country() {
        let mut g = sample_graph();
        g.set_node(node(7, 0.0, 0.0));
        let router = GraphRouter::new(g, Options::default());
        let (code, route) = calculate(&router, vec![LatLon::new(0.02, 0.0), LatLon::new(0.0, 0.0)]);

        assert_eq!(code, RouterResultCode::RouteNotFound);
        assert!(route.absent_countries().contains("Slovakia"));
    }

    #[test]
    fn found_with_absent_country() {
        let router = GraphRouter::new(sample_graph(), Options::default());
        let (code, route) = calculate(&router, vec![LatLon::new(0.01, 0.02), LatLon::new(0.01, 0.01)]);

        assert_eq!(code, RouterResultCode::NoError);
        assert_eq!(route.polyline().len(), 2);
        assert!(route.absent_countries().contains("Slovakia"));
    }

    #[test]
    fn cancelled() {
        let router = GraphRouter::new(sample_graph(), Options::default());
        let delegate = RouterDelegate::new();
        delegate.cancel();
        let mut route = Route::new(router.name(), 1);
        let code = router
            .calculate_route(
                &Checkpoints::from_start_finish(LatLon::new(0.02, 0.0), LatLon::new(0.01, 0.02)).unwrap(),
                Direction::ZERO,
                false,
                &delegate,
                &mut route,
            )
            .unwrap();
        assert_eq!(code, RouterResultCode::Cancelled);
        assert!(!route.is_valid());
    }

    #[test]
    fn closest_projection() {
        let router = GraphRouter::new(sample_graph(), Options::default());
        let p = router
            .find_closest_projection_to_road(LatLon::new(0.0101, 0.0199), Direction::ZERO, 100.0)
            .unwrap();
        assert_eq!(p.node_id, 5);
        assert!(p.distance_m < 20.0);

        assert!(router
            .find_closest_projection_to_road(LatLon::new(0.5, 0.5), Direction::ZERO, 100.0)
            .is_none());

        router.clear_state();
        assert!(router
            .find_closest_projection_to_road(LatLon::new(0.0101, 0.0199), Direction::ZERO, 100.0)
            .is_some());
    }
}
