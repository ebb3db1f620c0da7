// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::sync::{mpsc, Arc};
use std::time::Duration;

use waypath::city_boundaries::{self, boundary_polygon};
use waypath::{
    graph, AsyncRouter, Checkpoints, CityBoundariesChecker, Compression, Container, Direction,
    Edge, Graph, GraphRouter, ImmediateRunner, LatLon, Node, RouteRequest, RouterResultCode,
};

// A ladder of 10 rungs along the equator, with a border crossing at the east end:
//
//  101─102─103─ ... ─110
//   │   │   │         │
//    1───2───3─ ... ──10──(99: Kenya)
fn ladder() -> Graph {
    let mut g = Graph::default();
    for i in 1..=10 {
        let lon = i as f64 * 0.01;
        g.set_node(Node {
            id: i,
            position: LatLon::new(0.0, lon),
        });
        g.set_node(Node {
            id: 100 + i,
            position: LatLon::new(0.01, lon),
        });
        g.connect(i, 100 + i, 1.0);
        if i > 1 {
            g.connect(i - 1, i, 1.0);
            g.connect(100 + i - 1, 100 + i, 1.0);
        }
    }
    g.set_edge(10, Edge { to: 99, cost: 2000.0 });
    g.set_foreign_node(99, "Kenya");
    g
}

fn map_file() -> Container {
    let mut c = Container::new();
    c.insert(graph::SECTION_NAME, &ladder().encode(), Compression::Zlib)
        .unwrap();
    c.insert(
        city_boundaries::SECTION_NAME,
        &city_boundaries::encode_boundaries(&[boundary_polygon(&[
            LatLon::new(-0.005, 0.005),
            LatLon::new(-0.005, 0.035),
            LatLon::new(0.015, 0.035),
            LatLon::new(0.015, 0.005),
        ])]),
        Compression::Bzip2,
    )
    .unwrap();
    c
}

#[test]
fn routes_over_a_map_file() {
    let path = std::env::temp_dir().join(format!("waypath-ladder-{}.wpmc", std::process::id()));
    map_file().write_file(&path).unwrap();
    let container = Container::from_file(&path);
    std::fs::remove_file(&path).unwrap();
    let container = container.unwrap();

    let checker = Arc::new(CityBoundariesChecker::load(&container));
    assert!(checker.in_city(LatLon::new(0.0, 0.02)));
    assert!(!checker.in_city(LatLon::new(0.0, 0.08)));

    let router = GraphRouter::new(
        Graph::load(&container).unwrap(),
        waypath::graph_router::Options {
            city_boundaries: Some(checker),
            ..Default::default()
        },
    );

    let async_router = AsyncRouter::new(Arc::new(ImmediateRunner), Default::default()).unwrap();
    async_router.set_router(Arc::new(router), None);

    let (tx, rx) = mpsc::channel();
    let checkpoints =
        Checkpoints::from_start_finish(LatLon::new(0.0, 0.01), LatLon::new(0.01, 0.05)).unwrap();
    async_router.calculate_route(RouteRequest::new(checkpoints, move |route, code| {
        tx.send((route, code)).unwrap();
    }));

    let (route, code) = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(code, RouterResultCode::NoError);
    assert_eq!(route.router_name(), "graph");

    // 4 rungs east and 1 north, whatever the order
    let distance = route.total_distance_meters();
    assert!((distance - 5.0 * 1111.95).abs() < 5.0, "{}", distance);

    // Partially in the city, so slower than 70 km/h but faster than 30 km/h
    let time = route.total_time_sec();
    assert!(time > distance / (70.0 / 3.6));
    assert!(time < distance / (30.0 / 3.6));

    let projection = async_router
        .find_closest_projection_to_road(LatLon::new(0.0001, 0.0301), Direction::ZERO, 50.0)
        .unwrap();
    assert_eq!(projection.node_id, 3);
}

#[test]
fn border_crossing_needs_more_maps() {
    let mut g = ladder();
    g.set_node(Node {
        id: 500,
        position: LatLon::new(0.0, 0.12),
    });

    let async_router = AsyncRouter::new(Arc::new(ImmediateRunner), Default::default()).unwrap();
    async_router.set_router(Arc::new(GraphRouter::new(g, Default::default())), None);

    let (tx, rx) = mpsc::channel();
    let checkpoints =
        Checkpoints::from_start_finish(LatLon::new(0.0, 0.01), LatLon::new(0.0, 0.12)).unwrap();
    let ready_tx = tx.clone();
    async_router.calculate_route(
        RouteRequest::new(checkpoints, move |_, code| {
            ready_tx.send(Err(code)).unwrap();
        })
        .on_need_more_maps(move |_, countries| {
            tx.send(Ok(countries.clone())).unwrap();
        }),
    );

    let countries = rx.recv_timeout(Duration::from_secs(10)).unwrap().unwrap();
    assert_eq!(countries.into_iter().collect::<Vec<_>>(), vec!["Kenya".to_string()]);
}

#[derive(Debug, PartialEq)]
enum Delivery {
    Ready(RouterResultCode),
    NeedMoreMaps(Vec<String>),
}

#[test]
fn route_next_to_the_border_is_drawn_then_needs_more_maps() {
    let async_router = AsyncRouter::new(Arc::new(ImmediateRunner), Default::default()).unwrap();
    async_router.set_router(Arc::new(GraphRouter::new(ladder(), Default::default())), None);

    // Starting at node 10 expands its edge into Kenya before going north
    let (tx, rx) = mpsc::channel();
    let checkpoints =
        Checkpoints::from_start_finish(LatLon::new(0.0, 0.1), LatLon::new(0.01, 0.1)).unwrap();
    let ready_tx = tx.clone();
    async_router.calculate_route(
        RouteRequest::new(checkpoints, move |_, code| {
            ready_tx.send(Delivery::Ready(code)).unwrap();
        })
        .on_need_more_maps(move |_, countries| {
            tx.send(Delivery::NeedMoreMaps(countries.iter().cloned().collect()))
                .unwrap();
        }),
    );

    let timeout = Duration::from_secs(10);
    assert_eq!(rx.recv_timeout(timeout).unwrap(), Delivery::Ready(RouterResultCode::NoError));
    assert_eq!(
        rx.recv_timeout(timeout).unwrap(),
        Delivery::NeedMoreMaps(vec!["Kenya".to_string()])
    );
}
