// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::BTreeSet;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use clap::{Parser, Subcommand};
use waypath::{
    AsyncRouter, Checkpoints, CityBoundariesChecker, Container, Graph, GraphRouter, ImmediateRunner,
    LatLon, Route, RouteRequest, RouterResultCode,
};

#[derive(Debug, thiserror::Error)]
#[error("{0}: {1}")]
struct MapLoadError(PathBuf, #[source] Box<dyn Error + Send + Sync>);

#[derive(Debug, thiserror::Error)]
enum RouteError {
    #[error("routing has failed: {0}")]
    Failed(RouterResultCode),

    #[error("maps of the following countries are missing: {0:?}")]
    NeedMoreMaps(BTreeSet<String>),

    #[error("route calculation has timed out")]
    NoAnswer,
}

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Calculates a route and prints it as GeoJSON
    Route {
        /// The path to the map container
        container: PathBuf,

        /// Latitude of the start point
        start_lat: f64,

        /// Longitude of the start point
        start_lon: f64,

        /// Latitude of the end point
        end_lat: f64,

        /// Longitude of the end point
        end_lon: f64,

        /// Calculation timeout in seconds, 0 to disable
        #[arg(long, default_value_t = 0)]
        timeout: u32,
    },

    /// Checks whether a point lies within a city
    InCity {
        /// The path to the map container
        container: PathBuf,

        /// Latitude of the point
        lat: f64,

        /// Longitude of the point
        lon: f64,
    },
}

enum Outcome {
    Ready(Arc<Route>, RouterResultCode),
    NeedMoreMaps(BTreeSet<String>),
    Removed(RouterResultCode),
}

pub fn main() -> Result<(), Box<dyn Error>> {
    colog::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Route {
            container,
            start_lat,
            start_lon,
            end_lat,
            end_lon,
            timeout,
        } => {
            let start = LatLon::new(start_lat, start_lon);
            let end = LatLon::new(end_lat, end_lon);
            let route = calculate(&container, start, end, timeout)?;
            print_geojson(&route);
        }

        Command::InCity { container, lat, lon } => {
            let c = load_container(&container)?;
            let checker = CityBoundariesChecker::load(&c);
            println!("{}", checker.in_city(LatLon::new(lat, lon)));
        }
    }

    Ok(())
}

fn calculate(path: &Path, start: LatLon, end: LatLon, timeout: u32) -> Result<Arc<Route>, Box<dyn Error>> {
    let container = load_container(path)?;
    let graph = Graph::load(&container).map_err(|e| MapLoadError(path.into(), Box::new(e)))?;
    let options = waypath::graph_router::Options {
        city_boundaries: Some(Arc::new(CityBoundariesChecker::load(&container))),
        ..Default::default()
    };

    let router = AsyncRouter::new(Arc::new(ImmediateRunner), Default::default())?;
    router.set_router(Arc::new(GraphRouter::new(graph, options)), None);

    let (tx, rx) = mpsc::channel();
    let ready_tx = tx.clone();
    let maps_tx = tx.clone();
    let request = RouteRequest::new(Checkpoints::from_start_finish(start, end)?, move |route, code| {
        let _ = ready_tx.send(Outcome::Ready(route, code));
    })
    .on_need_more_maps(move |_, countries| {
        let _ = maps_tx.send(Outcome::NeedMoreMaps(countries.clone()));
    })
    .on_remove_route(move |code| {
        let _ = tx.send(Outcome::Removed(code));
    })
    .with_timeout(timeout);

    router.calculate_route(request);

    // The timeout only bounds the router itself; allow for loading and delivery.
    let wait = match timeout {
        0 => Duration::from_secs(24 * 3600),
        t => Duration::from_secs(t as u64 + 5),
    };
    match rx.recv_timeout(wait) {
        Ok(Outcome::Ready(route, RouterResultCode::NoError)) => Ok(route),
        Ok(Outcome::Ready(_, code)) | Ok(Outcome::Removed(code)) => Err(RouteError::Failed(code).into()),
        Ok(Outcome::NeedMoreMaps(countries)) => Err(RouteError::NeedMoreMaps(countries).into()),
        Err(_) => Err(RouteError::NoAnswer.into()),
    }
}

fn load_container(path: &Path) -> Result<Container, MapLoadError> {
    Container::from_file(path).map_err(|e| MapLoadError(path.into(), Box::new(e)))
}

fn print_geojson(route: &Route) {
    println!("{{");
    println!("  \"type\": \"FeatureCollection\",");
    println!("  \"features\": [");
    println!("    {{");
    println!("      \"type\": \"Feature\",");
    println!("      \"properties\": {{");
    println!("        \"distance\": {},", route.total_distance_meters());
    println!("        \"time\": {}", route.total_time_sec());
    println!("      }},");

    println!("      \"geometry\": {{");
    println!("        \"type\": \"LineString\",");
    println!("        \"coordinates\": [");

    let mut points = route.polyline().iter().peekable();
    while let Some(point) = points.next() {
        let suffix = if points.peek().is_some() { "," } else { "" };
        println!("          [{}, {}]{}", point.lon, point.lat, suffix);
    }

    println!("        ]");
    println!("      }}");
    println!("    }}");
    println!("  ]");
    println!("}}");
}
