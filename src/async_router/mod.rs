// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! The route calculation orchestrator.
//!
//! [AsyncRouter] owns one worker thread. Requests are never queued: a new
//! request replaces the pending one and cancels the one in flight, whose
//! results are then suppressed by its [RouterDelegateProxy].

mod proxy;

use std::any::Any;
use std::collections::BTreeSet;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

pub use proxy::{NeedMoreMapsCallback, ReadyCallback, RemoveRouteCallback, RouterDelegateProxy};

use crate::statistics::{self, StatisticsCallback};
use crate::task::{TaskRunner, Thread};
use crate::{
    log_code, Checkpoints, Direction, GuidesTracks, LatLon, OnlineFetcher, PointCheckCallback,
    ProgressCallback, RoadProjection, Route, Router, RouterResultCode,
};
use proxy::Callbacks;

/// Additional controls of an [AsyncRouter].
#[derive(Clone)]
pub struct Options {
    /// Receives telemetry of every calculation, on [Thread::Gui].
    pub statistics_callback: Option<StatisticsCallback>,

    /// Receives sampled junctions visited by routers, on [Thread::Gui].
    /// Only used with the `route-debug-marks` feature.
    pub point_check_callback: Option<PointCheckCallback>,

    /// Name of the worker thread.
    pub thread_name: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            statistics_callback: None,
            point_check_callback: None,
            thread_name: "waypath-router".to_string(),
        }
    }
}

/// A route calculation request, see [AsyncRouter::calculate_route].
///
/// Only the ready callback is mandatory.
#[derive(Clone)]
pub struct RouteRequest {
    checkpoints: Checkpoints,
    direction: Direction,
    adjust_to_prev_route: bool,
    on_ready: ReadyCallback,
    on_need_more_maps: Option<NeedMoreMapsCallback>,
    on_remove_route: Option<RemoveRouteCallback>,
    on_progress: Option<ProgressCallback>,
    timeout_sec: u32,
}

impl RouteRequest {
    /// Creates a request without a timeout. `on_ready` receives the route
    /// as soon as it is calculated without errors, before absent maps are checked.
    pub fn new<F>(checkpoints: Checkpoints, on_ready: F) -> Self
    where
        F: Fn(Arc<Route>, RouterResultCode) + Send + Sync + 'static,
    {
        Self {
            checkpoints,
            direction: Direction::ZERO,
            adjust_to_prev_route: false,
            on_ready: Arc::new(on_ready),
            on_need_more_maps: None,
            on_remove_route: None,
            on_progress: None,
            timeout_sec: 0,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn adjust_to_prev_route(mut self, adjust: bool) -> Self {
        self.adjust_to_prev_route = adjust;
        self
    }

    /// Called with the route id and the absent countries when maps are missing.
    pub fn on_need_more_maps<F>(mut self, callback: F) -> Self
    where
        F: Fn(u64, &BTreeSet<String>) + Send + Sync + 'static,
    {
        self.on_need_more_maps = Some(Arc::new(callback));
        self
    }

    /// Called when the calculation has failed, so that a stale route can be removed.
    pub fn on_remove_route<F>(mut self, callback: F) -> Self
    where
        F: Fn(RouterResultCode) + Send + Sync + 'static,
    {
        self.on_remove_route = Some(Arc::new(callback));
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(f32) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Cancels the calculation after `seconds`; zero means no timeout.
    pub fn with_timeout(mut self, seconds: u32) -> Self {
        self.timeout_sec = seconds;
        self
    }

    pub fn checkpoints(&self) -> &Checkpoints {
        &self.checkpoints
    }
}

/// Calculates routes on a dedicated worker thread.
///
/// All methods return immediately; results are delivered via the
/// [TaskRunner] on [Thread::Gui]. Dropping the router cancels the current
/// calculation and waits for the worker thread to stop; no request
/// callback is invoked afterwards.
pub struct AsyncRouter {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<State>,
    wakeup: Condvar,
    runner: Arc<dyn TaskRunner>,
    statistics_callback: Option<StatisticsCallback>,
    point_check_callback: Option<PointCheckCallback>,
}

#[derive(Default)]
struct State {
    thread_exit: bool,
    has_request: bool,
    clear_state: bool,

    checkpoints: Option<Checkpoints>,
    start_direction: Direction,
    adjust_to_prev_route: bool,
    delegate_proxy: Option<Arc<RouterDelegateProxy>>,

    router: Option<Arc<dyn Router>>,
    absent_fetcher: Option<Arc<dyn OnlineFetcher>>,
    guides: GuidesTracks,
    route_counter: u64,
}

impl State {
    fn reset_delegate(&mut self) {
        if let Some(proxy) = self.delegate_proxy.take() {
            proxy.cancel();
        }
    }
}

/// Context of a calculation in which the router has failed.
struct Failure<'a> {
    router_name: &'a str,
    checkpoints: &'a Checkpoints,
    start_direction: Direction,
    route_id: u64,
}

/// Everything a single calculation needs, copied out of [State].
struct Job {
    checkpoints: Checkpoints,
    start_direction: Direction,
    adjust_to_prev_route: bool,
    proxy: Arc<RouterDelegateProxy>,
    router: Arc<dyn Router>,
    absent_fetcher: Option<Arc<dyn OnlineFetcher>>,
    guides: GuidesTracks,
    route_id: u64,
}

impl AsyncRouter {
    /// Creates the router and starts its worker thread.
    pub fn new(runner: Arc<dyn TaskRunner>, options: Options) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            wakeup: Condvar::new(),
            runner,
            statistics_callback: options.statistics_callback,
            point_check_callback: options.point_check_callback,
        });

        let thread = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(options.thread_name)
                .spawn(move || shared.thread_func())?
        };

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Installs the router (and optionally the online fetcher) used by the next calculation.
    ///
    /// The current calculation is cancelled but not waited for.
    pub fn set_router(&self, router: Arc<dyn Router>, fetcher: Option<Arc<dyn OnlineFetcher>>) {
        let mut state = self.shared.lock();
        state.reset_delegate();
        state.router = Some(router);
        state.absent_fetcher = fetcher;
    }

    /// Submits a calculation, superseding any pending or running one.
    pub fn calculate_route(&self, request: RouteRequest) {
        let callbacks = Callbacks {
            on_ready: request.on_ready,
            on_need_more_maps: request.on_need_more_maps,
            on_remove_route: request.on_remove_route,
            on_point_check: self.shared.point_check_callback.clone(),
            on_progress: request.on_progress,
        };

        let mut state = self.shared.lock();
        state.checkpoints = Some(request.checkpoints);
        state.start_direction = request.direction;
        state.adjust_to_prev_route = request.adjust_to_prev_route;

        state.reset_delegate();
        state.delegate_proxy = Some(RouterDelegateProxy::new(
            callbacks,
            Arc::clone(&self.shared.runner),
            request.timeout_sec,
        ));

        state.has_request = true;
        self.shared.wakeup.notify_one();
    }

    /// Attaches guide tracks to the next calculation only.
    pub fn set_guides_tracks(&self, guides: GuidesTracks) {
        self.shared.lock().guides = guides;
    }

    /// Asks the router to drop its caches and cancels the current calculation.
    pub fn clear_state(&self) {
        let mut state = self.shared.lock();
        state.clear_state = true;
        self.shared.wakeup.notify_one();
        state.reset_delegate();
    }

    /// Finds the closest road to `point` using the current router.
    pub fn find_closest_projection_to_road(
        &self,
        point: LatLon,
        direction: Direction,
        radius_m: f64,
    ) -> Option<RoadProjection> {
        let router = self.shared.lock().router.clone()?;
        router.find_closest_projection_to_road(point, direction, radius_m)
    }
}

impl Drop for AsyncRouter {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            state.reset_delegate();
            state.thread_exit = true;
            self.shared.wakeup.notify_one();
        }

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("The routing thread has panicked");
            }
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn thread_func(&self) {
        loop {
            {
                let state = self.lock();
                let mut state = self
                    .wakeup
                    .wait_while(state, |s| !(s.thread_exit || s.has_request || s.clear_state))
                    .unwrap_or_else(PoisonError::into_inner);

                if state.clear_state {
                    state.clear_state = false;
                    if let Some(router) = &state.router {
                        if let Err(e) = contain(|| router.clear_state()) {
                            log::error!("Router has failed to clear its state: {}", e);
                        }
                    }
                }

                if state.thread_exit {
                    break;
                }

                if !state.has_request {
                    continue;
                }
            }

            if let Some(job) = self.take_job() {
                self.calculate_route(job);
            }
        }
    }

    fn take_job(&self) -> Option<Job> {
        let mut state = self.lock();

        if !std::mem::take(&mut state.has_request) {
            return None;
        }

        let router = state.router.clone()?;
        let proxy = state.delegate_proxy.clone()?;
        let checkpoints = state.checkpoints.clone()?;

        state.route_counter += 1;
        Some(Job {
            checkpoints,
            start_direction: state.start_direction,
            adjust_to_prev_route: state.adjust_to_prev_route,
            proxy,
            router,
            absent_fetcher: state.absent_fetcher.clone(),
            guides: std::mem::take(&mut state.guides),
            route_id: state.route_counter,
        })
    }

    fn calculate_route(&self, job: Job) {
        let Job {
            checkpoints,
            start_direction,
            adjust_to_prev_route,
            proxy,
            router,
            absent_fetcher,
            guides,
            route_id,
        } = job;

        let router_name = router.name().to_string();
        let mut route = Route::new(router_name.as_str(), route_id);
        let timer = Instant::now();

        log::info!(
            "Calculating the route. checkpoints: {}, startDirection: {:?}, router name: {}",
            checkpoints,
            start_direction,
            router_name
        );

        let result = contain(|| {
            router.set_guides(guides);

            if let Some(fetcher) = &absent_fetcher {
                fetcher.generate_request(&checkpoints);
            }

            // Run the basic request
            let code = router.calculate_route(
                &checkpoints,
                start_direction,
                adjust_to_prev_route,
                proxy.delegate(),
                &mut route,
            );
            router.set_guides(GuidesTracks::new());
            code
        });

        let mut code = match result.and_then(|r| r.map_err(|e| e.to_string())) {
            Ok(code) => code,
            Err(message) => {
                let failure = Failure {
                    router_name: &router_name,
                    checkpoints: &checkpoints,
                    start_direction,
                    route_id,
                };
                return self.on_failure(failure, proxy, message);
            }
        };

        let elapsed_sec = timer.elapsed().as_secs_f64();
        log_code(code, elapsed_sec);
        log::info!("ETA: {} sec.", route.total_time_sec());

        let stats = statistics::calculation_statistics(
            &router_name,
            checkpoints.start(),
            start_direction,
            checkpoints.finish(),
            code,
            route.total_distance_meters(),
            elapsed_sec,
        );
        self.send_statistics(stats);

        let route = Arc::new(route);

        // Draw the route without waiting for the network.
        if code == RouterResultCode::NoError {
            let proxy = Arc::clone(&proxy);
            let route = Arc::clone(&route);
            self.runner
                .run_task(Thread::Gui, Box::new(move || proxy.on_ready(route, code)));
        }

        let mut absent = BTreeSet::new();
        if code != RouterResultCode::Cancelled {
            if let Some(fetcher) = &absent_fetcher {
                match contain(|| fetcher.absent_countries()) {
                    Ok(countries) => absent = countries,
                    Err(e) => log::error!("Online fetcher has failed: {}", e),
                }
            }
        }

        absent.extend(route.absent_countries().iter().cloned());
        if !absent.is_empty() {
            code = RouterResultCode::NeedMoreMaps;
        }

        log_code(code, timer.elapsed().as_secs_f64());

        match code {
            RouterResultCode::NoError => {}
            RouterResultCode::NeedMoreMaps => self.runner.run_task(
                Thread::Gui,
                Box::new(move || proxy.on_need_more_maps(route_id, &absent)),
            ),
            _ => self
                .runner
                .run_task(Thread::Gui, Box::new(move || proxy.on_remove_route(code))),
        }
    }

    /// Reports a router which has returned an error or panicked.
    fn on_failure(&self, failure: Failure<'_>, proxy: Arc<RouterDelegateProxy>, message: String) {
        let code = RouterResultCode::InternalError;
        log::error!("Exception happened while calculating route: {}", message);

        self.send_statistics(statistics::failure_statistics(
            failure.router_name,
            failure.checkpoints.start(),
            failure.start_direction,
            failure.checkpoints.finish(),
            &message,
        ));

        let route = Arc::new(Route::new(failure.router_name, failure.route_id));
        self.runner
            .run_task(Thread::Gui, Box::new(move || proxy.on_ready(route, code)));
    }

    fn send_statistics(&self, stats: statistics::Statistics) {
        if let Some(callback) = self.statistics_callback.clone() {
            self.runner
                .run_task(Thread::Gui, Box::new(move || callback(&stats)));
        }
    }
}

/// Runs `f`, turning a panic into its message.
fn contain<T, F: FnOnce() -> T>(f: F) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
