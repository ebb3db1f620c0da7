// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::task::{TaskRunner, Thread};
use crate::{
    LatLon, PointCheckCallback, ProgressCallback, Route, RouterDelegate,
    RouterResultCode,
};

pub type ReadyCallback = Arc<dyn Fn(Arc<Route>, RouterResultCode) + Send + Sync>;
pub type NeedMoreMapsCallback = Arc<dyn Fn(u64, &BTreeSet<String>) + Send + Sync>;
pub type RemoveRouteCallback = Arc<dyn Fn(RouterResultCode) + Send + Sync>;

/// Callbacks of a single route request.
#[derive(Clone)]
pub(crate) struct Callbacks {
    pub on_ready: ReadyCallback,
    pub on_need_more_maps: Option<NeedMoreMapsCallback>,
    pub on_remove_route: Option<RemoveRouteCallback>,
    pub on_point_check: Option<PointCheckCallback>,
    pub on_progress: Option<ProgressCallback>,
}

/// Ties a [RouterDelegate] to the callbacks of one request.
///
/// Once the request is cancelled, either through [cancel](Self::cancel) or
/// by running out of time, nothing reaches those callbacks anymore, even if
/// the router keeps running for a while or results are already queued on the
/// UI thread.
pub struct RouterDelegateProxy {
    guard: Mutex<()>,
    delegate: RouterDelegate,
    callbacks: Callbacks,
    runner: Arc<dyn TaskRunner>,
}

impl RouterDelegateProxy {
    pub(crate) fn new(
        callbacks: Callbacks,
        runner: Arc<dyn TaskRunner>,
        timeout_sec: u32,
    ) -> Arc<Self> {
        Arc::new_cyclic(|proxy: &Weak<Self>| {
            let mut delegate = RouterDelegate::new();

            if callbacks.on_progress.is_some() {
                let proxy = proxy.clone();
                delegate.set_progress_callback(Arc::new(move |percent| {
                    if let Some(p) = proxy.upgrade() {
                        p.on_progress(percent);
                    }
                }));
            }

            if cfg!(feature = "route-debug-marks") && callbacks.on_point_check.is_some() {
                let proxy = proxy.clone();
                delegate.set_point_check_callback(Arc::new(move |point| {
                    if let Some(p) = proxy.upgrade() {
                        p.on_point_check(point);
                    }
                }));
            }

            delegate.set_timeout(timeout_sec);
            delegate.reset();

            Self {
                guard: Mutex::new(()),
                delegate,
                callbacks,
                runner,
            }
        })
    }

    /// The delegate to hand over to the [Router](crate::Router).
    pub fn delegate(&self) -> &RouterDelegate {
        &self.delegate
    }

    pub fn is_cancelled(&self) -> bool {
        self.delegate.is_cancelled()
    }

    /// Stops all further deliveries and makes the router's
    /// [is_cancelled](crate::TimeoutCancellable::is_cancelled) return true.
    pub fn cancel(&self) {
        let _lock = self.lock();
        self.delegate.cancel();
    }

    pub(crate) fn on_ready(&self, route: Arc<Route>, code: RouterResultCode) {
        if !self.may_deliver() {
            return;
        }
        (self.callbacks.on_ready)(route, code);
    }

    pub(crate) fn on_need_more_maps(&self, route_id: u64, absent_countries: &BTreeSet<String>) {
        let Some(callback) = &self.callbacks.on_need_more_maps else {
            return;
        };
        if !self.may_deliver() {
            return;
        }
        callback(route_id, absent_countries);
    }

    pub(crate) fn on_remove_route(&self, code: RouterResultCode) {
        let Some(callback) = &self.callbacks.on_remove_route else {
            return;
        };
        if !self.may_deliver() {
            return;
        }
        callback(code);
    }

    fn on_progress(&self, percent: f32) {
        let _lock = self.lock();
        if self.delegate.is_cancelled() {
            return;
        }
        if let Some(callback) = self.callbacks.on_progress.clone() {
            self.runner
                .run_task(Thread::Gui, Box::new(move || callback(percent)));
        }
    }

    fn on_point_check(&self, point: LatLon) {
        let _lock = self.lock();
        if self.delegate.is_cancelled() {
            return;
        }
        if let Some(callback) = self.callbacks.on_point_check.clone() {
            self.runner
                .run_task(Thread::Gui, Box::new(move || callback(point)));
        }
    }

    fn may_deliver(&self) -> bool {
        let _lock = self.lock();
        !self.delegate.is_cancelled()
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.guard.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
