// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::ops::Deref;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::{LatLon, TimeoutCancellable};

/// Minimal change of progress, in percentage points, which is forwarded
/// to the progress callback by [RouterDelegate::on_progress].
pub const PROGRESS_STEP: f32 = 0.5;

/// Only every `POINT_CHECK_PERIOD`-th call to [RouterDelegate::on_point_check]
/// reaches the point check callback.
pub const POINT_CHECK_PERIOD: u64 = 100;

/// [PeriodicPoll] consults the underlying delegate once per `POLL_PERIOD` calls.
pub const POLL_PERIOD: u32 = 128;

pub type ProgressCallback = Arc<dyn Fn(f32) + Send + Sync>;
pub type PointCheckCallback = Arc<dyn Fn(LatLon) + Send + Sync>;

/// Sentinel for "no progress was reported yet"; not a valid f32 bit pattern
/// produced by [f32::to_bits] for any percentage.
const NO_PROGRESS: u32 = u32::MAX;

/// The object threaded through a [Router](crate::Router) call.
///
/// It lets the router check for cancellation cheaply (it derefs to
/// [TimeoutCancellable]) and report progress and visited points
/// without knowing anything about threads.
///
/// Router implementations must poll [is_cancelled](TimeoutCancellable::is_cancelled)
/// at least every few thousand node expansions (see [PeriodicPoll]) and return
/// [RouterResultCode::Cancelled](crate::RouterResultCode::Cancelled) promptly afterwards.
pub struct RouterDelegate {
    cancellable: TimeoutCancellable,
    progress_callback: Option<ProgressCallback>,
    point_check_callback: Option<PointCheckCallback>,
    last_progress: AtomicU32,
    point_checks: AtomicU64,
}

impl Default for RouterDelegate {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterDelegate {
    pub fn new() -> Self {
        Self {
            cancellable: TimeoutCancellable::new(),
            progress_callback: None,
            point_check_callback: None,
            last_progress: AtomicU32::new(NO_PROGRESS),
            point_checks: AtomicU64::new(0),
        }
    }

    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress_callback = Some(callback);
    }

    pub fn set_point_check_callback(&mut self, callback: PointCheckCallback) {
        self.point_check_callback = Some(callback);
    }

    /// Reports calculation progress, in percent.
    ///
    /// Calls which moved the progress by less than [PROGRESS_STEP] since the
    /// last forwarded value are dropped, except for reaching 100%.
    pub fn on_progress(&self, percent: f32) {
        let Some(callback) = &self.progress_callback else {
            return;
        };

        let percent = percent.clamp(0.0, 100.0);
        let last = self.last_progress.load(Ordering::Relaxed);
        if last != NO_PROGRESS {
            let last = f32::from_bits(last);
            if percent <= last || (percent - last < PROGRESS_STEP && percent < 100.0) {
                return;
            }
        }

        self.last_progress.store(percent.to_bits(), Ordering::Relaxed);
        callback(percent);
    }

    /// Reports that the search has visited a junction.
    /// Only every [POINT_CHECK_PERIOD]-th call is forwarded.
    pub fn on_point_check(&self, point: LatLon) {
        let Some(callback) = &self.point_check_callback else {
            return;
        };

        if self.point_checks.fetch_add(1, Ordering::Relaxed) % POINT_CHECK_PERIOD == 0 {
            callback(point);
        }
    }
}

impl Deref for RouterDelegate {
    type Target = TimeoutCancellable;

    fn deref(&self) -> &Self::Target {
        &self.cancellable
    }
}

impl std::fmt::Debug for RouterDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterDelegate")
            .field("status", &self.cancellable.status())
            .field("has_progress_callback", &self.progress_callback.is_some())
            .field("has_point_check_callback", &self.point_check_callback.is_some())
            .finish()
    }
}

/// Rate-limits cancellation checks in hot loops: only every [POLL_PERIOD]-th
/// call to [is_cancelled](Self::is_cancelled) consults the delegate.
/// The first call always does.
pub struct PeriodicPoll<'a> {
    delegate: &'a RouterDelegate,
    count: u32,
}

impl<'a> PeriodicPoll<'a> {
    pub fn new(delegate: &'a RouterDelegate) -> Self {
        Self { delegate, count: 0 }
    }

    pub fn is_cancelled(&mut self) -> bool {
        let check = self.count % POLL_PERIOD == 0;
        self.count = self.count.wrapping_add(1);
        check && self.delegate.is_cancelled()
    }
}
