// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Scheduling closures onto logical threads.
//!
//! The routing core never assumes a threading runtime; everything it needs
//! from the embedding application is [TaskRunner::run_task]: "run this closure
//! later on that thread, in FIFO order with respect to my other submissions".

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Logical thread a [Task] should run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Thread {
    /// The UI/main thread; all routing callbacks are delivered here.
    Gui,
    Background,
}

/// The platform's task scheduling primitive.
pub trait TaskRunner: Send + Sync {
    /// Schedules `task` on `thread`. Tasks submitted for the same thread
    /// from the same source must run in submission order.
    fn run_task(&self, thread: Thread, task: Task);
}

/// Runs every task synchronously, on the calling thread.
///
/// Handy in single-threaded harnesses; note that callbacks then run on the
/// routing worker thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateRunner;

impl TaskRunner for ImmediateRunner {
    fn run_task(&self, _thread: Thread, task: Task) {
        task()
    }
}

/// Collects tasks until they are explicitly executed with
/// [run_pending](Self::run_pending), which makes delivery order fully
/// deterministic in tests.
#[derive(Default)]
pub struct QueueRunner {
    queue: Mutex<VecDeque<(Thread, Task)>>,
    queued: Condvar,
}

impl QueueRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of tasks waiting to be run.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs queued tasks in FIFO order (including tasks queued by those tasks)
    /// until the queue is empty. Returns the number of executed tasks.
    pub fn run_pending(&self) -> usize {
        let mut executed = 0;
        while let Some((_, task)) = self.pop() {
            task();
            executed += 1;
        }
        executed
    }

    /// Blocks until at least one task is queued or `timeout` elapses,
    /// then runs everything pending. Returns the number of executed tasks.
    pub fn wait_and_run(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        {
            let mut queue = self.lock();
            while queue.is_empty() {
                let now = Instant::now();
                if now >= deadline {
                    return 0;
                }
                queue = match self.queued.wait_timeout(queue, deadline - now) {
                    Ok((q, _)) => q,
                    Err(poisoned) => poisoned.into_inner().0,
                };
            }
        }
        self.run_pending()
    }

    fn pop(&self) -> Option<(Thread, Task)> {
        self.lock().pop_front()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<(Thread, Task)>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TaskRunner for QueueRunner {
    fn run_task(&self, thread: Thread, task: Task) {
        self.lock().push_back((thread, task));
        self.queued.notify_all();
    }
}

/// Runs tasks on dedicated threads, one per [Thread] tag, each
/// consuming its own FIFO channel.
pub struct ThreadRunner {
    gui: Worker,
    background: Worker,
}

struct Worker {
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(name: &str) -> Self {
        let (sender, receiver) = mpsc::channel::<Task>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(task) = receiver.recv() {
                    task();
                }
            })
            .map_err(|e| log::error!("Failed to spawn the {} thread: {}", name, e))
            .ok();

        Self {
            sender: Mutex::new(handle.as_ref().map(|_| sender)),
            handle,
        }
    }

    fn submit(&self, task: Task) {
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        match sender.as_ref() {
            Some(s) => {
                if s.send(task).is_err() {
                    log::warn!("Task dropped: the runner thread has stopped");
                }
            }
            None => log::warn!("Task dropped: the runner thread is not running"),
        }
    }

    fn stop(&mut self) {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("A task runner thread has panicked");
            }
        }
    }
}

impl ThreadRunner {
    pub fn new() -> Self {
        Self {
            gui: Worker::spawn("waypath-gui"),
            background: Worker::spawn("waypath-background"),
        }
    }
}

impl Default for ThreadRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRunner for ThreadRunner {
    fn run_task(&self, thread: Thread, task: Task) {
        match thread {
            Thread::Gui => self.gui.submit(task),
            Thread::Background => self.background.submit(task),
        }
    }
}

impl Drop for ThreadRunner {
    /// Runs all already submitted tasks, then stops the threads.
    fn drop(&mut self) {
        self.gui.stop();
        self.background.stop();
    }
}
