// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named worker threads and their registry.
//!
//! Each worker thread runs a cooperative event loop draining queued jobs.
//! Threads are created unstarted so callers can queue setup work (moving a
//! module instance onto the thread) before `start`, the move-then-start
//! pattern. `quit` closes the queue; the loop drains what is pending and
//! exits. `join` waits with a timeout and never runs under the registry
//! mutex.

use crate::error::EngineError;
use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A unit of work executed on a worker thread.
pub type Job = Box<dyn FnOnce() + Send>;

struct WorkerShared {
    name: String,
    ctl: Mutex<Ctl>,
    finished: Mutex<bool>,
    finished_cv: Condvar,
}

struct Ctl {
    /// Send side of the job queue; dropped on `quit` to end the loop.
    tx: Option<mpsc::Sender<Job>>,
    /// Receive side, consumed by `start`.
    rx: Option<mpsc::Receiver<Job>>,
    join: Option<std::thread::JoinHandle<()>>,
    started: bool,
}

/// Handle to one named worker thread.
pub struct WorkerThread {
    shared: Arc<WorkerShared>,
}

impl Clone for WorkerThread {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl WorkerThread {
    /// Create an unstarted worker. Jobs posted before `start` queue up and
    /// run once the thread is live.
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            shared: Arc::new(WorkerShared {
                name: name.into(),
                ctl: Mutex::new(Ctl { tx: Some(tx), rx: Some(rx), join: None, started: false }),
                finished: Mutex::new(false),
                finished_cv: Condvar::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Spawn the OS thread and enter the job loop. Idempotent.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut ctl = self.shared.ctl.lock();
        if ctl.started {
            return Ok(());
        }
        let rx = ctl
            .rx
            .take()
            .ok_or_else(|| EngineError::State(format!("thread {:?} already ran", self.name())))?;
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name(self.shared.name.clone())
            .spawn(move || {
                for job in rx {
                    job();
                }
                *shared.finished.lock() = true;
                shared.finished_cv.notify_all();
            })
            .map_err(|e| EngineError::State(format!("failed to spawn thread: {}", e)))?;
        ctl.join = Some(handle);
        ctl.started = true;
        debug!(thread = %self.shared.name, "worker thread started");
        Ok(())
    }

    /// Queue a job. Fails once the thread has quit or finished.
    pub fn post(&self, job: Job) -> Result<(), EngineError> {
        let ctl = self.shared.ctl.lock();
        let tx = ctl
            .tx
            .as_ref()
            .ok_or_else(|| EngineError::State(format!("thread {:?} is quitting", self.name())))?;
        tx.send(job)
            .map_err(|_| EngineError::State(format!("thread {:?} has stopped", self.name())))
    }

    /// Request a cooperative exit: pending jobs still run, then the loop
    /// ends. Idempotent.
    pub fn quit(&self) {
        let mut ctl = self.shared.ctl.lock();
        if ctl.tx.take().is_some() {
            debug!(thread = %self.shared.name, "worker thread quit requested");
        }
        if !ctl.started {
            // Never started: nothing will drain the queue, mark finished
            ctl.rx = None;
            drop(ctl);
            *self.shared.finished.lock() = true;
            self.shared.finished_cv.notify_all();
        }
    }

    /// True between `start` and loop exit.
    pub fn is_running(&self) -> bool {
        let started = self.shared.ctl.lock().started;
        started && !*self.shared.finished.lock()
    }

    /// Wait for the loop to end. A zero timeout checks without blocking.
    /// The registry never calls this while holding its own lock.
    pub fn join(&self, timeout: Duration) -> Result<(), EngineError> {
        {
            let started = self.shared.ctl.lock().started;
            let mut finished = self.shared.finished.lock();
            if !*finished {
                if !started && self.shared.ctl.lock().tx.is_some() {
                    return Err(EngineError::State(format!(
                        "thread {:?} was never started",
                        self.name()
                    )));
                }
                let result = self
                    .shared
                    .finished_cv
                    .wait_while_for(&mut finished, |done| !*done, timeout);
                if result.timed_out() && !*finished {
                    return Err(EngineError::Timeout(format!(
                        "thread {:?} did not stop within {:?}",
                        self.name(),
                        timeout
                    )));
                }
            }
        }
        // Loop has ended; reap the OS thread.
        let handle = self.shared.ctl.lock().join.take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!(thread = %self.shared.name, "worker thread panicked");
            }
        }
        Ok(())
    }

    fn same_thread(&self, other: &WorkerThread) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

/// Registry of named worker threads.
///
/// One mutex serializes the table; it is never held while joining.
pub struct ThreadManager {
    threads: Mutex<IndexMap<String, WorkerThread>>,
}

impl Default for ThreadManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadManager {
    pub fn new() -> Self {
        Self { threads: Mutex::new(IndexMap::new()) }
    }

    /// Create and register a new, unstarted thread.
    pub fn new_thread(&self, name: &str) -> Result<WorkerThread, EngineError> {
        let mut threads = self.threads.lock();
        if threads.contains_key(name) {
            return Err(EngineError::Duplicate(name.to_string()));
        }
        let thread = WorkerThread::new(name);
        threads.insert(name.to_string(), thread.clone());
        debug!(thread = name, "created worker thread");
        Ok(thread)
    }

    /// Attach an externally created thread. Registering the same thread
    /// under its existing name is a no-op; a different thread under a taken
    /// name is a conflict.
    pub fn register(&self, name: &str, thread: WorkerThread) -> Result<(), EngineError> {
        let mut threads = self.threads.lock();
        if let Some(existing) = threads.get(name) {
            if existing.same_thread(&thread) {
                return Ok(());
            }
            return Err(EngineError::Duplicate(name.to_string()));
        }
        threads.insert(name.to_string(), thread);
        Ok(())
    }

    /// Remove a thread from the registry. Fails while it is running.
    pub fn unregister(&self, name: &str) -> Result<(), EngineError> {
        let mut threads = self.threads.lock();
        let thread =
            threads.get(name).ok_or_else(|| EngineError::NotFound(name.to_string()))?;
        if thread.is_running() {
            return Err(EngineError::State(format!(
                "thread {:?} is still running",
                name
            )));
        }
        threads.shift_remove(name);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<WorkerThread> {
        self.threads.lock().get(name).cloned()
    }

    pub fn thread_names(&self) -> Vec<String> {
        self.threads.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.lock().is_empty()
    }

    /// Request cooperative exit of one thread's loop.
    pub fn quit(&self, name: &str) -> Result<(), EngineError> {
        let thread = self.get(name).ok_or_else(|| EngineError::NotFound(name.to_string()))?;
        thread.quit();
        Ok(())
    }

    pub fn quit_all(&self) {
        let threads: Vec<WorkerThread> = self.threads.lock().values().cloned().collect();
        for thread in threads {
            thread.quit();
        }
    }

    /// Join one thread with a timeout. The registry lock is released before
    /// blocking.
    pub fn join(&self, name: &str, timeout: Duration) -> Result<(), EngineError> {
        let thread = self.get(name).ok_or_else(|| EngineError::NotFound(name.to_string()))?;
        thread.join(timeout)
    }

    /// Join every registered thread, applying `timeout` per thread.
    pub fn join_all(&self, timeout: Duration) -> Result<(), EngineError> {
        let threads: Vec<WorkerThread> = self.threads.lock().values().cloned().collect();
        for thread in threads {
            thread.join(timeout)?;
        }
        Ok(())
    }

    /// Quit, join and drop one thread. Used when a module releases its
    /// worker during deactivation.
    pub fn retire(&self, name: &str, timeout: Duration) -> Result<(), EngineError> {
        let thread = self.get(name).ok_or_else(|| EngineError::NotFound(name.to_string()))?;
        thread.quit();
        thread.join(timeout)?;
        self.unregister(name)
    }
}

#[cfg(test)]
#[path = "threads_tests.rs"]
mod tests;
