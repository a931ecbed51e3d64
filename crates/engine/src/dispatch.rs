// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Main-thread call redirection.
//!
//! Operations that touch module instances are confined to the application's
//! main thread. A `MainDispatcher` captures the creating thread as "main";
//! calls from other threads are shipped over as request messages and block
//! on a completion channel, while calls already on the main thread run
//! inline. Blocking waits performed on the main thread pump the pending
//! queue so redirected calls keep flowing while the main thread waits on a
//! worker (e.g. during a threaded activation hook).

use crate::error::EngineError;
use parking_lot::Mutex;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send>;

struct DispatcherShared {
    main: ThreadId,
    tx: mpsc::Sender<Job>,
    /// Only ever locked from the main thread.
    rx: Mutex<mpsc::Receiver<Job>>,
}

/// Cloneable handle redirecting calls onto the main thread.
pub struct MainDispatcher {
    shared: Arc<DispatcherShared>,
}

impl Clone for MainDispatcher {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl Default for MainDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MainDispatcher {
    /// Create a dispatcher bound to the current thread as "main".
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            shared: Arc::new(DispatcherShared {
                main: std::thread::current().id(),
                tx,
                rx: Mutex::new(rx),
            }),
        }
    }

    pub fn is_main_thread(&self) -> bool {
        std::thread::current().id() == self.shared.main
    }

    /// Run `f` on the main thread, blocking until it completed.
    ///
    /// Inline when already on the main thread; otherwise the call is
    /// enqueued and the caller blocks on the completion channel.
    pub fn call<R: Send + 'static>(
        &self,
        f: impl FnOnce() -> R + Send + 'static,
    ) -> Result<R, EngineError> {
        if self.is_main_thread() {
            // Drain redirected calls queued before ours so ordering holds
            self.pump();
            return Ok(f());
        }
        let (done_tx, done_rx) = mpsc::channel();
        self.shared
            .tx
            .send(Box::new(move || {
                let _ = done_tx.send(f());
            }))
            .map_err(|_| EngineError::State("main dispatcher is gone".to_string()))?;
        done_rx
            .recv()
            .map_err(|_| EngineError::State("main thread dropped the call".to_string()))
    }

    /// Block on a completion channel. On the main thread the pending queue
    /// is pumped while waiting so redirected calls cannot deadlock against
    /// the blocked caller.
    pub fn block_on_completion<R>(&self, done_rx: &mpsc::Receiver<R>) -> Result<R, EngineError> {
        if !self.is_main_thread() {
            return done_rx
                .recv()
                .map_err(|_| EngineError::State("worker dropped the completion channel".to_string()));
        }
        loop {
            match done_rx.recv_timeout(Duration::from_millis(5)) {
                Ok(result) => {
                    return Ok(result);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => self.pump(),
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(EngineError::State(
                        "worker dropped the completion channel".to_string(),
                    ));
                }
            }
        }
    }

    /// Execute all currently queued redirected calls. Main thread only;
    /// calls from elsewhere are a no-op.
    pub fn pump(&self) {
        if !self.is_main_thread() {
            return;
        }
        loop {
            let job = {
                let rx = self.shared.rx.lock();
                match rx.try_recv() {
                    Ok(job) => job,
                    Err(_) => break,
                }
            };
            job();
        }
    }

    /// Block the main thread servicing redirected calls until `deadline`
    /// work arrives or the timeout elapses. Used by the application loop to
    /// interleave dispatch with the watchdog timer.
    pub fn pump_for(&self, timeout: Duration) {
        if !self.is_main_thread() {
            return;
        }
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = match deadline.checked_duration_since(std::time::Instant::now()) {
                Some(rem) if !rem.is_zero() => rem,
                _ => break,
            };
            let job = {
                let rx = self.shared.rx.lock();
                match rx.recv_timeout(remaining) {
                    Ok(job) => job,
                    Err(_) => break,
                }
            };
            job();
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
