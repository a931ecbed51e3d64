// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thread registry invariants and boundary cases.

use labx_engine::{EngineError, ThreadManager};
use std::time::Duration;

#[test]
fn registry_size_invariant() {
    let manager = ThreadManager::new();
    for name in ["a", "b", "c"] {
        manager.new_thread(name).unwrap();
    }
    assert_eq!(manager.thread_names().len(), manager.len());
    assert_eq!(manager.len(), 3);
}

#[test]
fn removing_a_running_thread_is_a_state_error() {
    let manager = ThreadManager::new();
    let thread = manager.new_thread("worker").unwrap();
    thread.start().unwrap();
    assert!(matches!(manager.unregister("worker"), Err(EngineError::State(_))));
    manager.quit("worker").unwrap();
    manager.join("worker", Duration::from_secs(5)).unwrap();
    manager.unregister("worker").unwrap();
    assert_eq!(manager.len(), 0);
}

#[test]
fn zero_timeout_join_returns_immediately() {
    let manager = ThreadManager::new();
    let thread = manager.new_thread("worker").unwrap();
    thread.start().unwrap();

    let start = std::time::Instant::now();
    let err = manager.join("worker", Duration::ZERO).unwrap_err();
    assert!(matches!(err, EngineError::Timeout(_)));
    assert!(start.elapsed() < Duration::from_millis(200));

    manager.quit_all();
    manager.join_all(Duration::from_secs(5)).unwrap();
}
