// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[test]
fn call_from_main_runs_inline() {
    let dispatcher = MainDispatcher::new();
    assert!(dispatcher.is_main_thread());
    let result = dispatcher.call(|| 21 * 2).unwrap();
    assert_eq!(result, 42);
}

#[test]
fn call_from_other_thread_is_redirected() {
    let dispatcher = MainDispatcher::new();
    let remote = dispatcher.clone();
    let ran_on_main = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran_on_main);
    let main_id = std::thread::current().id();

    let worker = std::thread::spawn(move || {
        remote.call(move || {
            flag.store(std::thread::current().id() == main_id, Ordering::SeqCst);
            7
        })
    });

    // The worker blocks until the main thread services the call
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !worker.is_finished() && std::time::Instant::now() < deadline {
        dispatcher.pump();
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(worker.join().unwrap().unwrap(), 7);
    assert!(ran_on_main.load(Ordering::SeqCst), "redirected call must run on main");
}

#[test]
fn block_on_completion_pumps_redirected_calls() {
    let dispatcher = MainDispatcher::new();
    let remote = dispatcher.clone();
    let (done_tx, done_rx) = std::sync::mpsc::channel();

    // Worker first redirects a call to main, then signals completion.
    // Without pumping inside block_on_completion this would deadlock.
    let worker = std::thread::spawn(move || {
        let value = remote.call(|| 5).unwrap();
        done_tx.send(value).unwrap();
    });

    let value = dispatcher.block_on_completion(&done_rx).unwrap();
    assert_eq!(value, 5);
    worker.join().unwrap();
}

#[test]
fn block_on_completion_from_worker_blocks_plainly() {
    let dispatcher = MainDispatcher::new();
    let remote = dispatcher.clone();
    let handle = std::thread::spawn(move || {
        let (tx, rx) = std::sync::mpsc::channel();
        tx.send(3).unwrap();
        remote.block_on_completion(&rx)
    });
    assert_eq!(handle.join().unwrap().unwrap(), 3);
}

#[test]
fn dropped_completion_channel_is_an_error() {
    let dispatcher = MainDispatcher::new();
    let (done_tx, done_rx) = std::sync::mpsc::channel::<u32>();
    drop(done_tx);
    assert!(dispatcher.block_on_completion(&done_rx).is_err());
}

#[test]
fn pump_for_services_calls_until_timeout() {
    let dispatcher = MainDispatcher::new();
    let remote = dispatcher.clone();
    let worker = std::thread::spawn(move || remote.call(|| "done"));
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !worker.is_finished() && std::time::Instant::now() < deadline {
        dispatcher.pump_for(Duration::from_millis(10));
    }
    assert_eq!(worker.join().unwrap().unwrap(), "done");
}
