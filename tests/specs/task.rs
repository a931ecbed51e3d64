// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task lifecycle scenario.

use labx_core::{TaskEvent, TaskState, Value};
use labx_engine::test_support::{blocking_task_class, doubling_task_class, test_manager};
use labx_engine::{ArgMap, TaskDescriptor, TaskManager};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn descriptor(name: &str, class_path: &str) -> TaskDescriptor {
    TaskDescriptor {
        name: name.to_string(),
        class_path: class_path.to_string(),
        options: indexmap::IndexMap::new(),
        connect: indexmap::IndexMap::new(),
    }
}

#[test]
fn s6_task_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let manager = test_manager(dir.path());
    let tasks = TaskManager::new(Arc::clone(&manager.ctx().threads));
    let class = Arc::new(doubling_task_class());
    tasks.add_task(descriptor("t", &class.class_path), Arc::clone(&class), &manager).unwrap();
    let rx = tasks.subscribe();

    let mut args = ArgMap::new();
    args.insert("x".to_string(), Value::Int(21));
    tasks.set_arguments("t", args).unwrap();
    tasks.run("t").unwrap();

    // Within bounded time the worker transitions Idle -> Running -> Idle
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut transitions = Vec::new();
    while transitions.len() < 2 && Instant::now() < deadline {
        manager.ctx().dispatcher.pump();
        if let Ok(TaskEvent::StateChanged { state, .. }) = rx.try_recv() {
            transitions.push(state);
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(transitions, [TaskState::Running, TaskState::Idle]);
    assert_eq!(tasks.get_result("t").unwrap(), (Some(Value::Int(42)), true));

    // Interrupting a long-running task yields (nil, false) without a
    // process-level error
    let started = Arc::new(AtomicBool::new(false));
    let slow = Arc::new(blocking_task_class(Arc::clone(&started)));
    tasks.add_task(descriptor("slow", &slow.class_path), Arc::clone(&slow), &manager).unwrap();
    tasks.run("slow").unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !started.load(Ordering::SeqCst) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    tasks.interrupt("slow").unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while tasks.get_state("slow").unwrap() != TaskState::Idle && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(tasks.get_result("slow").unwrap(), (None, false));

    tasks.terminate();
}
