// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{
    blocking_task_class, connected_task_class, doubling_task_class, test_manager,
    DummyClassBuilder,
};
use labx_core::{LocalDescriptor, ModuleBase, TaskEvent};
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

fn wait_for(manager: &ModuleManager, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for task");
        manager.ctx().dispatcher.pump();
        std::thread::sleep(Duration::from_millis(2));
    }
}

fn task_descriptor(name: &str, class: &TaskClass, connect: &[(&str, &str)]) -> TaskDescriptor {
    let mut connect_map = IndexMap::new();
    for (connector, module) in connect {
        connect_map.insert(connector.to_string(), module.to_string());
    }
    TaskDescriptor {
        name: name.to_string(),
        class_path: class.class_path.clone(),
        options: IndexMap::new(),
        connect: connect_map,
    }
}

#[test]
fn run_captures_result_and_transitions() {
    let dir = tempfile::tempdir().unwrap();
    let manager = test_manager(dir.path());
    let tasks = TaskManager::new(Arc::clone(&manager.ctx().threads));
    let class = Arc::new(doubling_task_class());
    tasks.add_task(task_descriptor("t", &class, &[]), class.clone(), &manager).unwrap();
    let rx = tasks.subscribe();

    let mut args = ArgMap::new();
    args.insert("x".to_string(), Value::Int(21));
    tasks.set_arguments("t", args).unwrap();

    assert_eq!(tasks.get_state("t").unwrap(), TaskState::Idle);
    tasks.run("t").unwrap();
    wait_for(&manager, || tasks.get_state("t").unwrap() == TaskState::Idle
        && tasks.get_result("t").unwrap().0.is_some());

    let (value, succeeded) = tasks.get_result("t").unwrap();
    assert_eq!(value, Some(Value::Int(42)));
    assert!(succeeded);

    // Events: parameters changed, idle->running, running->idle, finished
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(
        events,
        [
            TaskEvent::ParametersChanged { name: "t".to_string() },
            TaskEvent::StateChanged { name: "t".to_string(), state: TaskState::Running },
            TaskEvent::StateChanged { name: "t".to_string(), state: TaskState::Idle },
            TaskEvent::Finished { name: "t".to_string(), succeeded: true },
        ]
    );
    tasks.terminate();
}

#[test]
fn default_arguments_come_from_the_class() {
    let dir = tempfile::tempdir().unwrap();
    let manager = test_manager(dir.path());
    let tasks = TaskManager::new(Arc::clone(&manager.ctx().threads));
    let class = Arc::new(doubling_task_class());
    tasks.add_task(task_descriptor("t", &class, &[]), class.clone(), &manager).unwrap();

    tasks.run("t").unwrap();
    wait_for(&manager, || tasks.get_result("t").unwrap().1);
    assert_eq!(tasks.get_result("t").unwrap().0, Some(Value::Int(0)), "default x = 0");
    tasks.terminate();
}

#[test]
fn interrupt_cancels_running_task() {
    let dir = tempfile::tempdir().unwrap();
    let manager = test_manager(dir.path());
    let tasks = TaskManager::new(Arc::clone(&manager.ctx().threads));
    let started = Arc::new(AtomicBool::new(false));
    let class = Arc::new(blocking_task_class(Arc::clone(&started)));
    tasks.add_task(task_descriptor("t", &class, &[]), class.clone(), &manager).unwrap();

    tasks.run("t").unwrap();
    wait_for(&manager, || started.load(std::sync::atomic::Ordering::SeqCst));
    assert_eq!(tasks.get_state("t").unwrap(), TaskState::Running);

    tasks.interrupt("t").unwrap();
    wait_for(&manager, || tasks.get_state("t").unwrap() == TaskState::Idle);
    let (value, succeeded) = tasks.get_result("t").unwrap();
    assert_eq!(value, None);
    assert!(!succeeded);
    tasks.terminate();
}

#[test]
fn interrupt_before_run_cancels_in_activate_hook() {
    let dir = tempfile::tempdir().unwrap();
    let manager = test_manager(dir.path());
    let tasks = TaskManager::new(Arc::clone(&manager.ctx().threads));
    let class = Arc::new(doubling_task_class());
    tasks.add_task(task_descriptor("t", &class, &[]), class.clone(), &manager).unwrap();
    let rx = tasks.subscribe();

    tasks.interrupt("t").unwrap();
    tasks.run("t").unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut finished = None;
    while finished.is_none() {
        assert!(Instant::now() < deadline);
        manager.ctx().dispatcher.pump();
        if let Ok(TaskEvent::Finished { succeeded, .. }) = rx.try_recv() {
            finished = Some(succeeded);
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(finished, Some(false), "pre-raised flag cancels the run");
    assert_eq!(tasks.get_result("t").unwrap(), (None, false));
    tasks.terminate();
}

#[test]
fn connected_task_activates_module_and_calls_it() {
    let dir = tempfile::tempdir().unwrap();
    let manager = test_manager(dir.path());
    manager
        .ctx()
        .registry
        .register(DummyClassBuilder::new("labx.hw.Dev", ModuleBase::Hardware).build())
        .unwrap();
    manager
        .add(
            labx_core::ModuleDescriptor::local(
                "dev",
                ModuleBase::Hardware,
                LocalDescriptor {
                    class_path: "labx.hw.Dev".to_string(),
                    allow_remote: false,
                    options: IndexMap::new(),
                    connectors: IndexMap::new(),
                },
            )
            .unwrap(),
            false,
        )
        .unwrap();

    let tasks = TaskManager::new(Arc::clone(&manager.ctx().threads));
    let class = Arc::new(connected_task_class());
    tasks
        .add_task(task_descriptor("t", &class, &[("dev", "dev")]), class.clone(), &manager)
        .unwrap();

    let mut args = ArgMap::new();
    args.insert("x".to_string(), Value::Int(8));
    tasks.set_arguments("t", args).unwrap();
    tasks.run("t").unwrap();
    wait_for(&manager, || tasks.get_result("t").unwrap().1);

    assert_eq!(tasks.get_result("t").unwrap().0, Some(Value::Int(16)));
    assert_eq!(
        manager.get_state("dev").unwrap(),
        labx_core::ModuleState::Idle,
        "connector target was activated through the manager"
    );
    tasks.terminate();
}

#[test]
fn run_while_running_is_a_state_error() {
    let dir = tempfile::tempdir().unwrap();
    let manager = test_manager(dir.path());
    let tasks = TaskManager::new(Arc::clone(&manager.ctx().threads));
    let started = Arc::new(AtomicBool::new(false));
    let class = Arc::new(blocking_task_class(Arc::clone(&started)));
    tasks.add_task(task_descriptor("t", &class, &[]), class.clone(), &manager).unwrap();

    tasks.run("t").unwrap();
    wait_for(&manager, || started.load(std::sync::atomic::Ordering::SeqCst));
    assert!(matches!(tasks.run("t"), Err(EngineError::State(_))));
    tasks.interrupt("t").unwrap();
    wait_for(&manager, || tasks.get_state("t").unwrap() == TaskState::Idle);
    tasks.terminate();
}

#[test]
fn duplicate_task_name_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let manager = test_manager(dir.path());
    let tasks = TaskManager::new(Arc::clone(&manager.ctx().threads));
    let class = Arc::new(doubling_task_class());
    tasks.add_task(task_descriptor("t", &class, &[]), class.clone(), &manager).unwrap();
    assert!(matches!(
        tasks.add_task(task_descriptor("t", &class, &[]), class.clone(), &manager),
        Err(EngineError::Duplicate(_))
    ));
    tasks.terminate();
}

#[test]
fn workers_run_on_named_threads() {
    let dir = tempfile::tempdir().unwrap();
    let manager = test_manager(dir.path());
    let tasks = TaskManager::new(Arc::clone(&manager.ctx().threads));
    let class = Arc::new(doubling_task_class());
    tasks.add_task(task_descriptor("scan", &class, &[]), class.clone(), &manager).unwrap();
    assert!(manager.ctx().threads.get("task-scan").is_some());
    tasks.terminate();
    assert!(manager.ctx().threads.get("task-scan").is_none(), "terminate releases threads");
}

#[test]
fn unknown_task_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let manager = test_manager(dir.path());
    let tasks = TaskManager::new(Arc::clone(&manager.ctx().threads));
    assert!(matches!(tasks.run("ghost"), Err(EngineError::NotFound(_))));
    assert!(matches!(tasks.get_result("ghost"), Err(EngineError::NotFound(_))));
}
