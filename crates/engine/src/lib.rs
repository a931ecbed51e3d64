// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! labx-engine: the module lifecycle engine.
//!
//! Hosts plug-in modules described by configuration: resolves their
//! dependencies, places threaded instances on dedicated worker threads,
//! drives their state machines under concurrent requests, persists their
//! appdata, runs cancelable tasks and consumes modules served by remote
//! peers.

pub mod ctx;
pub mod dispatch;
pub mod error;
pub mod event_bus;
pub mod fsm;
pub mod handle;
pub mod manager;
pub mod module;
pub mod remote;
pub mod tasks;
pub mod threads;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use ctx::EngineCtx;
pub use dispatch::MainDispatcher;
pub use error::EngineError;
pub use event_bus::EventBus;
pub use fsm::{StateEvent, StateMachine, Transition, TransitionHooks};
pub use handle::{ModuleHandle, ModuleRef};
pub use manager::ModuleManager;
pub use module::{
    ClassRegistry, ConnectorDecl, MissingAction, Module, ModuleClass, ModuleError, ModuleInit,
    OptionDecl, StatusVarDecl,
};
pub use tasks::{
    ArgMap, InterruptFlag, Task, TaskClass, TaskDescriptor, TaskError, TaskInit, TaskManager,
    TaskWorker,
};
pub use threads::{ThreadManager, WorkerThread};
