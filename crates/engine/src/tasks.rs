// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancelable task workers.
//!
//! A task is a user-defined unit of work parameterized by keyword
//! arguments, hosted on its own worker thread. Interruption is
//! cooperative: `interrupt` raises a flag the task observes at
//! `InterruptFlag::check` points; a flag raised before `run` starts makes
//! the activate hook fail with `Cancelled`.

use crate::error::EngineError;
use crate::event_bus::EventBus;
use crate::handle::ModuleRef;
use crate::manager::ModuleManager;
use crate::threads::{ThreadManager, WorkerThread};
use indexmap::IndexMap;
use labx_core::{TaskEvent, TaskState, Value};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Join bound applied per task thread at termination.
const TERMINATE_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Keyword arguments of a task run.
pub type ArgMap = IndexMap<String, Value>;

/// Errors raised inside task implementations.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task observed its interrupt flag.
    #[error("task was cancelled")]
    Cancelled,

    #[error("{0}")]
    Runtime(String),

    /// Failure talking to a connected module.
    #[error(transparent)]
    Engine(#[from] Box<EngineError>),
}

impl From<EngineError> for TaskError {
    fn from(e: EngineError) -> Self {
        TaskError::Engine(Box::new(e))
    }
}

/// Cooperative cancellation flag shared between a worker and its task.
#[derive(Clone, Default)]
pub struct InterruptFlag {
    flag: Arc<AtomicBool>,
}

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Observation point: fails with `Cancelled` when the flag is raised.
    pub fn check(&self) -> Result<(), TaskError> {
        if self.is_set() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Everything a task receives at construction.
pub struct TaskInit {
    pub name: String,
    pub options: IndexMap<String, Value>,
    /// Connected modules, activated through the manager before the run.
    pub connections: IndexMap<String, ModuleRef>,
}

/// A user-defined task body.
pub trait Task: Send {
    /// Pre-run hook. The default observes the interrupt flag so a task
    /// interrupted before `run` fails with `Cancelled`.
    fn activate(&mut self, interrupt: &InterruptFlag) -> Result<(), TaskError> {
        interrupt.check()
    }

    fn run(&mut self, args: &ArgMap, interrupt: &InterruptFlag) -> Result<Value, TaskError>;

    /// Always called after `run`, success or not.
    fn deactivate(&mut self) {}
}

/// Factory producing a fresh task instance per run.
pub type TaskFactory = Arc<dyn Fn(TaskInit) -> Result<Box<dyn Task>, TaskError> + Send + Sync>;

/// Declarative description of a task class.
#[derive(Clone)]
pub struct TaskClass {
    pub class_path: String,
    /// Default keyword arguments, taken from the task signature.
    pub default_args: ArgMap,
    pub factory: TaskFactory,
}

/// Configuration of one task worker.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub name: String,
    pub class_path: String,
    pub options: IndexMap<String, Value>,
    /// Connector name → module name, auto-activated before each run.
    pub connect: IndexMap<String, String>,
}

struct TaskShared {
    descriptor: TaskDescriptor,
    class: Arc<TaskClass>,
    manager: ModuleManager,
    args: Mutex<ArgMap>,
    state: Mutex<TaskState>,
    result: Mutex<(Option<Value>, bool)>,
    interrupt: InterruptFlag,
    bus: EventBus<TaskEvent>,
}

/// One task worker: descriptor, argument record, last result and state.
pub struct TaskWorker {
    shared: Arc<TaskShared>,
}

impl Clone for TaskWorker {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl TaskWorker {
    fn new(
        descriptor: TaskDescriptor,
        class: Arc<TaskClass>,
        manager: ModuleManager,
        bus: EventBus<TaskEvent>,
    ) -> Self {
        let args = class.default_args.clone();
        Self {
            shared: Arc::new(TaskShared {
                descriptor,
                class,
                manager,
                args: Mutex::new(args),
                state: Mutex::new(TaskState::Idle),
                result: Mutex::new((None, false)),
                interrupt: InterruptFlag::new(),
                bus,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.descriptor.name
    }

    pub fn state(&self) -> TaskState {
        *self.shared.state.lock()
    }

    /// Last result: `(value, succeeded)`.
    pub fn result(&self) -> (Option<Value>, bool) {
        self.shared.result.lock().clone()
    }

    pub fn arguments(&self) -> ArgMap {
        self.shared.args.lock().clone()
    }

    /// Replace the keyword argument record.
    pub fn set_arguments(&self, args: ArgMap) {
        *self.shared.args.lock() = args;
        self.shared
            .bus
            .emit(TaskEvent::ParametersChanged { name: self.name().to_string() });
    }

    /// Raise the cooperative cancel flag.
    pub fn interrupt(&self) {
        self.shared.interrupt.set();
    }

    fn set_state(&self, state: TaskState) {
        *self.shared.state.lock() = state;
        self.shared
            .bus
            .emit(TaskEvent::StateChanged { name: self.name().to_string(), state });
    }

    /// Execute one run on the calling thread (the task's worker thread
    /// when driven by the [`TaskManager`]).
    pub fn run(&self) {
        let name = self.name().to_string();
        *self.shared.result.lock() = (None, false);

        // Resolve connected modules, activating them through the manager
        let mut connections = IndexMap::new();
        let mut connect_failed = false;
        for (connector, module) in &self.shared.descriptor.connect {
            match self.shared.manager.get_instance(module) {
                Ok(instance) => {
                    connections.insert(connector.clone(), instance);
                }
                Err(e) => {
                    error!(task = %name, module = %module, error = %e, "connector activation failed");
                    connect_failed = true;
                    break;
                }
            }
        }
        if connect_failed {
            self.finish(false);
            return;
        }

        let init = TaskInit {
            name: name.clone(),
            options: self.shared.descriptor.options.clone(),
            connections,
        };
        let mut task = match (self.shared.class.factory)(init) {
            Ok(task) => task,
            Err(e) => {
                error!(task = %name, error = %e, "task construction failed");
                self.finish(false);
                return;
            }
        };

        self.set_state(TaskState::Running);
        let args = self.arguments();
        let outcome = task
            .activate(&self.shared.interrupt)
            .and_then(|()| task.run(&args, &self.shared.interrupt));
        task.deactivate();

        let succeeded = match outcome {
            Ok(value) => {
                *self.shared.result.lock() = (Some(value), true);
                true
            }
            Err(TaskError::Cancelled) => {
                info!(task = %name, "task cancelled");
                false
            }
            Err(e) => {
                error!(task = %name, error = %e, "task failed");
                false
            }
        };
        self.set_state(TaskState::Idle);
        self.finish(succeeded);
    }

    fn finish(&self, succeeded: bool) {
        self.shared.interrupt.clear();
        self.shared
            .bus
            .emit(TaskEvent::Finished { name: self.name().to_string(), succeeded });
    }
}

struct TaskEntry {
    worker: TaskWorker,
    thread: WorkerThread,
}

struct TaskManagerShared {
    workers: Mutex<IndexMap<String, TaskEntry>>,
    threads: Arc<ThreadManager>,
    bus: EventBus<TaskEvent>,
}

/// Ordered table of task workers, each on a dedicated `task-<name>`
/// thread.
pub struct TaskManager {
    shared: Arc<TaskManagerShared>,
}

impl Clone for TaskManager {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl TaskManager {
    pub fn new(threads: Arc<ThreadManager>) -> Self {
        Self {
            shared: Arc::new(TaskManagerShared {
                workers: Mutex::new(IndexMap::new()),
                threads,
                bus: EventBus::new(),
            }),
        }
    }

    pub fn subscribe(&self) -> std::sync::mpsc::Receiver<TaskEvent> {
        self.shared.bus.subscribe()
    }

    /// Register a worker and start its dedicated thread.
    pub fn add_task(
        &self,
        descriptor: TaskDescriptor,
        class: Arc<TaskClass>,
        manager: &ModuleManager,
    ) -> Result<(), EngineError> {
        let name = descriptor.name.clone();
        {
            let workers = self.shared.workers.lock();
            if workers.contains_key(&name) {
                return Err(EngineError::Duplicate(name));
            }
        }
        let thread = self.shared.threads.new_thread(&format!("task-{}", name))?;
        thread.start()?;
        let worker = TaskWorker::new(descriptor, class, manager.clone(), self.shared.bus.clone());
        self.shared.workers.lock().insert(name, TaskEntry { worker, thread });
        Ok(())
    }

    pub fn task_names(&self) -> Vec<String> {
        self.shared.workers.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.shared.workers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.workers.lock().is_empty()
    }

    fn entry_worker(&self, name: &str) -> Result<TaskWorker, EngineError> {
        self.shared
            .workers
            .lock()
            .get(name)
            .map(|entry| entry.worker.clone())
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    /// Enqueue one run on the worker's thread. Non-blocking; a worker that
    /// is already running rejects the request.
    pub fn run(&self, name: &str) -> Result<(), EngineError> {
        let (worker, thread) = {
            let workers = self.shared.workers.lock();
            let entry =
                workers.get(name).ok_or_else(|| EngineError::NotFound(name.to_string()))?;
            (entry.worker.clone(), entry.thread.clone())
        };
        if worker.state() == TaskState::Running {
            return Err(EngineError::State(format!("task {:?} is already running", name)));
        }
        thread.post(Box::new(move || worker.run()))
    }

    pub fn set_arguments(&self, name: &str, args: ArgMap) -> Result<(), EngineError> {
        self.entry_worker(name)?.set_arguments(args);
        Ok(())
    }

    pub fn get_result(&self, name: &str) -> Result<(Option<Value>, bool), EngineError> {
        Ok(self.entry_worker(name)?.result())
    }

    pub fn get_state(&self, name: &str) -> Result<TaskState, EngineError> {
        Ok(self.entry_worker(name)?.state())
    }

    pub fn interrupt(&self, name: &str) -> Result<(), EngineError> {
        self.entry_worker(name)?.interrupt();
        Ok(())
    }

    pub fn interrupt_all(&self) {
        let workers = self.shared.workers.lock();
        for entry in workers.values() {
            entry.worker.interrupt();
        }
    }

    /// Interrupt all workers, stop their threads and drop the table.
    pub fn terminate(&self) {
        self.interrupt_all();
        let entries: Vec<TaskEntry> = {
            let mut workers = self.shared.workers.lock();
            workers.drain(..).map(|(_, entry)| entry).collect()
        };
        for entry in &entries {
            entry.thread.quit();
        }
        for entry in &entries {
            let name = entry.thread.name().to_string();
            if let Err(e) = entry.thread.join(TERMINATE_JOIN_TIMEOUT) {
                warn!(thread = %name, error = %e, "task thread did not stop in time");
            }
            if let Err(e) = self.shared.threads.unregister(&name) {
                warn!(thread = %name, error = %e, "task thread unregister failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
