// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dummy module and task classes for tests.

use crate::ctx::EngineCtx;
use crate::handle::ModuleRef;
use crate::manager::ModuleManager;
use crate::module::{
    ConnectorDecl, Module, ModuleClass, ModuleError, ModuleInit, OptionDecl, StatusVarDecl,
};
use crate::tasks::{ArgMap, InterruptFlag, Task, TaskClass, TaskError, TaskInit};
use indexmap::IndexMap;
use labx_core::{ModuleBase, Value};
use labx_store::AppDataStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Shared log of lifecycle calls, in order.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn log_entries(log: &CallLog) -> Vec<String> {
    log.lock().clone()
}

static GENERATION: AtomicU64 = AtomicU64::new(1);

/// Test module with a map-backed attribute surface.
///
/// Behavior toggles come in through options: `fail_activate`,
/// `fail_deactivate` and `cooperative_clear` (all booleans).
pub struct DummyModule {
    name: String,
    attrs: IndexMap<String, Value>,
    connectors: IndexMap<String, ModuleRef>,
    log: Option<CallLog>,
}

impl DummyModule {
    fn flag(&self, name: &str) -> bool {
        matches!(self.attrs.get(name), Some(Value::Bool(true)))
    }

    fn push_log(&self, entry: String) {
        if let Some(log) = &self.log {
            log.lock().push(entry);
        }
    }
}

impl Module for DummyModule {
    fn on_activate(&mut self) -> Result<(), ModuleError> {
        if self.flag("fail_activate") {
            return Err(ModuleError::Runtime("configured to fail activation".to_string()));
        }
        self.push_log(format!("activate:{}", self.name));
        for (connector, target) in &self.connectors {
            let state = target
                .state()
                .map(|s| s.to_string())
                .unwrap_or_else(|_| "gone".to_string());
            self.push_log(format!("{}:sees:{}:{}", self.name, connector, state));
        }
        Ok(())
    }

    fn on_deactivate(&mut self) -> Result<(), ModuleError> {
        self.push_log(format!("deactivate:{}", self.name));
        if self.flag("fail_deactivate") {
            return Err(ModuleError::Runtime("configured to fail deactivation".to_string()));
        }
        Ok(())
    }

    fn get_attr(&self, name: &str) -> Result<Value, ModuleError> {
        self.attrs
            .get(name)
            .cloned()
            .ok_or_else(|| ModuleError::MissingAttribute(name.to_string()))
    }

    fn set_attr(&mut self, name: &str, value: Value) -> Result<(), ModuleError> {
        self.attrs.insert(name.to_string(), value);
        Ok(())
    }

    fn del_attr(&mut self, name: &str) -> Result<(), ModuleError> {
        self.attrs
            .shift_remove(name)
            .map(|_| ())
            .ok_or_else(|| ModuleError::MissingAttribute(name.to_string()))
    }

    fn call(&mut self, method: &str, args: Vec<Value>) -> Result<Value, ModuleError> {
        match method {
            "echo" => Ok(args.into_iter().next().unwrap_or(Value::Null)),
            "double" => {
                let x = args
                    .first()
                    .ok_or_else(|| ModuleError::Runtime("double needs one argument".to_string()))?
                    .as_int()?;
                Ok(Value::Int(x * 2))
            }
            "connector_state" => {
                let connector = args
                    .first()
                    .and_then(|v| v.as_str().ok().map(str::to_string))
                    .ok_or_else(|| {
                        ModuleError::Runtime("connector_state needs a name".to_string())
                    })?;
                let target = self.connectors.get(&connector).ok_or_else(|| {
                    ModuleError::MissingAttribute(connector.clone())
                })?;
                let state = target
                    .state()
                    .map_err(|e| ModuleError::Runtime(e.to_string()))?;
                Ok(Value::Str(state.to_string()))
            }
            other => Err(ModuleError::MissingMethod(other.to_string())),
        }
    }

    fn is_method(&self, name: &str) -> bool {
        matches!(name, "echo" | "double" | "connector_state")
    }

    fn clear_appdata_live(&mut self) -> Result<(), ModuleError> {
        if self.flag("cooperative_clear") {
            self.attrs.insert("counter".to_string(), Value::Int(0));
            self.attrs.insert("label".to_string(), Value::Str(String::new()));
            Ok(())
        } else {
            Err(ModuleError::NotClearable)
        }
    }

    fn show(&mut self) {
        self.push_log(format!("show:{}", self.name));
    }
}

/// Builder for dummy module classes.
pub struct DummyClassBuilder {
    class_path: String,
    base: ModuleBase,
    threaded: bool,
    log: Option<CallLog>,
    interfaces: Vec<String>,
    options: Vec<OptionDecl>,
    connectors: Vec<ConnectorDecl>,
}

impl DummyClassBuilder {
    pub fn new(class_path: impl Into<String>, base: ModuleBase) -> Self {
        Self {
            class_path: class_path.into(),
            base,
            threaded: false,
            log: None,
            interfaces: Vec::new(),
            options: vec![
                OptionDecl::optional("fail_activate", Value::Bool(false)),
                OptionDecl::optional("fail_deactivate", Value::Bool(false)),
                OptionDecl::optional("cooperative_clear", Value::Bool(false)),
            ],
            connectors: Vec::new(),
        }
    }

    pub fn threaded(mut self) -> Self {
        self.threaded = true;
        self
    }

    pub fn log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn option(mut self, option: OptionDecl) -> Self {
        self.options.push(option);
        self
    }

    pub fn connector(mut self, connector: ConnectorDecl) -> Self {
        self.connectors.push(connector);
        self
    }

    pub fn build(self) -> ModuleClass {
        let log = self.log;
        ModuleClass {
            class_path: self.class_path,
            base: self.base,
            threaded: self.threaded,
            interfaces: self.interfaces,
            options: self.options,
            connectors: self.connectors,
            status_variables: vec![
                StatusVarDecl::new("counter", Value::Int(0)),
                StatusVarDecl::new("label", Value::Str(String::new())),
            ],
            factory: Arc::new(move |init: ModuleInit| {
                let mut attrs = init.options.clone();
                attrs.insert(
                    "generation".to_string(),
                    Value::Int(GENERATION.fetch_add(1, Ordering::SeqCst) as i64),
                );
                attrs.entry("counter".to_string()).or_insert(Value::Int(0));
                attrs.entry("label".to_string()).or_insert(Value::Str(String::new()));
                Ok(Box::new(DummyModule {
                    name: init.name,
                    attrs,
                    connectors: init.connectors,
                    log: log.clone(),
                }))
            }),
        }
    }
}

/// Engine context + manager on a store rooted at `appdata_dir`. The
/// calling thread becomes the main thread.
pub fn test_manager(appdata_dir: &std::path::Path) -> ModuleManager {
    let ctx = EngineCtx::new(AppDataStore::new(appdata_dir));
    ModuleManager::new(ctx)
}

/// Task class doubling its `x` keyword argument.
pub fn doubling_task_class() -> TaskClass {
    struct Doubling;
    impl Task for Doubling {
        fn run(&mut self, args: &ArgMap, _interrupt: &InterruptFlag) -> Result<Value, TaskError> {
            let x = args
                .get("x")
                .ok_or_else(|| TaskError::Runtime("missing argument x".to_string()))?
                .as_int()
                .map_err(|e| TaskError::Runtime(e.to_string()))?;
            Ok(Value::Int(x * 2))
        }
    }
    let mut default_args = ArgMap::new();
    default_args.insert("x".to_string(), Value::Int(0));
    TaskClass {
        class_path: "labx.tasks.test.Doubling".to_string(),
        default_args,
        factory: Arc::new(|_init: TaskInit| Ok(Box::new(Doubling))),
    }
}

/// Task class that spins at interrupt observation points until cancelled.
/// `started` flips once the body is running.
pub fn blocking_task_class(started: Arc<AtomicBool>) -> TaskClass {
    struct Blocking {
        started: Arc<AtomicBool>,
    }
    impl Task for Blocking {
        fn run(&mut self, _args: &ArgMap, interrupt: &InterruptFlag) -> Result<Value, TaskError> {
            self.started.store(true, Ordering::SeqCst);
            loop {
                interrupt.check()?;
                std::thread::sleep(std::time::Duration::from_millis(2));
            }
        }
    }
    TaskClass {
        class_path: "labx.tasks.test.Blocking".to_string(),
        default_args: ArgMap::new(),
        factory: Arc::new(move |_init: TaskInit| {
            Ok(Box::new(Blocking { started: Arc::clone(&started) }))
        }),
    }
}

/// Task class that calls `double` on its `dev` connection.
pub fn connected_task_class() -> TaskClass {
    struct Connected {
        dev: Option<ModuleRef>,
    }
    impl Task for Connected {
        fn run(&mut self, args: &ArgMap, _interrupt: &InterruptFlag) -> Result<Value, TaskError> {
            let dev = self
                .dev
                .as_ref()
                .ok_or_else(|| TaskError::Runtime("missing connection dev".to_string()))?;
            let x = args.get("x").cloned().unwrap_or(Value::Int(0));
            Ok(dev.call("double", vec![x]).map_err(Box::new)?)
        }
    }
    let mut default_args = ArgMap::new();
    default_args.insert("x".to_string(), Value::Int(1));
    TaskClass {
        class_path: "labx.tasks.test.Connected".to_string(),
        default_args,
        factory: Arc::new(|init: TaskInit| {
            Ok(Box::new(Connected { dev: init.connections.get("dev").cloned() }))
        }),
    }
}
