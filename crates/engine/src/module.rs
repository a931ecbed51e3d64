// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The module trait, class declarations and the class registry.
//!
//! A "class" is the Rust rendition of the dotted class path found in
//! configuration: host code registers a [`ModuleClass`] (declarative
//! metadata plus a factory closure) under its dotted path, and handles
//! resolve it from the registry at activation (and again on reload).

use crate::error::EngineError;
use indexmap::IndexMap;
use labx_core::{ModuleBase, Value};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by module implementations.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("module has no attribute {0:?}")]
    MissingAttribute(String),

    #[error("module has no method {0:?}")]
    MissingMethod(String),

    #[error("module does not support clearing appdata while active")]
    NotClearable,

    #[error("{0}")]
    Runtime(String),

    #[error(transparent)]
    Value(#[from] labx_core::ValueError),
}

impl From<ModuleError> for EngineError {
    fn from(e: ModuleError) -> Self {
        EngineError::Runtime(e.to_string())
    }
}

/// Severity of the log message emitted when an optional config option is
/// absent and its default applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingAction {
    Ignore,
    Info,
    Warn,
}

/// Declared config option of a module class.
#[derive(Debug, Clone)]
pub struct OptionDecl {
    pub name: String,
    pub optional: bool,
    pub default: Option<Value>,
    pub missing_action: MissingAction,
}

impl OptionDecl {
    pub fn required(name: impl Into<String>) -> Self {
        Self { name: name.into(), optional: false, default: None, missing_action: MissingAction::Warn }
    }

    pub fn optional(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            optional: true,
            default: Some(default),
            missing_action: MissingAction::Info,
        }
    }

    pub fn missing_action(mut self, action: MissingAction) -> Self {
        self.missing_action = action;
        self
    }
}

/// Declared connector of a module class. `interface`, when set, names an
/// interface the target class must advertise.
#[derive(Debug, Clone)]
pub struct ConnectorDecl {
    pub name: String,
    pub optional: bool,
    pub interface: Option<String>,
}

impl ConnectorDecl {
    pub fn mandatory(name: impl Into<String>) -> Self {
        Self { name: name.into(), optional: false, interface: None }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self { name: name.into(), optional: true, interface: None }
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }
}

/// Declared status variable: persisted on deactivation, restored (or
/// defaulted) on activation.
#[derive(Debug, Clone)]
pub struct StatusVarDecl {
    pub name: String,
    pub default: Value,
}

impl StatusVarDecl {
    pub fn new(name: impl Into<String>, default: Value) -> Self {
        Self { name: name.into(), default }
    }
}

/// Factory producing a fresh module instance.
pub type ModuleFactory =
    Arc<dyn Fn(ModuleInit) -> Result<Box<dyn Module>, ModuleError> + Send + Sync>;

/// Everything a module receives at construction.
pub struct ModuleInit {
    /// Configured instance name.
    pub name: String,
    /// Resolved options: configured values plus defaults for absent
    /// optional ones.
    pub options: IndexMap<String, Value>,
    /// Resolved connectors keyed by local connector name.
    pub connectors: IndexMap<String, crate::handle::ModuleRef>,
}

/// Declarative description of a module class plus its factory.
#[derive(Clone)]
pub struct ModuleClass {
    /// Dotted path the class is registered under.
    pub class_path: String,
    pub base: ModuleBase,
    /// Whether instances get a dedicated worker thread. Forced off for Gui.
    pub threaded: bool,
    /// Interfaces this class advertises to connector checks.
    pub interfaces: Vec<String>,
    pub options: Vec<OptionDecl>,
    pub connectors: Vec<ConnectorDecl>,
    pub status_variables: Vec<StatusVarDecl>,
    pub factory: ModuleFactory,
}

impl ModuleClass {
    /// Simple (undotted) class name, used for the appdata record key.
    pub fn simple_name(&self) -> &str {
        self.class_path.rsplit('.').next().unwrap_or(&self.class_path)
    }

    /// Gui classes are never threaded regardless of the declared flag.
    pub fn effective_threaded(&self) -> bool {
        self.threaded && self.base != ModuleBase::Gui
    }

    pub fn advertises(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }
}

impl std::fmt::Debug for ModuleClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleClass")
            .field("class_path", &self.class_path)
            .field("base", &self.base)
            .field("threaded", &self.threaded)
            .finish_non_exhaustive()
    }
}

/// A module instance hosted by a handle.
///
/// Attribute access is the uniform surface used by connectors and the
/// remote transport: data attributes through `get_attr`/`set_attr`,
/// methods through `call`. Declared status variables must be readable and
/// writable as attributes.
pub trait Module: Send {
    /// Activation hook, invoked on the owning thread after construction
    /// and status-variable restoration. Errors propagate to the caller and
    /// unwind the activation.
    fn on_activate(&mut self) -> Result<(), ModuleError>;

    /// Deactivation hook. Errors are logged and never block deactivation.
    fn on_deactivate(&mut self) -> Result<(), ModuleError>;

    fn get_attr(&self, name: &str) -> Result<Value, ModuleError>;

    fn set_attr(&mut self, name: &str, value: Value) -> Result<(), ModuleError>;

    fn del_attr(&mut self, name: &str) -> Result<(), ModuleError> {
        Err(ModuleError::MissingAttribute(name.to_string()))
    }

    fn call(&mut self, method: &str, args: Vec<Value>) -> Result<Value, ModuleError>;

    /// Whether `name` is a method (drives callable markers on the wire).
    fn is_method(&self, name: &str) -> bool {
        let _ = name;
        false
    }

    /// Cooperative appdata clearing while active. Default: refuse.
    fn clear_appdata_live(&mut self) -> Result<(), ModuleError> {
        Err(ModuleError::NotClearable)
    }

    /// Re-raise hook for Gui modules: called instead of activation when the
    /// module is already active.
    fn show(&mut self) {}
}

/// Registry mapping dotted class paths to module classes.
pub struct ClassRegistry {
    classes: RwLock<HashMap<String, Arc<ModuleClass>>>,
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self { classes: RwLock::new(HashMap::new()) }
    }

    /// Register a class under its dotted path.
    pub fn register(&self, class: ModuleClass) -> Result<(), EngineError> {
        let mut classes = self.classes.write();
        if classes.contains_key(&class.class_path) {
            return Err(EngineError::Duplicate(class.class_path.clone()));
        }
        classes.insert(class.class_path.clone(), Arc::new(class));
        Ok(())
    }

    /// Replace a registered class (the reload path picks up the new one).
    pub fn replace(&self, class: ModuleClass) {
        self.classes.write().insert(class.class_path.clone(), Arc::new(class));
    }

    pub fn get(&self, class_path: &str) -> Option<Arc<ModuleClass>> {
        self.classes.read().get(class_path).cloned()
    }

    /// Resolve a dotted path, failing with a config error when unknown.
    pub fn resolve(&self, class_path: &str) -> Result<Arc<ModuleClass>, EngineError> {
        self.get(class_path)
            .ok_or_else(|| EngineError::Config(format!("unknown module class {:?}", class_path)))
    }

    pub fn class_paths(&self) -> Vec<String> {
        self.classes.read().keys().cloned().collect()
    }
}

#[cfg(test)]
#[path = "module_tests.rs"]
mod tests;
