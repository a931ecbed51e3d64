// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The module manager: owns all handles, resolves dependency cascades,
//! emits table change events and reconciles remote state drift.

use crate::ctx::EngineCtx;
use crate::error::EngineError;
use crate::event_bus::EventBus;
use crate::handle::{HandleChange, ModuleHandle, ModuleRef, RemotePoll};
use indexmap::IndexMap;
use labx_core::{ManagerEvent, ModuleDescriptor, ModuleState};
use labx_wire::ModuleInfo;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tracing::{error, info, warn};

struct ManagerShared {
    handles: Mutex<IndexMap<String, Arc<ModuleHandle>>>,
    bus: EventBus<ManagerEvent>,
    ctx: EngineCtx,
}

/// Cloneable facade over the shared manager state.
///
/// Structural operations and everything that may (de)activate run on the
/// main thread; calls from other threads are redirected through the
/// dispatcher and block. Read-only accessors are safe from any thread.
pub struct ModuleManager {
    shared: Arc<ManagerShared>,
}

impl Clone for ModuleManager {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl ModuleManager {
    pub fn new(ctx: EngineCtx) -> Self {
        Self {
            shared: Arc::new(ManagerShared {
                handles: Mutex::new(IndexMap::new()),
                bus: EventBus::new(),
                ctx,
            }),
        }
    }

    pub fn ctx(&self) -> &EngineCtx {
        &self.shared.ctx
    }

    /// Subscribe to table events (rows inserted/removed, state changed,
    /// appdata changed).
    pub fn subscribe(&self) -> std::sync::mpsc::Receiver<ManagerEvent> {
        self.shared.bus.subscribe()
    }

    // ---- confinement helper -------------------------------------------

    fn on_main<R: Send + 'static>(
        &self,
        f: impl FnOnce(&ModuleManager) -> Result<R, EngineError> + Send + 'static,
    ) -> Result<R, EngineError> {
        let manager = self.clone();
        self.shared.ctx.dispatcher.call(move || f(&manager))?
    }

    // ---- registry -----------------------------------------------------

    /// Add a handle for a descriptor. With `allow_overwrite`, an existing
    /// module of the same name is deactivated and removed first.
    pub fn add(&self, descriptor: ModuleDescriptor, allow_overwrite: bool) -> Result<(), EngineError> {
        self.on_main(move |mgr| mgr.add_inner(descriptor, allow_overwrite))
    }

    fn add_inner(&self, descriptor: ModuleDescriptor, allow_overwrite: bool) -> Result<(), EngineError> {
        if self.has_module(&descriptor.name) {
            if !allow_overwrite {
                return Err(EngineError::Duplicate(descriptor.name));
            }
            self.deactivate_inner(&descriptor.name)?;
            self.remove_inner(&descriptor.name)?;
        }
        let handle = ModuleHandle::new(descriptor, &self.shared.ctx)?;
        handle.set_observer(self.make_observer());
        let index = {
            let mut handles = self.shared.handles.lock();
            let name = handle.name().to_string();
            handles.insert(name, handle);
            handles.len() - 1
        };
        self.shared.bus.emit(ManagerEvent::RowsInserted { first: index, last: index });
        Ok(())
    }

    /// Remove a module, deactivating it (and its dependents) first.
    pub fn remove(&self, name: &str) -> Result<(), EngineError> {
        let name = name.to_string();
        self.on_main(move |mgr| {
            mgr.deactivate_inner(&name)?;
            mgr.remove_inner(&name)
        })
    }

    fn remove_inner(&self, name: &str) -> Result<(), EngineError> {
        let index = {
            let mut handles = self.shared.handles.lock();
            let index = handles
                .get_index_of(name)
                .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
            if let Some(handle) = handles.get(name) {
                handle.clear_observer();
            }
            handles.shift_remove(name);
            index
        };
        self.shared.bus.emit(ManagerEvent::RowsRemoved { first: index, last: index });
        Ok(())
    }

    fn make_observer(&self) -> crate::handle::HandleObserver {
        let weak: Weak<ManagerShared> = Arc::downgrade(&self.shared);
        Arc::new(move |name, change| {
            let Some(shared) = weak.upgrade() else { return };
            let Some(index) = shared.handles.lock().get_index_of(name) else { return };
            let event = match change {
                HandleChange::State(state) => ManagerEvent::StateChanged {
                    index,
                    name: name.to_string(),
                    state,
                },
                HandleChange::AppData(has_appdata) => ManagerEvent::AppDataChanged {
                    index,
                    name: name.to_string(),
                    has_appdata,
                },
            };
            shared.bus.emit(event);
        })
    }

    // ---- lookups ------------------------------------------------------

    fn snapshot(&self) -> IndexMap<String, Arc<ModuleHandle>> {
        self.shared.handles.lock().clone()
    }

    pub(crate) fn handle(&self, name: &str) -> Result<Arc<ModuleHandle>, EngineError> {
        self.shared
            .handles
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.shared.handles.lock().contains_key(name)
    }

    pub fn module_names(&self) -> Vec<String> {
        self.shared.handles.lock().keys().cloned().collect()
    }

    /// Name → state snapshot in table order.
    pub fn module_states(&self) -> IndexMap<String, ModuleState> {
        self.shared
            .handles
            .lock()
            .iter()
            .map(|(name, handle)| (name.clone(), handle.state()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.shared.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.handles.lock().is_empty()
    }

    pub fn descriptor(&self, name: &str) -> Result<ModuleDescriptor, EngineError> {
        Ok(self.handle(name)?.descriptor().clone())
    }

    pub fn get_state(&self, name: &str) -> Result<ModuleState, EngineError> {
        Ok(self.handle(name)?.state())
    }

    pub fn has_appdata(&self, name: &str) -> Result<bool, EngineError> {
        let handle = self.handle(name)?;
        // Remote handles mirror the peer's answer
        handle.remote_refresh_appdata();
        Ok(handle.has_appdata())
    }

    /// State, appdata and shareability in one record (the transport's
    /// module info surface).
    pub fn module_info(&self, name: &str) -> Result<ModuleInfo, EngineError> {
        let handle = self.handle(name)?;
        Ok(ModuleInfo {
            state: handle.state(),
            has_appdata: handle.has_appdata(),
            allow_remote: handle.allow_remote(),
        })
    }

    // ---- lifecycle ----------------------------------------------------

    /// Activate a module, recursively activating its connector targets
    /// first. Fails fast when the cascade would close a dependency cycle.
    pub fn activate(&self, name: &str) -> Result<(), EngineError> {
        let name = name.to_string();
        self.on_main(move |mgr| mgr.activate_inner(&name))
    }

    fn activate_inner(&self, name: &str) -> Result<(), EngineError> {
        let handles = self.snapshot();
        let order = activation_order(&handles, name)?;
        for step in &order {
            let handle = Arc::clone(&handles[step.as_str()]);
            let connectors = resolve_connectors(&handle, &handles)?;
            handle.activate(&self.shared.ctx, connectors)?;
        }
        Ok(())
    }

    /// Deactivate a module, cascading over its active dependents first.
    pub fn deactivate(&self, name: &str) -> Result<(), EngineError> {
        let name = name.to_string();
        self.on_main(move |mgr| mgr.deactivate_inner(&name))
    }

    fn deactivate_inner(&self, name: &str) -> Result<(), EngineError> {
        let handles = self.snapshot();
        if !handles.contains_key(name) {
            return Err(EngineError::NotFound(name.to_string()));
        }
        deactivate_cascade(&handles, name, &self.shared.ctx)
    }

    /// Reload: deactivate (cascading), re-resolve the class from the
    /// registry, then reactivate self and every previously active
    /// dependent.
    pub fn reload(&self, name: &str) -> Result<(), EngineError> {
        let name = name.to_string();
        self.on_main(move |mgr| mgr.reload_inner(&name))
    }

    fn reload_inner(&self, name: &str) -> Result<(), EngineError> {
        let handle = self.handle(name)?;
        let was_active = handle.state().is_active();
        let dependents = if was_active {
            let handles = self.snapshot();
            let dependents = transitive_active_dependents(&handles, name);
            deactivate_cascade(&handles, name, &self.shared.ctx)?;
            dependents
        } else {
            Vec::new()
        };
        handle.reresolve_class(&self.shared.ctx)?;
        info!(module = name, "module class reloaded");
        if was_active {
            self.activate_inner(name)?;
            for dependent in dependents {
                self.activate_inner(&dependent)?;
            }
        }
        Ok(())
    }

    /// Clear a module's persisted appdata.
    pub fn clear_appdata(&self, name: &str) -> Result<(), EngineError> {
        let name = name.to_string();
        self.on_main(move |mgr| {
            let handle = mgr.handle(&name)?;
            handle.clear_appdata(&mgr.shared.ctx)
        })
    }

    /// Activate a module (if needed) and return a reference to its
    /// instance surface.
    pub fn get_instance(&self, name: &str) -> Result<ModuleRef, EngineError> {
        let name = name.to_string();
        self.on_main(move |mgr| {
            mgr.activate_inner(&name)?;
            let handle = mgr.handle(&name)?;
            Ok(ModuleRef::new(&name, &handle))
        })
    }

    /// Activate every configured module, in table order. Failures are
    /// logged and do not stop the sweep.
    pub fn activate_all(&self) -> Result<(), EngineError> {
        self.on_main(|mgr| {
            for name in mgr.module_names() {
                if let Err(e) = mgr.activate_inner(&name) {
                    error!(module = %name, error = %e, "activation failed");
                }
            }
            Ok(())
        })
    }

    /// Deactivate every module. Failures are logged and do not stop the
    /// sweep.
    pub fn deactivate_all(&self) -> Result<(), EngineError> {
        self.on_main(|mgr| {
            for name in mgr.module_names() {
                if let Err(e) = mgr.deactivate_inner(&name) {
                    error!(module = %name, error = %e, "deactivation failed");
                }
            }
            Ok(())
        })
    }

    /// Clear appdata of every module. Failures are logged.
    pub fn clear_all_appdata(&self) -> Result<(), EngineError> {
        self.on_main(|mgr| {
            for name in mgr.module_names() {
                let result = mgr
                    .handle(&name)
                    .and_then(|handle| handle.clear_appdata(&mgr.shared.ctx));
                if let Err(e) = result {
                    warn!(module = %name, error = %e, "clearing appdata failed");
                }
            }
            Ok(())
        })
    }

    /// Best-effort deactivate everything, then drop all handles.
    pub fn clear(&self) -> Result<(), EngineError> {
        self.on_main(|mgr| {
            let _ = mgr.deactivate_all_local();
            let count = {
                let mut handles = mgr.shared.handles.lock();
                for handle in handles.values() {
                    handle.clear_observer();
                }
                let count = handles.len();
                handles.clear();
                count
            };
            if count > 0 {
                mgr.shared.bus.emit(ManagerEvent::RowsRemoved { first: 0, last: count - 1 });
            }
            Ok(())
        })
    }

    fn deactivate_all_local(&self) -> Result<(), EngineError> {
        for name in self.module_names() {
            if let Err(e) = self.deactivate_inner(&name) {
                error!(module = %name, error = %e, "deactivation failed");
            }
        }
        Ok(())
    }

    // ---- attribute surface (used by connectors and the transport) -----

    pub fn get_module_attr(&self, name: &str, attr: &str) -> Result<labx_core::Value, EngineError> {
        self.handle(name)?.get_attr(attr)
    }

    pub fn set_module_attr(
        &self,
        name: &str,
        attr: &str,
        value: labx_core::Value,
    ) -> Result<(), EngineError> {
        self.handle(name)?.set_attr(attr, value)
    }

    pub fn del_module_attr(&self, name: &str, attr: &str) -> Result<(), EngineError> {
        self.handle(name)?.del_attr(attr)
    }

    pub fn call_module_method(
        &self,
        name: &str,
        method: &str,
        args: Vec<labx_core::Value>,
    ) -> Result<labx_core::Value, EngineError> {
        self.handle(name)?.call(method, args)
    }

    pub fn is_module_method(&self, name: &str, attr: &str) -> Result<bool, EngineError> {
        self.handle(name)?.is_method(attr)
    }

    // ---- watchdog -----------------------------------------------------

    /// One reconciliation pass over the active remote handles: mirror
    /// peer-side state changes, deactivate handles whose peer is gone.
    /// Driven by the application's 1 s timer.
    pub fn watchdog_tick(&self) {
        let result = self.on_main(|mgr| {
            let remotes: Vec<(String, Arc<ModuleHandle>)> = mgr
                .snapshot()
                .into_iter()
                .filter(|(_, handle)| handle.is_remote() && handle.state().is_active())
                .collect();
            for (name, handle) in remotes {
                match handle.poll_remote() {
                    RemotePoll::Unchanged => {}
                    RemotePoll::Changed(state) => handle.mirror_state(state),
                    RemotePoll::PeerLost => {
                        warn!(module = %name, "peer gone, deactivating remote module");
                        if let Err(e) = mgr.deactivate_inner(&name) {
                            error!(module = %name, error = %e, "watchdog deactivation failed");
                        }
                    }
                }
            }
            Ok(())
        });
        if let Err(e) = result {
            error!(error = %e, "watchdog tick failed");
        }
    }
}

// ---- cascade helpers ------------------------------------------------

/// Post-order activation sequence rooted at `name`. Already active
/// targets are skipped (their own dependencies are already satisfied);
/// a cycle among the modules still to activate fails before anything is
/// touched.
fn activation_order(
    handles: &IndexMap<String, Arc<ModuleHandle>>,
    root: &str,
) -> Result<Vec<String>, EngineError> {
    if !handles.contains_key(root) {
        return Err(EngineError::NotFound(root.to_string()));
    }
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = Vec::new();
    visit(handles, root, true, &mut order, &mut visited, &mut stack)?;
    Ok(order)
}

fn visit(
    handles: &IndexMap<String, Arc<ModuleHandle>>,
    name: &str,
    is_root: bool,
    order: &mut Vec<String>,
    visited: &mut HashSet<String>,
    stack: &mut Vec<String>,
) -> Result<(), EngineError> {
    if visited.contains(name) {
        return Ok(());
    }
    if stack.iter().any(|entry| entry == name) {
        stack.push(name.to_string());
        return Err(EngineError::Connection(format!(
            "activating would close a dependency cycle: {}",
            stack.join(" -> ")
        )));
    }
    let handle = &handles[name];
    if !is_root && handle.state().is_active() {
        visited.insert(name.to_string());
        return Ok(());
    }
    stack.push(name.to_string());
    if let Some(class) = handle.class() {
        let configured = handle.descriptor().connectors();
        for key in configured.keys() {
            if !class.connectors.iter().any(|decl| decl.name == *key) {
                return Err(EngineError::Connection(format!(
                    "module {:?}: connector {:?} is not declared by its class",
                    name, key
                )));
            }
        }
        for decl in &class.connectors {
            match configured.get(&decl.name) {
                Some(target) => {
                    if !handles.contains_key(target) {
                        return Err(EngineError::Connection(format!(
                            "module {:?}: connector {:?} targets unknown module {:?}",
                            name, decl.name, target
                        )));
                    }
                    visit(handles, target, false, order, visited, stack)?;
                }
                None if decl.optional => {}
                None => {
                    return Err(EngineError::Connection(format!(
                        "module {:?}: mandatory connector {:?} is not configured",
                        name, decl.name
                    )))
                }
            }
        }
    }
    stack.pop();
    visited.insert(name.to_string());
    order.push(name.to_string());
    Ok(())
}

/// Build the resolved connector map for one handle. All targets must
/// already be active.
fn resolve_connectors(
    handle: &Arc<ModuleHandle>,
    handles: &IndexMap<String, Arc<ModuleHandle>>,
) -> Result<IndexMap<String, ModuleRef>, EngineError> {
    let Some(class) = handle.class() else {
        return Ok(IndexMap::new());
    };
    let configured = handle.descriptor().connectors();
    let mut out = IndexMap::new();
    for decl in &class.connectors {
        let Some(target_name) = configured.get(&decl.name) else {
            if decl.optional {
                continue;
            }
            return Err(EngineError::Connection(format!(
                "module {:?}: mandatory connector {:?} is not configured",
                handle.name(),
                decl.name
            )));
        };
        let target = handles.get(target_name).ok_or_else(|| {
            EngineError::Connection(format!(
                "module {:?}: connector {:?} targets unknown module {:?}",
                handle.name(),
                decl.name,
                target_name
            ))
        })?;
        if let (Some(interface), Some(target_class)) = (&decl.interface, target.class()) {
            if !target_class.advertises(interface) {
                return Err(EngineError::Connection(format!(
                    "module {:?}: connector {:?} requires interface {:?}, {:?} does not advertise it",
                    handle.name(),
                    decl.name,
                    interface,
                    target_name
                )));
            }
        }
        if !target.state().is_active() {
            return Err(EngineError::Connection(format!(
                "module {:?}: connector target {:?} is not active",
                handle.name(),
                target_name
            )));
        }
        out.insert(decl.name.clone(), ModuleRef::new(target_name.as_str(), target));
    }
    Ok(out)
}

/// Direct active dependents of `name` (handles whose connectors resolve to
/// it and which are not deactivated).
fn active_dependents(handles: &IndexMap<String, Arc<ModuleHandle>>, name: &str) -> Vec<String> {
    handles
        .iter()
        .filter(|(_, handle)| handle.state().is_active())
        .filter(|(_, handle)| {
            handle.descriptor().connectors().values().any(|target| target == name)
        })
        .map(|(dep, _)| dep.clone())
        .collect()
}

/// All active handles that transitively depend on `name`.
fn transitive_active_dependents(
    handles: &IndexMap<String, Arc<ModuleHandle>>,
    name: &str,
) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut frontier = vec![name.to_string()];
    while let Some(current) = frontier.pop() {
        for dependent in active_dependents(handles, &current) {
            if dependent != name && !out.contains(&dependent) {
                out.push(dependent.clone());
                frontier.push(dependent);
            }
        }
    }
    out
}

/// Deactivate `name`, cascading over its active dependents first.
fn deactivate_cascade(
    handles: &IndexMap<String, Arc<ModuleHandle>>,
    name: &str,
    ctx: &EngineCtx,
) -> Result<(), EngineError> {
    for dependent in active_dependents(handles, name) {
        deactivate_cascade(handles, &dependent, ctx)?;
    }
    handles[name].deactivate(ctx)
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
