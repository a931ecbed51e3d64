// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-module handle: instance ownership, lifecycle transitions,
//! appdata integration and the attribute surface.
//!
//! A handle owns its instance and, for threaded modules, the worker thread
//! hosting it. The instance of a threaded module lives in a thread-local
//! slot on that worker; every instance-touching call is shipped there as a
//! job and the caller blocks on a completion channel. Non-threaded
//! instances live inline and their calls are confined to the main thread
//! through the dispatcher.

use crate::ctx::EngineCtx;
use crate::error::EngineError;
use crate::fsm::{StateEvent, StateMachine, Transition, TransitionHooks};
use crate::module::{MissingAction, Module, ModuleClass, ModuleInit};
use crate::remote::RemoteConnection;
use crate::threads::WorkerThread;
use indexmap::IndexMap;
use labx_core::{ModuleBase, ModuleDescriptor, ModuleKind, ModuleState, Value};
use labx_store::{AppDataKey, AppDataMap, AppDataStore};
use labx_wire::{RemoteValue, Request, Response};
use parking_lot::{Mutex, RwLock};
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Join bound applied when a module releases its worker thread.
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

thread_local! {
    /// Instance slot of a module worker thread. Populated by the install
    /// job queued before the thread starts; dropped with the thread.
    static HOSTED: RefCell<Option<Box<dyn Module>>> = const { RefCell::new(None) };
}

/// Where a local instance currently lives.
enum InstanceSlot {
    Empty,
    /// Non-threaded: owned directly, touched from the main thread only.
    Inline(Box<dyn Module>),
    /// Threaded: lives in the worker's thread-local slot.
    Threaded,
}

enum HandleKind {
    Local {
        /// Swapped on reload.
        class: RwLock<Arc<ModuleClass>>,
    },
    Remote {
        conn: Mutex<Option<RemoteConnection>>,
    },
}

/// Row-level change reported to the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandleChange {
    State(ModuleState),
    AppData(bool),
}

pub(crate) type HandleObserver = Arc<dyn Fn(&str, HandleChange) + Send + Sync>;

/// Outcome of one watchdog poll of a remote handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemotePoll {
    Unchanged,
    Changed(ModuleState),
    /// Peer reports deactivated, or the connection failed.
    PeerLost,
}

/// The manager-owned wrapper around one module.
pub struct ModuleHandle {
    descriptor: ModuleDescriptor,
    kind: HandleKind,
    fsm: Mutex<StateMachine>,
    state: Mutex<ModuleState>,
    has_appdata: AtomicBool,
    activating: AtomicBool,
    deactivating: AtomicBool,
    slot: Mutex<InstanceSlot>,
    thread: Mutex<Option<WorkerThread>>,
    observer: Mutex<Option<HandleObserver>>,
    dispatcher: crate::dispatch::MainDispatcher,
}

impl ModuleHandle {
    /// Build a handle, resolving the class from the registry for local
    /// descriptors (unknown class paths fail here, at add time).
    pub(crate) fn new(
        descriptor: ModuleDescriptor,
        ctx: &EngineCtx,
    ) -> Result<Arc<Self>, EngineError> {
        let kind = match &descriptor.kind {
            ModuleKind::Local(local) => {
                let class = ctx.registry.resolve(&local.class_path)?;
                if class.base != descriptor.base {
                    return Err(EngineError::Config(format!(
                        "module {:?}: class {:?} is a {} module, configured under {}",
                        descriptor.name, local.class_path, class.base, descriptor.base
                    )));
                }
                HandleKind::Local { class: RwLock::new(class) }
            }
            ModuleKind::Remote(_) => HandleKind::Remote { conn: Mutex::new(None) },
        };
        let handle = Arc::new(Self {
            descriptor,
            kind,
            fsm: Mutex::new(StateMachine::new()),
            state: Mutex::new(ModuleState::Deactivated),
            has_appdata: AtomicBool::new(false),
            activating: AtomicBool::new(false),
            deactivating: AtomicBool::new(false),
            slot: Mutex::new(InstanceSlot::Empty),
            thread: Mutex::new(None),
            observer: Mutex::new(None),
            dispatcher: ctx.dispatcher.clone(),
        });
        if let Some(key) = handle.appdata_key() {
            handle.has_appdata.store(ctx.store.exists(&key), Ordering::SeqCst);
        }
        Ok(handle)
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn base(&self) -> ModuleBase {
        self.descriptor.base
    }

    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.kind, HandleKind::Remote { .. })
    }

    pub fn allow_remote(&self) -> bool {
        self.descriptor.allow_remote()
    }

    pub fn state(&self) -> ModuleState {
        *self.state.lock()
    }

    pub fn has_appdata(&self) -> bool {
        self.has_appdata.load(Ordering::SeqCst)
    }

    /// Resolved class of a local handle.
    pub fn class(&self) -> Option<Arc<ModuleClass>> {
        match &self.kind {
            HandleKind::Local { class } => Some(Arc::clone(&class.read())),
            HandleKind::Remote { .. } => None,
        }
    }

    pub(crate) fn set_observer(&self, observer: HandleObserver) {
        *self.observer.lock() = Some(observer);
    }

    pub(crate) fn clear_observer(&self) {
        *self.observer.lock() = None;
    }

    fn notify(&self, change: HandleChange) {
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            observer(self.name(), change);
        }
    }

    fn commit_state(&self, state: ModuleState) {
        *self.state.lock() = state;
        self.notify(HandleChange::State(state));
    }

    /// Appdata record key; local handles only.
    pub fn appdata_key(&self) -> Option<AppDataKey> {
        let class = self.class()?;
        Some(AppDataKey::new(class.simple_name(), self.base(), self.name()))
    }

    fn refresh_appdata_cache(&self, store: &AppDataStore) {
        if let Some(key) = self.appdata_key() {
            let exists = store.exists(&key);
            let prior = self.has_appdata.swap(exists, Ordering::SeqCst);
            if prior != exists {
                self.notify(HandleChange::AppData(exists));
            }
        }
    }

    fn set_has_appdata(&self, value: bool) {
        let prior = self.has_appdata.swap(value, Ordering::SeqCst);
        if prior != value {
            self.notify(HandleChange::AppData(value));
        }
    }

    fn thread_name(&self) -> String {
        format!("mod-{}-{}", self.base(), self.name())
    }

    // ---- instance access ----------------------------------------------

    /// Run `f` with exclusive access to the instance, on the thread that
    /// owns it. Blocks the caller until done.
    pub(crate) fn with_instance<R: Send + 'static>(
        self: &Arc<Self>,
        f: impl FnOnce(&mut dyn Module) -> R + Send + 'static,
    ) -> Result<R, EngineError> {
        enum Route {
            Inline,
            Threaded(WorkerThread),
        }
        let route = {
            let slot = self.slot.lock();
            match &*slot {
                InstanceSlot::Empty => {
                    return Err(EngineError::State(format!(
                        "module {:?} is not active",
                        self.name()
                    )))
                }
                InstanceSlot::Inline(_) => Route::Inline,
                InstanceSlot::Threaded => Route::Threaded(
                    self.thread.lock().clone().ok_or_else(|| {
                        EngineError::State(format!(
                            "module {:?} lost its worker thread",
                            self.name()
                        ))
                    })?,
                ),
            }
        };
        match route {
            Route::Inline => {
                let this = Arc::clone(self);
                self.dispatcher.call(move || {
                    let mut slot = this.slot.lock();
                    match &mut *slot {
                        InstanceSlot::Inline(instance) => Ok(f(instance.as_mut())),
                        _ => Err(EngineError::State(format!(
                            "module {:?} is not active",
                            this.name()
                        ))),
                    }
                })?
            }
            Route::Threaded(thread) => {
                let (done_tx, done_rx) = mpsc::channel();
                let name = self.name().to_string();
                thread.post(Box::new(move || {
                    let result = HOSTED.with(|cell| match cell.borrow_mut().as_mut() {
                        Some(instance) => Ok(f(instance.as_mut())),
                        None => Err(EngineError::State(format!(
                            "module {:?} has no installed instance",
                            name
                        ))),
                    });
                    let _ = done_tx.send(result);
                }))?;
                self.dispatcher.block_on_completion(&done_rx)?
            }
        }
    }

    // ---- lifecycle ----------------------------------------------------

    /// Activate with pre-resolved connectors. Idempotent; an already
    /// active Gui module gets `show()` instead.
    pub(crate) fn activate(
        self: &Arc<Self>,
        ctx: &EngineCtx,
        connectors: IndexMap<String, ModuleRef>,
    ) -> Result<(), EngineError> {
        if self.activating.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = match self.kind {
            HandleKind::Local { .. } => self.activate_local(ctx, connectors),
            HandleKind::Remote { .. } => self.activate_remote(ctx),
        };
        self.activating.store(false, Ordering::SeqCst);
        result
    }

    fn activate_local(
        self: &Arc<Self>,
        ctx: &EngineCtx,
        connectors: IndexMap<String, ModuleRef>,
    ) -> Result<(), EngineError> {
        if self.state().is_active() {
            if self.base() == ModuleBase::Gui {
                self.with_instance(|m| m.show())?;
            }
            return Ok(());
        }
        info!(module = self.name(), "activating");
        let result = self.activate_local_inner(ctx, connectors);
        if let Err(e) = &result {
            error!(module = self.name(), error = %e, "activation failed, unwinding");
            self.unwind_activation(ctx);
        }
        result
    }

    fn activate_local_inner(
        self: &Arc<Self>,
        ctx: &EngineCtx,
        connectors: IndexMap<String, ModuleRef>,
    ) -> Result<(), EngineError> {
        let class = match &self.kind {
            HandleKind::Local { class } => Arc::clone(&class.read()),
            HandleKind::Remote { .. } => unreachable_local(self.name())?,
        };
        let configured = match &self.descriptor.kind {
            ModuleKind::Local(local) => &local.options,
            ModuleKind::Remote(_) => unreachable_local(self.name())?,
        };
        let options = resolve_options(&class, configured, self.name())?;
        let instance = (class.factory)(ModuleInit {
            name: self.name().to_string(),
            options,
            connectors,
        })
        .map_err(|e| EngineError::Runtime(format!(
            "constructing module {:?}: {}",
            self.name(),
            e
        )))?;

        if class.effective_threaded() {
            let thread = ctx.threads.new_thread(&self.thread_name())?;
            // Move the instance onto the thread before starting it
            thread.post(Box::new(move || {
                HOSTED.with(|cell| *cell.borrow_mut() = Some(instance));
            }))?;
            *self.thread.lock() = Some(thread.clone());
            *self.slot.lock() = InstanceSlot::Threaded;
            thread.start()?;
        } else {
            *self.slot.lock() = InstanceSlot::Inline(instance);
        }

        self.run_activate_transition(&ctx.store, &class)?;
        self.refresh_appdata_cache(&ctx.store);
        Ok(())
    }

    /// Runs on the instance's owning thread: restore status variables,
    /// then drive the FSM through `activate` with the module's hooks.
    fn run_activate_transition(
        self: &Arc<Self>,
        store: &Arc<AppDataStore>,
        class: &Arc<ModuleClass>,
    ) -> Result<(), EngineError> {
        let this = Arc::clone(self);
        let store = Arc::clone(store);
        let class = Arc::clone(class);
        let key = self.appdata_key();
        self.with_instance(move |instance| -> Result<(), EngineError> {
            let loaded = match &key {
                Some(key) => store.load(key, true).unwrap_or_else(|e| {
                    warn!(module = %this.name(), error = %e, "appdata load failed, using defaults");
                    AppDataMap::new()
                }),
                None => AppDataMap::new(),
            };
            for var in &class.status_variables {
                let restored = match loaded.get(&var.name) {
                    Some(value) => match instance.set_attr(&var.name, value.clone()) {
                        Ok(()) => true,
                        Err(e) => {
                            error!(
                                module = %this.name(),
                                variable = %var.name,
                                error = %e,
                                "status variable restore failed, using default"
                            );
                            false
                        }
                    },
                    None => false,
                };
                if !restored {
                    if let Err(e) = instance.set_attr(&var.name, var.default.clone()) {
                        error!(
                            module = %this.name(),
                            variable = %var.name,
                            error = %e,
                            "status variable default could not be applied"
                        );
                    }
                }
            }

            struct Hooks<'a> {
                instance: &'a mut dyn Module,
                handle: &'a ModuleHandle,
                failure: Option<EngineError>,
            }
            impl TransitionHooks for Hooks<'_> {
                fn on_before_activate(&mut self, _transition: &Transition) -> bool {
                    match self.instance.on_activate() {
                        Ok(()) => true,
                        Err(e) => {
                            self.failure = Some(EngineError::Runtime(format!(
                                "on_activate of {:?}: {}",
                                self.handle.name(),
                                e
                            )));
                            false
                        }
                    }
                }
                fn on_change_state(&mut self, transition: &Transition) {
                    self.handle.commit_state(transition.to);
                }
            }

            let mut fsm = this.fsm.lock();
            let mut hooks = Hooks { instance, handle: &*this, failure: None };
            match fsm.apply(StateEvent::Activate, &mut hooks) {
                Ok(_) => Ok(()),
                Err(e) => Err(hooks.failure.take().unwrap_or(e)),
            }
        })?
    }

    fn unwind_activation(&self, ctx: &EngineCtx) {
        *self.slot.lock() = InstanceSlot::Empty;
        if let Some(thread) = self.thread.lock().take() {
            let name = thread.name().to_string();
            thread.quit();
            if let Err(e) = thread.join(JOIN_TIMEOUT) {
                warn!(module = self.name(), error = %e, "worker did not stop during unwind");
            }
            if let Err(e) = ctx.threads.unregister(&name) {
                warn!(module = self.name(), error = %e, "worker unregister failed during unwind");
            }
        }
    }

    /// Deactivate this handle. The manager cascades dependents first.
    pub(crate) fn deactivate(self: &Arc<Self>, ctx: &EngineCtx) -> Result<(), EngineError> {
        if self.deactivating.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = match self.kind {
            HandleKind::Local { .. } => self.deactivate_local(ctx),
            HandleKind::Remote { .. } => self.deactivate_remote(),
        };
        self.deactivating.store(false, Ordering::SeqCst);
        result
    }

    fn deactivate_local(self: &Arc<Self>, ctx: &EngineCtx) -> Result<(), EngineError> {
        if !self.state().is_active() {
            return Ok(());
        }
        info!(module = self.name(), "deactivating");
        let class = match &self.kind {
            HandleKind::Local { class } => Arc::clone(&class.read()),
            HandleKind::Remote { .. } => unreachable_local(self.name())?,
        };
        let result = self.run_deactivate_transition(&ctx.store, &class);

        // Release the instance and its thread regardless of hook outcome
        *self.slot.lock() = InstanceSlot::Empty;
        if let Some(thread) = self.thread.lock().take() {
            let name = thread.name().to_string();
            thread.quit();
            if let Err(e) = thread.join(JOIN_TIMEOUT) {
                warn!(module = self.name(), error = %e, "worker did not stop in time");
            }
            if let Err(e) = ctx.threads.unregister(&name) {
                warn!(module = self.name(), error = %e, "worker unregister failed");
            }
        }
        self.refresh_appdata_cache(&ctx.store);
        result
    }

    /// Runs on the owning thread: `on_deactivate` (errors logged, never
    /// blocking), status-variable dump (errors logged), then the FSM
    /// transition.
    fn run_deactivate_transition(
        self: &Arc<Self>,
        store: &Arc<AppDataStore>,
        class: &Arc<ModuleClass>,
    ) -> Result<(), EngineError> {
        let this = Arc::clone(self);
        let store = Arc::clone(store);
        let class = Arc::clone(class);
        let key = self.appdata_key();
        self.with_instance(move |instance| -> Result<(), EngineError> {
            struct Hooks<'a> {
                instance: &'a mut dyn Module,
                handle: &'a ModuleHandle,
                class: &'a ModuleClass,
                store: &'a AppDataStore,
                key: Option<&'a AppDataKey>,
            }
            impl TransitionHooks for Hooks<'_> {
                fn on_before_deactivate(&mut self, _transition: &Transition) -> bool {
                    if let Err(e) = self.instance.on_deactivate() {
                        error!(
                            module = %self.handle.name(),
                            error = %e,
                            "on_deactivate failed (deactivation continues)"
                        );
                    }
                    // Dump appdata even when the hook failed
                    let mut record = AppDataMap::new();
                    for var in &self.class.status_variables {
                        match self.instance.get_attr(&var.name) {
                            Ok(value) => {
                                record.insert(var.name.clone(), value);
                            }
                            Err(e) => warn!(
                                module = %self.handle.name(),
                                variable = %var.name,
                                error = %e,
                                "status variable not dumped"
                            ),
                        }
                    }
                    if let Some(key) = self.key {
                        if let Err(e) = self.store.dump(key, &record) {
                            warn!(module = %self.handle.name(), error = %e, "appdata dump failed");
                        }
                    }
                    true
                }
                fn on_change_state(&mut self, transition: &Transition) {
                    self.handle.commit_state(transition.to);
                }
            }

            let mut fsm = this.fsm.lock();
            let mut hooks = Hooks {
                instance,
                handle: &*this,
                class: &class,
                store: &store,
                key: key.as_ref(),
            };
            fsm.apply(StateEvent::Deactivate, &mut hooks).map(|_| ())
        })?
    }

    /// Lock an idle module (advisory; user code drives this pair).
    pub fn lock_module(&self) -> Result<(), EngineError> {
        let mut fsm = self.fsm.lock();
        fsm.apply(StateEvent::Lock, &mut StateOnly { handle: self })?;
        debug!(module = self.name(), "locked");
        Ok(())
    }

    /// Unlock a locked module.
    pub fn unlock_module(&self) -> Result<(), EngineError> {
        let mut fsm = self.fsm.lock();
        fsm.apply(StateEvent::Unlock, &mut StateOnly { handle: self })?;
        debug!(module = self.name(), "unlocked");
        Ok(())
    }

    /// Swap in the latest registered class; part of the reload path.
    pub(crate) fn reresolve_class(&self, ctx: &EngineCtx) -> Result<(), EngineError> {
        match (&self.kind, &self.descriptor.kind) {
            (HandleKind::Local { class }, ModuleKind::Local(local)) => {
                let fresh = ctx.registry.resolve(&local.class_path)?;
                *class.write() = fresh;
                Ok(())
            }
            // Remote reload is a reconnection only; nothing to re-resolve.
            _ => Ok(()),
        }
    }

    /// Clear persisted appdata. While active this requires the instance to
    /// expose a cooperative clear; otherwise the handle must be
    /// deactivated first.
    pub(crate) fn clear_appdata(self: &Arc<Self>, ctx: &EngineCtx) -> Result<(), EngineError> {
        match &self.kind {
            HandleKind::Remote { .. } => {
                let native = self.native_name().to_string();
                self.remote_request(Request::ClearModuleAppdata { name: native })?;
                self.set_has_appdata(false);
                Ok(())
            }
            HandleKind::Local { .. } => {
                if self.state().is_active() {
                    self.with_instance(|m| m.clear_appdata_live())?
                        .map_err(|e| EngineError::State(format!(
                            "module {:?} is active and {}",
                            self.name(),
                            e
                        )))?;
                }
                if let Some(key) = self.appdata_key() {
                    ctx.store.clear(&key)?;
                }
                self.set_has_appdata(false);
                Ok(())
            }
        }
    }

    // ---- attribute surface --------------------------------------------

    pub fn get_attr(self: &Arc<Self>, attr: &str) -> Result<Value, EngineError> {
        match &self.kind {
            HandleKind::Local { .. } => {
                let attr = attr.to_string();
                self.with_instance(move |m| m.get_attr(&attr))?
                    .map_err(EngineError::from)
            }
            HandleKind::Remote { .. } => {
                let request = Request::GetModuleAttr {
                    name: self.native_name().to_string(),
                    attr: attr.to_string(),
                };
                self.remote_value(request)
            }
        }
    }

    pub fn set_attr(self: &Arc<Self>, attr: &str, value: Value) -> Result<(), EngineError> {
        match &self.kind {
            HandleKind::Local { .. } => {
                let attr = attr.to_string();
                self.with_instance(move |m| m.set_attr(&attr, value))?
                    .map_err(EngineError::from)
            }
            HandleKind::Remote { .. } => {
                let request = Request::SetModuleAttr {
                    name: self.native_name().to_string(),
                    attr: attr.to_string(),
                    value,
                };
                self.remote_request(request).map(|_| ())
            }
        }
    }

    pub fn del_attr(self: &Arc<Self>, attr: &str) -> Result<(), EngineError> {
        match &self.kind {
            HandleKind::Local { .. } => {
                let attr = attr.to_string();
                self.with_instance(move |m| m.del_attr(&attr))?
                    .map_err(EngineError::from)
            }
            HandleKind::Remote { .. } => {
                let request = Request::DelModuleAttr {
                    name: self.native_name().to_string(),
                    attr: attr.to_string(),
                };
                self.remote_request(request).map(|_| ())
            }
        }
    }

    pub fn call(self: &Arc<Self>, method: &str, args: Vec<Value>) -> Result<Value, EngineError> {
        match &self.kind {
            HandleKind::Local { .. } => {
                let method = method.to_string();
                self.with_instance(move |m| m.call(&method, args))?
                    .map_err(EngineError::from)
            }
            HandleKind::Remote { .. } => {
                let request = Request::CallModuleMethod {
                    name: self.native_name().to_string(),
                    method: method.to_string(),
                    args,
                };
                self.remote_value(request)
            }
        }
    }

    pub fn is_method(self: &Arc<Self>, name: &str) -> Result<bool, EngineError> {
        match &self.kind {
            HandleKind::Local { .. } => {
                let name = name.to_string();
                self.with_instance(move |m| m.is_method(&name))
            }
            HandleKind::Remote { .. } => {
                let request = Request::GetModuleAttr {
                    name: self.native_name().to_string(),
                    attr: name.to_string(),
                };
                match self.remote_request(request)? {
                    Response::Value { value: RemoteValue::Callable { .. } } => Ok(true),
                    _ => Ok(false),
                }
            }
        }
    }

    // ---- remote plumbing ----------------------------------------------

    fn native_name(&self) -> &str {
        match &self.descriptor.kind {
            ModuleKind::Remote(remote) => &remote.native_name,
            ModuleKind::Local(_) => self.name(),
        }
    }

    fn remote_request(&self, request: Request) -> Result<Response, EngineError> {
        match &self.kind {
            HandleKind::Remote { conn } => {
                let guard = conn.lock();
                let conn = guard.as_ref().ok_or_else(|| {
                    EngineError::State(format!("remote module {:?} is not connected", self.name()))
                })?;
                conn.request(request)
            }
            HandleKind::Local { .. } => Err(EngineError::State(format!(
                "module {:?} is local",
                self.name()
            ))),
        }
    }

    fn remote_value(&self, request: Request) -> Result<Value, EngineError> {
        match &self.kind {
            HandleKind::Remote { conn } => {
                let guard = conn.lock();
                let conn = guard.as_ref().ok_or_else(|| {
                    EngineError::State(format!("remote module {:?} is not connected", self.name()))
                })?;
                match conn.request(request)? {
                    Response::Value { value } => conn.materialize(value),
                    Response::Ok => Ok(Value::Null),
                    other => Err(EngineError::Connection(format!(
                        "unexpected response: {:?}",
                        other
                    ))),
                }
            }
            HandleKind::Local { .. } => Err(EngineError::State(format!(
                "module {:?} is local",
                self.name()
            ))),
        }
    }

    fn activate_remote(self: &Arc<Self>, ctx: &EngineCtx) -> Result<(), EngineError> {
        if self.state().is_active() {
            return Ok(());
        }
        let rt = ctx.rt.clone().ok_or_else(|| {
            EngineError::Config("remote module support is not initialized".to_string())
        })?;
        let remote = match &self.descriptor.kind {
            ModuleKind::Remote(remote) => remote.clone(),
            ModuleKind::Local(_) => unreachable_local(self.name())?,
        };
        info!(
            module = self.name(),
            peer = %format!("{}:{}", remote.host, remote.port),
            native = %remote.native_name,
            "activating remote module"
        );
        let conn = RemoteConnection::connect(rt, &remote)?;
        match conn.request(Request::ActivateModule { name: remote.native_name.clone() })? {
            Response::Ok => {}
            other => {
                return Err(EngineError::Connection(format!(
                    "peer rejected activation: {:?}",
                    other
                )))
            }
        }
        let info = match conn.request(Request::GetModuleInfo { name: remote.native_name.clone() })? {
            Response::Info { info } => info,
            other => {
                return Err(EngineError::Connection(format!(
                    "unexpected info response: {:?}",
                    other
                )))
            }
        };
        match &self.kind {
            HandleKind::Remote { conn: slot } => *slot.lock() = Some(conn),
            HandleKind::Local { .. } => unreachable_local(self.name())?,
        }
        let state = if info.state.is_active() { info.state } else { ModuleState::Idle };
        self.commit_state(state);
        self.set_has_appdata(info.has_appdata);
        Ok(())
    }

    fn deactivate_remote(self: &Arc<Self>) -> Result<(), EngineError> {
        if !self.state().is_active() {
            return Ok(());
        }
        info!(module = self.name(), "deactivating remote module");
        if let HandleKind::Remote { conn } = &self.kind {
            *conn.lock() = None;
        }
        self.commit_state(ModuleState::Deactivated);
        Ok(())
    }

    /// Refresh the appdata cache from the peer. No-op for local handles
    /// and disconnected remote handles.
    pub(crate) fn remote_refresh_appdata(&self) {
        if let HandleKind::Remote { conn } = &self.kind {
            let info = {
                let guard = conn.lock();
                guard.as_ref().and_then(|conn| {
                    match conn.request(Request::GetModuleInfo {
                        name: self.native_name().to_string(),
                    }) {
                        Ok(Response::Info { info }) => Some(info),
                        _ => None,
                    }
                })
            };
            if let Some(info) = info {
                self.set_has_appdata(info.has_appdata);
            }
        }
    }

    /// One watchdog poll: mirror the peer's state, or report the peer lost.
    pub(crate) fn poll_remote(&self) -> RemotePoll {
        let polled = match &self.kind {
            HandleKind::Remote { conn } => {
                let guard = conn.lock();
                match guard.as_ref() {
                    None => return RemotePoll::Unchanged,
                    Some(conn) => {
                        conn.request(Request::GetModuleState {
                            name: self.native_name().to_string(),
                        })
                    }
                }
            }
            HandleKind::Local { .. } => return RemotePoll::Unchanged,
        };
        match polled {
            Ok(Response::State { state }) => {
                if state == ModuleState::Deactivated {
                    RemotePoll::PeerLost
                } else if state == self.state() {
                    RemotePoll::Unchanged
                } else {
                    RemotePoll::Changed(state)
                }
            }
            Ok(other) => {
                warn!(module = self.name(), response = ?other, "unexpected watchdog response");
                RemotePoll::PeerLost
            }
            Err(e) => {
                warn!(module = self.name(), error = %e, "watchdog poll failed");
                RemotePoll::PeerLost
            }
        }
    }

    /// Mirror a peer-reported state change locally (watchdog path).
    pub(crate) fn mirror_state(&self, state: ModuleState) {
        self.commit_state(state);
    }
}

/// State-only hooks for the advisory lock/unlock pair.
struct StateOnly<'a> {
    handle: &'a ModuleHandle,
}

impl TransitionHooks for StateOnly<'_> {
    fn on_change_state(&mut self, transition: &Transition) {
        self.handle.commit_state(transition.to);
    }
}

fn unreachable_local<T>(name: &str) -> Result<T, EngineError> {
    Err(EngineError::State(format!("handle kind mismatch for module {:?}", name)))
}

/// Resolve configured option values against the class declarations:
/// mandatory options must be present; optional ones default with a message
/// at the declared level; undeclared configured options pass through with
/// a warning.
fn resolve_options(
    class: &ModuleClass,
    configured: &IndexMap<String, Value>,
    module: &str,
) -> Result<IndexMap<String, Value>, EngineError> {
    let mut out = IndexMap::new();
    for decl in &class.options {
        match configured.get(&decl.name) {
            Some(value) => {
                out.insert(decl.name.clone(), value.clone());
            }
            None => {
                if !decl.optional {
                    return Err(EngineError::Config(format!(
                        "module {:?}: mandatory option {:?} is missing",
                        module, decl.name
                    )));
                }
                match decl.missing_action {
                    MissingAction::Ignore => {}
                    MissingAction::Info => info!(
                        module,
                        option = %decl.name,
                        "option not configured, using default"
                    ),
                    MissingAction::Warn => warn!(
                        module,
                        option = %decl.name,
                        "option not configured, using default"
                    ),
                }
                out.insert(decl.name.clone(), decl.default.clone().unwrap_or(Value::Null));
            }
        }
    }
    for (key, value) in configured {
        if !class.options.iter().any(|decl| decl.name == *key) {
            warn!(module, option = %key, "option is not declared by the module class");
            out.insert(key.clone(), value.clone());
        }
    }
    Ok(out)
}

/// Weak, name-keyed reference to a managed module.
///
/// This is the object module instances receive for their connectors and
/// the value `get_instance` returns: attribute and method access routed to
/// wherever the target instance lives, never an owning reference.
#[derive(Clone)]
pub struct ModuleRef {
    name: String,
    handle: Weak<ModuleHandle>,
}

impl ModuleRef {
    pub(crate) fn new(name: impl Into<String>, handle: &Arc<ModuleHandle>) -> Self {
        Self { name: name.into(), handle: Arc::downgrade(handle) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn upgrade(&self) -> Result<Arc<ModuleHandle>, EngineError> {
        self.handle.upgrade().ok_or_else(|| {
            EngineError::Connection(format!("module {:?} is no longer managed", self.name))
        })
    }

    pub fn state(&self) -> Result<ModuleState, EngineError> {
        Ok(self.upgrade()?.state())
    }

    pub fn get(&self, attr: &str) -> Result<Value, EngineError> {
        self.upgrade()?.get_attr(attr)
    }

    pub fn set(&self, attr: &str, value: Value) -> Result<(), EngineError> {
        self.upgrade()?.set_attr(attr, value)
    }

    pub fn del(&self, attr: &str) -> Result<(), EngineError> {
        self.upgrade()?.del_attr(attr)
    }

    pub fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, EngineError> {
        self.upgrade()?.call(method, args)
    }

    pub fn is_method(&self, name: &str) -> Result<bool, EngineError> {
        self.upgrade()?.is_method(name)
    }

    /// Advisory lock of the target module (Idle → Locked).
    pub fn lock(&self) -> Result<(), EngineError> {
        self.upgrade()?.lock_module()
    }

    /// Advisory unlock of the target module (Locked → Idle).
    pub fn unlock(&self) -> Result<(), EngineError> {
        self.upgrade()?.unlock_module()
    }

    /// Direct instance access for local modules (typed helpers, tests).
    pub fn with_instance<R: Send + 'static>(
        &self,
        f: impl FnOnce(&mut dyn Module) -> R + Send + 'static,
    ) -> Result<R, EngineError> {
        self.upgrade()?.with_instance(f)
    }
}

impl std::fmt::Debug for ModuleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRef").field("name", &self.name).finish()
    }
}

#[cfg(test)]
#[path = "handle_tests.rs"]
mod tests;
