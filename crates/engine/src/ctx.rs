// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared engine services.

use crate::dispatch::MainDispatcher;
use crate::module::ClassRegistry;
use crate::threads::ThreadManager;
use labx_store::AppDataStore;
use std::sync::Arc;

/// Everything handles and the manager need to operate: the thread
/// registry, the appdata store, the class registry, main-thread dispatch
/// and (when remote federation is enabled) a tokio runtime handle.
#[derive(Clone)]
pub struct EngineCtx {
    pub threads: Arc<ThreadManager>,
    pub store: Arc<AppDataStore>,
    pub registry: Arc<ClassRegistry>,
    pub dispatcher: MainDispatcher,
    /// Runtime for remote connections; `None` disables remote modules.
    pub rt: Option<tokio::runtime::Handle>,
    /// Transfer remote call arguments and results fully by value.
    pub force_by_value: bool,
}

impl EngineCtx {
    /// Context with fresh services, bound to the current thread as main.
    pub fn new(store: AppDataStore) -> Self {
        Self {
            threads: Arc::new(ThreadManager::new()),
            store: Arc::new(store),
            registry: Arc::new(ClassRegistry::new()),
            dispatcher: MainDispatcher::new(),
            rt: None,
            force_by_value: true,
        }
    }

    pub fn with_runtime(mut self, rt: tokio::runtime::Handle) -> Self {
        self.rt = Some(rt);
        self
    }

    pub fn with_force_by_value(mut self, force: bool) -> Self {
        self.force_by_value = force;
        self
    }
}
