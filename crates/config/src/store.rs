// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared configuration store with validate-then-commit mutation.

use crate::error::ConfigError;
use crate::file;
use crate::global::GlobalConfig;
use crate::module_cfg::{LocalModuleConfig, RemoteModuleConfig};
use crate::proxy::OptionsProxy;
use crate::tree::Config;
use labx_core::ModuleBase;
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::mpsc;
use tracing::info;

/// Holds the current configuration tree. Readers get snapshots; writers go
/// through [`ConfigStore::mutate`], which validates a candidate tree and
/// either commits it atomically (notifying observers once) or leaves the
/// prior tree untouched.
pub struct ConfigStore {
    inner: RwLock<Config>,
    observers: Mutex<Vec<mpsc::Sender<Config>>>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl ConfigStore {
    pub fn new(config: Config) -> Self {
        Self { inner: RwLock::new(config), observers: Mutex::new(Vec::new()) }
    }

    /// Snapshot of the current tree.
    pub fn current(&self) -> Config {
        self.inner.read().clone()
    }

    /// Subscribe to tree replacements. Each successful mutation delivers
    /// exactly one snapshot of the new tree.
    pub fn subscribe(&self) -> mpsc::Receiver<Config> {
        let (tx, rx) = mpsc::channel();
        self.observers.lock().push(tx);
        rx
    }

    fn notify(&self, config: &Config) {
        self.observers.lock().retain(|tx| tx.send(config.clone()).is_ok());
    }

    /// Apply a mutation to a candidate copy of the tree. The candidate is
    /// validated before commit; on any error the stored tree is unchanged.
    pub fn mutate<R>(
        &self,
        f: impl FnOnce(&mut Config) -> Result<R, ConfigError>,
    ) -> Result<R, ConfigError> {
        let mut candidate = self.inner.read().clone();
        let result = f(&mut candidate)?;
        candidate.validate()?;
        *self.inner.write() = candidate.clone();
        self.notify(&candidate);
        Ok(result)
    }

    /// Load a document from disk, replacing the tree on success only.
    pub fn load(&self, path: &Path) -> Result<(), ConfigError> {
        let config = file::load(path)?;
        *self.inner.write() = config.clone();
        self.notify(&config);
        info!(path = %path.display(), "configuration loaded");
        Ok(())
    }

    /// Write the current tree to disk.
    pub fn dump(&self, path: &Path) -> Result<(), ConfigError> {
        let snapshot = self.current();
        file::dump(path, &snapshot)?;
        info!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn add_local_module(
        &self,
        base: ModuleBase,
        name: &str,
        config: LocalModuleConfig,
    ) -> Result<(), ConfigError> {
        self.mutate(|tree| tree.add_local_module(base, name, config))
    }

    pub fn add_remote_module(
        &self,
        base: ModuleBase,
        name: &str,
        config: RemoteModuleConfig,
    ) -> Result<(), ConfigError> {
        self.mutate(|tree| tree.add_remote_module(base, name, config))
    }

    pub fn rename_module(&self, old: &str, new: &str) -> Result<(), ConfigError> {
        self.mutate(|tree| tree.rename_module(old, new))
    }

    pub fn remove_module(&self, name: &str) -> Result<(), ConfigError> {
        self.mutate(|tree| tree.remove_module(name))
    }

    pub fn set_global_option(&self, key: &str, value: serde_yaml::Value) -> Result<(), ConfigError> {
        self.mutate(|tree| tree.set_global_option(key, value))
    }

    pub fn remove_global_option(&self, key: &str) -> Result<(), ConfigError> {
        self.mutate(|tree| tree.remove_global_option(key))
    }

    /// Snapshot of the `global` section.
    pub fn global(&self) -> GlobalConfig {
        self.inner.read().global.clone()
    }

    /// Validating view into one local module's options map.
    pub fn options_proxy<'a>(&'a self, module: &str) -> Result<OptionsProxy<'a>, ConfigError> {
        OptionsProxy::new(self, module)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
