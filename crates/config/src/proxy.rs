// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Validating proxy into a module's nested options container.
//!
//! Every write runs the whole-tree validation; an invalid write is rolled
//! back (the stored tree is never replaced) and surfaces as a
//! `ValidationError`-kind failure to the caller.

use crate::error::ConfigError;
use crate::module_cfg::ModuleConfigEntry;
use crate::store::ConfigStore;
use crate::tree::Config;

/// A view into the `options` map of one local module entry.
pub struct OptionsProxy<'a> {
    store: &'a ConfigStore,
    module: String,
}

impl<'a> OptionsProxy<'a> {
    pub(crate) fn new(store: &'a ConfigStore, module: &str) -> Result<Self, ConfigError> {
        match store.current().find_module(module) {
            Some((_, ModuleConfigEntry::Local(_))) => {
                Ok(Self { store, module: module.to_string() })
            }
            Some((_, ModuleConfigEntry::Remote(_))) => Err(ConfigError::Validation(format!(
                "remote module {:?} has no options",
                module
            ))),
            None => Err(ConfigError::NotFound(module.to_string())),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    fn with_local<R>(
        config: &mut Config,
        module: &str,
        f: impl FnOnce(&mut crate::module_cfg::LocalModuleConfig) -> Result<R, ConfigError>,
    ) -> Result<R, ConfigError> {
        let (base, _) =
            config.find_module(module).ok_or_else(|| ConfigError::NotFound(module.to_string()))?;
        match config.section_entry_mut(base, module) {
            Some(ModuleConfigEntry::Local(local)) => f(local),
            Some(ModuleConfigEntry::Remote(_)) => Err(ConfigError::Validation(format!(
                "remote module {:?} has no options",
                module
            ))),
            None => Err(ConfigError::NotFound(module.to_string())),
        }
    }

    /// Current value of one option key.
    pub fn get(&self, key: &str) -> Option<serde_yaml::Value> {
        match self.store.current().find_module(&self.module) {
            Some((_, ModuleConfigEntry::Local(local))) => local.options.get(key).cloned(),
            _ => None,
        }
    }

    /// Option keys in declaration order.
    pub fn keys(&self) -> Vec<String> {
        match self.store.current().find_module(&self.module) {
            Some((_, ModuleConfigEntry::Local(local))) => {
                local.options.keys().cloned().collect()
            }
            _ => Vec::new(),
        }
    }

    /// Set one option key. The write is validated against the whole schema
    /// and rolled back on failure.
    pub fn set(&self, key: &str, value: serde_yaml::Value) -> Result<(), ConfigError> {
        let module = self.module.clone();
        self.store.mutate(move |config| {
            Self::with_local(config, &module, |local| {
                local.options.insert(key.to_string(), value);
                Ok(())
            })
        })
    }

    /// Remove one option key.
    pub fn remove(&self, key: &str) -> Result<(), ConfigError> {
        let module = self.module.clone();
        self.store.mutate(move |config| {
            Self::with_local(config, &module, |local| {
                local
                    .options
                    .shift_remove(key)
                    .map(|_| ())
                    .ok_or_else(|| ConfigError::NotFound(key.to_string()))
            })
        })
    }
}

#[cfg(test)]
#[path = "proxy_tests.rs"]
mod tests;
