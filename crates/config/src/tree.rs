// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The configuration tree and its mutation operations.

use crate::convert::value_from_yaml;
use crate::error::ConfigError;
use crate::global::GlobalConfig;
use crate::module_cfg::{LocalModuleConfig, ModuleConfigEntry, RemoteModuleConfig};
use indexmap::IndexMap;
use labx_core::{LocalDescriptor, ModuleBase, ModuleDescriptor, RemoteDescriptor};
use serde::{Deserialize, Serialize};

/// The whole configuration document: `global` plus one ordered module map
/// per base. Top-level keys outside these four are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub hardware: IndexMap<String, ModuleConfigEntry>,
    #[serde(default)]
    pub logic: IndexMap<String, ModuleConfigEntry>,
    #[serde(default)]
    pub gui: IndexMap<String, ModuleConfigEntry>,
}

impl Config {
    /// Validate the whole tree against the schema.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.global.validate()?;
        let mut seen = std::collections::HashSet::new();
        for base in ModuleBase::all() {
            for (name, entry) in self.section(base) {
                entry.validate(name, base == ModuleBase::Gui)?;
                if !seen.insert(name.clone()) {
                    return Err(ConfigError::Validation(format!(
                        "module name {:?} used in more than one section",
                        name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn section(&self, base: ModuleBase) -> &IndexMap<String, ModuleConfigEntry> {
        match base {
            ModuleBase::Hardware => &self.hardware,
            ModuleBase::Logic => &self.logic,
            ModuleBase::Gui => &self.gui,
        }
    }

    pub(crate) fn section_entry_mut(
        &mut self,
        base: ModuleBase,
        name: &str,
    ) -> Option<&mut ModuleConfigEntry> {
        self.section_mut(base).get_mut(name)
    }

    fn section_mut(&mut self, base: ModuleBase) -> &mut IndexMap<String, ModuleConfigEntry> {
        match base {
            ModuleBase::Hardware => &mut self.hardware,
            ModuleBase::Logic => &mut self.logic,
            ModuleBase::Gui => &mut self.gui,
        }
    }

    /// Locate a module by name across all bases.
    pub fn find_module(&self, name: &str) -> Option<(ModuleBase, &ModuleConfigEntry)> {
        ModuleBase::all()
            .into_iter()
            .find_map(|base| self.section(base).get(name).map(|entry| (base, entry)))
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.find_module(name).is_some()
    }

    pub fn module_count(&self) -> usize {
        self.hardware.len() + self.logic.len() + self.gui.len()
    }

    /// Add a locally hosted module. Names are unique across all bases.
    pub fn add_local_module(
        &mut self,
        base: ModuleBase,
        name: &str,
        config: LocalModuleConfig,
    ) -> Result<(), ConfigError> {
        if self.has_module(name) {
            return Err(ConfigError::Duplicate(name.to_string()));
        }
        let entry = ModuleConfigEntry::Local(config);
        entry.validate(name, base == ModuleBase::Gui)?;
        self.section_mut(base).insert(name.to_string(), entry);
        Ok(())
    }

    /// Add a remote module. Gui modules can never be remote.
    pub fn add_remote_module(
        &mut self,
        base: ModuleBase,
        name: &str,
        config: RemoteModuleConfig,
    ) -> Result<(), ConfigError> {
        if self.has_module(name) {
            return Err(ConfigError::Duplicate(name.to_string()));
        }
        let entry = ModuleConfigEntry::Remote(config);
        entry.validate(name, base == ModuleBase::Gui)?;
        self.section_mut(base).insert(name.to_string(), entry);
        Ok(())
    }

    /// Rename a module in place, preserving its position. A rename to the
    /// same name is a no-op.
    pub fn rename_module(&mut self, old: &str, new: &str) -> Result<(), ConfigError> {
        if old == new {
            return Ok(());
        }
        if self.has_module(new) {
            return Err(ConfigError::Duplicate(new.to_string()));
        }
        let (base, _) = self.find_module(old).ok_or_else(|| ConfigError::NotFound(old.to_string()))?;
        let section = self.section_mut(base);
        let renamed: IndexMap<String, ModuleConfigEntry> = section
            .drain(..)
            .map(|(name, entry)| {
                if name == old {
                    (new.to_string(), entry)
                } else {
                    (name, entry)
                }
            })
            .collect();
        *section = renamed;
        if let Some(entry) = self.section(base).get(new) {
            entry.validate(new, base == ModuleBase::Gui)?;
        }
        Ok(())
    }

    /// Remove a module by name.
    pub fn remove_module(&mut self, name: &str) -> Result<(), ConfigError> {
        let (base, _) = self.find_module(name).ok_or_else(|| ConfigError::NotFound(name.to_string()))?;
        self.section_mut(base).shift_remove(name);
        Ok(())
    }

    /// Set one key in the `global` section. Recognized keys are re-validated
    /// through the schema; unrecognized keys land in the custom map.
    pub fn set_global_option(
        &mut self,
        key: &str,
        value: serde_yaml::Value,
    ) -> Result<(), ConfigError> {
        let mut mapping = match serde_yaml::to_value(&self.global) {
            Ok(serde_yaml::Value::Mapping(m)) => m,
            Ok(_) | Err(_) => {
                return Err(ConfigError::Validation("global section is not a mapping".to_string()))
            }
        };
        mapping.insert(serde_yaml::Value::String(key.to_string()), value);
        self.global = serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))
            .map_err(|e| ConfigError::Validation(format!("global option {:?}: {}", key, e)))?;
        Ok(())
    }

    /// Remove a custom key from the `global` section.
    pub fn remove_global_option(&mut self, key: &str) -> Result<(), ConfigError> {
        if self.global.custom.shift_remove(key).is_none() {
            return Err(ConfigError::NotFound(key.to_string()));
        }
        Ok(())
    }

    /// Build immutable descriptors for every configured module, converting
    /// option values into the core value model.
    pub fn descriptors(&self) -> Result<Vec<ModuleDescriptor>, ConfigError> {
        let mut out = Vec::with_capacity(self.module_count());
        for base in ModuleBase::all() {
            for (name, entry) in self.section(base) {
                out.push(descriptor_from_entry(name, base, entry)?);
            }
        }
        Ok(out)
    }
}

pub(crate) fn descriptor_from_entry(
    name: &str,
    base: ModuleBase,
    entry: &ModuleConfigEntry,
) -> Result<ModuleDescriptor, ConfigError> {
    let descriptor = match entry {
        ModuleConfigEntry::Local(local) => {
            let mut options = IndexMap::new();
            for (key, value) in &local.options {
                options.insert(key.clone(), value_from_yaml(value)?);
            }
            ModuleDescriptor::local(
                name,
                base,
                LocalDescriptor {
                    class_path: local.class_path.clone(),
                    allow_remote: local.allow_remote,
                    options,
                    connectors: local.connect.clone(),
                },
            )
        }
        ModuleConfigEntry::Remote(remote) => ModuleDescriptor::remote(
            name,
            base,
            RemoteDescriptor {
                native_name: remote.native_module_name.clone(),
                host: remote.address.clone(),
                port: remote.port,
                certfile: remote.certfile.clone(),
                keyfile: remote.keyfile.clone(),
            },
        ),
    };
    descriptor.map_err(|e| ConfigError::Validation(e.to_string()))
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
