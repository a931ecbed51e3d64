// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-module configuration entries.
//!
//! An entry is either local (hosts a class in this process) or remote
//! (consumes a module served by a peer). The two sub-schemas are mutually
//! exclusive: both deny unknown fields, so an entry mixing keys from both
//! fails deserialization.

use crate::error::ConfigError;
use indexmap::IndexMap;
use labx_core::is_valid_module_name;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration of a locally hosted module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalModuleConfig {
    /// Dotted path of the module class, e.g. `labx.hardware.dummy.Camera`.
    #[serde(rename = "module.Class")]
    pub class_path: String,

    /// Whether peers may consume this module over the remote transport.
    #[serde(default)]
    pub allow_remote: bool,

    /// Connector name → target module name.
    #[serde(default)]
    pub connect: IndexMap<String, String>,

    /// Opaque option values handed to the module constructor.
    #[serde(default)]
    pub options: IndexMap<String, serde_yaml::Value>,
}

/// Configuration of a module consumed from a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteModuleConfig {
    /// Name of the module on the serving peer.
    pub native_module_name: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub certfile: Option<PathBuf>,
    #[serde(default)]
    pub keyfile: Option<PathBuf>,
}

/// One entry in a `hardware`/`logic`/`gui` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModuleConfigEntry {
    Local(LocalModuleConfig),
    Remote(RemoteModuleConfig),
}

impl ModuleConfigEntry {
    pub fn is_remote(&self) -> bool {
        matches!(self, ModuleConfigEntry::Remote(_))
    }

    pub(crate) fn validate(&self, name: &str, gui: bool) -> Result<(), ConfigError> {
        if !is_valid_module_name(name) {
            return Err(ConfigError::Validation(format!("invalid module name: {:?}", name)));
        }
        match self {
            ModuleConfigEntry::Local(local) => {
                if local.class_path.is_empty()
                    || local.class_path.split('.').any(|seg| !is_valid_module_name(seg))
                {
                    return Err(ConfigError::Validation(format!(
                        "module {:?}: invalid class path {:?}",
                        name, local.class_path
                    )));
                }
                for (connector, target) in &local.connect {
                    if !is_valid_module_name(connector) || !is_valid_module_name(target) {
                        return Err(ConfigError::Validation(format!(
                            "module {:?}: invalid connector entry {:?} -> {:?}",
                            name, connector, target
                        )));
                    }
                }
            }
            ModuleConfigEntry::Remote(remote) => {
                if gui {
                    return Err(ConfigError::Validation(format!(
                        "gui module {:?} cannot be remote",
                        name
                    )));
                }
                if !is_valid_module_name(&remote.native_module_name) {
                    return Err(ConfigError::Validation(format!(
                        "module {:?}: invalid native module name {:?}",
                        name, remote.native_module_name
                    )));
                }
                if remote.address.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "module {:?}: empty address",
                        name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "module_cfg_tests.rs"]
mod tests;
