// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `global` configuration section.

use crate::error::ConfigError;
use indexmap::IndexMap;
use labx_core::is_valid_module_name;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Endpoint of the remote-modules server this process exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteServerConfig {
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub certfile: Option<PathBuf>,
    #[serde(default)]
    pub keyfile: Option<PathBuf>,
}

fn default_namespace_port() -> u16 {
    18861
}

fn default_true() -> bool {
    true
}

fn default_stylesheet() -> String {
    "qdark.qss".to_string()
}

/// Recognized global options plus a pass-through map for custom keys.
///
/// Unknown keys are allowed here and only here; the module sections reject
/// anything outside their schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Modules activated at application startup, in order.
    #[serde(default)]
    pub startup_modules: Vec<String>,

    /// When set, this process serves its `allow_remote` modules to peers.
    #[serde(default)]
    pub remote_modules_server: Option<RemoteServerConfig>,

    /// Port of the local namespace server (consumed by shell integration,
    /// which lives outside this workspace).
    #[serde(default = "default_namespace_port")]
    pub namespace_server_port: u16,

    /// Transfer remote call arguments and results fully by value.
    #[serde(default = "default_true")]
    pub force_remote_calls_by_value: bool,

    /// Append `YYYY/MM/YYYY-MM-DD` to the data root.
    #[serde(default = "default_true")]
    pub daily_data_dirs: bool,

    /// Overrides the default `<home>/labx/Data` root.
    #[serde(default)]
    pub default_data_dir: Option<PathBuf>,

    /// Name of the Qt stylesheet consumed by GUI extensions.
    #[serde(default = "default_stylesheet")]
    pub stylesheet: String,

    /// Extra module search paths announced to extensions.
    #[serde(default)]
    pub extension_paths: Vec<PathBuf>,

    /// Custom keys, preserved verbatim.
    #[serde(flatten)]
    pub custom: IndexMap<String, serde_yaml::Value>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            startup_modules: Vec::new(),
            remote_modules_server: None,
            namespace_server_port: default_namespace_port(),
            force_remote_calls_by_value: true,
            daily_data_dirs: true,
            default_data_dir: None,
            stylesheet: default_stylesheet(),
            extension_paths: Vec::new(),
            custom: IndexMap::new(),
        }
    }
}

impl GlobalConfig {
    /// Schema checks beyond what the types enforce.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !self.stylesheet.ends_with(".qss") {
            return Err(ConfigError::Validation(format!(
                "stylesheet must end in .qss, got {:?}",
                self.stylesheet
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for name in &self.startup_modules {
            if !is_valid_module_name(name) {
                return Err(ConfigError::Validation(format!(
                    "invalid startup module name: {:?}",
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate startup module: {:?}",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "global_tests.rs"]
mod tests;
