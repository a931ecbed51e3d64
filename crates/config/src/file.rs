// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration file I/O.
//!
//! Documents are YAML with a `.cfg` extension. Dumps go through a temp file
//! plus rename so a crash never leaves a half-written document. The appdata
//! directory additionally carries `load.cfg`, a single-key document
//! recording the most recently loaded configuration path.

use crate::error::ConfigError;
use crate::tree::Config;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read, parse and validate a configuration document.
pub(crate) fn load(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
    let document: serde_yaml::Value =
        serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let config: Config =
        serde_yaml::from_value(document).map_err(|e| ConfigError::Validation(e.to_string()))?;
    config.validate()?;
    debug!(path = %path.display(), modules = config.module_count(), "loaded configuration");
    Ok(config)
}

/// Validate and atomically write a configuration document.
pub(crate) fn dump(path: &Path, config: &Config) -> Result<(), ConfigError> {
    config.validate()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
    }
    let text = serde_yaml::to_string(config).map_err(|e| ConfigError::Validation(e.to_string()))?;
    write_atomic(path, &text)
}

/// Write via sibling temp file + rename.
pub(crate) fn write_atomic(path: &Path, text: &str) -> Result<(), ConfigError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, text).map_err(|e| ConfigError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| ConfigError::io(path, e))
}

const LOAD_CFG: &str = "load.cfg";
const LOAD_KEY: &str = "load_config_path";

/// Path of the most recently loaded configuration, if recorded.
pub fn read_recent_config_path(appdata_dir: &Path) -> Option<PathBuf> {
    let text = std::fs::read_to_string(appdata_dir.join(LOAD_CFG)).ok()?;
    let document: serde_yaml::Value = serde_yaml::from_str(&text).ok()?;
    let path = document.get(LOAD_KEY)?.as_str()?;
    Some(PathBuf::from(path))
}

/// Record `path` as the most recently loaded configuration.
pub fn write_recent_config_path(appdata_dir: &Path, path: &Path) -> Result<(), ConfigError> {
    std::fs::create_dir_all(appdata_dir).map_err(|e| ConfigError::io(appdata_dir, e))?;
    let mut mapping = serde_yaml::Mapping::new();
    mapping.insert(
        serde_yaml::Value::String(LOAD_KEY.to_string()),
        serde_yaml::Value::String(path.display().to_string()),
    );
    let text = serde_yaml::to_string(&serde_yaml::Value::Mapping(mapping))
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    write_atomic(&appdata_dir.join(LOAD_CFG), &text)
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
