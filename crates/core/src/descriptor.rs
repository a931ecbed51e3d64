// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Immutable module descriptors.
//!
//! A descriptor is the validated, configuration-derived record the manager
//! builds a handle from. Local descriptors carry a dotted class path plus
//! options and connector targets; remote descriptors carry the peer
//! endpoint and the module's native name there.

use crate::module::{is_valid_module_name, ModuleBase};
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors from descriptor construction.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("invalid module name: {0:?}")]
    InvalidName(String),

    #[error("invalid connector name: {0:?}")]
    InvalidConnectorName(String),

    #[error("invalid class path: {0:?}")]
    InvalidClassPath(String),

    #[error("gui module {0:?} cannot be remote")]
    RemoteGui(String),
}

/// Configuration of a locally hosted module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalDescriptor {
    /// Dotted class path resolved through the class registry.
    pub class_path: String,
    /// Whether this module may be served to remote peers.
    pub allow_remote: bool,
    /// Opaque option values handed to the module constructor.
    #[serde(default)]
    pub options: IndexMap<String, Value>,
    /// Local connector name → target module name.
    #[serde(default)]
    pub connectors: IndexMap<String, String>,
}

/// Configuration of a module consumed from a remote peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDescriptor {
    /// Name of the module on the serving peer.
    pub native_name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub certfile: Option<PathBuf>,
    #[serde(default)]
    pub keyfile: Option<PathBuf>,
}

/// Local or remote flavor of a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModuleKind {
    Local(LocalDescriptor),
    Remote(RemoteDescriptor),
}

/// Immutable description of one configured module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub name: String,
    pub base: ModuleBase,
    #[serde(flatten)]
    pub kind: ModuleKind,
}

impl ModuleDescriptor {
    /// Build a local descriptor. Gui modules get `allow_remote` forced off.
    pub fn local(
        name: impl Into<String>,
        base: ModuleBase,
        mut local: LocalDescriptor,
    ) -> Result<Self, DescriptorError> {
        let name = name.into();
        if !is_valid_module_name(&name) {
            return Err(DescriptorError::InvalidName(name));
        }
        if local.class_path.is_empty()
            || local.class_path.split('.').any(|seg| !is_valid_module_name(seg))
        {
            return Err(DescriptorError::InvalidClassPath(local.class_path));
        }
        for connector in local.connectors.keys() {
            if !is_valid_module_name(connector) {
                return Err(DescriptorError::InvalidConnectorName(connector.clone()));
            }
        }
        if base == ModuleBase::Gui {
            local.allow_remote = false;
        }
        Ok(Self { name, base, kind: ModuleKind::Local(local) })
    }

    /// Build a remote descriptor. Remote Gui modules are rejected outright.
    pub fn remote(
        name: impl Into<String>,
        base: ModuleBase,
        remote: RemoteDescriptor,
    ) -> Result<Self, DescriptorError> {
        let name = name.into();
        if !is_valid_module_name(&name) {
            return Err(DescriptorError::InvalidName(name));
        }
        if base == ModuleBase::Gui {
            return Err(DescriptorError::RemoteGui(name));
        }
        if !is_valid_module_name(&remote.native_name) {
            return Err(DescriptorError::InvalidName(remote.native_name));
        }
        Ok(Self { name, base, kind: ModuleKind::Remote(remote) })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.kind, ModuleKind::Remote(_))
    }

    /// Whether this module may be served to peers. Always false for remote
    /// and Gui modules.
    pub fn allow_remote(&self) -> bool {
        match &self.kind {
            ModuleKind::Local(local) => local.allow_remote,
            ModuleKind::Remote(_) => false,
        }
    }

    /// Connector map for local descriptors; empty for remote ones.
    pub fn connectors(&self) -> IndexMap<String, String> {
        match &self.kind {
            ModuleKind::Local(local) => local.connectors.clone(),
            ModuleKind::Remote(_) => IndexMap::new(),
        }
    }
}

#[cfg(test)]
#[path = "descriptor_tests.rs"]
mod tests;
