// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The appdata store.

use indexmap::IndexMap;
use labx_core::{ArrayData, ModuleBase, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Status-variable record of one module instance.
pub type AppDataMap = IndexMap<String, Value>;

/// Arrays with payloads above this many bytes go to a sidecar file.
const INLINE_ARRAY_LIMIT: usize = 16 * 1024;

/// Errors from appdata access.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no appdata record at {0}")]
    NotFound(PathBuf),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("appdata serialization failed: {0}")]
    Serialize(String),
}

impl StoreError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io { path: path.into(), source }
    }
}

/// Identity of one appdata record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppDataKey {
    /// Simple (undotted) class name.
    pub class_name: String,
    pub base: ModuleBase,
    /// Configured instance name; empty for class-wide records.
    pub instance: String,
}

impl AppDataKey {
    pub fn new(class_name: impl Into<String>, base: ModuleBase, instance: impl Into<String>) -> Self {
        Self { class_name: class_name.into(), base, instance: instance.into() }
    }

    /// `status-<ClassName>[-<name>].cfg`
    fn file_name(&self) -> String {
        if self.instance.is_empty() {
            format!("status-{}.cfg", self.class_name)
        } else {
            format!("status-{}-{}.cfg", self.class_name, self.instance)
        }
    }

    /// Stem shared by the record and its array sidecar files.
    fn sidecar_stem(&self) -> String {
        if self.instance.is_empty() {
            format!("status-{}", self.class_name)
        } else {
            format!("status-{}-{}", self.class_name, self.instance)
        }
    }
}

/// Filesystem-backed appdata records, one YAML file per key.
pub struct AppDataStore {
    root: PathBuf,
}

impl AppDataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, key: &AppDataKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    /// Whether a record exists on disk for this key.
    pub fn exists(&self, key: &AppDataKey) -> bool {
        self.record_path(key).is_file()
    }

    /// Load a record. With `ignore_missing`, an absent record yields an
    /// empty map instead of `NotFound`.
    pub fn load(&self, key: &AppDataKey, ignore_missing: bool) -> Result<AppDataMap, StoreError> {
        let path = self.record_path(key);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return if ignore_missing {
                    Ok(AppDataMap::new())
                } else {
                    Err(StoreError::NotFound(path))
                };
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        let mut record: AppDataMap =
            serde_yaml::from_str(&text).map_err(|e| StoreError::Serialize(e.to_string()))?;
        for value in record.values_mut() {
            resolve_arrays(value, &self.root)?;
        }
        Ok(record)
    }

    /// Atomically write a record, spilling large arrays to sidecar files.
    pub fn dump(&self, key: &AppDataKey, data: &AppDataMap) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.root).map_err(|e| StoreError::io(&self.root, e))?;
        self.remove_sidecars(key)?;

        let stem = key.sidecar_stem();
        let mut sidecar_count = 0usize;
        let mut record = AppDataMap::with_capacity(data.len());
        for (name, value) in data {
            let mut value = value.clone();
            externalize_arrays(&mut value, &self.root, &stem, &mut sidecar_count)?;
            record.insert(name.clone(), value);
        }

        let text =
            serde_yaml::to_string(&record).map_err(|e| StoreError::Serialize(e.to_string()))?;
        let path = self.record_path(key);
        let tmp = path.with_extension("cfg.tmp");
        std::fs::write(&tmp, text).map_err(|e| StoreError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| StoreError::io(&path, e))?;
        debug!(record = %path.display(), entries = record.len(), "dumped appdata");
        Ok(())
    }

    /// Remove a record and its sidecar files. Removing an absent record is
    /// not an error.
    pub fn clear(&self, key: &AppDataKey) -> Result<(), StoreError> {
        self.remove_sidecars(key)?;
        let path = self.record_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    fn remove_sidecars(&self, key: &AppDataKey) -> Result<(), StoreError> {
        let prefix = format!("{}.", key.sidecar_stem());
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StoreError::io(&self.root, e)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.root, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(&prefix) && name.ends_with(".bin") {
                std::fs::remove_file(entry.path()).map_err(|e| StoreError::io(entry.path(), e))?;
            }
        }
        Ok(())
    }
}

/// Replace large inline arrays with sidecar file references, writing the
/// payloads next to the record.
fn externalize_arrays(
    value: &mut Value,
    root: &Path,
    stem: &str,
    counter: &mut usize,
) -> Result<(), StoreError> {
    match value {
        Value::Array(array) => {
            if array.byte_len() > INLINE_ARRAY_LIMIT {
                let bytes = array
                    .to_bytes()
                    .map_err(|e| StoreError::Serialize(e.to_string()))?;
                let name = format!("{}.{}.bin", stem, counter);
                *counter += 1;
                let path = root.join(&name);
                std::fs::write(&path, bytes).map_err(|e| StoreError::io(&path, e))?;
                array.data = ArrayData::File { name };
            }
            Ok(())
        }
        Value::List(items) | Value::Set(items) | Value::FrozenSet(items) => {
            for item in items {
                externalize_arrays(item, root, stem, counter)?;
            }
            Ok(())
        }
        Value::Map(map) => {
            for item in map.values_mut() {
                externalize_arrays(item, root, stem, counter)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Inverse of [`externalize_arrays`]: read sidecar payloads back inline.
fn resolve_arrays(value: &mut Value, root: &Path) -> Result<(), StoreError> {
    match value {
        Value::Array(array) => {
            if let ArrayData::File { name } = &array.data {
                let path = root.join(name);
                let bytes = std::fs::read(&path).map_err(|e| StoreError::io(&path, e))?;
                let rebuilt =
                    labx_core::ArrayValue::from_bytes(array.dtype, array.shape.clone(), &bytes)
                        .map_err(|e| StoreError::Serialize(e.to_string()))?;
                array.data = rebuilt.data;
            }
            Ok(())
        }
        Value::List(items) | Value::Set(items) | Value::FrozenSet(items) => {
            for item in items {
                resolve_arrays(item, root)?;
            }
            Ok(())
        }
        Value::Map(map) => {
            for item in map.values_mut() {
                resolve_arrays(item, root)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
#[path = "appdata_tests.rs"]
mod tests;
