// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from configuration parsing, validation and mutation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not syntactically valid YAML.
    #[error("parse error: {0}")]
    Parse(String),

    /// The document parsed but does not satisfy the schema.
    #[error("validation error: {0}")]
    Validation(String),

    /// A module with that name is already configured.
    #[error("module {0:?} is already configured")]
    Duplicate(String),

    /// No module with that name is configured.
    #[error("module {0:?} is not configured")]
    NotFound(String),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io { path: path.into(), source }
    }
}
