// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Responses and the tagged remote-value transfer type.

use labx_core::{ModuleState, Value};
use serde::{Deserialize, Serialize};

/// Error categories a peer reports. Mirrors the engine's error kinds so a
/// failure can be rebuilt with its original meaning on the calling side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    NotFound,
    PermissionDenied,
    State,
    Connection,
    Config,
    Timeout,
    Runtime,
}

impl std::fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RemoteErrorKind::NotFound => "not found",
            RemoteErrorKind::PermissionDenied => "permission denied",
            RemoteErrorKind::State => "state error",
            RemoteErrorKind::Connection => "connection error",
            RemoteErrorKind::Config => "config error",
            RemoteErrorKind::Timeout => "timeout",
            RemoteErrorKind::Runtime => "runtime error",
        };
        f.write_str(s)
    }
}

/// How a value crosses the wire.
///
/// `ByValue` fully materializes the value on the far side. `Ref` hands out
/// a server-side handle (used when by-value transfer is disabled for
/// containers); the holder resolves it with `Request::GetRefValue` and
/// releases it with `Request::DropRef`. `Callable` marks an attribute that
/// is a method, to be invoked via `Request::CallModuleMethod`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transfer", rename_all = "snake_case")]
pub enum RemoteValue {
    ByValue { value: Value },
    Ref { id: u64 },
    Callable { module: String, method: String },
}

/// Module summary returned by `Request::GetModuleInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub state: ModuleState,
    pub has_appdata: bool,
    pub allow_remote: bool,
}

/// One response frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// Generic success.
    Ok,

    /// Health check response.
    Pong,

    /// Version handshake response.
    Hello { version: String },

    /// Confirmed instance handle for a served module.
    Instance { module: String },

    State { state: ModuleState },

    Info { info: ModuleInfo },

    Value { value: RemoteValue },

    Serializer { id: String },

    /// Peer-side failure, carrying the original error kind.
    Error { kind: RemoteErrorKind, message: String },
}
