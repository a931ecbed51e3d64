// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error kinds.

use labx_wire::RemoteErrorKind;
use thiserror::Error;

/// Errors from the module engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An entity with that name already exists.
    #[error("{0:?} already exists")]
    Duplicate(String),

    /// Lookup by name missed.
    #[error("{0:?} not found")]
    NotFound(String),

    /// The state machine rejected a transition, or the operation requires a
    /// different state.
    #[error("state error: {0}")]
    State(String),

    /// A mandatory connector has no target, or activating would close a
    /// dependency cycle.
    #[error("connection error: {0}")]
    Connection(String),

    /// A mandatory option is absent or a class path did not resolve.
    #[error("config error: {0}")]
    Config(String),

    /// A bounded wait exceeded its limit.
    #[error("timed out: {0}")]
    Timeout(String),

    /// A module hook or task body failed.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Peer-reported failure, carrying the original error kind.
    #[error("remote {kind}: {message}")]
    Remote { kind: RemoteErrorKind, message: String },

    #[error(transparent)]
    Protocol(#[from] labx_wire::ProtocolError),

    #[error(transparent)]
    Store(#[from] labx_store::StoreError),
}

impl EngineError {
    /// Error kind reported to remote peers.
    pub fn remote_kind(&self) -> RemoteErrorKind {
        match self {
            EngineError::NotFound(_) | EngineError::Duplicate(_) => RemoteErrorKind::NotFound,
            EngineError::State(_) => RemoteErrorKind::State,
            EngineError::Connection(_) | EngineError::Protocol(_) => RemoteErrorKind::Connection,
            EngineError::Config(_) => RemoteErrorKind::Config,
            EngineError::Timeout(_) => RemoteErrorKind::Timeout,
            EngineError::Remote { kind, .. } => *kind,
            EngineError::Runtime(_) | EngineError::Store(_) => RemoteErrorKind::Runtime,
        }
    }
}
