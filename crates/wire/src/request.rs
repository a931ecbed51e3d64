// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Requests a peer may send over the remote-module connection.

use labx_core::Value;
use serde::{Deserialize, Serialize};

/// One request frame. Every variant gets exactly one [`crate::Response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check.
    #[serde(rename = "ping")]
    Ping,

    /// Version handshake; sent once after connecting.
    #[serde(rename = "hello")]
    Hello { version: String },

    /// Activate a served module (no-op when already active).
    #[serde(rename = "module:activate")]
    ActivateModule { name: String },

    /// Activate if needed and return an opaque instance handle.
    #[serde(rename = "module:get_instance")]
    GetModuleInstance { name: String },

    #[serde(rename = "module:get_state")]
    GetModuleState { name: String },

    /// State + has_appdata + allow_remote in one round-trip.
    #[serde(rename = "module:get_info")]
    GetModuleInfo { name: String },

    #[serde(rename = "module:clear_appdata")]
    ClearModuleAppdata { name: String },

    #[serde(rename = "module:get_attr")]
    GetModuleAttr { name: String, attr: String },

    #[serde(rename = "module:set_attr")]
    SetModuleAttr { name: String, attr: String, value: Value },

    #[serde(rename = "module:del_attr")]
    DelModuleAttr { name: String, attr: String },

    #[serde(rename = "module:call")]
    CallModuleMethod { name: String, method: String, args: Vec<Value> },

    /// Identifier of the by-value serialization in use.
    #[serde(rename = "serializer")]
    GetSerializer,

    /// Materialize a value previously returned as a reference handle.
    #[serde(rename = "ref:get")]
    GetRefValue { id: u64 },

    /// Release a reference handle on the server.
    #[serde(rename = "ref:drop")]
    DropRef { id: u64 },
}

impl Request {
    /// Module name this request addresses, if any.
    pub fn module_name(&self) -> Option<&str> {
        match self {
            Request::ActivateModule { name }
            | Request::GetModuleInstance { name }
            | Request::GetModuleState { name }
            | Request::GetModuleInfo { name }
            | Request::ClearModuleAppdata { name }
            | Request::GetModuleAttr { name, .. }
            | Request::SetModuleAttr { name, .. }
            | Request::DelModuleAttr { name, .. }
            | Request::CallModuleMethod { name, .. } => Some(name),
            Request::Ping
            | Request::Hello { .. }
            | Request::GetSerializer
            | Request::GetRefValue { .. }
            | Request::DropRef { .. } => None,
        }
    }
}
