// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC protocol for remote module federation.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.
//! Each round-trip is one request/response pair over a single TCP
//! connection, optionally wrapped in TLS by the transport layer.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod frame;
mod request;
mod response;

pub use frame::{decode, encode, read_message, write_message, ProtocolError};
pub use frame::{read_request, read_response, write_request, write_response};
pub use request::Request;
pub use response::{ModuleInfo, RemoteErrorKind, RemoteValue, Response};

/// Protocol version exchanged in the Hello handshake.
pub const PROTOCOL_VERSION: &str = "1";

/// Identifier of the by-value serialization in use, reported by
/// `Request::GetSerializer` so peers can verify symmetric encoding.
pub const SERIALIZER_ID: &str = "labx-value/json-1";

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
