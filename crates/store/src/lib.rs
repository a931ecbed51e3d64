// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! labx-store: per-module appdata persistence.
//!
//! Each module's declared status variables are persisted as one YAML
//! record keyed by (class simple-name, base, instance name). Dense arrays
//! above an inline threshold spill to sidecar binary files next to the
//! record.

mod appdata;

pub use appdata::{AppDataKey, AppDataMap, AppDataStore, StoreError};
