// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! labx-app: the application process.
//!
//! Owns configuration, logging, the engine services, the remote-modules
//! server and the main-thread event loop. The `labx` binary wires a class
//! registry into an [`Application`] and runs it.

pub mod application;
pub mod logging;
pub mod paths;
pub mod server;

pub use application::{AppError, AppHandle, AppOptions, Application, RESTART_EXIT_CODE};
pub use paths::AppPaths;
pub use server::{RemoteModulesServer, ServeCtx};
