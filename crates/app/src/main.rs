// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The labx binary: parse flags, install logging, run the application.

use clap::Parser;
use labx_app::{AppOptions, AppPaths, Application};
use labx_engine::ClassRegistry;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

/// Modular laboratory experiment orchestrator.
#[derive(Debug, Parser)]
#[command(name = "labx", version, about)]
struct Cli {
    /// Configuration file to load.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose diagnostics (DEBUG log level).
    #[arg(long)]
    debug: bool,

    /// Run headless: never activate Gui modules.
    #[arg(long = "no-gui")]
    no_gui: bool,

    /// Override the log directory.
    #[arg(long)]
    logdir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_dir = match &cli.logdir {
        Some(dir) => dir.clone(),
        None => match AppPaths::from_user_home() {
            Some(paths) => paths.log_dir(),
            None => {
                eprintln!("labx: could not determine the user home directory");
                return ExitCode::FAILURE;
            }
        },
    };
    let _log_guard = match labx_app::logging::init(cli.debug, &log_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("labx: failed to initialize logging in {}: {}", log_dir.display(), e);
            return ExitCode::FAILURE;
        }
    };

    // Module classes are contributed by extension crates linking against
    // labx-engine; the stock binary starts with an empty registry.
    let registry = Arc::new(ClassRegistry::new());

    let options = AppOptions { config: cli.config, no_gui: cli.no_gui, home: None };
    let result = Application::new(registry, options).and_then(|app| app.run());
    match result {
        Ok(code) => {
            info!(code, "exiting");
            ExitCode::from(code as u8)
        }
        Err(e) => {
            error!(error = %e, "fatal error");
            ExitCode::FAILURE
        }
    }
}
