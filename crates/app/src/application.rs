// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application lifecycle: startup, the main-thread event loop, shutdown
//! and restart.

use crate::paths::AppPaths;
use crate::server::{tls_acceptor, RemoteModulesServer, ServeCtx};
use fs2::FileExt;
use labx_config::{read_recent_config_path, write_recent_config_path, ConfigError, ConfigStore};
use labx_core::ModuleBase;
use labx_engine::{
    ClassRegistry, EngineCtx, EngineError, ModuleManager, TaskManager, ThreadManager,
};
use labx_store::AppDataStore;
use parking_lot::Mutex;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Exit code a supervising launcher interprets as a restart request.
pub const RESTART_EXIT_CODE: i32 = 42;

/// Interval of the remote-state watchdog.
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(1);
/// Per-thread join bound during shutdown.
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Fatal application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("could not determine the user home directory")]
    NoHomeDir,

    #[error("another labx instance is already running")]
    AlreadyRunning(#[source] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Options resolved from the command line.
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    /// Explicit configuration file (`--config`).
    pub config: Option<PathBuf>,
    /// Run headless: Gui modules are never activated (`--no-gui`).
    pub no_gui: bool,
    /// Override the home directory (tests).
    pub home: Option<PathBuf>,
}

/// Cloneable control handle: signal handlers and embedded UIs use it to
/// end or restart the main loop.
#[derive(Clone, Default)]
pub struct AppHandle {
    shutdown: Arc<AtomicBool>,
    restart: Arc<AtomicBool>,
}

impl AppHandle {
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Shut down and exit with the restart sentinel code.
    pub fn request_restart(&self) {
        self.restart.store(true, Ordering::SeqCst);
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// The top-level process supervisor: owns configuration, engine services
/// and the optional remote-modules server.
pub struct Application {
    options: AppOptions,
    paths: AppPaths,
    // NOTE(lifetime): held to maintain the exclusive pid-file lock
    #[allow(dead_code)]
    lock_file: File,
    config: Arc<ConfigStore>,
    runtime: tokio::runtime::Runtime,
    manager: ModuleManager,
    tasks: TaskManager,
    server: Mutex<Option<RemoteModulesServer>>,
    handle: AppHandle,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application").finish_non_exhaustive()
    }
}

impl Application {
    /// Build the application: lock the instance, load configuration and
    /// assemble the engine. Must run on the thread that will host the
    /// main loop.
    pub fn new(registry: Arc<ClassRegistry>, options: AppOptions) -> Result<Self, AppError> {
        // 1. Resolve the filesystem layout
        let paths = match &options.home {
            Some(home) => AppPaths::new(home),
            None => AppPaths::from_user_home().ok_or(AppError::NoHomeDir)?,
        };
        paths.ensure_dirs()?;

        // 2. Acquire the pid-file lock first: one instance per user
        let lock_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(paths.lock_file())?;
        lock_file.try_lock_exclusive().map_err(AppError::AlreadyRunning)?;
        let mut lock_file = lock_file;
        lock_file.set_len(0)?;
        writeln!(lock_file, "{}", std::process::id())?;

        // 3. Load configuration: explicit path, else the recorded recent
        //    path, else the default document (missing file = empty tree)
        let config = Arc::new(ConfigStore::default());
        let config_path = options
            .config
            .clone()
            .or_else(|| read_recent_config_path(&paths.appdata_dir()))
            .unwrap_or_else(|| paths.default_config_file());
        if config_path.is_file() || options.config.is_some() {
            config.load(&config_path)?;
            write_recent_config_path(&paths.appdata_dir(), &config_path)?;
        } else {
            info!(path = %config_path.display(), "no configuration file, starting empty");
        }

        // 4. Runtime for the remote transport
        let runtime = tokio::runtime::Runtime::new()?;

        // 5. Engine services; this thread becomes the main thread
        let global = config.global();
        let ctx = EngineCtx {
            threads: Arc::new(ThreadManager::new()),
            store: Arc::new(AppDataStore::new(paths.appdata_dir())),
            registry,
            dispatcher: labx_engine::MainDispatcher::new(),
            rt: Some(runtime.handle().clone()),
            force_by_value: global.force_remote_calls_by_value,
        };
        let manager = ModuleManager::new(ctx.clone());
        let tasks = TaskManager::new(Arc::clone(&ctx.threads));

        Ok(Self {
            options,
            paths,
            lock_file,
            config,
            runtime,
            manager,
            tasks,
            server: Mutex::new(None),
            handle: AppHandle::default(),
        })
    }

    pub fn handle(&self) -> AppHandle {
        self.handle.clone()
    }

    pub fn manager(&self) -> &ModuleManager {
        &self.manager
    }

    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    /// Run to completion: startup, main loop, shutdown. Returns the
    /// process exit code (0, or 42 for a restart request).
    pub fn run(&self) -> Result<i32, AppError> {
        self.startup()?;

        // Main loop: service redirected calls, tick the watchdog once a
        // second, leave when shutdown is requested.
        let dispatcher = self.manager.ctx().dispatcher.clone();
        while !self.handle.shutdown_requested() {
            dispatcher.pump_for(WATCHDOG_INTERVAL);
            self.manager.watchdog_tick();
        }

        self.shutdown();
        Ok(if self.handle.restart.load(Ordering::SeqCst) {
            RESTART_EXIT_CODE
        } else {
            0
        })
    }

    fn startup(&self) -> Result<(), AppError> {
        info!(version = env!("CARGO_PKG_VERSION"), "starting labx");

        // 1. Forward termination signals into the shutdown flag
        self.install_signal_handler();

        // 2. Start the remote-modules server when configured and at least
        //    one module is shareable
        self.start_server_if_configured()?;

        // 3. Apply the module configuration to the manager
        let descriptors = self.config.current().descriptors()?;
        for descriptor in descriptors {
            let name = descriptor.name.clone();
            if let Err(e) = self.manager.add(descriptor, true) {
                error!(module = %name, error = %e, "module configuration rejected");
            }
        }

        // 4. Activate startup modules; failures leave the module
        //    deactivated and the process running
        for name in self.config.global().startup_modules {
            if self.options.no_gui {
                if let Ok(descriptor) = self.manager.descriptor(&name) {
                    if descriptor.base == ModuleBase::Gui {
                        info!(module = %name, "skipping gui startup module (headless)");
                        continue;
                    }
                }
            }
            if let Err(e) = self.manager.activate(&name) {
                error!(module = %name, error = %e, "startup module activation failed");
            }
        }

        info!("startup complete");
        Ok(())
    }

    fn install_signal_handler(&self) {
        let handle = self.handle.clone();
        self.runtime.spawn(async move {
            let interrupt = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt());
            let terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate());
            match (interrupt, terminate) {
                (Ok(mut interrupt), Ok(mut terminate)) => {
                    tokio::select! {
                        _ = interrupt.recv() => info!("interrupt received"),
                        _ = terminate.recv() => info!("termination requested"),
                    }
                    handle.request_shutdown();
                }
                _ => warn!("could not install signal handlers"),
            }
        });
    }

    fn start_server_if_configured(&self) -> Result<(), AppError> {
        let global = self.config.global();
        let Some(server_config) = global.remote_modules_server else {
            return Ok(());
        };
        let shareable = self
            .config
            .current()
            .descriptors()?
            .iter()
            .any(|descriptor| descriptor.allow_remote());
        if !shareable {
            warn!("remote modules server configured but no module allows remote access");
            return Ok(());
        }
        let tls = match (&server_config.certfile, &server_config.keyfile) {
            (Some(cert), Some(key)) => Some(tls_acceptor(cert, key)?),
            (None, None) => None,
            _ => {
                return Err(AppError::Engine(EngineError::Config(
                    "remote_modules_server needs both certfile and keyfile for TLS".to_string(),
                )))
            }
        };
        let ctx = Arc::new(ServeCtx::new(
            self.manager.clone(),
            global.force_remote_calls_by_value,
        ));
        let server = RemoteModulesServer::start(
            self.runtime.handle(),
            &server_config.address,
            server_config.port,
            tls,
            ctx,
        )?;
        *self.server.lock() = Some(server);
        Ok(())
    }

    /// Tear everything down in reverse startup order, tolerating failures
    /// at every step.
    fn shutdown(&self) {
        info!("shutting down");

        // 1. Stop accepting peers
        if let Some(server) = self.server.lock().take() {
            server.stop();
        }

        // 2. Interrupt tasks and join their threads
        self.tasks.terminate();

        // 3. Deactivate all modules (dumps appdata)
        if let Err(e) = self.manager.deactivate_all() {
            warn!(error = %e, "module deactivation failed during shutdown");
        }

        // 4. Stop any remaining worker threads
        let threads = Arc::clone(&self.manager.ctx().threads);
        threads.quit_all();
        if let Err(e) = threads.join_all(SHUTDOWN_JOIN_TIMEOUT) {
            warn!(error = %e, "worker threads did not stop in time");
        }

        info!("shutdown complete");
        // Lock file released when self drops
    }
}

#[cfg(test)]
#[path = "application_tests.rs"]
mod tests;
