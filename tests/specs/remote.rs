// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote transparency scenario: host A serves a module, host B consumes
//! it as if local, and the watchdog notices a severed peer.

use labx_app::{RemoteModulesServer, ServeCtx};
use labx_core::{
    LocalDescriptor, ModuleBase, ModuleDescriptor, ModuleState, RemoteDescriptor, Value,
};
use labx_engine::test_support::DummyClassBuilder;
use labx_engine::{EngineCtx, ModuleManager};
use labx_store::AppDataStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

/// Host a manager on its own pumping "main" thread, the way a real
/// process does.
fn spawn_host(
    dir: std::path::PathBuf,
    rt: tokio::runtime::Handle,
    stop: Arc<AtomicBool>,
) -> (ModuleManager, std::thread::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let host = std::thread::spawn(move || {
        let ctx = EngineCtx::new(AppDataStore::new(dir)).with_runtime(rt);
        let manager = ModuleManager::new(ctx);
        tx.send(manager.clone()).ok();
        while !stop.load(Ordering::SeqCst) {
            manager.ctx().dispatcher.pump_for(Duration::from_millis(5));
        }
    });
    (rx.recv().expect("host setup failed"), host)
}

/// Process A: a manager serving hardware module `h1`.
struct HostA {
    rt: Option<tokio::runtime::Runtime>,
    manager: ModuleManager,
    server: RemoteModulesServer,
    stop: Arc<AtomicBool>,
    host: Option<std::thread::JoinHandle<()>>,
    _dir: tempfile::TempDir,
}

impl HostA {
    fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let (manager, host) =
            spawn_host(dir.path().to_path_buf(), rt.handle().clone(), Arc::clone(&stop));

        manager
            .ctx()
            .registry
            .register(DummyClassBuilder::new("labx.hw.Sensor", ModuleBase::Hardware).build())
            .unwrap();
        manager
            .add(
                ModuleDescriptor::local(
                    "h1",
                    ModuleBase::Hardware,
                    LocalDescriptor {
                        class_path: "labx.hw.Sensor".to_string(),
                        allow_remote: true,
                        options: indexmap::IndexMap::new(),
                        connectors: indexmap::IndexMap::new(),
                    },
                )
                .unwrap(),
                false,
            )
            .unwrap();

        let ctx = Arc::new(ServeCtx::new(manager.clone(), true));
        let server = RemoteModulesServer::start(rt.handle(), "127.0.0.1", 0, None, ctx).unwrap();
        Self { rt: Some(rt), manager, server, stop, host: Some(host), _dir: dir }
    }

    fn port(&self) -> u16 {
        self.server.local_addr().port()
    }

    /// Sever every connection by tearing down the serving runtime.
    fn sever(&mut self) {
        self.server.stop();
        if let Some(rt) = self.rt.take() {
            drop(rt);
        }
    }
}

impl Drop for HostA {
    fn drop(&mut self) {
        self.server.stop();
        self.stop.store(true, Ordering::SeqCst);
        if let Some(host) = self.host.take() {
            let _ = host.join();
        }
    }
}

/// Process B: a manager with a remote entry `h1r` -> A's `h1`.
fn host_b(dir: &std::path::Path, rt: tokio::runtime::Handle, port: u16) -> ModuleManager {
    let ctx = EngineCtx::new(AppDataStore::new(dir)).with_runtime(rt);
    let manager = ModuleManager::new(ctx);
    manager
        .add(
            ModuleDescriptor::remote(
                "h1r",
                ModuleBase::Hardware,
                RemoteDescriptor {
                    native_name: "h1".to_string(),
                    host: "127.0.0.1".to_string(),
                    port,
                    certfile: None,
                    keyfile: None,
                },
            )
            .unwrap(),
            false,
        )
        .unwrap();
    manager
}

#[test]
fn s5_remote_transparency() {
    let mut a = HostA::start();
    let dir_b = tempfile::tempdir().unwrap();
    let rt_b = tokio::runtime::Runtime::new().unwrap();
    let b = host_b(dir_b.path(), rt_b.handle().clone(), a.port());

    // Activation on B succeeds and activates h1 on A
    b.activate("h1r").unwrap();
    assert_eq!(a.manager.get_state("h1").unwrap(), ModuleState::Idle);
    assert_eq!(b.get_state("h1r").unwrap(), a.manager.get_state("h1").unwrap());

    // Attribute and method access are forwarded transparently
    b.set_module_attr("h1r", "counter", Value::Int(5)).unwrap();
    assert_eq!(a.manager.get_module_attr("h1", "counter").unwrap(), Value::Int(5));
    assert_eq!(
        b.call_module_method("h1r", "double", vec![Value::Int(21)]).unwrap(),
        Value::Int(42)
    );

    // Peer-side state changes are mirrored by the watchdog
    a.manager.get_instance("h1").unwrap().lock().unwrap();
    b.watchdog_tick();
    assert_eq!(b.get_state("h1r").unwrap(), ModuleState::Locked);
    a.manager.get_instance("h1").unwrap().unlock().unwrap();
    b.watchdog_tick();
    assert_eq!(b.get_state("h1r").unwrap(), ModuleState::Idle);

    // Severing the connection deactivates the remote handle within one
    // watchdog tick
    a.sever();
    b.watchdog_tick();
    assert_eq!(b.get_state("h1r").unwrap(), ModuleState::Deactivated);
}

#[test]
fn remote_activation_fails_when_peer_rejects() {
    let a = HostA::start();
    let dir_b = tempfile::tempdir().unwrap();
    let rt_b = tokio::runtime::Runtime::new().unwrap();

    let ctx = EngineCtx::new(AppDataStore::new(dir_b.path())).with_runtime(rt_b.handle().clone());
    let manager = ModuleManager::new(ctx);
    manager
        .add(
            ModuleDescriptor::remote(
                "ghost",
                ModuleBase::Hardware,
                RemoteDescriptor {
                    native_name: "unknown".to_string(),
                    host: "127.0.0.1".to_string(),
                    port: a.port(),
                    certfile: None,
                    keyfile: None,
                },
            )
            .unwrap(),
            false,
        )
        .unwrap();

    let err = manager.activate("ghost").unwrap_err();
    assert!(matches!(err, labx_engine::EngineError::Remote { .. }));
    assert_eq!(manager.get_state("ghost").unwrap(), ModuleState::Deactivated);
}

#[test]
fn peer_deactivation_is_mirrored_within_one_tick() {
    let a = HostA::start();
    let dir_b = tempfile::tempdir().unwrap();
    let rt_b = tokio::runtime::Runtime::new().unwrap();
    let b = host_b(dir_b.path(), rt_b.handle().clone(), a.port());

    b.activate("h1r").unwrap();
    a.manager.deactivate("h1").unwrap();
    b.watchdog_tick();
    assert_eq!(b.get_state("h1r").unwrap(), ModuleState::Deactivated);
}
