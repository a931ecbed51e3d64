// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency cascade scenarios: activation ordering, cascaded
//! deactivation and reload with dependents.

use labx_core::{LocalDescriptor, ManagerEvent, ModuleBase, ModuleDescriptor, ModuleState};
use labx_engine::test_support::{log_entries, new_log, test_manager, CallLog, DummyClassBuilder};
use labx_engine::{ConnectorDecl, ModuleManager};
use std::sync::mpsc::Receiver;

fn descriptor(name: &str, base: ModuleBase, class: &str, connect: &[(&str, &str)]) -> ModuleDescriptor {
    let mut local = LocalDescriptor {
        class_path: class.to_string(),
        allow_remote: false,
        options: indexmap::IndexMap::new(),
        connectors: indexmap::IndexMap::new(),
    };
    for (connector, target) in connect {
        local.connectors.insert(connector.to_string(), target.to_string());
    }
    ModuleDescriptor::local(name, base, local).unwrap()
}

/// Hardware `h1` plus logic `l1` with connector `sensor -> h1`.
fn rig(dir: &std::path::Path, log: CallLog) -> ModuleManager {
    let manager = test_manager(dir);
    manager
        .ctx()
        .registry
        .register(
            DummyClassBuilder::new("labx.hw.Sensor", ModuleBase::Hardware)
                .threaded()
                .log(log.clone())
                .build(),
        )
        .unwrap();
    manager
        .ctx()
        .registry
        .register(
            DummyClassBuilder::new("labx.logic.Scope", ModuleBase::Logic)
                .connector(ConnectorDecl::mandatory("sensor"))
                .log(log)
                .build(),
        )
        .unwrap();
    manager
        .add(descriptor("h1", ModuleBase::Hardware, "labx.hw.Sensor", &[]), false)
        .unwrap();
    manager
        .add(
            descriptor("l1", ModuleBase::Logic, "labx.logic.Scope", &[("sensor", "h1")]),
            false,
        )
        .unwrap();
    manager
}

fn state_events(rx: &Receiver<ManagerEvent>) -> Vec<(String, ModuleState)> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ManagerEvent::StateChanged { name, state, .. } = event {
            out.push((name, state));
        }
    }
    out
}

#[test]
fn s1_dependency_cascade_orders_activation() {
    let dir = tempfile::tempdir().unwrap();
    let log = new_log();
    let manager = rig(dir.path(), log.clone());
    let rx = manager.subscribe();

    manager.activate("l1").unwrap();

    assert_eq!(manager.get_state("h1").unwrap(), ModuleState::Idle);
    assert_eq!(manager.get_state("l1").unwrap(), ModuleState::Idle);

    // h1 reached idle strictly before l1's activation hook ran
    let entries = log_entries(&log);
    assert_eq!(entries[0], "activate:h1");
    assert_eq!(entries[1], "activate:l1");
    assert!(entries.contains(&"l1:sees:sensor:idle".to_string()));

    assert_eq!(
        state_events(&rx),
        [("h1".to_string(), ModuleState::Idle), ("l1".to_string(), ModuleState::Idle)]
    );
}

#[test]
fn s2_cascaded_deactivation_orders_events() {
    let dir = tempfile::tempdir().unwrap();
    let log = new_log();
    let manager = rig(dir.path(), log.clone());
    manager.activate("l1").unwrap();
    let rx = manager.subscribe();

    manager.deactivate("h1").unwrap();

    assert_eq!(manager.get_state("h1").unwrap(), ModuleState::Deactivated);
    assert_eq!(manager.get_state("l1").unwrap(), ModuleState::Deactivated);
    assert_eq!(
        state_events(&rx),
        [
            ("l1".to_string(), ModuleState::Deactivated),
            ("h1".to_string(), ModuleState::Deactivated),
        ]
    );
}

#[test]
fn s3_reload_preserves_dependents() {
    let dir = tempfile::tempdir().unwrap();
    let log = new_log();
    let manager = rig(dir.path(), log);
    manager.activate("l1").unwrap();

    let h1_before = manager.get_module_attr("h1", "generation").unwrap();

    manager.reload("h1").unwrap();

    // Both are idle again; the handles survived in place
    assert_eq!(manager.get_state("h1").unwrap(), ModuleState::Idle);
    assert_eq!(manager.get_state("l1").unwrap(), ModuleState::Idle);
    assert_eq!(manager.module_names(), ["h1", "l1"]);

    // h1 was re-instantiated from the freshly resolved class
    let h1_after = manager.get_module_attr("h1", "generation").unwrap();
    assert_ne!(h1_after, h1_before);

    // l1's connector transparently resolves to the new h1 instance
    assert_eq!(
        manager
            .call_module_method("l1", "connector_state", vec!["sensor".into()])
            .unwrap(),
        labx_core::Value::Str("idle".to_string())
    );
}

#[test]
fn activation_invariants_hold_for_every_successful_activate() {
    let dir = tempfile::tempdir().unwrap();
    let log = new_log();
    let manager = rig(dir.path(), log.clone());
    manager.activate("l1").unwrap();

    // Invariant 3: every mandatory connector target was active when
    // l1's activation hook returned
    assert!(log_entries(&log).contains(&"l1:sees:sensor:idle".to_string()));

    // Invariant 4 after deactivating the target
    manager.deactivate("h1").unwrap();
    for state in manager.module_states().values() {
        assert_eq!(*state, ModuleState::Deactivated);
    }
}
