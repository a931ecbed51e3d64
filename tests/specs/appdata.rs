// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Appdata round-trip scenario and store-level properties.

use labx_core::{LocalDescriptor, ModuleBase, ModuleDescriptor, Value};
use labx_engine::test_support::{test_manager, DummyClassBuilder};
use labx_store::{AppDataKey, AppDataStore};

#[test]
fn s4_appdata_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let manager = test_manager(dir.path());
    manager
        .ctx()
        .registry
        .register(DummyClassBuilder::new("labx.hw.Counter", ModuleBase::Hardware).build())
        .unwrap();
    manager
        .add(
            ModuleDescriptor::local(
                "m",
                ModuleBase::Hardware,
                LocalDescriptor {
                    class_path: "labx.hw.Counter".to_string(),
                    allow_remote: false,
                    options: indexmap::IndexMap::new(),
                    connectors: indexmap::IndexMap::new(),
                },
            )
            .unwrap(),
            false,
        )
        .unwrap();

    // Activate, set the declared status variables, deactivate
    manager.activate("m").unwrap();
    manager.set_module_attr("m", "counter", Value::Int(7)).unwrap();
    manager.set_module_attr("m", "label", Value::Str("ok".to_string())).unwrap();
    manager.deactivate("m").unwrap();

    // The record exists and maps exactly the declared variables
    let store = AppDataStore::new(dir.path());
    let key = AppDataKey::new("Counter", ModuleBase::Hardware, "m");
    assert!(store.exists(&key));
    let record = store.load(&key, false).unwrap();
    assert_eq!(record.len(), 2);
    assert_eq!(record.get("counter"), Some(&Value::Int(7)));
    assert_eq!(record.get("label"), Some(&Value::Str("ok".to_string())));

    // Reactivation restores the persisted values
    manager.activate("m").unwrap();
    assert_eq!(manager.get_module_attr("m", "counter").unwrap(), Value::Int(7));
    assert_eq!(
        manager.get_module_attr("m", "label").unwrap(),
        Value::Str("ok".to_string())
    );
}

#[test]
fn corrupt_appdata_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let manager = test_manager(dir.path());
    manager
        .ctx()
        .registry
        .register(DummyClassBuilder::new("labx.hw.Counter", ModuleBase::Hardware).build())
        .unwrap();
    manager
        .add(
            ModuleDescriptor::local(
                "m",
                ModuleBase::Hardware,
                LocalDescriptor {
                    class_path: "labx.hw.Counter".to_string(),
                    allow_remote: false,
                    options: indexmap::IndexMap::new(),
                    connectors: indexmap::IndexMap::new(),
                },
            )
            .unwrap(),
            false,
        )
        .unwrap();

    // Write an unreadable record; activation must still succeed with the
    // declared defaults
    std::fs::write(dir.path().join("status-Counter-m.cfg"), ":: not yaml ::\n").unwrap();
    manager.activate("m").unwrap();
    assert_eq!(manager.get_module_attr("m", "counter").unwrap(), Value::Int(0));
    assert_eq!(
        manager.get_module_attr("m", "label").unwrap(),
        Value::Str(String::new())
    );
}

#[test]
fn store_round_trips_every_representable_value() {
    let dir = tempfile::tempdir().unwrap();
    let store = AppDataStore::new(dir.path());
    let key = AppDataKey::new("Device", ModuleBase::Logic, "dev");

    let mut record = labx_store::AppDataMap::new();
    record.insert("int".to_string(), Value::Int(-3));
    record.insert("float".to_string(), Value::Float(0.5));
    record.insert("complex".to_string(), Value::Complex { re: 1.0, im: -2.0 });
    record.insert("flag".to_string(), Value::Bool(true));
    record.insert("text".to_string(), Value::Str("scan".to_string()));
    record.insert("none".to_string(), Value::Null);
    record.insert(
        "seq".to_string(),
        Value::List(vec![Value::Int(1), Value::Str("two".to_string())]),
    );
    record.insert("set".to_string(), Value::Set(vec![Value::Int(1), Value::Int(2)]));
    record.insert("frozen".to_string(), Value::FrozenSet(vec![Value::Int(3)]));
    let mut map = indexmap::IndexMap::new();
    map.insert("nested".to_string(), Value::Int(9));
    record.insert("map".to_string(), Value::Map(map));
    record.insert(
        "trace".to_string(),
        Value::Array(labx_core::ArrayValue::from_f64(vec![3], &[1.0, 2.0, 3.0]).unwrap()),
    );
    record.insert(
        "edge".to_string(),
        Value::Enum { qualname: "labx.TriggerEdge".to_string(), member: "Rising".to_string() },
    );

    store.dump(&key, &record).unwrap();
    assert_eq!(store.load(&key, false).unwrap(), record);
}
