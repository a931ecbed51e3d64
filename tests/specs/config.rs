// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration round-trip and mutation-safety properties.

use labx_config::{Config, ConfigError, ConfigStore};
use labx_core::ModuleBase;

const DOCUMENT: &str = r#"
# laboratory configuration
global:
  startup_modules: [scope_gui]
  namespace_server_port: 18861
  daily_data_dirs: false
hardware:
  camera:
    module.Class: labx.hardware.dummy.Camera
    allow_remote: true
    options:
      exposure: 0.5
logic:
  scope:
    module.Class: labx.logic.scope.ScopeLogic
    connect:
      sensor: camera
gui:
  scope_gui:
    module.Class: labx.gui.scope.ScopeGui
    connect:
      logic: scope
"#;

#[test]
fn dump_then_load_is_semantically_equal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lab.cfg");

    let store = ConfigStore::default();
    std::fs::write(&path, DOCUMENT).unwrap();
    store.load(&path).unwrap();
    let before = store.current();

    let dumped = dir.path().join("dumped.cfg");
    store.dump(&dumped).unwrap();

    let restored = ConfigStore::default();
    restored.load(&dumped).unwrap();
    assert_eq!(restored.current(), before);
}

#[test]
fn defaults_fill_in_for_absent_optional_keys() {
    let config: Config = serde_yaml::from_str("global: {}\n").unwrap();
    assert_eq!(config.global.namespace_server_port, 18861);
    assert!(config.global.force_remote_calls_by_value);
    assert_eq!(config.global.stylesheet, "qdark.qss");
}

#[test]
fn failed_mutation_leaves_tree_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lab.cfg");
    std::fs::write(&path, DOCUMENT).unwrap();
    let store = ConfigStore::default();
    store.load(&path).unwrap();

    let before = serde_yaml::to_string(&store.current()).unwrap();

    // Duplicate module name across bases
    let err = store.add_local_module(
        ModuleBase::Logic,
        "camera",
        labx_config::LocalModuleConfig {
            class_path: "labx.logic.Dup".to_string(),
            allow_remote: false,
            connect: indexmap::IndexMap::new(),
            options: indexmap::IndexMap::new(),
        },
    );
    assert!(matches!(err, Err(ConfigError::Duplicate(_))));

    // Schema violation through the validated proxy
    let proxy = store.options_proxy("camera").unwrap();
    let err = proxy.remove("missing_key");
    assert!(matches!(err, Err(ConfigError::NotFound(_))));

    let after = serde_yaml::to_string(&store.current()).unwrap();
    assert_eq!(after, before, "rejected mutations leave the tree untouched");
}

#[test]
fn successful_mutations_always_validate() {
    let store = ConfigStore::default();
    store
        .add_local_module(
            ModuleBase::Hardware,
            "camera",
            labx_config::LocalModuleConfig {
                class_path: "a.Camera".to_string(),
                allow_remote: false,
                connect: indexmap::IndexMap::new(),
                options: indexmap::IndexMap::new(),
            },
        )
        .unwrap();
    store.rename_module("camera", "cam").unwrap();
    store.current().validate().unwrap();
    store.remove_module("cam").unwrap();
    store.current().validate().unwrap();
}

#[test]
fn descriptors_feed_the_manager() {
    let config: Config = serde_yaml::from_str(DOCUMENT).unwrap();
    let descriptors = config.descriptors().unwrap();
    assert_eq!(descriptors.len(), 3);
    assert!(descriptors.iter().all(|d| !d.is_remote()));
    let camera = descriptors.iter().find(|d| d.name == "camera").unwrap();
    assert!(camera.allow_remote());
    let gui = descriptors.iter().find(|d| d.name == "scope_gui").unwrap();
    assert_eq!(gui.base, ModuleBase::Gui);
    assert!(!gui.allow_remote());
}

#[test]
fn module_names_validated_at_the_boundary() {
    let bad = "hardware:\n  2cam:\n    module.Class: a.B\n";
    let config: Config = serde_yaml::from_str(bad).unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
}
