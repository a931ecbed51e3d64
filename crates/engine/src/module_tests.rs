// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::DummyClassBuilder;
use labx_core::ModuleBase;

#[test]
fn simple_name_is_last_segment() {
    let class = DummyClassBuilder::new("labx.hardware.dummy.Camera", ModuleBase::Hardware).build();
    assert_eq!(class.simple_name(), "Camera");
    let flat = DummyClassBuilder::new("Camera", ModuleBase::Hardware).build();
    assert_eq!(flat.simple_name(), "Camera");
}

#[test]
fn gui_classes_are_never_threaded() {
    let class = DummyClassBuilder::new("labx.gui.Main", ModuleBase::Gui).threaded().build();
    assert!(class.threaded);
    assert!(!class.effective_threaded());
    let hw = DummyClassBuilder::new("labx.hw.Cam", ModuleBase::Hardware).threaded().build();
    assert!(hw.effective_threaded());
}

#[test]
fn registry_register_and_resolve() {
    let registry = ClassRegistry::new();
    registry
        .register(DummyClassBuilder::new("labx.hw.Cam", ModuleBase::Hardware).build())
        .unwrap();
    assert!(registry.get("labx.hw.Cam").is_some());
    assert_eq!(registry.resolve("labx.hw.Cam").unwrap().class_path, "labx.hw.Cam");
}

#[test]
fn registry_duplicate_rejected() {
    let registry = ClassRegistry::new();
    registry
        .register(DummyClassBuilder::new("labx.hw.Cam", ModuleBase::Hardware).build())
        .unwrap();
    let err = registry.register(DummyClassBuilder::new("labx.hw.Cam", ModuleBase::Hardware).build());
    assert!(matches!(err, Err(EngineError::Duplicate(_))));
}

#[test]
fn registry_unknown_class_is_config_error() {
    let registry = ClassRegistry::new();
    assert!(matches!(registry.resolve("labx.hw.Ghost"), Err(EngineError::Config(_))));
}

#[test]
fn registry_replace_swaps_class() {
    let registry = ClassRegistry::new();
    registry
        .register(DummyClassBuilder::new("labx.hw.Cam", ModuleBase::Hardware).build())
        .unwrap();
    registry.replace(
        DummyClassBuilder::new("labx.hw.Cam", ModuleBase::Hardware).interface("camera").build(),
    );
    assert!(registry.resolve("labx.hw.Cam").unwrap().advertises("camera"));
}

#[test]
fn interface_advertisement() {
    let class = DummyClassBuilder::new("labx.hw.Cam", ModuleBase::Hardware)
        .interface("camera")
        .build();
    assert!(class.advertises("camera"));
    assert!(!class.advertises("scope"));
}

#[test]
fn option_decl_builders() {
    let required = OptionDecl::required("port");
    assert!(!required.optional);
    assert!(required.default.is_none());

    let optional = OptionDecl::optional("exposure", labx_core::Value::Float(0.1))
        .missing_action(MissingAction::Ignore);
    assert!(optional.optional);
    assert_eq!(optional.missing_action, MissingAction::Ignore);
}

#[test]
fn connector_decl_builders() {
    let mandatory = ConnectorDecl::mandatory("sensor").with_interface("camera");
    assert!(!mandatory.optional);
    assert_eq!(mandatory.interface.as_deref(), Some("camera"));
    assert!(ConnectorDecl::optional("aux").optional);
}
