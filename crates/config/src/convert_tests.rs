// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use labx_core::Value;

#[test]
fn scalars_convert() {
    assert_eq!(value_from_yaml(&serde_yaml::Value::Null).unwrap(), Value::Null);
    assert_eq!(value_from_yaml(&serde_yaml::from_str("true").unwrap()).unwrap(), Value::Bool(true));
    assert_eq!(value_from_yaml(&serde_yaml::from_str("3").unwrap()).unwrap(), Value::Int(3));
    assert_eq!(value_from_yaml(&serde_yaml::from_str("2.5").unwrap()).unwrap(), Value::Float(2.5));
    assert_eq!(
        value_from_yaml(&serde_yaml::from_str("hello").unwrap()).unwrap(),
        Value::Str("hello".to_string())
    );
}

#[test]
fn nested_containers_convert() {
    let yaml: serde_yaml::Value = serde_yaml::from_str("a:\n  - 1\n  - x: 2\n").unwrap();
    let value = value_from_yaml(&yaml).unwrap();
    let map = value.as_map().unwrap();
    let list = map.get("a").unwrap().as_list().unwrap();
    assert_eq!(list[0], Value::Int(1));
    assert_eq!(list[1].as_map().unwrap().get("x"), Some(&Value::Int(2)));
}

#[test]
fn non_string_mapping_keys_rejected() {
    let yaml: serde_yaml::Value = serde_yaml::from_str("1: one\n").unwrap();
    assert!(value_from_yaml(&yaml).is_err());
}

#[test]
fn huge_unsigned_rejected() {
    let yaml: serde_yaml::Value = serde_yaml::from_str("18446744073709551615").unwrap();
    // u64::MAX does not fit i64 and YAML numbers keep it integral
    match value_from_yaml(&yaml) {
        Ok(Value::Float(_)) | Err(_) => {}
        other => panic!("unexpected conversion: {:?}", other),
    }
}

#[test]
fn plain_round_trip() {
    let yaml: serde_yaml::Value =
        serde_yaml::from_str("exposure: 0.5\ngain: 3\nlabel: fast\nflags: [true, false]\n").unwrap();
    let value = value_from_yaml(&yaml).unwrap();
    let back = value_to_yaml(&value);
    assert_eq!(value_from_yaml(&back).unwrap(), value);
}

#[test]
fn tagged_yaml_rejected() {
    let yaml: serde_yaml::Value = serde_yaml::from_str("!special 1").unwrap();
    assert!(value_from_yaml(&yaml).is_err());
}
