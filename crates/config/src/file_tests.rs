// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::module_cfg::LocalModuleConfig;
use indexmap::IndexMap;
use labx_core::ModuleBase;

fn sample_config() -> Config {
    let mut config = Config::default();
    config
        .add_local_module(
            ModuleBase::Hardware,
            "camera",
            LocalModuleConfig {
                class_path: "labx.hardware.dummy.Camera".to_string(),
                allow_remote: true,
                connect: IndexMap::new(),
                options: IndexMap::new(),
            },
        )
        .unwrap();
    config
}

#[test]
fn dump_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("lab.cfg");
    let config = sample_config();
    dump(&path, &config).unwrap();
    let loaded = load(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn dump_creates_parent_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a").join("b").join("lab.cfg");
    dump(&path, &Config::default()).unwrap();
    assert!(path.is_file());
}

#[test]
fn dump_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lab.cfg");
    dump(&path, &Config::default()).unwrap();
    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(entries, ["lab.cfg"]);
}

#[test]
fn load_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load(&dir.path().join("absent.cfg")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn load_bad_syntax_is_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.cfg");
    std::fs::write(&path, "global: [unclosed\n").unwrap();
    let err = load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn load_schema_violation_is_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.cfg");
    std::fs::write(&path, "hardware:\n  cam:\n    not_a_key: 1\n").unwrap();
    let err = load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}

#[test]
fn comments_are_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("commented.cfg");
    std::fs::write(
        &path,
        "# laboratory configuration\nglobal:\n  daily_data_dirs: false  # flat layout\n",
    )
    .unwrap();
    let config = load(&path).unwrap();
    assert!(!config.global.daily_data_dirs);
}

#[test]
fn recent_config_path_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    assert!(read_recent_config_path(dir.path()).is_none());
    let config_path = dir.path().join("lab.cfg");
    write_recent_config_path(dir.path(), &config_path).unwrap();
    assert_eq!(read_recent_config_path(dir.path()), Some(config_path));
}
