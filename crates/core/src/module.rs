// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Module base kinds, lifecycle states and name validation.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// The three kinds of modules the manager hosts.
///
/// Gui modules are never threaded and never shareable over the remote
/// transport; the engine enforces both restrictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleBase {
    Hardware,
    Logic,
    Gui,
}

impl ModuleBase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleBase::Hardware => "hardware",
            ModuleBase::Logic => "logic",
            ModuleBase::Gui => "gui",
        }
    }

    /// All bases in configuration order.
    pub fn all() -> [ModuleBase; 3] {
        [ModuleBase::Hardware, ModuleBase::Logic, ModuleBase::Gui]
    }
}

impl fmt::Display for ModuleBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleBase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hardware" => Ok(ModuleBase::Hardware),
            "logic" => Ok(ModuleBase::Logic),
            "gui" => Ok(ModuleBase::Gui),
            other => Err(format!("unknown module base: {}", other)),
        }
    }
}

/// Lifecycle state of a managed module.
///
/// Legal transitions: Deactivated↔Idle, Idle↔Locked, Locked→Deactivated.
/// The transition table itself lives in the engine's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    Deactivated,
    Idle,
    Locked,
}

impl ModuleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleState::Deactivated => "deactivated",
            ModuleState::Idle => "idle",
            ModuleState::Locked => "locked",
        }
    }

    /// True for every state except `Deactivated`.
    pub fn is_active(&self) -> bool {
        !matches!(self, ModuleState::Deactivated)
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deactivated" => Ok(ModuleState::Deactivated),
            "idle" => Ok(ModuleState::Idle),
            "locked" => Ok(ModuleState::Locked),
            other => Err(format!("unknown module state: {}", other)),
        }
    }
}

fn module_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // literal pattern
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap()
    })
}

/// Check a module (or connector/task) name against `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_module_name(name: &str) -> bool {
    module_name_re().is_match(name)
}

#[cfg(test)]
#[path = "module_tests.rs"]
mod tests;
