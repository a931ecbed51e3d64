// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-module finite state machine.
//!
//! States: deactivated, idle, locked. Events: activate, deactivate, lock,
//! unlock. The complete transition table:
//!
//! ```text
//!            activate
//! deactivated ────────► idle
//!      ▲                 │ ▲
//!      │ deactivate      │ │ unlock
//!      │                 ▼ │
//!      └─────deactivate─ locked  ◄── lock ── idle
//! ```
//!
//! Anything else is a `State` error. Deactivation is legal from both idle
//! and locked; the lock/unlock pair is advisory for user code and never
//! blocks deactivation.

use crate::error::EngineError;
use labx_core::ModuleState;
use std::fmt;

/// Events the state machine accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    Activate,
    Deactivate,
    Lock,
    Unlock,
}

impl fmt::Display for StateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StateEvent::Activate => "activate",
            StateEvent::Deactivate => "deactivate",
            StateEvent::Lock => "lock",
            StateEvent::Unlock => "unlock",
        };
        f.write_str(s)
    }
}

/// One applied transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ModuleState,
    pub event: StateEvent,
    pub to: ModuleState,
}

/// Callbacks fired around a transition, in order:
/// `on_before_activate` (false aborts), `on_before_deactivate` (result is
/// logged by implementors; returning false aborts, which the core never
/// does), then `on_change_state` after the state changed.
pub trait TransitionHooks {
    fn on_before_activate(&mut self, transition: &Transition) -> bool {
        let _ = transition;
        true
    }

    fn on_before_deactivate(&mut self, transition: &Transition) -> bool {
        let _ = transition;
        true
    }

    fn on_change_state(&mut self, transition: &Transition);
}

/// Hook implementation that only observes state changes.
pub struct NoHooks;

impl TransitionHooks for NoHooks {
    fn on_change_state(&mut self, _transition: &Transition) {}
}

/// The state machine proper. Starts deactivated.
#[derive(Debug)]
pub struct StateMachine {
    state: ModuleState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self { state: ModuleState::Deactivated }
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Target state for an event, if the transition is legal.
    pub fn target(from: ModuleState, event: StateEvent) -> Option<ModuleState> {
        match (from, event) {
            (ModuleState::Deactivated, StateEvent::Activate) => Some(ModuleState::Idle),
            (ModuleState::Idle, StateEvent::Deactivate) => Some(ModuleState::Deactivated),
            (ModuleState::Idle, StateEvent::Lock) => Some(ModuleState::Locked),
            (ModuleState::Locked, StateEvent::Unlock) => Some(ModuleState::Idle),
            (ModuleState::Locked, StateEvent::Deactivate) => Some(ModuleState::Deactivated),
            _ => None,
        }
    }

    /// Apply an event, firing hooks in order. The state changes only when
    /// the transition is legal and not aborted by `on_before_activate`.
    pub fn apply(
        &mut self,
        event: StateEvent,
        hooks: &mut impl TransitionHooks,
    ) -> Result<Transition, EngineError> {
        let to = Self::target(self.state, event).ok_or_else(|| {
            EngineError::State(format!("cannot {} from state {}", event, self.state))
        })?;
        let transition = Transition { from: self.state, event, to };

        match event {
            StateEvent::Activate => {
                if !hooks.on_before_activate(&transition) {
                    return Err(EngineError::State(format!(
                        "activation aborted in state {}",
                        self.state
                    )));
                }
            }
            StateEvent::Deactivate => {
                if !hooks.on_before_deactivate(&transition) {
                    return Err(EngineError::State(format!(
                        "deactivation aborted in state {}",
                        self.state
                    )));
                }
            }
            StateEvent::Lock | StateEvent::Unlock => {}
        }

        self.state = to;
        hooks.on_change_state(&transition);
        Ok(transition)
    }
}

#[cfg(test)]
#[path = "fsm_tests.rs"]
mod tests;
