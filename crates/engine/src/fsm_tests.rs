// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[derive(Default)]
struct Recorder {
    calls: Vec<String>,
    abort_activate: bool,
}

impl TransitionHooks for Recorder {
    fn on_before_activate(&mut self, t: &Transition) -> bool {
        self.calls.push(format!("before_activate:{}->{}", t.from, t.to));
        !self.abort_activate
    }

    fn on_before_deactivate(&mut self, t: &Transition) -> bool {
        self.calls.push(format!("before_deactivate:{}->{}", t.from, t.to));
        true
    }

    fn on_change_state(&mut self, t: &Transition) {
        self.calls.push(format!("changed:{}", t.to));
    }
}

#[test]
fn initial_state_is_deactivated() {
    assert_eq!(StateMachine::new().state(), ModuleState::Deactivated);
}

#[parameterized(
    activate = { ModuleState::Deactivated, StateEvent::Activate, ModuleState::Idle },
    deactivate_idle = { ModuleState::Idle, StateEvent::Deactivate, ModuleState::Deactivated },
    lock = { ModuleState::Idle, StateEvent::Lock, ModuleState::Locked },
    unlock = { ModuleState::Locked, StateEvent::Unlock, ModuleState::Idle },
    deactivate_locked = { ModuleState::Locked, StateEvent::Deactivate, ModuleState::Deactivated },
)]
fn legal_transitions(from: ModuleState, event: StateEvent, to: ModuleState) {
    assert_eq!(StateMachine::target(from, event), Some(to));
}

#[parameterized(
    activate_idle = { ModuleState::Idle, StateEvent::Activate },
    activate_locked = { ModuleState::Locked, StateEvent::Activate },
    lock_deactivated = { ModuleState::Deactivated, StateEvent::Lock },
    lock_locked = { ModuleState::Locked, StateEvent::Lock },
    unlock_idle = { ModuleState::Idle, StateEvent::Unlock },
    unlock_deactivated = { ModuleState::Deactivated, StateEvent::Unlock },
    deactivate_deactivated = { ModuleState::Deactivated, StateEvent::Deactivate },
)]
fn illegal_transitions(from: ModuleState, event: StateEvent) {
    assert_eq!(StateMachine::target(from, event), None);
}

#[test]
fn illegal_event_is_state_error_and_keeps_state() {
    let mut machine = StateMachine::new();
    let mut hooks = Recorder::default();
    let err = machine.apply(StateEvent::Lock, &mut hooks).unwrap_err();
    assert!(matches!(err, EngineError::State(_)));
    assert_eq!(machine.state(), ModuleState::Deactivated);
    assert!(hooks.calls.is_empty(), "no hooks fire on rejected events");
}

#[test]
fn full_cycle_fires_hooks_in_order() {
    let mut machine = StateMachine::new();
    let mut hooks = Recorder::default();
    machine.apply(StateEvent::Activate, &mut hooks).unwrap();
    machine.apply(StateEvent::Lock, &mut hooks).unwrap();
    machine.apply(StateEvent::Unlock, &mut hooks).unwrap();
    machine.apply(StateEvent::Deactivate, &mut hooks).unwrap();
    assert_eq!(
        hooks.calls,
        [
            "before_activate:deactivated->idle",
            "changed:idle",
            "changed:locked",
            "changed:idle",
            "before_deactivate:idle->deactivated",
            "changed:deactivated",
        ]
    );
}

#[test]
fn aborted_activation_keeps_state() {
    let mut machine = StateMachine::new();
    let mut hooks = Recorder { abort_activate: true, ..Default::default() };
    let err = machine.apply(StateEvent::Activate, &mut hooks).unwrap_err();
    assert!(matches!(err, EngineError::State(_)));
    assert_eq!(machine.state(), ModuleState::Deactivated);
    assert_eq!(hooks.calls, ["before_activate:deactivated->idle"]);
}

#[test]
fn deactivate_from_locked_without_unlock() {
    let mut machine = StateMachine::new();
    let mut hooks = Recorder::default();
    machine.apply(StateEvent::Activate, &mut hooks).unwrap();
    machine.apply(StateEvent::Lock, &mut hooks).unwrap();
    machine.apply(StateEvent::Deactivate, &mut hooks).unwrap();
    assert_eq!(machine.state(), ModuleState::Deactivated);
}
