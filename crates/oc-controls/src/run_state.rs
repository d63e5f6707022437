//! Run/fault state machine driven by the safety switch and operator commands.
//!
//! Precedence, evaluated once per control tick by [`RunStateMachine::observe_switch`]:
//! 1. Switch disabled: the state becomes `SwitchDisabled`, except that an
//!    existing `Fault` is kept. The switch can never clear a fault.
//! 2. `Fault` stays `Fault` whatever the switch does.
//! 3. Switch enabled while `SwitchDisabled` or `Idle`: `Idle`. Running
//!    always requires an explicit start.
//!
//! `Fault` is left only through [`RunStateMachine::stop`].

use tracing::{info, warn};

use crate::status::RunState;

#[derive(Debug, Clone, Default)]
pub struct RunStateMachine {
    state: RunState,
    switch_enabled: bool,
}

impl RunStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn is_faulted(&self) -> bool {
        self.state == RunState::Fault
    }

    /// Switch level seen by the last [`observe_switch`](Self::observe_switch).
    pub fn switch_enabled(&self) -> bool {
        self.switch_enabled
    }

    fn transition(&mut self, to: RunState) {
        if self.state != to {
            info!(from = %self.state, to = %to, "run state change");
            self.state = to;
        }
    }

    /// Apply the switch rules for this tick.
    pub fn observe_switch(&mut self, enabled: bool) {
        self.switch_enabled = enabled;
        match (enabled, self.state) {
            (_, RunState::Fault) => {}
            (false, _) => self.transition(RunState::SwitchDisabled),
            (true, RunState::SwitchDisabled | RunState::Idle) => self.transition(RunState::Idle),
            (true, RunState::Running) => {}
        }
    }

    /// Request a run. Fails when the switch is disabled or a fault is
    /// latched; a disabled switch is reflected in the state unless a fault
    /// is latched.
    pub fn try_start(&mut self) -> bool {
        if self.state == RunState::Fault {
            return false;
        }
        if !self.switch_enabled {
            self.transition(RunState::SwitchDisabled);
            return false;
        }
        self.transition(RunState::Running);
        true
    }

    /// Leave any state, including `Fault`, for `Idle` or `SwitchDisabled`
    /// depending on the switch.
    pub fn stop(&mut self) {
        let to = if self.switch_enabled {
            RunState::Idle
        } else {
            RunState::SwitchDisabled
        };
        self.transition(to);
    }

    /// Latch a fault. Returns `true` if the fault is new.
    pub fn enter_fault(&mut self, reason: &'static str) -> bool {
        if self.state == RunState::Fault {
            return false;
        }
        warn!(from = %self.state, reason, "entering fault");
        self.state = RunState::Fault;
        true
    }

    /// A finished run returns to idle.
    pub fn finish(&mut self) {
        if self.state == RunState::Running {
            self.transition(RunState::Idle);
        }
    }
}
