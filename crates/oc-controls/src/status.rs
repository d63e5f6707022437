//! Run state, fault codes and the status snapshot.

use std::fmt;

use oc_core::Real;
use serde::{Deserialize, Serialize};

/// Fault code reported in [`ControlStatus::last_fault`]. Nonzero values
/// below the sentinels are passed through from the sensor driver.
pub type FaultCode = u8;

pub const FAULT_NONE: FaultCode = 0;
/// Smoothed temperature reached `tmax_c`.
pub const FAULT_OVER_TEMPERATURE: FaultCode = 0xFD;
/// No valid sample arrived within `stale_after_ms`.
pub const FAULT_SAMPLE_STALE: FaultCode = 0xFE;
/// Reading unavailable without an explicit driver code.
pub const FAULT_READING_UNAVAILABLE: FaultCode = 0xFF;

/// Controller run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunState {
    #[default]
    #[serde(rename = "IDLE")]
    Idle,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "DISABLED")]
    SwitchDisabled,
    #[serde(rename = "ERROR")]
    Fault,
}

impl RunState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Running => "RUNNING",
            Self::SwitchDisabled => "DISABLED",
            Self::Fault => "ERROR",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Read-only snapshot of the controller.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlStatus {
    /// Last valid raw temperature, `None` after a failed reading.
    pub t_meas_c: Option<Real>,
    /// Moving average the control law acts on. Buffered history survives a
    /// failed reading, so this can stay `Some` while `t_meas_c` is `None`.
    pub t_smoothed_c: Option<Real>,
    /// Setpoint used by the last running tick.
    pub t_set_c: Option<Real>,
    /// Duty fraction in `[0, 1]`.
    pub duty: Real,
    pub last_fault: FaultCode,
    pub state: RunState,
    pub run_switch_enabled: bool,
    /// Relay decision from the last control tick.
    pub relay_on: bool,
    /// Armed profile, if any.
    pub active_profile: Option<String>,
}

impl ControlStatus {
    /// Setpoint minus measurement, when both are known.
    pub fn delta_c(&self) -> Option<Real> {
        Some(self.t_set_c? - self.t_meas_c?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_labels_match_wire_names() {
        assert_eq!(RunState::SwitchDisabled.to_string(), "DISABLED");
        assert_eq!(
            serde_json::to_string(&RunState::Fault).unwrap(),
            "\"ERROR\""
        );
    }

    #[test]
    fn delta_needs_both_values() {
        let mut status = ControlStatus {
            t_set_c: Some(100.0),
            ..Default::default()
        };
        assert_eq!(status.delta_c(), None);
        status.t_meas_c = Some(40.0);
        assert_eq!(status.delta_c(), Some(60.0));
    }

    #[test]
    fn default_status_is_idle_and_off() {
        let status = ControlStatus::default();
        assert_eq!(status.state, RunState::Idle);
        assert_eq!(status.duty, 0.0);
        assert_eq!(status.last_fault, FAULT_NONE);
        assert!(!status.relay_on);
    }
}
