//! Proportional control law.
//!
//! `duty = clamp(kp * (setpoint - measured) + bias, 0, 1)`
//!
//! There is no integral or derivative action and therefore no windup to
//! manage. `bias` supplies the steady-state holding power that the missing
//! integral term would otherwise find.

use oc_core::{Real, clamp_unit, ensure_finite};
use serde::{Deserialize, Serialize};

use crate::error::ControlResult;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProportionalLaw {
    /// Proportional gain (duty per °C).
    pub kp: Real,
    /// Constant duty offset.
    pub bias: Real,
}

impl ProportionalLaw {
    /// Create a law from finite gains.
    pub fn new(kp: Real, bias: Real) -> ControlResult<Self> {
        Ok(Self {
            kp: ensure_finite(kp, "kp")?,
            bias: ensure_finite(bias, "bias")?,
        })
    }

    /// Duty fraction for the given setpoint and measurement (°C).
    ///
    /// Positive error (measurement below setpoint) increases duty.
    pub fn duty(&self, setpoint_c: Real, measured_c: Real) -> Real {
        let error = setpoint_c - measured_c;
        clamp_unit(self.kp * error + self.bias)
    }
}
