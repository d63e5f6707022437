//! Operator-set control configuration.

use oc_core::{Real, ensure_finite};
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};

/// Capacity of the smoothing buffer.
pub const MAX_SMOOTH_WINDOW: u8 = 10;

/// Control configuration. Missing fields take their defaults when
/// deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Proportional gain (duty per °C of error).
    pub kp: Real,
    /// Constant duty offset added to the proportional term.
    pub bias: Real,
    /// Fixed setpoint used when no profile is armed (°C).
    pub setpoint_c: Real,
    /// Smoothed temperature at or above which the controller faults (°C).
    pub tmax_c: Real,
    /// Relay is energized by a high pin level.
    pub ssr_active_high: bool,
    /// Run switch reads "enabled" on a high pin level.
    pub switch_active_high: bool,
    /// Time-proportioning window length.
    pub window_ms: u32,
    /// Shortest allowed relay pulse.
    pub min_on_ms: u32,
    /// Shortest allowed relay rest.
    pub min_off_ms: u32,
    /// Moving-average length; 0 or 1 disables smoothing.
    pub smooth_window: u8,
    /// Fault when no valid sample has arrived for this long while running.
    /// 0 disables the check.
    pub stale_after_ms: u32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            kp: 0.03,
            bias: 0.0,
            setpoint_c: 100.0,
            tmax_c: 300.0,
            ssr_active_high: true,
            switch_active_high: false,
            window_ms: 1000,
            min_on_ms: 0,
            min_off_ms: 0,
            smooth_window: 1,
            stale_after_ms: 2000,
        }
    }
}

impl ControlConfig {
    /// Smoothing window actually applied, bounded by buffer capacity.
    pub fn effective_smooth_window(&self) -> usize {
        usize::from(self.smooth_window.min(MAX_SMOOTH_WINDOW))
    }

    pub fn validate(&self) -> ControlResult<()> {
        ensure_finite(self.kp, "kp")?;
        ensure_finite(self.bias, "bias")?;
        ensure_finite(self.setpoint_c, "setpoint_c")?;
        ensure_finite(self.tmax_c, "tmax_c")?;

        if self.window_ms == 0 {
            return Err(ControlError::InvalidArg {
                what: "window_ms must be positive",
            });
        }
        if self.min_on_ms > self.window_ms {
            return Err(ControlError::InvalidConfig {
                what: format!(
                    "min_on_ms ({}) exceeds window_ms ({})",
                    self.min_on_ms, self.window_ms
                ),
            });
        }
        if self.min_off_ms > self.window_ms {
            return Err(ControlError::InvalidConfig {
                what: format!(
                    "min_off_ms ({}) exceeds window_ms ({})",
                    self.min_off_ms, self.window_ms
                ),
            });
        }
        if self.smooth_window > MAX_SMOOTH_WINDOW {
            return Err(ControlError::InvalidConfig {
                what: format!(
                    "smooth_window ({}) exceeds maximum ({MAX_SMOOTH_WINDOW})",
                    self.smooth_window
                ),
            });
        }
        Ok(())
    }
}
