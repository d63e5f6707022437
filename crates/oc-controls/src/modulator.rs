//! Time-proportional relay modulation.
//!
//! A duty fraction is turned into one contiguous "on" pulse at the start of
//! each fixed-length window. Relay guard times are applied to the pulse
//! length:
//! - a nonzero request shorter than `min_on_ms` is lengthened to `min_on_ms`
//! - if the remaining rest would be shorter than `min_off_ms`, the pulse is
//!   shortened to `window_ms - min_off_ms`
//!
//! The minimum rest wins when both guards conflict.

use oc_core::{Millis, Real, clamp_unit};

use crate::config::ControlConfig;

/// Pulse length within one window for `duty`.
pub fn on_time_ms(duty: Real, window_ms: u32, min_on_ms: u32, min_off_ms: u32) -> u32 {
    let requested = (clamp_unit(duty) * Real::from(window_ms)) as u32;
    let mut on = requested.min(window_ms);
    if on > 0 && on < min_on_ms {
        on = min_on_ms.min(window_ms);
    }
    if window_ms - on < min_off_ms {
        on = window_ms.saturating_sub(min_off_ms);
    }
    on
}

/// Window-tracking relay modulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DutyCycleModulator {
    window_start_ms: Millis,
}

impl DutyCycleModulator {
    pub fn new(now_ms: Millis) -> Self {
        Self {
            window_start_ms: now_ms,
        }
    }

    pub fn window_start_ms(&self) -> Millis {
        self.window_start_ms
    }

    /// Relay decision for this tick. Returns `false` without touching the
    /// window when not running.
    pub fn update(
        &mut self,
        now_ms: Millis,
        running: bool,
        duty: Real,
        config: &ControlConfig,
    ) -> bool {
        if !running {
            return false;
        }
        let window = Millis::from(config.window_ms);
        if now_ms.saturating_sub(self.window_start_ms) >= window {
            self.window_start_ms = now_ms;
        }
        let on = on_time_ms(duty, config.window_ms, config.min_on_ms, config.min_off_ms);
        now_ms.saturating_sub(self.window_start_ms) < Millis::from(on)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(window_ms: u32, min_on_ms: u32, min_off_ms: u32) -> ControlConfig {
        ControlConfig {
            window_ms,
            min_on_ms,
            min_off_ms,
            ..Default::default()
        }
    }

    #[test]
    fn plain_proportioning() {
        assert_eq!(on_time_ms(0.0, 1000, 0, 0), 0);
        assert_eq!(on_time_ms(0.25, 1000, 0, 0), 250);
        assert_eq!(on_time_ms(1.0, 1000, 0, 0), 1000);
    }

    #[test]
    fn duty_is_clamped() {
        assert_eq!(on_time_ms(3.0, 1000, 0, 0), 1000);
        assert_eq!(on_time_ms(-1.0, 1000, 0, 0), 0);
    }

    #[test]
    fn short_pulse_is_raised_to_min_on() {
        assert_eq!(on_time_ms(0.05, 1000, 200, 0), 200);
        // Zero stays zero.
        assert_eq!(on_time_ms(0.0, 1000, 200, 0), 0);
    }

    #[test]
    fn short_rest_shrinks_pulse() {
        assert_eq!(on_time_ms(0.95, 1000, 0, 100), 900);
        assert_eq!(on_time_ms(1.0, 1000, 0, 100), 900);
    }

    #[test]
    fn min_off_wins_over_min_on() {
        // min_on would give 700, leaving 300 < 400 of rest.
        assert_eq!(on_time_ms(0.1, 1000, 700, 400), 600);
    }

    #[test]
    fn output_follows_window() {
        let config = cfg(1000, 0, 0);
        let mut m = DutyCycleModulator::new(0);
        assert!(m.update(0, true, 0.3, &config));
        assert!(m.update(299, true, 0.3, &config));
        assert!(!m.update(300, true, 0.3, &config));
        assert!(!m.update(999, true, 0.3, &config));
        // New window.
        assert!(m.update(1000, true, 0.3, &config));
        assert_eq!(m.window_start_ms(), 1000);
    }

    #[test]
    fn not_running_is_off_and_keeps_window() {
        let config = cfg(1000, 0, 0);
        let mut m = DutyCycleModulator::new(0);
        assert!(!m.update(5_000, false, 1.0, &config));
        assert_eq!(m.window_start_ms(), 0);
        // Next running tick starts a fresh window.
        assert!(m.update(5_100, true, 0.5, &config));
        assert_eq!(m.window_start_ms(), 5_100);
    }

    #[test]
    fn zero_duty_is_always_off() {
        let config = cfg(1000, 0, 0);
        let mut m = DutyCycleModulator::new(0);
        assert!((0..1000).step_by(50).all(|t| !m.update(t, true, 0.0, &config)));
    }

    #[test]
    fn full_duty_is_always_on() {
        let config = cfg(1000, 0, 0);
        let mut m = DutyCycleModulator::new(0);
        assert!((0..3000).step_by(50).all(|t| m.update(t, true, 1.0, &config)));
    }
}
