//! One control tick: safety checks, setpoint selection, proportional law.

use oc_core::{Millis, Real};
use oc_profile::ProfileSetpoint;
use tracing::info;

use crate::config::ControlConfig;
use crate::error::ControlResult;
use crate::law::ProportionalLaw;
use crate::run_state::RunStateMachine;
use crate::status::{
    FAULT_OVER_TEMPERATURE, FAULT_READING_UNAVAILABLE, FAULT_SAMPLE_STALE, FaultCode,
};

/// Inputs gathered under the state lock for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickInput {
    /// Smoothed temperature (°C).
    pub smoothed_c: Option<Real>,
    /// Time since the last valid sample, `None` if there never was one.
    pub sample_age_ms: Option<Millis>,
    /// Profile setpoint at this tick's time.
    pub profile: ProfileSetpoint,
}

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutput {
    /// Duty fraction in `[0, 1]`.
    pub duty: Real,
    /// Setpoint used this tick, `None` when the law was not evaluated.
    pub setpoint_c: Option<Real>,
    /// Fault latched by this tick.
    pub fault: Option<FaultCode>,
}

impl TickOutput {
    const OFF: Self = Self {
        duty: 0.0,
        setpoint_c: None,
        fault: None,
    };

    fn fault(code: FaultCode) -> Self {
        Self {
            fault: Some(code),
            ..Self::OFF
        }
    }
}

/// Per-tick controller built from the current configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlLoop {
    law: ProportionalLaw,
    setpoint_c: Real,
    tmax_c: Real,
    stale_after_ms: u32,
}

impl ControlLoop {
    /// Validate `config` and build the loop from it.
    pub fn from_config(config: &ControlConfig) -> ControlResult<Self> {
        config.validate()?;
        Ok(Self {
            law: ProportionalLaw::new(config.kp, config.bias)?,
            setpoint_c: config.setpoint_c,
            tmax_c: config.tmax_c,
            stale_after_ms: config.stale_after_ms,
        })
    }

    /// Run one tick against `machine`.
    ///
    /// Faults are latched in `machine` and reported in the output; the tick
    /// itself never fails.
    pub fn update(&self, machine: &mut RunStateMachine, input: &TickInput) -> TickOutput {
        if !machine.is_running() {
            return TickOutput::OFF;
        }

        let measured = match input.smoothed_c {
            Some(t) if !t.is_nan() => t,
            _ => {
                machine.enter_fault("temperature unavailable");
                return TickOutput::fault(FAULT_READING_UNAVAILABLE);
            }
        };

        if self.stale_after_ms > 0 {
            let stale = input
                .sample_age_ms
                .is_none_or(|age| age > Millis::from(self.stale_after_ms));
            if stale {
                machine.enter_fault("temperature sample stale");
                return TickOutput::fault(FAULT_SAMPLE_STALE);
            }
        }

        if measured >= self.tmax_c {
            machine.enter_fault("over temperature");
            return TickOutput::fault(FAULT_OVER_TEMPERATURE);
        }

        let profile = input.profile;
        let setpoint_c = match profile.setpoint_c {
            Some(sp) if profile.active => sp,
            _ => self.setpoint_c,
        };

        if profile.requests_stop() {
            info!("profile complete, stopping");
            machine.finish();
            return TickOutput {
                setpoint_c: Some(setpoint_c),
                ..TickOutput::OFF
            };
        }

        TickOutput {
            duty: self.law.duty(setpoint_c, measured),
            setpoint_c: Some(setpoint_c),
            fault: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::RunState;
    use oc_profile::EndBehavior;

    fn running() -> RunStateMachine {
        let mut m = RunStateMachine::new();
        m.observe_switch(true);
        assert!(m.try_start());
        m
    }

    fn input(t: Real) -> TickInput {
        TickInput {
            smoothed_c: Some(t),
            sample_age_ms: Some(0),
            profile: ProfileSetpoint::INACTIVE,
        }
    }

    fn profile(setpoint_c: Real, completed: bool, end_behavior: EndBehavior) -> ProfileSetpoint {
        ProfileSetpoint {
            active: true,
            completed,
            end_behavior,
            setpoint_c: Some(setpoint_c),
        }
    }

    #[test]
    fn from_config_rejects_bad_gain_or_window() {
        let nan_gain = ControlConfig {
            kp: Real::NAN,
            ..Default::default()
        };
        assert!(ControlLoop::from_config(&nan_gain).is_err());
        let zero_window = ControlConfig {
            window_ms: 0,
            ..Default::default()
        };
        assert!(ControlLoop::from_config(&zero_window).is_err());
    }

    #[test]
    fn idle_gives_zero_duty() {
        let lp = ControlLoop::from_config(&ControlConfig::default()).unwrap();
        let mut m = RunStateMachine::new();
        let out = lp.update(&mut m, &input(20.0));
        assert_eq!(out, TickOutput::OFF);
        assert_eq!(m.state(), RunState::Idle);
    }

    #[test]
    fn fixed_setpoint_saturates() {
        let lp = ControlLoop::from_config(&ControlConfig::default()).unwrap();
        let mut m = running();
        let out = lp.update(&mut m, &input(50.0));
        assert_eq!(out.duty, 1.0);
        assert_eq!(out.setpoint_c, Some(100.0));
        assert!(m.is_running());
    }

    #[test]
    fn missing_temperature_faults() {
        let lp = ControlLoop::from_config(&ControlConfig::default()).unwrap();
        let mut m = running();
        let out = lp.update(
            &mut m,
            &TickInput {
                smoothed_c: None,
                ..input(0.0)
            },
        );
        assert_eq!(out.fault, Some(FAULT_READING_UNAVAILABLE));
        assert_eq!(out.duty, 0.0);
        assert!(m.is_faulted());
    }

    #[test]
    fn nan_temperature_faults() {
        let lp = ControlLoop::from_config(&ControlConfig::default()).unwrap();
        let mut m = running();
        let out = lp.update(&mut m, &input(Real::NAN));
        assert_eq!(out.fault, Some(FAULT_READING_UNAVAILABLE));
    }

    #[test]
    fn over_temperature_faults_at_limit() {
        let lp = ControlLoop::from_config(&ControlConfig::default()).unwrap();
        let mut m = running();
        let out = lp.update(&mut m, &input(300.0));
        assert_eq!(out.fault, Some(FAULT_OVER_TEMPERATURE));
        assert!(m.is_faulted());
    }

    #[test]
    fn stale_sample_faults() {
        let lp = ControlLoop::from_config(&ControlConfig::default()).unwrap();
        let mut m = running();
        let out = lp.update(
            &mut m,
            &TickInput {
                sample_age_ms: Some(2_001),
                ..input(50.0)
            },
        );
        assert_eq!(out.fault, Some(FAULT_SAMPLE_STALE));
    }

    #[test]
    fn staleness_check_can_be_disabled() {
        let config = ControlConfig {
            stale_after_ms: 0,
            ..Default::default()
        };
        let lp = ControlLoop::from_config(&config).unwrap();
        let mut m = running();
        let out = lp.update(
            &mut m,
            &TickInput {
                sample_age_ms: None,
                ..input(90.0)
            },
        );
        assert_eq!(out.fault, None);
        assert!(out.duty > 0.0);
    }

    #[test]
    fn active_profile_overrides_fixed_setpoint() {
        let lp = ControlLoop::from_config(&ControlConfig::default()).unwrap();
        let mut m = running();
        let out = lp.update(
            &mut m,
            &TickInput {
                profile: profile(70.0, false, EndBehavior::HoldLast),
                ..input(60.0)
            },
        );
        assert_eq!(out.setpoint_c, Some(70.0));
        assert!((out.duty - 0.3).abs() < 1e-12);
    }

    #[test]
    fn completed_hold_last_keeps_running() {
        let lp = ControlLoop::from_config(&ControlConfig::default()).unwrap();
        let mut m = running();
        let out = lp.update(
            &mut m,
            &TickInput {
                profile: profile(120.0, true, EndBehavior::HoldLast),
                ..input(110.0)
            },
        );
        assert!(m.is_running());
        assert_eq!(out.setpoint_c, Some(120.0));
        assert!(out.duty > 0.0);
    }

    #[test]
    fn completed_stop_profile_idles() {
        let lp = ControlLoop::from_config(&ControlConfig::default()).unwrap();
        let mut m = running();
        let out = lp.update(
            &mut m,
            &TickInput {
                profile: profile(120.0, true, EndBehavior::Stop),
                ..input(110.0)
            },
        );
        assert_eq!(m.state(), RunState::Idle);
        assert_eq!(out.duty, 0.0);
        assert_eq!(out.fault, None);
    }
}
