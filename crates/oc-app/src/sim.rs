//! Simulated oven hardware.
//!
//! The plant is a single lumped thermal mass heated by a switched element and
//! losing heat to ambient through a fixed conductance:
//!
//! `C * dT/dt = P * u - k * (T - T_amb)`
//!
//! where `u` is the relay state. The model is integrated lazily: every access
//! first advances it to the clock's current time using the exact solution of
//! the linear ODE for the relay state held since the previous access. This
//! keeps the simulated sensor, switch and relay consistent no matter how
//! irregularly the control activities run.
//!
//! [`SteppedSimulation`] drives the whole control stack on a
//! [`ManualClock`], which makes runs deterministic.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use oc_controls::{ControlConfig, FaultCode, RunState};
use oc_core::{Clock, ManualClock, Millis, Real};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::hardware::{
    DigitalInput, DigitalOutput, Hardware, Relay, RunSwitch, SensorReading, TemperatureSensor,
};
use crate::state::SharedControl;

/// Physical parameters of the simulated oven.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OvenParams {
    /// Ambient temperature (°C)
    pub ambient_c: Real,
    /// Temperature at start (°C)
    pub initial_c: Real,
    /// Heater power when the relay is on (W)
    pub heater_w: Real,
    /// Conductance to ambient (W/°C)
    pub loss_w_per_c: Real,
    /// Lumped heat capacity (J/°C), must be positive
    pub heat_capacity_j_per_c: Real,
}

impl Default for OvenParams {
    fn default() -> Self {
        Self {
            ambient_c: 22.0,
            initial_c: 22.0,
            heater_w: 1500.0,
            loss_w_per_c: 5.0,
            heat_capacity_j_per_c: 4000.0,
        }
    }
}

impl OvenParams {
    /// # Errors
    ///
    /// Returns [`AppError::InvalidConfig`] if any value is non-finite, the
    /// heat capacity is not positive, or the heater power or conductance is
    /// negative.
    pub fn validate(&self) -> AppResult<()> {
        let all_finite = [
            self.ambient_c,
            self.initial_c,
            self.heater_w,
            self.loss_w_per_c,
            self.heat_capacity_j_per_c,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !all_finite {
            return Err(AppError::InvalidConfig(
                "oven parameters must be finite".to_string(),
            ));
        }
        if self.heat_capacity_j_per_c <= 0.0 {
            return Err(AppError::InvalidConfig(
                "oven heat capacity must be positive".to_string(),
            ));
        }
        if self.heater_w < 0.0 || self.loss_w_per_c < 0.0 {
            return Err(AppError::InvalidConfig(
                "oven heater power and loss must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Temperature the oven settles at with the heater permanently on or off.
    pub fn equilibrium_c(&self, heater_on: bool) -> Real {
        let power = if heater_on { self.heater_w } else { 0.0 };
        if self.loss_w_per_c > 0.0 {
            self.ambient_c + power / self.loss_w_per_c
        } else {
            Real::INFINITY
        }
    }

    /// Temperature after `dt_s` seconds starting at `temp_c` with a constant
    /// heater state.
    pub fn evolve(&self, temp_c: Real, heater_on: bool, dt_s: Real) -> Real {
        if dt_s <= 0.0 {
            return temp_c;
        }
        let power = if heater_on { self.heater_w } else { 0.0 };
        if self.loss_w_per_c > 0.0 {
            let t_eq = self.equilibrium_c(heater_on);
            let tau_s = self.heat_capacity_j_per_c / self.loss_w_per_c;
            t_eq + (temp_c - t_eq) * (-dt_s / tau_s).exp()
        } else {
            temp_c + power * dt_s / self.heat_capacity_j_per_c
        }
    }
}

#[derive(Debug)]
struct OvenModel {
    params: OvenParams,
    temp_c: Real,
    heater_on: bool,
    updated_ms: Millis,
    sensor_fault: Option<FaultCode>,
    switch_high: bool,
}

impl OvenModel {
    fn advance_to(&mut self, now_ms: Millis) {
        if now_ms <= self.updated_ms {
            return;
        }
        let dt_s = (now_ms - self.updated_ms) as Real / 1000.0;
        self.temp_c = self.params.evolve(self.temp_c, self.heater_on, dt_s);
        self.updated_ms = now_ms;
    }
}

/// Shared handle on the simulated plant. Clones refer to the same oven.
#[derive(Clone)]
pub struct SimulatedOven {
    model: Arc<Mutex<OvenModel>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SimulatedOven {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedOven")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl SimulatedOven {
    /// Create an oven at `params.initial_c` with the heater off and the
    /// switch pin low.
    pub fn new(params: OvenParams, clock: Arc<dyn Clock>) -> AppResult<Self> {
        params.validate()?;
        let model = OvenModel {
            params,
            temp_c: params.initial_c,
            heater_on: false,
            updated_ms: clock.now_ms(),
            sensor_fault: None,
            switch_high: false,
        };
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            clock,
        })
    }

    /// Lock the model and bring it up to the current time.
    fn model(&self) -> MutexGuard<'_, OvenModel> {
        let now = self.clock.now_ms();
        let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        model.advance_to(now);
        model
    }

    pub fn temperature_c(&self) -> Real {
        self.model().temp_c
    }

    pub fn heater_on(&self) -> bool {
        self.model().heater_on
    }

    fn set_heater(&self, on: bool) {
        self.model().heater_on = on;
    }

    /// Make the thermocouple report `fault` until cleared with `None`.
    pub fn inject_sensor_fault(&self, fault: Option<FaultCode>) {
        self.model().sensor_fault = fault;
    }

    /// Drive the run switch pin.
    pub fn set_switch_high(&self, high: bool) {
        self.model().switch_high = high;
    }

    pub fn sensor(&self) -> SimSensor {
        SimSensor { oven: self.clone() }
    }

    pub fn switch_pin(&self) -> SimSwitchPin {
        SimSwitchPin { oven: self.clone() }
    }

    /// Heater output pin. `active_high` describes how the simulated SSR is
    /// wired.
    pub fn heater_pin(&self, active_high: bool) -> SimHeaterPin {
        SimHeaterPin {
            oven: self.clone(),
            active_high,
        }
    }

    /// Hardware set wired with the polarities from `config`, with the switch
    /// pin driven to its enabled level.
    pub fn hardware(
        &self,
        config: &ControlConfig,
    ) -> Hardware<SimSensor, SimSwitchPin, SimHeaterPin> {
        self.set_switch_high(config.switch_active_high);
        Hardware {
            sensor: self.sensor(),
            switch: RunSwitch::new(self.switch_pin(), config.switch_active_high),
            relay: Relay::new(self.heater_pin(config.ssr_active_high), config.ssr_active_high),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimSensor {
    oven: SimulatedOven,
}

impl TemperatureSensor for SimSensor {
    fn read(&mut self) -> SensorReading {
        let model = self.oven.model();
        match model.sensor_fault {
            Some(code) => SensorReading::failed(code),
            None => SensorReading::ok(model.temp_c),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimSwitchPin {
    oven: SimulatedOven,
}

impl DigitalInput for SimSwitchPin {
    fn is_high(&mut self) -> bool {
        self.oven.model().switch_high
    }
}

#[derive(Debug, Clone)]
pub struct SimHeaterPin {
    oven: SimulatedOven,
    active_high: bool,
}

impl DigitalOutput for SimHeaterPin {
    fn set_high(&mut self, high: bool) {
        self.oven.set_heater(high == self.active_high);
    }
}

/// One row of a stepped simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimRecord {
    pub t_ms: Millis,
    pub oven_c: Real,
    pub measured_c: Option<Real>,
    pub setpoint_c: Option<Real>,
    pub duty: Real,
    pub relay_on: bool,
    pub state: RunState,
}

/// Deterministic closed-loop simulation on a manual clock.
///
/// Each step advances the clock by `step_ms`, then runs one sampling pass
/// and one control pass, exactly as the threaded runtime would.
#[derive(Debug)]
pub struct SteppedSimulation {
    clock: Arc<ManualClock>,
    shared: Arc<SharedControl>,
    oven: SimulatedOven,
    hardware: Hardware<SimSensor, SimSwitchPin, SimHeaterPin>,
    switch_active_high: bool,
    step_ms: Millis,
}

impl SteppedSimulation {
    /// Build the control state, oven and hardware from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if `step_ms` is zero or any part of `config` is
    /// rejected.
    pub fn new(config: &AppConfig, step_ms: Millis) -> AppResult<Self> {
        if step_ms == 0 {
            return Err(AppError::InvalidConfig(
                "simulation step must be greater than zero".to_string(),
            ));
        }
        let clock = Arc::new(ManualClock::new(0));
        let shared = Arc::new(SharedControl::from_app_config(config, clock.clone())?);
        let oven = SimulatedOven::new(config.oven, clock.clone())?;
        let hardware = oven.hardware(&config.control);
        Ok(Self {
            clock,
            shared,
            oven,
            hardware,
            switch_active_high: config.control.switch_active_high,
            step_ms,
        })
    }

    pub fn shared(&self) -> &Arc<SharedControl> {
        &self.shared
    }

    pub fn oven(&self) -> &SimulatedOven {
        &self.oven
    }

    pub fn now_ms(&self) -> Millis {
        self.clock.now_ms()
    }

    /// Flip the safety switch, honouring the configured polarity.
    pub fn set_switch_enabled(&self, enabled: bool) {
        self.oven.set_switch_high(enabled == self.switch_active_high);
    }

    /// Sample and tick at the current time without advancing the clock.
    pub fn tick(&mut self) -> SimRecord {
        self.shared.publish_reading(self.hardware.sensor.read());
        let enabled = self.hardware.switch.is_enabled();
        let relay_on = self.shared.control_tick(enabled);
        self.hardware.relay.set(relay_on);

        let status = self.shared.get_status();
        SimRecord {
            t_ms: self.clock.now_ms(),
            oven_c: self.oven.temperature_c(),
            measured_c: status.t_meas_c,
            setpoint_c: status.t_set_c,
            duty: status.duty,
            relay_on: status.relay_on,
            state: status.state,
        }
    }

    /// Advance one step and tick.
    pub fn step(&mut self) -> SimRecord {
        self.clock.advance(self.step_ms);
        self.tick()
    }

    /// Step until `duration_ms` has elapsed, collecting every record.
    pub fn run_for(&mut self, duration_ms: Millis) -> Vec<SimRecord> {
        let end = self.clock.now_ms().saturating_add(duration_ms);
        let mut records = Vec::new();
        while self.clock.now_ms() < end {
            records.push(self.step());
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oven() -> (Arc<ManualClock>, SimulatedOven) {
        let clock = Arc::new(ManualClock::new(0));
        let oven = SimulatedOven::new(OvenParams::default(), clock.clone()).unwrap();
        (clock, oven)
    }

    #[test]
    fn rejects_bad_params() {
        let clock = Arc::new(ManualClock::new(0));
        let params = OvenParams {
            heat_capacity_j_per_c: 0.0,
            ..Default::default()
        };
        assert!(SimulatedOven::new(params, clock).is_err());
    }

    #[test]
    fn idle_oven_stays_at_ambient() {
        let (clock, oven) = oven();
        clock.advance(60_000);
        assert!((oven.temperature_c() - 22.0).abs() < 1e-9);
    }

    #[test]
    fn heater_warms_towards_equilibrium() {
        let (clock, oven) = oven();
        let mut pin = oven.heater_pin(true);
        pin.set_high(true);
        let params = OvenParams::default();
        clock.advance(10_000);
        let t1 = oven.temperature_c();
        assert!(t1 > 22.0);
        assert!((t1 - params.evolve(22.0, true, 10.0)).abs() < 1e-9);

        // Ten thousand seconds is 12.5 time constants.
        clock.advance(10_000_000);
        let t2 = oven.temperature_c();
        assert!((t2 - params.evolve(t1, true, 10_000.0)).abs() < 1e-9);
        let t_eq = params.equilibrium_c(true);
        assert!(t2 < t_eq);
        assert!(t_eq - t2 < 0.01);
    }

    #[test]
    fn exact_integration_matches_piecewise() {
        let params = OvenParams::default();
        let whole = params.evolve(22.0, true, 20.0);
        let halves = params.evolve(params.evolve(22.0, true, 10.0), true, 10.0);
        assert!((whole - halves).abs() < 1e-9);
    }

    #[test]
    fn active_low_heater_wiring() {
        let (_, oven) = oven();
        let mut pin = oven.heater_pin(false);
        pin.set_high(false);
        assert!(oven.heater_on());
        pin.set_high(true);
        assert!(!oven.heater_on());
    }

    #[test]
    fn injected_fault_reaches_sensor() {
        let (_, oven) = oven();
        let mut sensor = oven.sensor();
        oven.inject_sensor_fault(Some(2));
        assert_eq!(sensor.read().valid_temp(), None);
        oven.inject_sensor_fault(None);
        assert_eq!(sensor.read().valid_temp(), Some(22.0));
    }

    #[test]
    fn stepped_simulation_heats_when_running() {
        let mut sim = SteppedSimulation::new(&AppConfig::default(), 100).unwrap();
        sim.tick();
        assert!(sim.shared().try_start_run());
        let records = sim.run_for(30_000);
        assert_eq!(records.len(), 300);
        assert!(records.iter().all(|r| r.state == RunState::Running));
        let last = records.last().unwrap();
        assert!(last.oven_c > 22.0);
        assert_eq!(last.setpoint_c, Some(100.0));
    }

    #[test]
    fn zero_step_is_rejected() {
        assert!(SteppedSimulation::new(&AppConfig::default(), 0).is_err());
    }
}
