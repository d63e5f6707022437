//! The shared control state and its entry points.
//!
//! All mutable control data lives in one aggregate behind a single mutex.
//! Each public method is one critical section, so the sampling activity, the
//! control activity and operator commands never observe each other half-way.
//! Pin I/O never happens here: callers read the switch before
//! [`SharedControl::control_tick`] and drive the relay with its result.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use oc_controls::{
    ControlConfig, ControlLoop, ControlStatus, DutyCycleModulator, FAULT_NONE, FaultCode,
    RunState, RunStateMachine, SampleSmoother, TickInput,
};
use oc_core::{Clock, Millis, Real};
use oc_profile::{Profile, ProfileEngine, ProfileSummary, TempLimits};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::hardware::SensorReading;

/// Lowest temperature a profile point may request.
pub const PROFILE_MIN_C: Real = -100.0;

/// Profile limits implied by a control configuration.
pub fn profile_limits(config: &ControlConfig) -> TempLimits {
    TempLimits {
        min_c: PROFILE_MIN_C,
        max_c: config.tmax_c,
    }
}

#[derive(Debug)]
struct ControlData {
    config: ControlConfig,
    control: ControlLoop,
    machine: RunStateMachine,
    smoother: SampleSmoother,
    modulator: DutyCycleModulator,
    profiles: ProfileEngine,
    setpoint_c: Option<Real>,
    duty: Real,
    last_fault: FaultCode,
    relay_on: bool,
    last_sample_ms: Option<Millis>,
}

impl ControlData {
    fn status(&self) -> ControlStatus {
        ControlStatus {
            t_meas_c: self.smoother.latest(),
            t_smoothed_c: self.smoother.smoothed(self.config.effective_smooth_window()),
            t_set_c: self.setpoint_c,
            duty: self.duty,
            last_fault: self.last_fault,
            state: self.machine.state(),
            run_switch_enabled: self.machine.switch_enabled(),
            relay_on: self.relay_on,
            active_profile: self.profiles.active_name().map(str::to_owned),
        }
    }

    fn force_off(&mut self) {
        self.duty = 0.0;
        self.relay_on = false;
    }
}

/// Thread-safe handle on the control state.
pub struct SharedControl {
    data: Mutex<ControlData>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SharedControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedControl")
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

impl SharedControl {
    /// Create the state with a validated configuration.
    pub fn new(config: ControlConfig, clock: Arc<dyn Clock>) -> AppResult<Self> {
        let control = ControlLoop::from_config(&config)?;
        let now = clock.now_ms();
        let data = ControlData {
            profiles: ProfileEngine::new(profile_limits(&config)),
            config,
            control,
            machine: RunStateMachine::new(),
            smoother: SampleSmoother::new(),
            modulator: DutyCycleModulator::new(now),
            setpoint_c: None,
            duty: 0.0,
            last_fault: FAULT_NONE,
            relay_on: false,
            last_sample_ms: None,
        };
        Ok(Self {
            data: Mutex::new(data),
            clock,
        })
    }

    /// Create the state from a configuration file's contents, preloading its
    /// profiles.
    pub fn from_app_config(config: &AppConfig, clock: Arc<dyn Clock>) -> AppResult<Self> {
        let shared = Self::new(config.control.clone(), clock)?;
        for profile in &config.profiles {
            shared.add_or_update_profile(profile.clone())?;
        }
        Ok(shared)
    }

    /// Every method leaves the aggregate consistent, so a panic elsewhere
    /// while holding the lock does not invalidate it.
    fn lock(&self) -> MutexGuard<'_, ControlData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn now_ms(&self) -> Millis {
        self.clock.now_ms()
    }

    /// Publish one sensor reading from the sampling activity.
    ///
    /// An unusable reading latches a fault from any state.
    pub fn publish_reading(&self, reading: SensorReading) {
        let now = self.clock.now_ms();
        let mut d = self.lock();
        match reading.valid_temp() {
            Some(temp_c) => {
                let window = d.config.effective_smooth_window();
                d.smoother.push(temp_c, window);
                d.last_sample_ms = Some(now);
                if !d.machine.is_faulted() {
                    d.last_fault = FAULT_NONE;
                }
            }
            None => {
                let code = reading.fault_code();
                d.smoother.mark_unavailable();
                d.last_fault = code;
                if d.machine.enter_fault("sensor fault") {
                    warn!(fault = code, "sensor reading unavailable");
                }
                d.force_off();
            }
        }
    }

    /// Run one control tick and return whether the relay should be on.
    ///
    /// The switch level must be read by the caller beforehand; the relay is
    /// driven by the caller afterwards.
    pub fn control_tick(&self, switch_enabled: bool) -> bool {
        let now = self.clock.now_ms();
        let mut guard = self.lock();
        let d = &mut *guard;

        let was_running = d.machine.is_running();
        d.machine.observe_switch(switch_enabled);

        let input = TickInput {
            smoothed_c: d.smoother.smoothed(d.config.effective_smooth_window()),
            sample_age_ms: d.last_sample_ms.map(|t| now.saturating_sub(t)),
            profile: d.profiles.setpoint_at(now),
        };
        let out = d.control.update(&mut d.machine, &input);

        d.duty = out.duty;
        if let Some(sp) = out.setpoint_c {
            d.setpoint_c = Some(sp);
        }
        if let Some(code) = out.fault {
            warn!(fault = code, "control fault");
            d.last_fault = code;
        }
        // Only a run that this tick ended disarms its profile; an armed
        // profile whose time ran out before any run started stays armed.
        if was_running && input.profile.requests_stop() && d.machine.state() == RunState::Idle {
            d.profiles.clear_active();
        }

        d.relay_on = d
            .modulator
            .update(now, d.machine.is_running(), d.duty, &d.config);
        d.relay_on
    }

    /// Snapshot of the current status.
    pub fn get_status(&self) -> ControlStatus {
        self.lock().status()
    }

    /// Start a run. Fails if the switch is disabled or a fault is latched.
    pub fn try_start_run(&self) -> bool {
        let mut d = self.lock();
        let started = d.machine.try_start();
        if started {
            info!(profile = d.profiles.active_name(), "run started");
        } else {
            debug!(state = %d.machine.state(), "start refused");
        }
        started
    }

    /// Stop any run and clear a latched fault.
    pub fn stop_run(&self) {
        let mut d = self.lock();
        d.machine.stop();
        d.force_off();
        if !d.machine.is_faulted() {
            d.last_fault = FAULT_NONE;
        }
        d.profiles.clear_active();
    }

    pub fn config(&self) -> ControlConfig {
        self.lock().config.clone()
    }

    /// Validate and apply a new configuration. Profile temperature limits
    /// follow the new `tmax_c`; already stored profiles are kept.
    pub fn update_config(&self, config: ControlConfig) -> AppResult<()> {
        let control = ControlLoop::from_config(&config)?;
        let mut d = self.lock();
        let limits = profile_limits(&config);
        d.profiles.set_temp_limits(limits.min_c, limits.max_c);
        d.control = control;
        d.config = config;
        info!("configuration updated");
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<ProfileSummary> {
        self.lock().profiles.list()
    }

    pub fn get_profile(&self, name: &str) -> Option<Profile> {
        self.lock().profiles.get(name).cloned()
    }

    pub fn add_or_update_profile(&self, profile: Profile) -> AppResult<()> {
        self.lock().profiles.add_or_update(profile)?;
        Ok(())
    }

    pub fn delete_profile(&self, name: &str) -> bool {
        self.lock().profiles.delete(name)
    }

    /// Arm a profile as the setpoint source. The run itself still needs
    /// [`try_start_run`](Self::try_start_run).
    pub fn start_profile_run(&self, name: &str) -> bool {
        let now = self.clock.now_ms();
        self.lock().profiles.start(name, now)
    }

    pub fn active_profile(&self) -> Option<String> {
        self.lock().profiles.active_name().map(str::to_owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oc_controls::{FAULT_OVER_TEMPERATURE, FAULT_READING_UNAVAILABLE, FAULT_SAMPLE_STALE};
    use oc_core::ManualClock;
    use oc_profile::EndBehavior;

    fn setup(config: ControlConfig) -> (Arc<ManualClock>, SharedControl) {
        let clock = Arc::new(ManualClock::new(0));
        let shared = SharedControl::new(config, clock.clone()).unwrap();
        (clock, shared)
    }

    fn running_at(temp_c: Real) -> (Arc<ManualClock>, SharedControl) {
        let (clock, shared) = setup(ControlConfig::default());
        shared.publish_reading(SensorReading::ok(temp_c));
        shared.control_tick(true);
        assert!(shared.try_start_run());
        (clock, shared)
    }

    #[test]
    fn rejects_invalid_config() {
        let clock = Arc::new(ManualClock::new(0));
        let config = ControlConfig {
            window_ms: 0,
            ..Default::default()
        };
        assert!(SharedControl::new(config, clock).is_err());
    }

    #[test]
    fn initial_status() {
        let (_, shared) = setup(ControlConfig::default());
        let status = shared.get_status();
        assert_eq!(status.state, RunState::Idle);
        assert_eq!(status.duty, 0.0);
        assert_eq!(status.t_meas_c, None);
        assert!(!status.relay_on);
    }

    #[test]
    fn running_tick_drives_relay() {
        let (clock, shared) = running_at(50.0);
        clock.advance(100);
        shared.publish_reading(SensorReading::ok(50.0));
        assert!(shared.control_tick(true));
        let status = shared.get_status();
        assert_eq!(status.duty, 1.0);
        assert_eq!(status.t_set_c, Some(100.0));
        assert!(status.relay_on);
    }

    #[test]
    fn sensor_fault_latches_and_forces_off() {
        let (_, shared) = running_at(50.0);
        shared.publish_reading(SensorReading::failed(7));
        let status = shared.get_status();
        assert_eq!(status.state, RunState::Fault);
        assert_eq!(status.last_fault, 7);
        assert_eq!(status.duty, 0.0);
        assert!(!shared.control_tick(true));
    }

    #[test]
    fn nan_reading_reports_unavailable() {
        let (_, shared) = setup(ControlConfig::default());
        shared.publish_reading(SensorReading::ok(Real::NAN));
        let status = shared.get_status();
        assert_eq!(status.state, RunState::Fault);
        assert_eq!(status.last_fault, FAULT_READING_UNAVAILABLE);
        assert_eq!(status.t_meas_c, None);
    }

    #[test]
    fn good_sample_does_not_clear_latched_fault_code() {
        let (_, shared) = running_at(50.0);
        shared.publish_reading(SensorReading::failed(7));
        shared.publish_reading(SensorReading::ok(51.0));
        assert_eq!(shared.get_status().last_fault, 7);
        shared.stop_run();
        assert_eq!(shared.get_status().last_fault, FAULT_NONE);
    }

    #[test]
    fn over_temperature_faults() {
        let (_, shared) = running_at(50.0);
        shared.publish_reading(SensorReading::ok(305.0));
        assert!(!shared.control_tick(true));
        let status = shared.get_status();
        assert_eq!(status.state, RunState::Fault);
        assert_eq!(status.last_fault, FAULT_OVER_TEMPERATURE);
    }

    #[test]
    fn stale_samples_fault() {
        let (clock, shared) = running_at(50.0);
        clock.advance(2_500);
        shared.control_tick(true);
        let status = shared.get_status();
        assert_eq!(status.state, RunState::Fault);
        assert_eq!(status.last_fault, FAULT_SAMPLE_STALE);
    }

    #[test]
    fn stop_run_is_idempotent() {
        let (_, shared) = running_at(50.0);
        shared.control_tick(true);
        shared.stop_run();
        let first = shared.get_status();
        shared.stop_run();
        let second = shared.get_status();
        assert_eq!(first, second);
        assert_eq!(second.state, RunState::Idle);
        assert_eq!(second.duty, 0.0);
    }

    #[test]
    fn stop_clears_armed_profile() {
        let (_, shared) = setup(ControlConfig::default());
        let profile =
            Profile::new("p", EndBehavior::HoldLast, [(0, 20.0), (60, 80.0)]);
        shared.add_or_update_profile(profile).unwrap();
        assert!(shared.start_profile_run("p"));
        assert_eq!(shared.active_profile().as_deref(), Some("p"));
        shared.stop_run();
        assert_eq!(shared.active_profile(), None);
    }

    #[test]
    fn expired_stop_profile_stays_armed_until_a_run_ends() {
        let (clock, shared) = setup(ControlConfig::default());
        let profile = Profile::new("p", EndBehavior::Stop, [(0, 20.0), (60, 80.0)]);
        shared.add_or_update_profile(profile).unwrap();
        assert!(shared.start_profile_run("p"));

        clock.advance(101_000);
        shared.publish_reading(SensorReading::ok(50.0));
        assert!(!shared.control_tick(true));
        assert_eq!(shared.get_status().state, RunState::Idle);
        assert_eq!(shared.active_profile().as_deref(), Some("p"));

        assert!(shared.try_start_run());
        assert!(!shared.control_tick(true));
        assert_eq!(shared.get_status().state, RunState::Idle);
        assert_eq!(shared.active_profile(), None);
    }

    #[test]
    fn update_config_changes_fixed_setpoint() {
        let (_, shared) = running_at(50.0);
        shared
            .update_config(ControlConfig {
                setpoint_c: 60.0,
                ..Default::default()
            })
            .unwrap();
        shared.control_tick(true);
        let status = shared.get_status();
        assert_eq!(status.t_set_c, Some(60.0));
        assert!((status.duty - 0.3).abs() < 1e-12);
    }

    #[test]
    fn update_config_moves_profile_limits() {
        let (_, shared) = setup(ControlConfig::default());
        let hot = Profile::new("hot", EndBehavior::HoldLast, [(0, 20.0), (60, 250.0)]);
        shared.add_or_update_profile(hot.clone()).unwrap();

        shared
            .update_config(ControlConfig {
                tmax_c: 200.0,
                ..Default::default()
            })
            .unwrap();
        assert!(shared.add_or_update_profile(hot).is_err());
        assert_eq!(shared.config().tmax_c, 200.0);
    }

    #[test]
    fn update_config_rejects_invalid_without_applying() {
        let (_, shared) = setup(ControlConfig::default());
        let bad = ControlConfig {
            smooth_window: 50,
            ..Default::default()
        };
        assert!(shared.update_config(bad).is_err());
        assert_eq!(shared.config(), ControlConfig::default());
    }

    #[test]
    fn status_reports_raw_and_smoothed_temperature() {
        let (_, shared) = setup(ControlConfig {
            smooth_window: 4,
            ..Default::default()
        });
        for temp_c in [10.0, 20.0, 30.0, 40.0] {
            shared.publish_reading(SensorReading::ok(temp_c));
        }
        let status = shared.get_status();
        assert_eq!(status.t_meas_c, Some(40.0));
        assert_eq!(status.t_smoothed_c, Some(25.0));

        shared.publish_reading(SensorReading::failed(7));
        let status = shared.get_status();
        assert_eq!(status.state, RunState::Fault);
        assert_eq!(status.t_meas_c, None);
        assert_eq!(status.t_smoothed_c, Some(25.0));
    }
}
