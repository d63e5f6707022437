//! Control core for ovenctl.
//!
//! This crate holds the pieces that turn temperature samples into relay
//! pulses:
//! - [`SampleSmoother`]: bounded moving average over raw readings
//! - [`RunStateMachine`]: idle / running / switch-disabled / fault, with a
//!   latching fault
//! - [`ControlLoop`]: per-tick proportional law with over-temperature and
//!   sensor checks
//! - [`DutyCycleModulator`]: time-proportional relay output with minimum
//!   on/off guard times
//!
//! # Design Principles
//!
//! - **Fail safe**: every fault path ends in zero duty and a latched `Fault`
//! - **No hidden time**: all time-dependent pieces take `now_ms` explicitly
//! - **No locking here**: components are plain values; the application layer
//!   owns them behind a single lock

pub mod config;
pub mod control_loop;
pub mod error;
pub mod law;
pub mod modulator;
pub mod run_state;
pub mod smoother;
pub mod status;

pub use config::{ControlConfig, MAX_SMOOTH_WINDOW};
pub use control_loop::{ControlLoop, TickInput, TickOutput};
pub use error::{ControlError, ControlResult};
pub use law::ProportionalLaw;
pub use modulator::{DutyCycleModulator, on_time_ms};
pub use run_state::RunStateMachine;
pub use smoother::SampleSmoother;
pub use status::{
    ControlStatus, FAULT_NONE, FAULT_OVER_TEMPERATURE, FAULT_READING_UNAVAILABLE,
    FAULT_SAMPLE_STALE, FaultCode, RunState,
};
