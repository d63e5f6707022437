//! Application layer for ovenctl.
//!
//! Ties the control crates to hardware: the shared control state and its
//! operator entry points, the periodic runtime threads, configuration file
//! loading and a simulated oven for the CLI and tests.

pub mod config;
pub mod error;
pub mod hardware;
pub mod runtime;
pub mod sim;
pub mod state;

// Re-export key types for convenience
pub use config::{AppConfig, TimingConfig, load_config, load_profile};
pub use error::{AppError, AppResult};
pub use hardware::{
    DigitalInput, DigitalOutput, Hardware, Relay, RunSwitch, SensorReading, TemperatureSensor,
};
pub use runtime::{Runtime, RuntimeHandle};
pub use sim::{OvenParams, SimRecord, SimulatedOven, SteppedSimulation};
pub use state::{PROFILE_MIN_C, SharedControl, profile_limits};
