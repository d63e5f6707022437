//! Hardware collaborators: thermocouple driver, run switch and relay pins.

use oc_controls::{FAULT_NONE, FAULT_READING_UNAVAILABLE, FaultCode};
use oc_core::Real;

/// One reading from the thermocouple driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub temp_c: Real,
    /// Driver fault code, `0` when the driver reports no fault.
    pub fault: FaultCode,
}

impl SensorReading {
    pub fn ok(temp_c: Real) -> Self {
        Self {
            temp_c,
            fault: FAULT_NONE,
        }
    }

    pub fn failed(fault: FaultCode) -> Self {
        Self {
            temp_c: Real::NAN,
            fault,
        }
    }

    /// The temperature, if this reading is usable.
    pub fn valid_temp(&self) -> Option<Real> {
        (self.fault == FAULT_NONE && self.temp_c.is_finite()).then_some(self.temp_c)
    }

    /// Fault code to report for an unusable reading.
    pub fn fault_code(&self) -> FaultCode {
        if self.fault != FAULT_NONE {
            self.fault
        } else {
            FAULT_READING_UNAVAILABLE
        }
    }
}

pub trait TemperatureSensor: Send {
    fn read(&mut self) -> SensorReading;
}

pub trait DigitalInput: Send {
    /// `true` when the pin reads high.
    fn is_high(&mut self) -> bool;
}

pub trait DigitalOutput: Send {
    fn set_high(&mut self, high: bool);
}

/// Safety switch input with configurable polarity.
#[derive(Debug)]
pub struct RunSwitch<I> {
    pin: I,
    active_high: bool,
}

impl<I: DigitalInput> RunSwitch<I> {
    pub fn new(pin: I, active_high: bool) -> Self {
        Self { pin, active_high }
    }

    pub fn is_enabled(&mut self) -> bool {
        self.pin.is_high() == self.active_high
    }
}

/// Solid-state relay output with configurable polarity.
#[derive(Debug)]
pub struct Relay<O> {
    pin: O,
    active_high: bool,
}

impl<O: DigitalOutput> Relay<O> {
    pub fn new(pin: O, active_high: bool) -> Self {
        Self { pin, active_high }
    }

    pub fn set(&mut self, on: bool) {
        self.pin.set_high(on == self.active_high);
    }

    pub fn off(&mut self) {
        self.set(false);
    }
}

/// Everything the runtime drives.
#[derive(Debug)]
pub struct Hardware<S, I, O> {
    pub sensor: S,
    pub switch: RunSwitch<I>,
    pub relay: Relay<O>,
}
