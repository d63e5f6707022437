//! Periodic sampling and control activities on dedicated threads.
//!
//! The sampling thread owns the sensor and only touches the shared state to
//! publish a reading, so a slow or stuck sensor never holds the lock. The
//! control thread owns the run switch and relay: it reads the switch, runs
//! one locked tick, then drives the relay after the lock is released.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::TimingConfig;
use crate::error::{AppError, AppResult};
use crate::hardware::{DigitalInput, DigitalOutput, Hardware, TemperatureSensor};
use crate::state::SharedControl;

/// Extra time granted to the sampler on shutdown, on top of two sample
/// periods, before it is detached.
const SAMPLER_JOIN_SLACK: Duration = Duration::from_millis(500);

/// Fixed-rate pacing: sleeps until the next deadline, and skips missed
/// deadlines instead of bursting to catch up.
#[derive(Debug)]
struct Pacer {
    period: Duration,
    next: Instant,
}

impl Pacer {
    fn new(period_ms: u32) -> Self {
        Self {
            period: Duration::from_millis(u64::from(period_ms)),
            next: Instant::now(),
        }
    }

    fn wait(&mut self) {
        self.next += self.period;
        let now = Instant::now();
        if self.next < now {
            self.next = now;
        }
        thread::sleep(self.next.saturating_duration_since(now));
    }
}

/// Rate-limited status line.
#[derive(Debug)]
struct StatusLog {
    every: Duration,
    last: Option<Instant>,
}

impl StatusLog {
    fn new(every_ms: u32) -> Self {
        Self {
            every: Duration::from_millis(u64::from(every_ms)),
            last: None,
        }
    }

    fn maybe_log(&mut self, shared: &SharedControl) {
        if self.every.is_zero() {
            return;
        }
        let now = Instant::now();
        if self.last.is_some_and(|t| now.duration_since(t) < self.every) {
            return;
        }
        self.last = Some(now);
        let s = shared.get_status();
        info!(
            state = %s.state,
            t_meas_c = ?s.t_meas_c,
            t_smoothed_c = ?s.t_smoothed_c,
            t_set_c = ?s.t_set_c,
            duty = s.duty,
            relay_on = s.relay_on,
            fault = s.last_fault,
            profile = s.active_profile.as_deref(),
            "status"
        );
    }
}

/// Builder for the periodic activities.
#[derive(Debug)]
pub struct Runtime {
    shared: Arc<SharedControl>,
    timing: TimingConfig,
}

impl Runtime {
    pub fn new(shared: Arc<SharedControl>, timing: TimingConfig) -> AppResult<Self> {
        timing.validate()?;
        Ok(Self { shared, timing })
    }

    /// Start the sampling and control threads.
    ///
    /// Switch and relay polarity are fixed by `hardware` for the lifetime of
    /// the threads.
    pub fn spawn<S, I, O>(self, hardware: Hardware<S, I, O>) -> AppResult<RuntimeHandle>
    where
        S: TemperatureSensor + 'static,
        I: DigitalInput + 'static,
        O: DigitalOutput + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let Hardware {
            mut sensor,
            mut switch,
            mut relay,
        } = hardware;

        let sampler = {
            let shared = Arc::clone(&self.shared);
            let sampler_stop = Arc::clone(&stop);
            let period_ms = self.timing.sample_period_ms;
            thread::Builder::new()
                .name("sampler".to_string())
                .spawn(move || {
                    let mut pacer = Pacer::new(period_ms);
                    while !sampler_stop.load(Ordering::Acquire) {
                        let reading = sensor.read();
                        shared.publish_reading(reading);
                        pacer.wait();
                    }
                    debug!("sampler stopped");
                })?
        };

        let control = {
            let shared = Arc::clone(&self.shared);
            let control_stop = Arc::clone(&stop);
            let timing = self.timing;
            let spawned = thread::Builder::new()
                .name("control".to_string())
                .spawn(move || {
                    let mut pacer = Pacer::new(timing.control_period_ms);
                    let mut status = StatusLog::new(timing.status_log_ms);
                    while !control_stop.load(Ordering::Acquire) {
                        let enabled = switch.is_enabled();
                        let relay_on = shared.control_tick(enabled);
                        relay.set(relay_on);
                        status.maybe_log(&shared);
                        pacer.wait();
                    }
                    relay.off();
                    debug!("control stopped, relay off");
                });
            match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    stop.store(true, Ordering::Release);
                    let _ = sampler.join();
                    return Err(e.into());
                }
            }
        };

        info!(
            sample_period_ms = self.timing.sample_period_ms,
            control_period_ms = self.timing.control_period_ms,
            "runtime started"
        );
        Ok(RuntimeHandle {
            stop,
            sampler: Some(sampler),
            control: Some(control),
            sampler_grace: Duration::from_millis(2 * u64::from(self.timing.sample_period_ms))
                + SAMPLER_JOIN_SLACK,
        })
    }
}

fn join_named(handle: JoinHandle<()>) -> AppResult<()> {
    let name = handle.thread().name().unwrap_or("unnamed").to_string();
    handle
        .join()
        .map_err(|_| AppError::ThreadPanicked { name })
}

/// Running activities. Dropping the handle signals the threads to stop
/// without waiting for them; [`shutdown`](Self::shutdown) also joins them.
#[derive(Debug)]
pub struct RuntimeHandle {
    stop: Arc<AtomicBool>,
    sampler: Option<JoinHandle<()>>,
    control: Option<JoinHandle<()>>,
    sampler_grace: Duration,
}

impl RuntimeHandle {
    /// Stop both activities. The control thread is always joined, and it
    /// drives the relay off on its way out. The sampler may be blocked
    /// inside a sensor read; it is joined if it exits within a grace period
    /// and detached otherwise.
    pub fn shutdown(mut self) -> AppResult<()> {
        self.stop.store(true, Ordering::Release);

        let mut result = match self.control.take() {
            Some(control) => join_named(control),
            None => Ok(()),
        };

        if let Some(sampler) = self.sampler.take() {
            let deadline = Instant::now() + self.sampler_grace;
            while !sampler.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if sampler.is_finished() {
                let joined = join_named(sampler);
                if result.is_ok() {
                    result = joined;
                }
            } else {
                warn!(
                    grace_ms = self.sampler_grace.as_millis() as u64,
                    "sampler still blocked in a sensor read, detaching"
                );
            }
        }

        info!("runtime stopped");
        result
    }
}

impl Drop for RuntimeHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}
