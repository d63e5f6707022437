//! Moving-average smoothing of raw temperature readings.
//!
//! The buffer holds at most `MAX_SMOOTH_WINDOW` readings. The window actually
//! applied is recomputed from the configured size on every push and read, so
//! changing the configuration never requires rebuilding history: shrinking
//! drops the oldest readings, growing lets history accumulate again.

use std::collections::VecDeque;

use oc_core::Real;

use crate::config::MAX_SMOOTH_WINDOW;

#[derive(Debug, Clone)]
pub struct SampleSmoother {
    samples: VecDeque<Real>,
    latest: Option<Real>,
}

impl Default for SampleSmoother {
    fn default() -> Self {
        Self::new()
    }
}

fn effective(configured: usize) -> usize {
    configured.min(usize::from(MAX_SMOOTH_WINDOW))
}

impl SampleSmoother {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(usize::from(MAX_SMOOTH_WINDOW)),
            latest: None,
        }
    }

    /// Record a valid raw reading. The reading always becomes the latest
    /// value; it only enters the averaging buffer when the window is
    /// nonzero.
    pub fn push(&mut self, reading: Real, configured_window: usize) {
        self.latest = Some(reading);
        let window = effective(configured_window);
        if window == 0 {
            return;
        }
        while self.samples.len() >= window {
            self.samples.pop_front();
        }
        self.samples.push_back(reading);
    }

    /// Forget the latest raw value after a failed reading. Buffered history
    /// is kept.
    pub fn mark_unavailable(&mut self) {
        self.latest = None;
    }

    pub fn latest(&self) -> Option<Real> {
        self.latest
    }

    /// Number of buffered readings that count toward the average.
    pub fn valid_count(&self, configured_window: usize) -> usize {
        self.samples.len().min(effective(configured_window))
    }

    /// Mean of the buffered readings, or the latest raw value when smoothing
    /// is disabled or nothing is buffered yet.
    pub fn smoothed(&self, configured_window: usize) -> Option<Real> {
        let window = effective(configured_window);
        let count = self.valid_count(configured_window);
        if window <= 1 || count == 0 {
            return self.latest;
        }
        let sum: Real = self.samples.iter().rev().take(count).sum();
        Some(sum / count as Real)
    }
}
