//! Profile table, active-run tracking and setpoint interpolation.

use oc_core::{Millis, Real};
use tracing::{debug, info};

use crate::error::{ProfileError, ProfileResult};
use crate::profile::{EndBehavior, Profile, ProfilePoint, ProfileSummary, TempLimits};

/// Maximum number of profiles held at once.
pub const MAX_PROFILES: usize = 8;

/// Result of querying the engine for the current setpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileSetpoint {
    /// A profile run is armed.
    pub active: bool,
    /// The run is past its last point.
    pub completed: bool,
    /// End behavior of the armed profile (`HoldLast` when inactive).
    pub end_behavior: EndBehavior,
    /// Setpoint in °C, `None` when inactive.
    pub setpoint_c: Option<Real>,
}

impl ProfileSetpoint {
    pub const INACTIVE: Self = Self {
        active: false,
        completed: false,
        end_behavior: EndBehavior::HoldLast,
        setpoint_c: None,
    };

    /// The run has finished and asked for the controller to idle.
    pub fn requests_stop(&self) -> bool {
        self.active && self.completed && self.end_behavior == EndBehavior::Stop
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ActiveRun {
    name: String,
    started_ms: Millis,
}

/// Capacity-bounded profile table with at most one armed run.
#[derive(Debug, Clone, Default)]
pub struct ProfileEngine {
    profiles: Vec<Profile>,
    active: Option<ActiveRun>,
    limits: TempLimits,
}

impl ProfileEngine {
    pub fn new(limits: TempLimits) -> Self {
        Self {
            profiles: Vec::with_capacity(MAX_PROFILES),
            active: None,
            limits,
        }
    }

    /// Change the allowed point temperature range. Stored profiles are not
    /// re-validated; the range only applies to later writes.
    pub fn set_temp_limits(&mut self, min_c: Real, max_c: Real) {
        self.limits = TempLimits { min_c, max_c };
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.profiles.iter().position(|p| p.name == name)
    }

    /// Insert a new profile or replace the one with the same name.
    pub fn add_or_update(&mut self, profile: Profile) -> ProfileResult<()> {
        profile.validate(&self.limits)?;
        match self.position(&profile.name) {
            Some(index) => {
                debug!(name = %profile.name, "replacing profile");
                self.profiles[index] = profile;
            }
            None => {
                if self.profiles.len() >= MAX_PROFILES {
                    return Err(ProfileError::ProfilesFull {
                        capacity: MAX_PROFILES,
                    });
                }
                debug!(name = %profile.name, points = profile.points.len(), "adding profile");
                self.profiles.push(profile);
            }
        }
        Ok(())
    }

    /// Remove a profile. Deleting the armed profile disarms the run.
    pub fn delete(&mut self, name: &str) -> bool {
        let Some(index) = self.position(name) else {
            return false;
        };
        self.profiles.remove(index);
        if self.active.as_ref().is_some_and(|run| run.name == name) {
            info!(name, "armed profile deleted, clearing run");
            self.active = None;
        }
        debug!(name, "deleted profile");
        true
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn list(&self) -> Vec<ProfileSummary> {
        self.profiles.iter().map(Profile::summary).collect()
    }

    /// Arm `name` with `now_ms` as its start time.
    pub fn start(&mut self, name: &str, now_ms: Millis) -> bool {
        if self.position(name).is_none() {
            return false;
        }
        info!(name, "profile run armed");
        self.active = Some(ActiveRun {
            name: name.to_string(),
            started_ms: now_ms,
        });
        true
    }

    pub fn clear_active(&mut self) {
        if let Some(run) = self.active.take() {
            debug!(name = %run.name, "profile run cleared");
        }
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_ref().map(|run| run.name.as_str())
    }

    /// Setpoint of the armed run at `now_ms`.
    pub fn setpoint_at(&self, now_ms: Millis) -> ProfileSetpoint {
        let Some(run) = &self.active else {
            return ProfileSetpoint::INACTIVE;
        };
        let Some(profile) = self.get(&run.name) else {
            return ProfileSetpoint::INACTIVE;
        };

        let elapsed_s = now_ms.saturating_sub(run.started_ms) as Real / 1000.0;
        let (setpoint_c, completed) = sample(&profile.points, elapsed_s);
        ProfileSetpoint {
            active: true,
            completed,
            end_behavior: profile.end_behavior,
            setpoint_c: Some(setpoint_c),
        }
    }
}

/// Piecewise-linear sample of `points` at `t` seconds. Returns the value and
/// whether `t` is past the final point.
fn sample(points: &[ProfilePoint], t: Real) -> (Real, bool) {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return (Real::NAN, true);
    };
    if t <= Real::from(first.t_sec) {
        return (first.temp_c, false);
    }
    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if t <= Real::from(b.t_sec) {
            return (interpolate(a, b, t), false);
        }
    }
    (last.temp_c, true)
}

fn interpolate(a: ProfilePoint, b: ProfilePoint, t: Real) -> Real {
    let (t0, t1) = (Real::from(a.t_sec), Real::from(b.t_sec));
    if t1 == t0 || t >= t1 {
        return b.temp_c;
    }
    if t <= t0 {
        return a.temp_c;
    }
    a.temp_c + (b.temp_c - a.temp_c) * (t - t0) / (t1 - t0)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn points_strategy() -> impl Strategy<Value = Vec<ProfilePoint>> {
        prop::collection::vec((1u32..600, -50.0_f64..250.0), 2..12).prop_map(|steps| {
            let mut t = 0u32;
            steps
                .into_iter()
                .map(|(dt, temp_c)| {
                    t += dt;
                    ProfilePoint { t_sec: t, temp_c }
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn knots_are_exact(points in points_strategy()) {
            for p in &points {
                let (v, completed) = sample(&points, Real::from(p.t_sec));
                prop_assert_eq!(v, p.temp_c);
                prop_assert!(!completed);
            }
        }

        #[test]
        fn value_stays_within_segment_bounds(points in points_strategy(), frac in 0.0_f64..1.0) {
            let t0 = Real::from(points[0].t_sec);
            let t1 = Real::from(points[points.len() - 1].t_sec);
            let t = t0 + (t1 - t0) * frac;
            let (v, _) = sample(&points, t);
            let lo = points.iter().map(|p| p.temp_c).fold(Real::INFINITY, Real::min);
            let hi = points.iter().map(|p| p.temp_c).fold(Real::NEG_INFINITY, Real::max);
            prop_assert!(v >= lo - 1e-9 && v <= hi + 1e-9);
        }
    }
}
