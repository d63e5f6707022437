//! Profile data model and write-time validation.

use std::fmt;
use std::str::FromStr;

use oc_core::Real;
use serde::{Deserialize, Serialize};

use crate::error::{ProfileError, ProfileResult};

/// Maximum number of points a single profile may carry.
pub const MAX_POINTS: usize = 32;

/// Minimum number of points for a usable ramp.
pub const MIN_POINTS: usize = 2;

/// One knot of a temperature ramp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfilePoint {
    /// Seconds since the run was armed.
    pub t_sec: u32,
    /// Target temperature at `t_sec` (°C).
    pub temp_c: Real,
}

impl ProfilePoint {
    pub fn new(t_sec: u32, temp_c: Real) -> Self {
        Self { t_sec, temp_c }
    }
}

/// What the controller should do once the ramp's last point has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndBehavior {
    /// Keep regulating to the last point's temperature.
    #[default]
    HoldLast,
    /// Return the controller to idle.
    Stop,
}

impl EndBehavior {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HoldLast => "hold_last",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for EndBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndBehavior {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hold_last" => Ok(Self::HoldLast),
            "stop" => Ok(Self::Stop),
            other => Err(format!("unknown end behavior '{other}'")),
        }
    }
}

/// Allowed temperature range for profile points (°C, inclusive).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempLimits {
    pub min_c: Real,
    pub max_c: Real,
}

impl Default for TempLimits {
    fn default() -> Self {
        Self {
            min_c: -100.0,
            max_c: 500.0,
        }
    }
}

impl TempLimits {
    pub fn contains(&self, temp_c: Real) -> bool {
        temp_c.is_finite() && temp_c >= self.min_c && temp_c <= self.max_c
    }
}

/// A named temperature ramp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub end_behavior: EndBehavior,
    pub points: Vec<ProfilePoint>,
}

impl Profile {
    pub fn new(
        name: impl Into<String>,
        end_behavior: EndBehavior,
        points: impl IntoIterator<Item = (u32, Real)>,
    ) -> Self {
        Self {
            name: name.into(),
            end_behavior,
            points: points
                .into_iter()
                .map(|(t_sec, temp_c)| ProfilePoint { t_sec, temp_c })
                .collect(),
        }
    }

    /// Check the profile against `limits`.
    ///
    /// Checks run in a fixed order (name, point count, then each point's
    /// temperature and time in sequence) so the first reported reason is
    /// deterministic.
    pub fn validate(&self, limits: &TempLimits) -> ProfileResult<()> {
        if self.name.trim().is_empty() {
            return Err(ProfileError::NameRequired);
        }
        if self.points.len() < MIN_POINTS {
            return Err(ProfileError::PointsMin {
                min: MIN_POINTS,
                got: self.points.len(),
            });
        }
        if self.points.len() > MAX_POINTS {
            return Err(ProfileError::PointsMax {
                max: MAX_POINTS,
                got: self.points.len(),
            });
        }
        for (index, point) in self.points.iter().enumerate() {
            if !limits.contains(point.temp_c) {
                return Err(ProfileError::TempOutOfRange {
                    index,
                    temp_c: point.temp_c,
                    min_c: limits.min_c,
                    max_c: limits.max_c,
                });
            }
            if index > 0 && point.t_sec <= self.points[index - 1].t_sec {
                return Err(ProfileError::PointsNotMonotonic { index });
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            name: self.name.clone(),
            point_count: self.points.len(),
            end_behavior: self.end_behavior,
        }
    }

    /// Time offset of the final point (seconds).
    pub fn duration_sec(&self) -> u32 {
        self.points.last().map_or(0, |p| p.t_sec)
    }
}

/// Listing entry for a stored profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub name: String,
    pub point_count: usize,
    pub end_behavior: EndBehavior,
}
