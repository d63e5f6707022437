//! Configuration and profile file loading.

use std::path::Path;

use oc_controls::ControlConfig;
use oc_profile::Profile;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::sim::OvenParams;

/// Periods of the runtime activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub sample_period_ms: u32,
    pub control_period_ms: u32,
    /// Minimum spacing of the periodic status log line.
    pub status_log_ms: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sample_period_ms: 200,
            control_period_ms: 200,
            status_log_ms: 1000,
        }
    }
}

impl TimingConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.sample_period_ms == 0 || self.control_period_ms == 0 {
            return Err(AppError::InvalidConfig(
                "timing periods must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub control: ControlConfig,
    pub timing: TimingConfig,
    /// Profiles preloaded into the engine at startup.
    pub profiles: Vec<Profile>,
    /// Plant parameters for the simulated oven.
    pub oven: OvenParams,
}

impl AppConfig {
    /// Check everything that can be checked without building the service.
    ///
    /// Profiles are validated against the limits implied by `control.tmax_c`.
    pub fn validate(&self) -> AppResult<()> {
        self.control.validate()?;
        self.timing.validate()?;
        let limits = crate::state::profile_limits(&self.control);
        for profile in &self.profiles {
            profile.validate(&limits)?;
        }
        Ok(())
    }
}

fn read(path: &Path) -> AppResult<String> {
    std::fs::read_to_string(path).map_err(|e| AppError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Load and validate an [`AppConfig`] from a YAML file.
pub fn load_config(path: &Path) -> AppResult<AppConfig> {
    let content = read(path)?;
    let config: AppConfig = serde_yaml::from_str(&content).map_err(|e| AppError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Load a single profile from a YAML or JSON file (by extension).
///
/// Only the file format is checked here; validation against temperature
/// limits happens when the profile is added to an engine.
pub fn load_profile(path: &Path) -> AppResult<Profile> {
    let content = read(path)?;
    let parsed = if is_json(path) {
        serde_json::from_str(&content).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str(&content).map_err(|e| e.to_string())
    };
    parsed.map_err(|message| AppError::Parse {
        path: path.to_path_buf(),
        message,
    })
}
