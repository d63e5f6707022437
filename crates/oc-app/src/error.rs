//! Error types for the oc-app service layer.

use std::path::PathBuf;

use oc_controls::{ControlError, RunState};
use oc_profile::ProfileError;

/// Application error type that wraps errors from the control crates and the
/// file/thread plumbing around them.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Failed to read file: {path}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Control configuration rejected: {0}")]
    Control(#[from] ControlError),

    #[error("Profile rejected ({}): {0}", .0.code())]
    Profile(#[from] ProfileError),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Run refused in state {0}")]
    RunRefused(RunState),

    #[error("Activity thread '{name}' panicked")]
    ThreadPanicked { name: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for oc-app operations.
pub type AppResult<T> = Result<T, AppError>;
