//! Error types for control configuration.

use thiserror::Error;

/// Result type for control operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur when building control components.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// Invalid argument provided to a control function.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// Configuration rejected as a whole.
    #[error("Invalid configuration: {what}")]
    InvalidConfig { what: String },

    #[error(transparent)]
    Core(#[from] oc_core::CoreError),
}
