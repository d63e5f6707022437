//! Error types for profile table operations.

use thiserror::Error;

/// Result type for profile operations.
pub type ProfileResult<T> = Result<T, ProfileError>;

/// Reasons a profile write is rejected. A rejected write never modifies the
/// table.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProfileError {
    #[error("Profile name is required")]
    NameRequired,

    #[error("Profile needs at least {min} points, got {got}")]
    PointsMin { min: usize, got: usize },

    #[error("Profile has {got} points, at most {max} are allowed")]
    PointsMax { max: usize, got: usize },

    #[error("Point {index} temperature {temp_c} is outside [{min_c}, {max_c}]")]
    TempOutOfRange {
        index: usize,
        temp_c: f64,
        min_c: f64,
        max_c: f64,
    },

    #[error("Point {index} time is not after the previous point")]
    PointsNotMonotonic { index: usize },

    #[error("Profile table is full ({capacity} profiles)")]
    ProfilesFull { capacity: usize },
}

impl ProfileError {
    /// Stable reason code reported to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NameRequired => "name_required",
            Self::PointsMin { .. } => "points_min",
            Self::PointsMax { .. } => "points_max",
            Self::TempOutOfRange { .. } => "temp_out_of_range",
            Self::PointsNotMonotonic { .. } => "points_not_monotonic",
            Self::ProfilesFull { .. } => "profiles_full",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes() {
        assert_eq!(ProfileError::NameRequired.code(), "name_required");
        assert_eq!(
            ProfileError::PointsNotMonotonic { index: 1 }.code(),
            "points_not_monotonic"
        );
        assert_eq!(
            ProfileError::ProfilesFull { capacity: 8 }.code(),
            "profiles_full"
        );
    }

    #[test]
    fn messages_mention_the_offending_point() {
        let err = ProfileError::TempOutOfRange {
            index: 2,
            temp_c: 900.0,
            min_c: -100.0,
            max_c: 300.0,
        };
        assert!(err.to_string().contains("Point 2"));
    }
}
