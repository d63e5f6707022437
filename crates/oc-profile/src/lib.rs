//! Temperature ramp ("profile") storage and playback for ovenctl.
//!
//! A profile is a named, time-ordered list of `(elapsed seconds, temperature)`
//! points. The [`ProfileEngine`] keeps a small, capacity-bounded table of
//! profiles, remembers which one (if any) is armed, and turns "time since the
//! run was armed" into an instantaneous setpoint by piecewise-linear
//! interpolation.
//!
//! Validation happens on write. Once a profile is in the table it is known to
//! be well formed, so [`ProfileEngine::setpoint_at`] never fails and never
//! mutates anything; it is cheap enough to call on every control tick.

pub mod engine;
pub mod error;
pub mod profile;

pub use engine::{MAX_PROFILES, ProfileEngine, ProfileSetpoint};
pub use error::{ProfileError, ProfileResult};
pub use profile::{EndBehavior, MAX_POINTS, Profile, ProfilePoint, ProfileSummary, TempLimits};
