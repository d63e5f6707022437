//! oc-core: shared foundation for ovenctl.
//!
//! Contains:
//! - numeric (Real + float helpers)
//! - clock (monotonic millisecond time source, manual clock for tests)
//! - error (non-finite value rejection)

pub mod clock;
pub mod error;
pub mod numeric;

pub use clock::{Clock, ManualClock, Millis, MonotonicClock};
pub use error::{CoreError, CoreResult};
pub use numeric::*;
