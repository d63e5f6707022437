use crate::error::{CoreError, CoreResult};

/// Floating point type used throughout the controller
pub type Real = f64;

/// Reject NaN and infinities, naming the offending value.
pub fn ensure_finite(v: Real, what: &'static str) -> CoreResult<Real> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// Clamp a fraction into `[0, 1]`. NaN collapses to 0 so a bad computation
/// can never energize an output.
#[inline]
pub fn clamp_unit(v: Real) -> Real {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}
