//! Caller-side helpers around the coefficient update.
//!
//! - observation errors, whitening scale and perturbation sampling (`noise`)
//! - a complete one-shot update of parameter blocks (`smoother`)

pub mod noise;
pub mod smoother;

pub use noise::*;
pub use smoother::*;
