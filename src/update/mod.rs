//! The smoother update step.
//!
//! Responsibilities:
//!
//! - build the perturbed residual D (`residual`)
//! - pick and run an inversion strategy (`inversion`)
//! - orchestrate one coefficient-matrix update (`coefficient`)

pub mod coefficient;
pub mod inversion;
pub mod residual;

pub use coefficient::*;
pub use inversion::*;
pub use residual::*;
