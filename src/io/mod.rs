//! Input/output helpers.
//!
//! - JSON matrix, vector and observation-error files (`matrix`)

pub mod matrix;

pub use matrix::*;
