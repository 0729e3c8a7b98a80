//! Domain types used throughout the update.
//!
//! This module defines:
//!
//! - the inversion strategy selector (`Inversion`)
//! - the truncation parameter (`Truncation`)
//! - per-call settings (`UpdateSettings`)
//! - the read-only operands of one update (`EnsembleInputs`)

pub mod types;

pub use types::*;
