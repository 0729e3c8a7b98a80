//! `ies-smoother` library crate.
//!
//! The update step of an iterative ensemble smoother: given predicted responses
//! of an ensemble and perturbed observations, compute the coefficient matrix W
//! that maps ensemble anomalies to a parameter update.
//!
//! The binary (`ies`) is a thin wrapper around this library so that:
//!
//! - the update is testable without spawning processes
//! - calling workflows can embed it directly and own W between iterations

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod io;
pub mod math;
pub mod report;
pub mod update;
pub mod workflow;

pub use domain::{EnsembleInputs, Inversion, Truncation, UpdateSettings};
pub use error::{IesError, IesResult};
pub use update::{UpdateReport, create_coefficient_matrix, create_coefficient_matrix_with_report, make_residual};
