//! One-shot ensemble smoother update of parameter blocks.
//!
//! This is the caller-side glue around the coefficient update:
//!
//! 1. `D = d_obs + E - Y`
//! 2. whiten D, E and Y by the observation standard deviations
//! 3. normalized anomalies `(Y - rowmean(Y)) / √(n-1)`
//! 4. W from zero with the configured inversion, truncation and step length
//! 5. transition matrix `T = I + W / √(n-1)` applied as `A ← A T` to each block
//!
//! Running the forward model and generating the prior ensemble are left to the
//! caller.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::info;

use crate::domain::{EnsembleInputs, UpdateSettings};
use crate::error::{IesError, IesResult};
use crate::math::row_centered;
use crate::update::{UpdateReport, create_coefficient_matrix_with_report, make_residual};
use crate::workflow::noise::{ObservationErrors, observation_error_scale};

/// Divide row `i` of `m` by `scale[i]`.
fn whiten_rows(m: &DMatrix<f64>, scale: &DVector<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(m.nrows(), m.ncols(), |i, j| m[(i, j)] / scale[i])
}

/// `T = I + W / √(n-1)`.
pub fn transition_matrix(w: &DMatrix<f64>) -> IesResult<DMatrix<f64>> {
    let n = w.nrows();
    if n < 2 {
        return Err(IesError::TooFewRealizations(n));
    }
    Ok(DMatrix::identity(n, n) + w.scale(1.0 / (n as f64 - 1.0).sqrt()))
}

/// Update every parameter block in place from one batch of responses.
///
/// `responses` (m x n) are the predicted observations of the prior ensemble,
/// `perturbations` (m x n) the centered observation noise, and each parameter
/// block has one column per realization.
pub fn ensemble_smoother_update(
    responses: &DMatrix<f64>,
    parameter_blocks: &mut [DMatrix<f64>],
    errors: &ObservationErrors,
    observations: &DVector<f64>,
    perturbations: &DMatrix<f64>,
    settings: &UpdateSettings,
) -> IesResult<UpdateReport> {
    let (m, n) = responses.shape();
    if errors.len() != m {
        return Err(IesError::ShapeMismatch {
            name: "observation errors",
            expected_rows: m,
            expected_cols: 1,
            rows: errors.len(),
            cols: 1,
        });
    }
    if let Some(block) = parameter_blocks.iter().find(|b| b.ncols() != n) {
        return Err(IesError::ShapeMismatch {
            name: "parameters",
            expected_rows: block.nrows(),
            expected_cols: n,
            rows: block.nrows(),
            cols: block.ncols(),
        });
    }

    let (scale, r) = observation_error_scale(errors, settings.inversion)?;
    let d = whiten_rows(&make_residual(observations, perturbations, responses)?, &scale);
    let e = whiten_rows(perturbations, &scale);
    let y = row_centered(&whiten_rows(responses, &scale)).scale(1.0 / (n as f64 - 1.0).sqrt());

    let inputs = EnsembleInputs {
        responses: &y,
        covariance: r.as_ref(),
        perturbations: &e,
        residual: &d,
    };
    let mut w = DMatrix::zeros(n, n);
    let report = create_coefficient_matrix_with_report(&inputs, settings, &mut w)?;

    let t = transition_matrix(&w)?;
    parameter_blocks
        .par_iter_mut()
        .for_each(|block| *block = &*block * &t);

    info!(
        blocks = parameter_blocks.len(),
        responses = m,
        realizations = n,
        inversion = %settings.inversion,
        "ensemble smoother update applied"
    );
    Ok(report)
}
