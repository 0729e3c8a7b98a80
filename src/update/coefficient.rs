//! Coefficient-matrix update (one outer iteration of the smoother).
//!
//! Steps:
//!
//! 1. validate shapes and settings (nothing numerical runs on bad input)
//! 2. `S = Y Ω⁻¹` from the current W
//! 3. innovation `H = D + S W`
//! 4. dispatch to the selected inversion strategy, updating W in place
//!
//! W is owned by the caller and carried from one outer iteration to the next;
//! nothing here keeps state between calls.

use nalgebra::DMatrix;
use tracing::debug;

use crate::domain::{EnsembleInputs, Inversion, UpdateSettings};
use crate::error::{IesError, IesResult};
use crate::math::solve_sensitivity;
use crate::update::inversion::apply_inversion;

/// Relative tolerance for the symmetry check on R.
const SYMMETRY_TOL: f64 = 1e-10;

/// Summary of a single coefficient-matrix update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateReport {
    pub inversion: Inversion,
    /// Inverted singular directions (subspace strategies only).
    pub rank: Option<usize>,
    pub responses: usize,
    pub realizations: usize,
    /// Frobenius norm of `W_new - W_old`.
    pub change_norm: f64,
    /// Frobenius norm of `W_new`.
    pub coefficient_norm: f64,
}

/// Update `w` in place for one outer iteration.
pub fn create_coefficient_matrix(
    inputs: &EnsembleInputs<'_>,
    settings: &UpdateSettings,
    w: &mut DMatrix<f64>,
) -> IesResult<()> {
    create_coefficient_matrix_with_report(inputs, settings, w).map(|_| ())
}

/// Same as [`create_coefficient_matrix`], also describing what was done.
pub fn create_coefficient_matrix_with_report(
    inputs: &EnsembleInputs<'_>,
    settings: &UpdateSettings,
    w: &mut DMatrix<f64>,
) -> IesResult<UpdateReport> {
    settings.validate()?;
    validate_inputs(inputs, settings.inversion, w)?;

    let previous = w.clone();

    let s = solve_sensitivity(w, inputs.responses)?;
    let h = inputs.residual + &s * &*w;

    let rank = apply_inversion(
        settings.inversion,
        w,
        &s,
        &h,
        inputs.perturbations,
        inputs.covariance,
        settings.truncation,
        settings.step_length,
    )?;

    if w.iter().any(|v| !v.is_finite()) {
        // Leave the caller's state as it was rather than handing back NaNs.
        *w = previous;
        return Err(IesError::Numerical(
            "Coefficient update produced non-finite values.".to_string(),
        ));
    }

    let change_norm = (&*w - &previous).norm();
    debug!(inversion = %settings.inversion, change_norm, "coefficient matrix updated");

    Ok(UpdateReport {
        inversion: settings.inversion,
        rank,
        responses: inputs.num_responses(),
        realizations: inputs.num_realizations(),
        change_norm,
        coefficient_norm: w.norm(),
    })
}

fn validate_inputs(
    inputs: &EnsembleInputs<'_>,
    inversion: Inversion,
    w: &DMatrix<f64>,
) -> IesResult<()> {
    match (inversion.needs_covariance(), inputs.covariance.is_some()) {
        (true, false) => {
            return Err(IesError::InvalidConfig(format!(
                "Inversion '{inversion}' requires an observation error covariance R."
            )));
        }
        (false, true) => {
            return Err(IesError::InvalidConfig(format!(
                "Inversion '{inversion}' does not use R; pass it only with '{}'.",
                Inversion::SubspaceWithCovariance
            )));
        }
        _ => {}
    }

    let (m, n) = inputs.responses.shape();
    if n < 2 {
        return Err(IesError::TooFewRealizations(n));
    }
    if m == 0 {
        return Err(IesError::InvalidArgument(
            "Response ensemble has no rows.".to_string(),
        ));
    }

    check_shape("E", inputs.perturbations, m, n)?;
    check_shape("D", inputs.residual, m, n)?;
    check_shape("W", w, n, n)?;
    if let Some(r) = inputs.covariance {
        check_shape("R", r, m, m)?;
        let asym = (r - r.transpose()).amax();
        if asym > SYMMETRY_TOL * r.amax().max(1.0) {
            return Err(IesError::InvalidArgument(format!(
                "Covariance R is not symmetric (max asymmetry {asym:.3e})."
            )));
        }
    }

    check_finite("Y", inputs.responses)?;
    check_finite("E", inputs.perturbations)?;
    check_finite("D", inputs.residual)?;
    check_finite("W", w)?;
    if let Some(r) = inputs.covariance {
        check_finite("R", r)?;
    }
    Ok(())
}

fn check_shape(name: &'static str, m: &DMatrix<f64>, rows: usize, cols: usize) -> IesResult<()> {
    if m.shape() != (rows, cols) {
        return Err(IesError::ShapeMismatch {
            name,
            expected_rows: rows,
            expected_cols: cols,
            rows: m.nrows(),
            cols: m.ncols(),
        });
    }
    Ok(())
}

fn check_finite(name: &str, m: &DMatrix<f64>) -> IesResult<()> {
    if m.iter().any(|v| !v.is_finite()) {
        return Err(IesError::InvalidArgument(format!(
            "{name} contains non-finite values."
        )));
    }
    Ok(())
}
