//! Perturbed residual `D = E - P + d_obs 1ᵀ`.

use nalgebra::{DMatrix, DVector};

use crate::error::{IesError, IesResult};

/// Build the residual matrix consumed as `D` by the coefficient update.
///
/// `perturbations` and `predicted` are m x n; `observations` has length m and is
/// added to every column.
pub fn make_residual(
    observations: &DVector<f64>,
    perturbations: &DMatrix<f64>,
    predicted: &DMatrix<f64>,
) -> IesResult<DMatrix<f64>> {
    let (m, n) = predicted.shape();
    if perturbations.shape() != (m, n) {
        return Err(IesError::ShapeMismatch {
            name: "E",
            expected_rows: m,
            expected_cols: n,
            rows: perturbations.nrows(),
            cols: perturbations.ncols(),
        });
    }
    if observations.len() != m {
        return Err(IesError::ShapeMismatch {
            name: "observations",
            expected_rows: m,
            expected_cols: 1,
            rows: observations.len(),
            cols: 1,
        });
    }

    let mut d = perturbations - predicted;
    for mut col in d.column_iter_mut() {
        col += observations;
    }
    Ok(d)
}
