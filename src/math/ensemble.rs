//! Ensemble statistics and the sensitivity solve.
//!
//! Given the current coefficient matrix `W` (n x n), the ensemble transform is
//!
//! ```text
//! Ω = (W - rowmean(W) 1ᵀ) / √(n-1) + I
//! ```
//!
//! and the average sensitivity `S` solves `Ωᵀ Sᵀ = Yᵀ`, i.e. `S = Y Ω⁻¹`.
//!
//! Implementation choices:
//! - The solve uses a full-pivot LU. Ω is square and usually well conditioned
//!   (it equals I when W = 0), so no truncation is applied here.
//! - A singular Ω is reported as a numerical failure instead of producing
//!   non-finite sensitivities.

use nalgebra::DMatrix;

use crate::error::{IesError, IesResult};

/// Subtract each row's mean from that row.
pub fn row_centered(m: &DMatrix<f64>) -> DMatrix<f64> {
    let means = m.column_mean();
    let mut out = m.clone();
    for mut col in out.column_iter_mut() {
        col -= &means;
    }
    out
}

/// `Ω = (W - rowmean(W)) / √(n-1) + I`.
pub fn ensemble_transform(w: &DMatrix<f64>) -> IesResult<DMatrix<f64>> {
    let n = w.nrows();
    if n != w.ncols() {
        return Err(IesError::ShapeMismatch {
            name: "W",
            expected_rows: n,
            expected_cols: n,
            rows: w.nrows(),
            cols: w.ncols(),
        });
    }
    if n < 2 {
        return Err(IesError::TooFewRealizations(n));
    }

    let mut omega = row_centered(w).scale(1.0 / (n as f64 - 1.0).sqrt());
    for i in 0..n {
        omega[(i, i)] += 1.0;
    }
    Ok(omega)
}

/// Solve `Ωᵀ Sᵀ = Yᵀ` for the sensitivity `S` (m x n).
pub fn solve_sensitivity(w: &DMatrix<f64>, y: &DMatrix<f64>) -> IesResult<DMatrix<f64>> {
    let omega = ensemble_transform(w)?;
    if y.ncols() != omega.nrows() {
        return Err(IesError::ShapeMismatch {
            name: "Y",
            expected_rows: y.nrows(),
            expected_cols: omega.nrows(),
            rows: y.nrows(),
            cols: y.ncols(),
        });
    }

    let st = omega
        .transpose()
        .full_piv_lu()
        .solve(&y.transpose())
        .ok_or_else(|| IesError::Numerical("Ensemble transform Ω is singular.".to_string()))?;

    if st.iter().any(|v| !v.is_finite()) {
        return Err(IesError::Numerical(
            "Non-finite sensitivity from the Ω solve.".to_string(),
        ));
    }
    Ok(st.transpose())
}
