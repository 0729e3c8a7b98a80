//! Low-rank inverses of the observation-space operator `S Sᵀ + C`.
//!
//! Both builders return a factor `X₁` (m x r) and a vector `λ` (length r) such
//! that
//!
//! ```text
//! (S Sᵀ + C)⁻¹ ≈ X₁ diag(λ) X₁ᵀ
//! ```
//!
//! restricted to the retained singular subspace of `S`, with `r = min(m, n)`.
//! No m x m matrix is ever formed; the largest decomposition is r x n.
//!
//! - [`low_rank_from_perturbations`]: `C = E Eᵀ` from a (pre-scaled) perturbation
//!   ensemble.
//! - [`low_rank_from_covariance`]: `C` given explicitly (pre-scaled).

use nalgebra::{DMatrix, DVector};

use crate::domain::Truncation;
use crate::error::{IesError, IesResult};
use crate::math::svd::{left_vectors, thin_svd, truncated_svd};

/// Factored approximate inverse `X₁ diag(λ) X₁ᵀ`.
#[derive(Debug, Clone)]
pub struct LowRankInverse {
    /// `X₁`, m x r.
    pub factor: DMatrix<f64>,
    /// `λ`, length r.
    pub eig: DVector<f64>,
    /// Number of singular directions of `S` that were inverted.
    pub rank: usize,
}

impl LowRankInverse {
    /// Apply the factored inverse to `h` (see [`apply_low_rank_inverse`]).
    pub fn apply(&self, h: &DMatrix<f64>) -> IesResult<DMatrix<f64>> {
        apply_low_rank_inverse(&self.factor, &self.eig, h)
    }
}

/// Build the inverse from a perturbation ensemble already scaled by `1/√(n-1)`.
pub fn low_rank_from_perturbations(
    s: &DMatrix<f64>,
    e_scaled: &DMatrix<f64>,
    truncation: Truncation,
) -> IesResult<LowRankInverse> {
    check_shape("E", e_scaled, s.nrows(), s.ncols())?;

    let tsvd = truncated_svd(s, truncation)?;
    let sigma_inv = tsvd.inv_sigma_matrix();

    // X₀ = Σ⁺ U₀ᵀ E  (r x n)
    let x0 = &sigma_inv * tsvd.u.transpose() * e_scaled;
    let svd = thin_svd(&x0, false, "X0")?;
    let u1 = left_vectors(&svd, "X0")?;

    let eig = svd.singular_values.map(|s| 1.0 / (1.0 + s * s));
    let factor = &tsvd.u * sigma_inv.transpose() * u1;

    Ok(LowRankInverse {
        factor,
        eig,
        rank: tsvd.rank,
    })
}

/// Build the inverse from an error covariance already scaled by `1/(n-1)`.
pub fn low_rank_from_covariance(
    s: &DMatrix<f64>,
    r_scaled: &DMatrix<f64>,
    truncation: Truncation,
) -> IesResult<LowRankInverse> {
    check_shape("R", r_scaled, s.nrows(), s.nrows())?;

    let ens_size = s.ncols() as f64;
    let tsvd = truncated_svd(s, truncation)?;
    let sigma_inv = tsvd.inv_sigma_matrix();

    // B = (n-1) Σ⁺ U₀ᵀ R U₀ Σ⁺ᵀ  (r x r, symmetric positive semi-definite)
    let b = (&sigma_inv * tsvd.u.transpose() * r_scaled * &tsvd.u * sigma_inv.transpose())
        .scale(ens_size - 1.0);
    let svd = thin_svd(&b, false, "B")?;
    let z = left_vectors(&svd, "B")?;

    let eig = svd.singular_values.map(|mu| 1.0 / (1.0 + mu));
    let factor = &tsvd.u * (&sigma_inv * z);

    Ok(LowRankInverse {
        factor,
        eig,
        rank: tsvd.rank,
    })
}

/// Compute `X₁ diag(λ) X₁ᵀ H` right to left, keeping every intermediate at most r x n.
pub fn apply_low_rank_inverse(
    factor: &DMatrix<f64>,
    eig: &DVector<f64>,
    h: &DMatrix<f64>,
) -> IesResult<DMatrix<f64>> {
    if factor.ncols() != eig.len() {
        return Err(IesError::InvalidArgument(format!(
            "Low-rank factor has {} columns but {} eigenvalues.",
            factor.ncols(),
            eig.len()
        )));
    }
    if factor.nrows() != h.nrows() {
        return Err(IesError::ShapeMismatch {
            name: "H",
            expected_rows: factor.nrows(),
            expected_cols: h.ncols(),
            rows: h.nrows(),
            cols: h.ncols(),
        });
    }

    let x1 = DMatrix::from_diagonal(eig) * factor.transpose();
    let x2 = x1 * h;
    Ok(factor * x2)
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
