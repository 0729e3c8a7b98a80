//! Truncated singular value decomposition.
//!
//! Every subspace inversion starts from a thin SVD `S = U Σ Vᵀ` of the
//! response anomalies. Only the leading singular directions are inverted:
//!
//! ```text
//! Σ⁺ᵢ = 1/σᵢ   for i < k
//! Σ⁺ᵢ = 0      for i >= k
//! ```
//!
//! where `k` comes from the truncation setting. Zeroing the tail is the
//! regularization: directions carrying a negligible share of the variance never
//! enter an inverse built on top of `Σ⁺`.
//!
//! nalgebra's `try_svd` returns singular values sorted in descending order,
//! which the variance-fraction rule relies on.

use nalgebra::{DMatrix, DVector, Dyn, SVD};
use tracing::{debug, warn};

use crate::domain::Truncation;
use crate::error::{IesError, IesResult};

/// Iteration allowance per matrix dimension before an SVD is declared non-convergent.
const SVD_ITERS_PER_DIM: usize = 100;

/// Thin SVD with non-convergence surfaced as an error.
pub(crate) fn thin_svd(
    m: &DMatrix<f64>,
    compute_v: bool,
    what: &str,
) -> IesResult<SVD<f64, Dyn, Dyn>> {
    let max_niter = SVD_ITERS_PER_DIM * m.nrows().max(m.ncols()).max(1);
    m.clone()
        .try_svd(true, compute_v, f64::EPSILON, max_niter)
        .ok_or_else(|| IesError::Numerical(format!("SVD of {what} did not converge.")))
}

/// Left singular vectors of a decomposition computed with `compute_u = true`.
pub(crate) fn left_vectors(svd: &SVD<f64, Dyn, Dyn>, what: &str) -> IesResult<DMatrix<f64>> {
    svd.u
        .clone()
        .ok_or_else(|| IesError::Numerical(format!("SVD of {what} produced no left singular vectors.")))
}

/// Number of leading singular values needed to capture `threshold` of the variance.
///
/// Before including the k-th value we stop if the share already accumulated is
/// not strictly below `threshold`. With `threshold <= 0` nothing is kept; with
/// `threshold = 1` and positive singular values everything is kept. An all-zero
/// spectrum keeps nothing.
pub fn num_significant(singular_values: &[f64], threshold: f64) -> usize {
    let total: f64 = singular_values.iter().map(|s| s * s).sum();

    let mut running = 0.0;
    let mut count = 0;
    for &sigma in singular_values {
        if running / total < threshold {
            count += 1;
            running += sigma * sigma;
        } else {
            break;
        }
    }
    count
}

/// Resolve a truncation setting against a descending spectrum.
///
/// An explicit rank is returned as given; clamping happens in [`truncated_svd`].
pub fn select_rank(singular_values: &[f64], truncation: Truncation) -> usize {
    match truncation {
        Truncation::Rank(k) => k,
        Truncation::Fraction(t) => num_significant(singular_values, t),
    }
}

/// Thin left singular vectors and a truncated pseudo-inverse spectrum.
#[derive(Debug, Clone)]
pub struct TruncatedSvd {
    /// `U` with all `min(m, n)` columns (not truncated to `rank`).
    pub u: DMatrix<f64>,
    /// `Σ⁺` of length `min(m, n)`; entries at and beyond `rank` are zero.
    pub inv_sigma: DVector<f64>,
    /// Number of singular directions actually inverted.
    pub rank: usize,
}

impl TruncatedSvd {
    pub fn inv_sigma_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_diagonal(&self.inv_sigma)
    }
}

/// Thin SVD of `s` with the pseudo-inverse spectrum truncated per `truncation`.
pub fn truncated_svd(s: &DMatrix<f64>, truncation: Truncation) -> IesResult<TruncatedSvd> {
    let full_rank = s.nrows().min(s.ncols());
    let svd = thin_svd(s, false, "S")?;
    let u = left_vectors(&svd, "S")?;
    let sigma = &svd.singular_values;

    let mut rank = select_rank(sigma.as_slice(), truncation);
    if rank > full_rank {
        warn!(requested = rank, available = full_rank, "truncation rank clamped");
        rank = full_rank;
    }

    // A zero singular value has no inverse even when it falls inside the kept rank.
    let inv_sigma = DVector::from_iterator(
        full_rank,
        sigma
            .iter()
            .enumerate()
            .map(|(i, &s)| if i < rank && s > 0.0 { 1.0 / s } else { 0.0 }),
    );
    debug!(rank, full_rank, "truncated SVD of S");

    Ok(TruncatedSvd { u, inv_sigma, rank })
}
