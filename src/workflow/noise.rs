//! Observation errors and perturbation sampling.
//!
//! Perturbation columns are drawn from `N(0, C_dd)` and then centered so that
//! every row has zero ensemble mean:
//!
//! ```text
//! E = L Z (I - 1 1ᵀ / n),   L Lᵀ = C_dd,   Zᵢⱼ ~ N(0, 1)
//! ```
//!
//! Errors may be given as per-response standard deviations (C_dd diagonal) or
//! as a full covariance matrix.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::domain::Inversion;
use crate::error::{IesError, IesResult};
use crate::math::row_centered;

/// Observation error description.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservationErrors {
    /// Per-response standard deviations.
    StdDev(DVector<f64>),
    /// Full error covariance (m x m).
    Covariance(DMatrix<f64>),
}

impl ObservationErrors {
    pub fn len(&self) -> usize {
        match self {
            ObservationErrors::StdDev(v) => v.len(),
            ObservationErrors::Covariance(c) => c.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-response scale used to whiten the update inputs, plus the R matching it.
///
/// Rows are divided by the standard deviations `σᵢ = √Cᵢᵢ`. The whitened error
/// covariance is then the correlation matrix `Rᵢⱼ = Cᵢⱼ / (σᵢ σⱼ)`, which is the
/// identity for independent errors. R is only returned when the inversion uses it.
pub fn observation_error_scale(
    errors: &ObservationErrors,
    inversion: Inversion,
) -> IesResult<(DVector<f64>, Option<DMatrix<f64>>)> {
    let std_dev = match errors {
        ObservationErrors::StdDev(v) => v.clone(),
        ObservationErrors::Covariance(c) => {
            if !c.is_square() {
                return Err(IesError::ShapeMismatch {
                    name: "observation error covariance",
                    expected_rows: c.nrows(),
                    expected_cols: c.nrows(),
                    rows: c.nrows(),
                    cols: c.ncols(),
                });
            }
            c.diagonal().map(f64::sqrt)
        }
    };

    if std_dev.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
        return Err(IesError::InvalidArgument(
            "Observation errors must be finite and strictly positive.".to_string(),
        ));
    }

    if !inversion.needs_covariance() {
        return Ok((std_dev, None));
    }
    let m = std_dev.len();
    let r = match errors {
        ObservationErrors::StdDev(_) => DMatrix::identity(m, m),
        ObservationErrors::Covariance(c) => {
            DMatrix::from_fn(m, m, |i, j| c[(i, j)] / (std_dev[i] * std_dev[j]))
        }
    };
    Ok((std_dev, Some(r)))
}

/// Turn standard-normal noise `Z` (m x n) into centered perturbations `L Z`.
pub fn perturbations_from_noise(
    errors: &ObservationErrors,
    noise: &DMatrix<f64>,
) -> IesResult<DMatrix<f64>> {
    let m = errors.len();
    if noise.nrows() != m {
        return Err(IesError::ShapeMismatch {
            name: "noise",
            expected_rows: m,
            expected_cols: noise.ncols(),
            rows: noise.nrows(),
            cols: noise.ncols(),
        });
    }

    let e = match errors {
        // Diagonal case: L = diag(σ), no factorization needed.
        ObservationErrors::StdDev(v) => DMatrix::from_fn(m, noise.ncols(), |i, j| v[i] * noise[(i, j)]),
        ObservationErrors::Covariance(c) => {
            if !c.is_square() {
                return Err(IesError::ShapeMismatch {
                    name: "observation error covariance",
                    expected_rows: m,
                    expected_cols: m,
                    rows: c.nrows(),
                    cols: c.ncols(),
                });
            }
            let chol = c.clone().cholesky().ok_or_else(|| {
                IesError::Numerical(
                    "Observation error covariance is not positive definite.".to_string(),
                )
            })?;
            chol.l() * noise
        }
    };
    Ok(row_centered(&e))
}

/// Sample centered perturbations for `realizations` ensemble members.
pub fn sample_perturbations<R: Rng>(
    errors: &ObservationErrors,
    realizations: usize,
    rng: &mut R,
) -> IesResult<DMatrix<f64>> {
    let noise: DMatrix<f64> =
        DMatrix::from_fn(errors.len(), realizations, |_, _| rng.sample(StandardNormal));
    perturbations_from_noise(errors, &noise)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn std_dev_scale_is_passed_through_and_r_is_identity_when_needed() {
        let errors = ObservationErrors::StdDev(DVector::from_row_slice(&[0.5, 2.0]));

        let (scale, r) = observation_error_scale(&errors, Inversion::Exact).unwrap();
        assert_eq!(scale, DVector::from_row_slice(&[0.5, 2.0]));
        assert!(r.is_none());

        let (_, r) = observation_error_scale(&errors, Inversion::SubspaceWithCovariance).unwrap();
        assert_eq!(r.unwrap(), DMatrix::identity(2, 2));
    }

    #[test]
    fn covariance_scale_uses_diagonal_square_roots() {
        let c = DMatrix::from_row_slice(2, 2, &[4.0, 0.5, 0.5, 9.0]);
        let (scale, _) =
            observation_error_scale(&ObservationErrors::Covariance(c), Inversion::Exact).unwrap();
        assert!((scale[0] - 2.0).abs() < 1e-12);
        assert!((scale[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn covariance_errors_keep_their_correlation() {
        let c = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 9.0]);
        let errors = ObservationErrors::Covariance(c);

        let (_, r) = observation_error_scale(&errors, Inversion::SubspaceWithCovariance).unwrap();
        let want = DMatrix::from_row_slice(2, 2, &[1.0, 1.0 / 6.0, 1.0 / 6.0, 1.0]);
        assert!((r.unwrap() - want).amax() < 1e-12);

        let (_, r) = observation_error_scale(&errors, Inversion::SubspaceWithPerturbations).unwrap();
        assert!(r.is_none());
    }

    #[test]
    fn non_positive_errors_are_rejected() {
        let errors = ObservationErrors::StdDev(DVector::from_row_slice(&[1.0, 0.0]));
        assert!(matches!(
            observation_error_scale(&errors, Inversion::Exact),
            Err(IesError::InvalidArgument(_))
        ));
    }

    #[test]
    fn perturbations_are_centered_and_scaled() {
        let errors = ObservationErrors::StdDev(DVector::from_row_slice(&[2.0, 0.5]));
        let noise = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, -1.0, 0.0, 4.0]);
        let e = perturbations_from_noise(&errors, &noise).unwrap();

        assert!((e[(0, 0)] - (-2.0)).abs() < 1e-12);
        assert!((e[(1, 2)] - 1.5).abs() < 1e-12);
        for row in e.row_iter() {
            assert!(row.sum().abs() < 1e-12);
        }
    }

    #[test]
    fn full_covariance_uses_cholesky_factor() {
        let c = DMatrix::from_row_slice(2, 2, &[4.0, 2.0, 2.0, 5.0]);
        let noise = DMatrix::from_row_slice(2, 2, &[1.0, -1.0, 1.0, -1.0]);
        let e = perturbations_from_noise(&ObservationErrors::Covariance(c), &noise).unwrap();
        // L = [[2, 0], [1, 2]] so L Z = [[2, -2], [3, -3]], already centered.
        let want = DMatrix::from_row_slice(2, 2, &[2.0, -2.0, 3.0, -3.0]);
        assert!((e - want).amax() < 1e-12);
    }

    #[test]
    fn sampled_perturbations_are_reproducible_for_a_seed() {
        let errors = ObservationErrors::StdDev(DVector::from_element(4, 1.0));
        let a = sample_perturbations(&errors, 10, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = sample_perturbations(&errors, 10, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a.shape(), (4, 10));
        assert_eq!(a, b);
    }
}
