//! Inversion strategies for the coefficient-matrix update.
//!
//! All three strategies compute (an approximation of)
//!
//! ```text
//! W ← W - γ (W - Sᵀ (S Sᵀ + R)⁻¹ H)
//! ```
//!
//! with step length γ, but differ in which matrix they actually decompose:
//!
//! - `Exact` uses the identity `Sᵀ (S Sᵀ + I)⁻¹ = (SᵀS + I)⁻¹ Sᵀ` and inverts an
//!   n x n matrix. It assumes R = I, i.e. whitened responses.
//! - The two subspace strategies build a rank-r factored inverse (see
//!   `math::lowrank`) and never form an m x m matrix.
//!
//! With R = I and truncation 1.0, `SubspaceWithCovariance` and `Exact` give the
//! same W up to rounding.

use nalgebra::DMatrix;
use tracing::debug;

use crate::domain::{Inversion, Truncation};
use crate::error::{IesError, IesResult};
use crate::math::{LowRankInverse, low_rank_from_covariance, low_rank_from_perturbations, thin_svd};

/// Dense ensemble-space inversion.
///
/// `W ← W - γ (W - V diag(1/σ) Vᵀ Sᵀ H)` where `V diag(σ) Vᵀ = SᵀS + I`.
pub fn exact_inversion(
    w: &mut DMatrix<f64>,
    s: &DMatrix<f64>,
    h: &DMatrix<f64>,
    step_length: f64,
) -> IesResult<()> {
    let n = s.ncols();
    let mut c = s.transpose() * s;
    for i in 0..n {
        c[(i, i)] += 1.0;
    }

    let svd = thin_svd(&c, true, "SᵀS + I")?;
    let v_t = svd
        .v_t
        .as_ref()
        .ok_or_else(|| IesError::Numerical("SVD of SᵀS + I produced no right singular vectors.".to_string()))?;
    let inv_sigma = DMatrix::from_diagonal(&svd.singular_values.map(|s| 1.0 / s));

    let target = v_t.transpose() * inv_sigma * v_t * s.transpose() * h;
    let delta = (&*w - target).scale(step_length);
    *w -= delta;
    Ok(())
}

/// Blend a subspace correction into W: `W ← γ Sᵀ X₃ + (1 - γ) W`.
fn blend_correction(
    w: &mut DMatrix<f64>,
    s: &DMatrix<f64>,
    inverse: &LowRankInverse,
    h: &DMatrix<f64>,
    step_length: f64,
) -> IesResult<()> {
    let x3 = inverse.apply(h)?;
    let updated = (s.transpose() * x3).scale(step_length) + w.scale(1.0 - step_length);
    *w = updated;
    Ok(())
}

/// Run the selected strategy, updating `w` in place.
///
/// Returns the number of inverted singular directions for the subspace
/// strategies, `None` for `Exact`.
#[allow(clippy::too_many_arguments)]
pub fn apply_inversion(
    inversion: Inversion,
    w: &mut DMatrix<f64>,
    s: &DMatrix<f64>,
    h: &DMatrix<f64>,
    perturbations: &DMatrix<f64>,
    covariance: Option<&DMatrix<f64>>,
    truncation: Truncation,
    step_length: f64,
) -> IesResult<Option<usize>> {
    let nsc = 1.0 / (s.ncols() as f64 - 1.0).sqrt();

    match inversion {
        Inversion::Exact => {
            debug!(n = s.ncols(), "exact ensemble-space inversion");
            exact_inversion(w, s, h, step_length)?;
            Ok(None)
        }
        Inversion::SubspaceWithPerturbations => {
            let inverse = low_rank_from_perturbations(s, &perturbations.scale(nsc), truncation)?;
            debug!(rank = inverse.rank, "subspace inversion from perturbations");
            blend_correction(w, s, &inverse, h, step_length)?;
            Ok(Some(inverse.rank))
        }
        Inversion::SubspaceWithCovariance => {
            let r = covariance.ok_or_else(|| {
                IesError::InvalidConfig(format!(
                    "Inversion '{inversion}' requires an observation error covariance R."
                ))
            })?;
            let inverse = low_rank_from_covariance(s, &r.scale(nsc * nsc), truncation)?;
            debug!(rank = inverse.rank, "subspace inversion from covariance");
            blend_correction(w, s, &inverse, h, step_length)?;
            Ok(Some(inverse.rank))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_full_step_matches_normal_equations() {
        let s = DMatrix::from_row_slice(3, 2, &[1.0, 0.5, -0.4, 0.2, 0.3, -0.8]);
        let h = DMatrix::from_row_slice(3, 2, &[0.6, -0.1, 0.2, 0.9, -0.5, 0.3]);
        let mut w = DMatrix::from_row_slice(2, 2, &[0.1, 0.2, 0.3, 0.4]);

        exact_inversion(&mut w, &s, &h, 1.0).unwrap();

        let c = s.transpose() * &s + DMatrix::<f64>::identity(2, 2);
        let want = c.try_inverse().unwrap() * s.transpose() * &h;
        assert!((&w - &want).amax() < 1e-12);
    }

    #[test]
    fn zero_step_keeps_w_for_every_strategy() {
        let s = DMatrix::from_row_slice(3, 2, &[1.0, 0.5, -0.4, 0.2, 0.3, -0.8]);
        let h = DMatrix::from_row_slice(3, 2, &[0.6, -0.1, 0.2, 0.9, -0.5, 0.3]);
        let e = DMatrix::from_row_slice(3, 2, &[0.1, -0.1, 0.2, -0.2, 0.05, -0.05]);
        let r = DMatrix::<f64>::identity(3, 3);
        let w0 = DMatrix::from_row_slice(2, 2, &[0.1, 0.2, 0.3, 0.4]);

        for inv in Inversion::ALL {
            let mut w = w0.clone();
            apply_inversion(inv, &mut w, &s, &h, &e, Some(&r), Truncation::Fraction(1.0), 0.0)
                .unwrap();
            assert!((&w - &w0).amax() < 1e-15, "{inv} changed W with zero step");
        }
    }

    #[test]
    fn covariance_strategy_without_r_fails_before_touching_w() {
        let s = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let mut w = DMatrix::from_element(2, 2, 7.0);
        let err = apply_inversion(
            Inversion::SubspaceWithCovariance,
            &mut w,
            &s,
            &s,
            &s,
            None,
            Truncation::Fraction(1.0),
            1.0,
        )
        .unwrap_err();
        assert!(matches!(err, IesError::InvalidConfig(_)));
        assert_eq!(w, DMatrix::from_element(2, 2, 7.0));
    }
}
