//! Shared domain types.
//!
//! These types are kept small and serializable so the same settings can be:
//!
//! - built in code by a calling workflow
//! - loaded from a JSON settings file
//! - overridden from CLI flags

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{IesError, IesResult};

/// Strategy used to invert the observation-space operator.
///
/// The numeric codes are the ones used by existing callers of the smoother
/// (`0`, `1`, `3`); any other code is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum Inversion {
    /// Dense `(SᵀS + I)⁻¹` in ensemble space. Assumes whitened errors (R = I).
    #[serde(rename = "exact")]
    #[value(name = "exact")]
    Exact,
    /// Low-rank subspace inversion using an explicit covariance matrix R.
    #[serde(rename = "subspace-exact-r", alias = "exact-r")]
    #[value(name = "subspace-exact-r", alias = "exact-r")]
    SubspaceWithCovariance,
    /// Low-rank subspace inversion using the perturbation ensemble E.
    #[serde(rename = "subspace-re")]
    #[value(name = "subspace-re")]
    SubspaceWithPerturbations,
}

impl Inversion {
    pub const ALL: [Inversion; 3] = [
        Inversion::Exact,
        Inversion::SubspaceWithCovariance,
        Inversion::SubspaceWithPerturbations,
    ];

    pub fn code(self) -> u8 {
        match self {
            Inversion::Exact => 0,
            Inversion::SubspaceWithCovariance => 1,
            Inversion::SubspaceWithPerturbations => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Inversion::Exact => "exact",
            Inversion::SubspaceWithCovariance => "subspace-exact-r",
            Inversion::SubspaceWithPerturbations => "subspace-re",
        }
    }

    /// Whether this strategy consumes an explicit covariance matrix.
    pub fn needs_covariance(self) -> bool {
        matches!(self, Inversion::SubspaceWithCovariance)
    }
}

impl fmt::Display for Inversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for Inversion {
    type Error = IesError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Inversion::Exact),
            1 => Ok(Inversion::SubspaceWithCovariance),
            3 => Ok(Inversion::SubspaceWithPerturbations),
            other => Err(IesError::InvalidConfig(format!(
                "Unknown inversion code {other} (expected 0, 1 or 3)."
            ))),
        }
    }
}

impl FromStr for Inversion {
    type Err = IesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        if let Ok(code) = key.parse::<u8>() {
            return Inversion::try_from(code);
        }
        match key.as_str() {
            "exact" => Ok(Inversion::Exact),
            "subspace-exact-r" | "exact-r" => Ok(Inversion::SubspaceWithCovariance),
            "subspace-re" => Ok(Inversion::SubspaceWithPerturbations),
            _ => Err(IesError::InvalidConfig(format!("Unknown inversion '{s}'."))),
        }
    }
}

/// How many singular directions to keep when building a pseudo-inverse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Truncation {
    /// Keep exactly this many singular values (clamped to `min(m, n)`).
    Rank(usize),
    /// Keep singular values until this fraction of the total variance is captured.
    Fraction(f64),
}

impl Truncation {
    pub fn validate(self) -> IesResult<()> {
        match self {
            Truncation::Rank(0) => Err(IesError::InvalidConfig(
                "Truncation rank must be a positive integer.".to_string(),
            )),
            Truncation::Rank(_) => Ok(()),
            Truncation::Fraction(t) if t.is_finite() && t > 0.0 && t <= 1.0 => Ok(()),
            Truncation::Fraction(t) => Err(IesError::InvalidConfig(format!(
                "Truncation fraction must lie in (0, 1], got {t}."
            ))),
        }
    }
}

impl Default for Truncation {
    fn default() -> Self {
        Truncation::Fraction(0.98)
    }
}

impl fmt::Display for Truncation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Truncation::Rank(k) => write!(f, "rank {k}"),
            Truncation::Fraction(t) => write!(f, "fraction {t}"),
        }
    }
}

/// Per-call settings of the coefficient-matrix update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateSettings {
    pub inversion: Inversion,
    pub truncation: Truncation,
    /// Damping in `[0, 1]`: `0` keeps W unchanged, `1` takes the full update.
    pub step_length: f64,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            inversion: Inversion::Exact,
            truncation: Truncation::default(),
            step_length: 1.0,
        }
    }
}

impl UpdateSettings {
    pub fn validate(&self) -> IesResult<()> {
        self.truncation.validate()?;
        if !(self.step_length.is_finite() && (0.0..=1.0).contains(&self.step_length)) {
            return Err(IesError::InvalidConfig(format!(
                "Step length must lie in [0, 1], got {}.",
                self.step_length
            )));
        }
        Ok(())
    }
}

/// Read-only operands of one coefficient-matrix update.
///
/// All matrices have `m` rows (responses) and `n` columns (realizations),
/// except the optional covariance which is `m x m`.
#[derive(Debug, Clone, Copy)]
pub struct EnsembleInputs<'a> {
    /// Predicted responses Y.
    pub responses: &'a DMatrix<f64>,
    /// Observation error covariance R.
    pub covariance: Option<&'a DMatrix<f64>>,
    /// Perturbations E.
    pub perturbations: &'a DMatrix<f64>,
    /// Residual D = observations + E - predictions.
    pub residual: &'a DMatrix<f64>,
}

impl EnsembleInputs<'_> {
    pub fn num_responses(&self) -> usize {
        self.responses.nrows()
    }

    pub fn num_realizations(&self) -> usize {
        self.responses.ncols()
    }
}
