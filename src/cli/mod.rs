//! Command-line parsing for the `ies` binary.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! update math. Matrices are exchanged as JSON files (see `io::matrix`).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{Inversion, Truncation, UpdateSettings};
use crate::error::AppError;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "ies", version, about = "Iterative ensemble smoother update step")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compute the next coefficient matrix W for one outer iteration.
    Update(UpdateArgs),
    /// Build the perturbed residual D = observations + E - predictions.
    Residual(ResidualArgs),
    /// Sample perturbations and update parameter blocks in one step.
    Smooth(SmoothArgs),
}

/// Settings shared by `update` and `smooth`.
///
/// Flags override values read from `--config`.
#[derive(Debug, Args, Clone)]
pub struct SettingsArgs {
    /// JSON settings file (`inversion`, `truncation`, `step_length`).
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Inversion strategy.
    #[arg(long, value_enum)]
    pub inversion: Option<Inversion>,

    /// Keep singular values until this fraction of the variance is captured.
    #[arg(long, conflicts_with = "rank")]
    pub truncation: Option<f64>,

    /// Keep exactly this many singular values.
    #[arg(long)]
    pub rank: Option<usize>,

    /// Step length in [0, 1].
    #[arg(long)]
    pub step_length: Option<f64>,
}

impl SettingsArgs {
    /// Merge the config file (if any) with flag overrides and validate.
    pub fn resolve(&self) -> Result<UpdateSettings, AppError> {
        let mut settings = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    AppError::new(3, format!("Failed to read settings '{}': {e}", path.display()))
                })?;
                serde_json::from_str::<UpdateSettings>(&text).map_err(|e| {
                    AppError::new(2, format!("Invalid settings '{}': {e}", path.display()))
                })?
            }
            None => UpdateSettings::default(),
        };

        if let Some(inversion) = self.inversion {
            settings.inversion = inversion;
        }
        if let Some(t) = self.truncation {
            settings.truncation = Truncation::Fraction(t);
        }
        if let Some(k) = self.rank {
            settings.truncation = Truncation::Rank(k);
        }
        if let Some(step) = self.step_length {
            settings.step_length = step;
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Parser, Clone)]
pub struct UpdateArgs {
    /// Predicted responses Y (m x n).
    #[arg(long, value_name = "JSON")]
    pub responses: PathBuf,

    /// Perturbations E (m x n).
    #[arg(long, value_name = "JSON")]
    pub perturbations: PathBuf,

    /// Residual D (m x n), e.g. from `ies residual`.
    #[arg(long, value_name = "JSON")]
    pub residual: PathBuf,

    /// Observation error covariance R (m x m); only for `subspace-exact-r`.
    #[arg(long, value_name = "JSON")]
    pub covariance: Option<PathBuf>,

    /// Current coefficient matrix W (n x n). Defaults to zeros.
    #[arg(long, value_name = "JSON")]
    pub coefficients: Option<PathBuf>,

    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Where to write the updated W.
    #[arg(long, value_name = "JSON")]
    pub out: PathBuf,
}

#[derive(Debug, Parser, Clone)]
pub struct ResidualArgs {
    /// Observation values (vector file, length m).
    #[arg(long, value_name = "JSON")]
    pub observations: PathBuf,

    /// Perturbations E (m x n).
    #[arg(long, value_name = "JSON")]
    pub perturbations: PathBuf,

    /// Predicted responses (m x n).
    #[arg(long, value_name = "JSON")]
    pub responses: PathBuf,

    /// Where to write D.
    #[arg(long, value_name = "JSON")]
    pub out: PathBuf,
}

#[derive(Debug, Parser, Clone)]
pub struct SmoothArgs {
    /// Predicted responses of the prior ensemble (m x n).
    #[arg(long, value_name = "JSON")]
    pub responses: PathBuf,

    /// Parameter ensemble (p x n).
    #[arg(long, value_name = "JSON")]
    pub parameters: PathBuf,

    /// Observation values (vector file, length m).
    #[arg(long, value_name = "JSON")]
    pub observations: PathBuf,

    /// Observation errors: standard deviations (vector file) or covariance (matrix file).
    #[arg(long, value_name = "JSON")]
    pub errors: PathBuf,

    /// Random seed for the perturbations.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Where to write the updated parameter ensemble.
    #[arg(long, value_name = "JSON")]
    pub out: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "ies",
            "update",
            "--responses",
            "y.json",
            "--perturbations",
            "e.json",
            "--residual",
            "d.json",
            "--inversion",
            "subspace-re",
            "--rank",
            "3",
            "--step-length",
            "0.5",
            "--out",
            "w.json",
        ]);
        let Command::Update(args) = cli.command else {
            panic!("expected update");
        };
        let settings = args.settings.resolve().unwrap();
        assert_eq!(settings.inversion, Inversion::SubspaceWithPerturbations);
        assert_eq!(settings.truncation, Truncation::Rank(3));
        assert_eq!(settings.step_length, 0.5);
    }

    #[test]
    fn truncation_and_rank_conflict() {
        let res = Cli::try_parse_from([
            "ies",
            "update",
            "--responses",
            "y.json",
            "--perturbations",
            "e.json",
            "--residual",
            "d.json",
            "--truncation",
            "0.9",
            "--rank",
            "3",
            "--out",
            "w.json",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn invalid_step_length_is_rejected() {
        let args = SettingsArgs {
            config: None,
            inversion: None,
            truncation: None,
            rank: None,
            step_length: Some(2.0),
        };
        assert_eq!(args.resolve().unwrap_err().exit_code(), 2);
    }
}
