//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - sets up logging
//! - parses CLI arguments
//! - loads matrices from JSON
//! - runs the requested update
//! - prints a summary and writes the result

use clap::Parser;
use nalgebra::DMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, ResidualArgs, SmoothArgs, UpdateArgs};
use crate::domain::EnsembleInputs;
use crate::error::AppError;
use crate::io::{read_matrix_json, read_observation_errors, read_vector_json, write_matrix_json};
use crate::update::{create_coefficient_matrix_with_report, make_residual};
use crate::workflow::{ensemble_smoother_update, sample_perturbations};

/// Environment variable holding the log filter (e.g. `IES_LOG=debug`).
const LOG_ENV: &str = "IES_LOG";

/// Entry point for the `ies` binary.
pub fn run() -> Result<(), AppError> {
    init_logging();
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Update(args) => handle_update(args),
        Command::Residual(args) => handle_residual(args),
        Command::Smooth(args) => handle_smooth(args),
    }
}

fn init_logging() {
    // A missing .env file is the normal case.
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_update(args: UpdateArgs) -> Result<(), AppError> {
    let settings = args.settings.resolve()?;

    let y = read_matrix_json(&args.responses)?;
    let e = read_matrix_json(&args.perturbations)?;
    let d = read_matrix_json(&args.residual)?;
    let r = args.covariance.as_deref().map(read_matrix_json).transpose()?;
    let mut w = match &args.coefficients {
        Some(path) => read_matrix_json(path)?,
        None => DMatrix::zeros(y.ncols(), y.ncols()),
    };

    let inputs = EnsembleInputs {
        responses: &y,
        covariance: r.as_ref(),
        perturbations: &e,
        residual: &d,
    };
    let report = create_coefficient_matrix_with_report(&inputs, &settings, &mut w)?;

    println!("{}", crate::report::format_update_summary(&report, &settings));
    write_matrix_json(&args.out, &w)?;
    Ok(())
}

fn handle_residual(args: ResidualArgs) -> Result<(), AppError> {
    let observations = read_vector_json(&args.observations)?;
    let e = read_matrix_json(&args.perturbations)?;
    let responses = read_matrix_json(&args.responses)?;

    let d = make_residual(&observations, &e, &responses)?;
    write_matrix_json(&args.out, &d)?;
    Ok(())
}

fn handle_smooth(args: SmoothArgs) -> Result<(), AppError> {
    let settings = args.settings.resolve()?;

    let responses = read_matrix_json(&args.responses)?;
    let parameters = read_matrix_json(&args.parameters)?;
    let observations = read_vector_json(&args.observations)?;
    let errors = read_observation_errors(&args.errors)?;

    let mut rng = StdRng::seed_from_u64(args.seed);
    let perturbations = sample_perturbations(&errors, responses.ncols(), &mut rng)?;

    let mut blocks = [parameters];
    let report = ensemble_smoother_update(
        &responses,
        &mut blocks,
        &errors,
        &observations,
        &perturbations,
        &settings,
    )?;

    let [updated] = &blocks;
    println!("{}", crate::report::format_update_summary(&report, &settings));
    write_matrix_json(&args.out, updated)?;
    Ok(())
}
