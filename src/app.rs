//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - initializes logging and the worker pool
//! - runs the fit or simulation pipeline
//! - prints the summary and writes outputs

use clap::Parser;
use tracing::warn;

use crate::cli::{Command, FitArgs, SimulateArgs};
use crate::domain::{FitConfig, SimulateConfig};
use crate::error::{AppError, EXIT_CONFIG, EXIT_FLAGGED};
use crate::io::{DirectorySink, ResultSink, write_profiles};

pub mod pipeline;

/// Rows shown in the largest-residuals table.
const WORST_RESIDUALS: usize = 10;

/// Entry point for the `chemex` binary.
pub fn run() -> Result<(), AppError> {
    // `+r GROUP` is not a flag clap can declare, so argv is rewritten first.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    crate::logging::init(cli.verbose);
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| AppError::new(EXIT_CONFIG, format!("cannot configure {threads} worker threads: {e}")))?;
    }

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args);
    let run = pipeline::run_fit(&config)?;
    let result = &run.result;

    if !config.quiet {
        println!("{}", crate::report::format_fit_summary(result, &config));
        let worst = crate::report::worst_residuals(result, WORST_RESIDUALS);
        println!("{}", crate::report::format_worst_residuals(&worst));
    }

    DirectorySink::new(&config.output).write(result)?;

    match &result.failure {
        Some(failure) => {
            warn!(output = %config.output.display(), "result written with a diagnostic flag");
            Err(AppError::new(EXIT_FLAGGED, failure.to_string()))
        }
        None => Ok(()),
    }
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = simulate_config_from_args(&args);
    let run = pipeline::run_simulate(&config)?;

    write_profiles(
        &config.output,
        &run.inputs.descriptors,
        &run.inputs.collection,
        &run.simulated,
    )?;

    let points = run.simulated.iter().map(|s| s.points.len()).sum();
    println!(
        "{}",
        crate::report::format_simulation_summary(
            run.inputs.descriptors.len(),
            run.simulated.len(),
            points,
            config.noiseless
        )
    );
    Ok(())
}

pub fn fit_config_from_args(args: &FitArgs) -> FitConfig {
    FitConfig {
        experiments: args.experiments.clone(),
        parameters: args.parameters.clone(),
        method: args.method.clone(),
        output: args.output.clone(),
        exclude: args.exclude.clone(),
        include: args.include.clone(),
        order: args.order,
        quiet: args.quiet,
    }
}

pub fn simulate_config_from_args(args: &SimulateArgs) -> SimulateConfig {
    SimulateConfig {
        experiments: args.experiments.clone(),
        parameters: args.parameters.clone(),
        output: args.output.clone(),
        seed: args.seed,
        noiseless: args.noiseless,
    }
}

/// Rewrite the residue selection shorthands.
///
/// Rules:
/// - `+r G ...` -> `--include G ...`
/// - `-r G ...` -> `--exclude G ...`
/// - everything else is left unchanged
fn rewrite_args(argv: Vec<String>) -> Vec<String> {
    argv.into_iter()
        .map(|arg| match arg.as_str() {
            "+r" => "--include".to_string(),
            "-r" => "--exclude".to_string(),
            _ => arg,
        })
        .collect()
}
