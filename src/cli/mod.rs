//! Command-line parsing.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the fitting code.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::domain::EvaluationOrder;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "chemex",
    version,
    about = "Global fitting of NMR relaxation-dispersion and CEST data"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Worker threads for residual and Jacobian evaluation (default: all cores).
    #[arg(long, global = true)]
    pub threads: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit one or more experiments jointly and write the results.
    Fit(FitArgs),
    /// Back-calculate synthetic profiles from parameter files.
    Simulate(SimulateArgs),
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Experiment descriptor files.
    #[arg(short = 'e', long = "experiments", num_args = 1.., required = true, value_name = "FILE")]
    pub experiments: Vec<PathBuf>,

    /// Parameter descriptor files (initial values, bounds, fixed flags).
    #[arg(short = 'p', long = "parameters", num_args = 1.., value_name = "FILE")]
    pub parameters: Vec<PathBuf>,

    /// Fitting method (stage schedule). Default: one stage freeing every parameter.
    #[arg(short = 'm', long = "method", value_name = "FILE")]
    pub method: Option<PathBuf>,

    /// Output directory.
    #[arg(short = 'o', long = "output", default_value = "Output", value_name = "DIR")]
    pub output: PathBuf,

    /// Groups to remove from the fit (`-r`).
    #[arg(short = 'r', long = "exclude", num_args = 1.., value_name = "GROUP")]
    pub exclude: Vec<String>,

    /// Groups to keep, all others are removed (`+r`).
    #[arg(long = "include", num_args = 1.., value_name = "GROUP")]
    pub include: Vec<String>,

    /// Residual evaluation order.
    #[arg(long, value_enum, default_value_t = EvaluationOrder::Parallel)]
    pub order: EvaluationOrder,

    /// Do not print the terminal summary.
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Experiment descriptor files (their x values and uncertainties are reused).
    #[arg(short = 'e', long = "experiments", num_args = 1.., required = true, value_name = "FILE")]
    pub experiments: Vec<PathBuf>,

    /// Parameter descriptor files with the values to simulate.
    #[arg(short = 'p', long = "parameters", num_args = 1.., value_name = "FILE")]
    pub parameters: Vec<PathBuf>,

    /// Output directory.
    #[arg(short = 'o', long = "output", default_value = "Simulation", value_name = "DIR")]
    pub output: PathBuf,

    /// Random seed for the noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Write exact back-calculated values.
    #[arg(long)]
    pub noiseless: bool,
}
