//! Shared pipeline logic for `chemex fit` and `chemex simulate`.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! experiments -> parameter files -> point filters -> selection -> method -> engine
//!
//! Everything that can fail on bad input happens before the engine starts, so a
//! configuration error never leaves a partial result behind.

use std::path::PathBuf;

use tracing::info;

use crate::data::{DatasetCollection, ExperimentDescriptor, SimulatedDataset, simulate};
use crate::domain::{FitConfig, SimulateConfig};
use crate::error::FitError;
use crate::filter::SelectionFilter;
use crate::fit::{CancelToken, FitResult, GlobalFitEngine};
use crate::method::FitMethod;
use crate::models::ModelCatalog;
use crate::params::{ParameterFile, ParameterRegistry};

/// Loaded experiments and parameters, ready to fit or simulate.
#[derive(Debug, Clone)]
pub struct Inputs {
    pub descriptors: Vec<ExperimentDescriptor>,
    pub collection: DatasetCollection,
    pub registry: ParameterRegistry,
}

/// All computed outputs of a single `chemex fit` run.
#[derive(Debug, Clone)]
pub struct FitRun {
    pub result: FitResult,
    pub inputs: Inputs,
}

/// All computed outputs of a single `chemex simulate` run.
#[derive(Debug, Clone)]
pub struct SimulationRun {
    pub simulated: Vec<SimulatedDataset>,
    pub inputs: Inputs,
}

/// Load experiment and parameter descriptors with the standard model catalog.
pub fn load_inputs(experiments: &[PathBuf], parameters: &[PathBuf]) -> Result<Inputs, FitError> {
    load_inputs_with(&ModelCatalog::standard(), experiments, parameters)
}

pub fn load_inputs_with(
    catalog: &ModelCatalog,
    experiments: &[PathBuf],
    parameters: &[PathBuf],
) -> Result<Inputs, FitError> {
    let mut registry = ParameterRegistry::new();
    let mut collection = DatasetCollection::new();
    let mut descriptors = Vec::with_capacity(experiments.len());

    for path in experiments {
        let desc = ExperimentDescriptor::load(path)?;
        collection.load(&desc, catalog, &mut registry)?;
        descriptors.push(desc);
    }
    for path in parameters {
        ParameterFile::load(path)?.apply_to(&mut registry)?;
    }
    collection.apply_point_filters(&registry);

    info!(
        experiments = descriptors.len(),
        datasets = collection.len(),
        points = collection.total_points(),
        parameters = registry.len(),
        "inputs loaded"
    );
    Ok(Inputs {
        descriptors,
        collection,
        registry,
    })
}

/// Execute the fitting pipeline and return the result (nothing is written here).
pub fn run_fit(config: &FitConfig) -> Result<FitRun, FitError> {
    run_fit_with_cancel(config, CancelToken::new())
}

pub fn run_fit_with_cancel(config: &FitConfig, cancel: CancelToken) -> Result<FitRun, FitError> {
    let mut inputs = load_inputs(&config.experiments, &config.parameters)?;

    let filter = SelectionFilter::new(config.exclude.clone(), config.include.clone());
    let active = filter.apply(&inputs.collection)?;

    let method = match &config.method {
        Some(path) => FitMethod::load(path)?,
        None => FitMethod::default(),
    };

    let result = GlobalFitEngine::new(&inputs.collection, &mut inputs.registry, active, &method)?
        .with_order(config.order)
        .with_cancel_token(cancel)
        .run();

    Ok(FitRun { result, inputs })
}

/// Back-calculate every dataset at the parameter files' values.
pub fn run_simulate(config: &SimulateConfig) -> Result<SimulationRun, FitError> {
    let inputs = load_inputs(&config.experiments, &config.parameters)?;
    let simulated = simulate(
        &inputs.collection,
        &inputs.registry,
        config.seed,
        config.noiseless,
    )?;
    Ok(SimulationRun { simulated, inputs })
}
