//! Result and simulation files.

mod common;

use std::fs;

use approx::assert_relative_eq;
use chemex::app::pipeline::{load_inputs, run_fit, run_simulate};
use chemex::domain::SimulateConfig;
use chemex::io::{DirectorySink, ResultSink, write_profiles};
use chemex::params::{ParameterFile, ParameterRegistry};

use common::*;

#[test]
fn directory_sink_writes_reloadable_results() {
    let dir = tempfile::tempdir().unwrap();
    let (experiments, start) = write_inputs(dir.path(), &[&CPMG_600, &CPMG_800]);
    let output = dir.path().join("Output");
    let run = run_fit(&config(experiments.clone(), vec![start], output.clone())).unwrap();
    DirectorySink::new(&output).write(&run.result).unwrap();

    assert!(output.join("residuals.csv").is_file());
    assert!(output.join("stages/1-standard_calculation/parameters.toml").is_file());

    let stats: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(output.join("statistics.json")).unwrap()).unwrap();
    assert_eq!(stats["flagged"], serde_json::Value::Bool(false));
    assert_eq!(stats["statistics"]["n_points"], serde_json::json!(24));

    let residual_rows = fs::read_to_string(output.join("residuals.csv"))
        .unwrap()
        .lines()
        .count();
    assert_eq!(residual_rows, 24 + 1);

    // Fitted values load back as a parameter file.
    let file = ParameterFile::load(&output.join("parameters.toml")).unwrap();
    let inputs = load_inputs(&experiments, &[]).unwrap();
    let mut registry: ParameterRegistry = inputs.registry;
    file.apply_to(&mut registry).unwrap();
    let id = registry.id_of(&kex()).unwrap();
    assert_relative_eq!(
        registry.get(id).value,
        run.result.parameter(&kex()).unwrap().value,
        max_relative = 1e-12
    );
}

#[test]
fn simulated_profiles_can_be_loaded_again() {
    let dir = tempfile::tempdir().unwrap();
    let (experiments, _) = write_inputs(dir.path(), &[&CPMG_600, &CPMG_800]);
    let truth = dir.path().join("truth.toml");
    let output = dir.path().join("Simulation");

    let config = SimulateConfig {
        experiments,
        parameters: vec![truth.clone()],
        output: output.clone(),
        seed: 11,
        noiseless: false,
    };
    let run = run_simulate(&config).unwrap();
    write_profiles(&output, &run.inputs.descriptors, &run.inputs.collection, &run.simulated).unwrap();

    assert!(output.join("cpmg_600/32N-HN.csv").is_file());
    let reloaded = load_inputs(
        &[output.join("cpmg_600.toml"), output.join("cpmg_800.toml")],
        &[truth],
    )
    .unwrap();
    assert_eq!(reloaded.collection.len(), 3);
    assert_eq!(reloaded.collection.total_points(), 3 * NU_CPMG.len());

    // Same seed, same noise.
    let again = run_simulate(&config).unwrap();
    assert_eq!(again.simulated[0].points, run.simulated[0].points);
}
