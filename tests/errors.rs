//! Configuration errors and flagged results.

mod common;

use std::fs;

use chemex::app::pipeline::{load_inputs, run_fit};
use chemex::domain::ParamName;
use chemex::error::{EXIT_CONFIG, EXIT_FLAGGED, FitError};

use common::*;

#[test]
fn disjoint_bounds_from_two_files_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let (experiments, _) = write_inputs(dir.path(), &[&CPMG_600]);
    let a = dir.path().join("a.toml");
    let b = dir.path().join("b.toml");
    fs::write(&a, "[[parameter]]\nname = \"kex_ab\"\nmin = 100.0\nmax = 500.0\n").unwrap();
    fs::write(&b, "[[parameter]]\nname = \"kex_ab\"\nmin = 800.0\nmax = 2000.0\n").unwrap();

    let err = load_inputs(&experiments, &[a, b.clone()]).unwrap_err();
    match &err {
        FitError::Conflict { parameter, origin, .. } => {
            assert!(parameter.starts_with("kex_ab"));
            assert!(origin.contains(&b.display().to_string()));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.exit_code(), EXIT_CONFIG);
}

#[test]
fn overlapping_bounds_intersect() {
    let dir = tempfile::tempdir().unwrap();
    let (experiments, _) = write_inputs(dir.path(), &[&CPMG_600]);
    let a = dir.path().join("a.toml");
    let b = dir.path().join("b.toml");
    fs::write(&a, "[[parameter]]\nname = \"kex_ab\"\nmin = 100.0\nmax = 1500.0\n").unwrap();
    fs::write(&b, "[[parameter]]\nname = \"kex_ab\"\nmin = 800.0\nmax = 2000.0\nvalue = 900.0\n").unwrap();

    let inputs = load_inputs(&experiments, &[a, b]).unwrap();
    let id = inputs
        .registry
        .id_of(&ParamName::new("kex_ab").with_temperature(25.0))
        .unwrap();
    let param = inputs.registry.get(id);
    assert_eq!(param.bounds.min, 800.0);
    assert_eq!(param.bounds.max, 1500.0);
    assert_eq!(param.value, 900.0);
}

#[test]
fn unknown_model_names_the_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(
        &path,
        "[experiment]\nname = \"x\"\nmodel = \"cpmg_9st\"\n[conditions]\nh_larmor_frq = 600.0\ntemperature = 25.0\nnucleus = \"15N\"\n[[data]]\ngroup = \"A\"\npoints = [[50.0, 10.0, 0.2]]\n",
    )
    .unwrap();
    let err = load_inputs(&[path.clone()], &[]).unwrap_err();
    assert!(matches!(err, FitError::UnknownModel { .. }));
    assert!(err.to_string().contains(&path.display().to_string()));
}

#[test]
fn same_experiment_twice_is_a_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let (experiments, _) = write_inputs(dir.path(), &[&CPMG_600]);
    let copy = dir.path().join("copy.toml");
    fs::copy(&experiments[0], &copy).unwrap();
    let err = load_inputs(&[experiments[0].clone(), copy], &[]).unwrap_err();
    assert!(matches!(err, FitError::DuplicateDataset { .. }));
}

#[test]
fn more_free_parameters_than_points_is_flagged_degenerate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tiny.toml");
    fs::write(
        &path,
        "[experiment]\nname = \"tiny\"\nmodel = \"cpmg_2st_fast\"\n[conditions]\nh_larmor_frq = 600.0\ntemperature = 25.0\nnucleus = \"15N\"\n[[data]]\ngroup = \"A\"\npoints = [[50.0, 14.0, 0.2]]\n",
    )
    .unwrap();
    let start = dir.path().join("start.toml");
    fs::write(
        &start,
        "[[parameter]]\nname = \"pb\"\nfixed = true\n\n[[parameter]]\nname = \"kex_ab\"\nfixed = true\n\n[[parameter]]\nname = \"dw_ab\"\nvalue = 1.0\n",
    )
    .unwrap();

    // dw_ab and r2_a free over a single point.
    let result = run_fit(&config(vec![path], vec![start], dir.path().join("Output")))
        .unwrap()
        .result;
    assert_eq!(result.statistics.dof, -1);
    let failure = result.failure.clone().unwrap();
    assert!(matches!(failure, FitError::DegenerateFit { points: 1, free: 2 }));
    assert_eq!(failure.exit_code(), EXIT_FLAGGED);
}
