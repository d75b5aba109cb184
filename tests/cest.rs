//! CEST profiles: on-resonance filtering and fitting.

mod common;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use chemex::app::pipeline::{load_inputs, run_fit};
use chemex::domain::{GroupId, ParamName};

use common::*;

const GROUP: &str = "42N-HN";

const HEADER: &str = r#"[experiment]
name = "cest_600"
model = "cest_2st"

[conditions]
h_larmor_frq = 600.0
temperature = 25.0
nucleus = "15N"

[constants]
carrier = 118.0
b1_frq = 25.0
time_t1 = 0.5
on_resonance_filter = 100.0
"#;

const TRUTH_CEST: &str = r#"
[[parameter]]
name = "pb"
value = 0.1

[[parameter]]
name = "kex_ab"
value = 200.0

[[parameter]]
name = "cs_a"
value = 118.0

[[parameter]]
name = "dw_ab"
value = 3.0
"#;

const START_CEST: &str = r#"
[[parameter]]
name = "pb"
value = 0.07

[[parameter]]
name = "kex_ab"
value = 300.0

[[parameter]]
name = "cs_a"
value = 118.0

[[parameter]]
name = "dw_ab"
value = 2.8
"#;

/// One reference point, then −600 Hz to +600 Hz in 30 Hz steps.
fn offsets() -> Vec<f64> {
    std::iter::once(-2.0e4)
        .chain((-20..=20).map(|i| f64::from(i) * 30.0))
        .collect()
}

fn active_offsets(experiment: &Path, parameters: &[PathBuf]) -> Vec<f64> {
    let inputs = load_inputs(&[experiment.to_path_buf()], parameters).unwrap();
    let (_, dataset) = inputs.collection.iter().next().unwrap();
    dataset.points.iter().map(|p| p.x).collect()
}

#[test]
fn on_resonance_filter_follows_cs_a_from_parameter_files() {
    let dir = tempfile::tempdir().unwrap();
    let xs = offsets();
    let experiment = write_file(
        dir.path(),
        "cest_600.toml",
        &descriptor_text(HEADER, &[GROUP], &xs, &BTreeMap::new()),
    );

    // The default cs_a sits far outside the sampled window.
    assert_eq!(active_offsets(&experiment, &[]).len(), xs.len());

    let at_carrier = write_file(dir.path(), "carrier.toml", "[[parameter]]\nname = \"cs_a\"\nvalue = 118.0\n");
    let kept = active_offsets(&experiment, &[at_carrier]);
    assert_eq!(kept.len(), xs.len() - 3);
    for x in [-30.0, 0.0, 30.0] {
        assert!(!kept.contains(&x), "{x} Hz should be filtered");
    }
    assert!(kept.contains(&-2.0e4));

    // 2 ppm downfield is about 122 Hz at 600 MHz for 15N.
    let shifted = write_file(dir.path(), "shifted.toml", "[[parameter]]\nname = \"cs_a\"\nvalue = 120.0\n");
    let kept = active_offsets(&experiment, &[shifted]);
    assert_eq!(kept.len(), xs.len() - 3);
    for x in [90.0, 120.0, 150.0] {
        assert!(!kept.contains(&x), "{x} Hz should be filtered");
    }
    assert!(kept.contains(&0.0));
    assert!(kept.contains(&60.0) && kept.contains(&180.0));
}

#[test]
fn cest_fit_recovers_exchange_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let xs = offsets();
    let truth = write_file(dir.path(), "truth.toml", TRUTH_CEST);
    let start = write_file(dir.path(), "start.toml", START_CEST);
    let experiment = simulate(dir.path(), "cest_600", HEADER, &[GROUP], &xs, &truth);

    let run = run_fit(&config(vec![experiment], vec![start], dir.path().join("Output"))).unwrap();
    let result = run.result;
    assert!(!result.is_flagged(), "{:?}", result.failure);
    assert_eq!(result.residuals.len(), xs.len() - 3);

    let pb = ParamName::new("pb").with_temperature(25.0);
    let cs_a = ParamName::new("cs_a")
        .with_group(GroupId::new(GROUP))
        .with_temperature(25.0);
    assert_relative_eq!(result.parameter(&pb).unwrap().value, 0.1, max_relative = 1e-2);
    assert_relative_eq!(result.parameter(&kex()).unwrap().value, 200.0, max_relative = 1e-2);
    assert_relative_eq!(result.parameter(&dw(GROUP)).unwrap().value, 3.0, max_relative = 1e-3);

    let cs_a = result.parameter(&cs_a).unwrap();
    assert!(cs_a.fixed);
    assert_eq!(cs_a.value, 118.0);
}
