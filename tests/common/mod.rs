//! Synthetic CPMG inputs shared by the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chemex::app::pipeline::load_inputs;
use chemex::domain::{EvaluationOrder, FitConfig, GroupId, ParamName};

pub const NU_CPMG: [f64; 8] = [25.0, 50.0, 100.0, 150.0, 250.0, 400.0, 600.0, 1000.0];
pub const ERROR: f64 = 0.2;

/// Values the synthetic profiles are generated with.
pub const TRUTH: &str = r#"
[[parameter]]
name = "pb"
value = 0.05
fixed = true

[[parameter]]
name = "kex_ab"
value = 1000.0

[[parameter]]
name = "dw_ab"
value = 2.0

[[parameter]]
name = "r2_a"
b0 = 600.0
value = 10.0

[[parameter]]
name = "r2_a"
b0 = 800.0
value = 12.0
"#;

/// Starting values for the fits.
pub const START: &str = r#"
[[parameter]]
name = "pb"
value = 0.05
fixed = true

[[parameter]]
name = "kex_ab"
value = 500.0

[[parameter]]
name = "dw_ab"
value = 1.5
"#;

pub struct Experiment {
    pub stem: &'static str,
    pub field: f64,
    pub groups: &'static [&'static str],
}

pub const CPMG_600: Experiment = Experiment {
    stem: "cpmg_600",
    field: 600.0,
    groups: &["32N-HN", "33N-HN"],
};

pub const CPMG_800: Experiment = Experiment {
    stem: "cpmg_800",
    field: 800.0,
    groups: &["32N-HN"],
};

/// `[experiment]` and `[conditions]` tables of a CPMG experiment.
pub fn cpmg_header(stem: &str, field: f64) -> String {
    format!(
        "[experiment]\nname = \"{stem}\"\nmodel = \"cpmg_2st_fast\"\n\n[conditions]\nh_larmor_frq = {field:.1}\ntemperature = 25.0\nnucleus = \"15N\"\n"
    )
}

/// Descriptor text with one `[[data]]` block per group.
///
/// `values` maps a group to `(x, value)` pairs; missing points get a placeholder.
pub fn descriptor_text(
    header: &str,
    groups: &[&str],
    xs: &[f64],
    values: &BTreeMap<String, Vec<(f64, f64)>>,
) -> String {
    let mut text = header.to_string();
    for group in groups {
        text.push_str(&format!("\n[[data]]\ngroup = \"{group}\"\npoints = [\n"));
        for x in xs {
            let value = values
                .get(*group)
                .and_then(|v| v.iter().find(|(px, _)| px == x))
                .map_or(1.0, |&(_, v)| v);
            text.push_str(&format!("  [{x:?}, {value:?}, {ERROR:?}],\n"));
        }
        text.push_str("]\n");
    }
    text
}

/// Write `<stem>.toml` holding noiseless profiles back-calculated at `truth`.
///
/// Points the model drops at `truth` keep a placeholder value.
pub fn simulate(
    dir: &Path,
    stem: &str,
    header: &str,
    groups: &[&str],
    xs: &[f64],
    truth: &Path,
) -> PathBuf {
    let path = dir.join(format!("{stem}.toml"));
    fs::write(&path, descriptor_text(header, groups, xs, &BTreeMap::new())).unwrap();

    let inputs = load_inputs(&[path.clone()], &[truth.to_path_buf()]).unwrap();
    let simulated = chemex::data::simulate(&inputs.collection, &inputs.registry, 0, true).unwrap();
    let mut values = BTreeMap::new();
    for sim in &simulated {
        let dataset = inputs.collection.get(sim.dataset);
        values.insert(
            dataset.group.to_string(),
            sim.points.iter().map(|p| (p.x, p.value)).collect::<Vec<_>>(),
        );
    }
    fs::write(&path, descriptor_text(header, groups, xs, &values)).unwrap();
    path
}

/// Write noiseless CPMG profiles generated at [`TRUTH`] plus a [`START`] parameter file.
///
/// Returns the experiment paths and the start parameter path.
pub fn write_inputs(dir: &Path, experiments: &[&Experiment]) -> (Vec<PathBuf>, PathBuf) {
    let truth = dir.join("truth.toml");
    fs::write(&truth, TRUTH).unwrap();
    let paths = experiments
        .iter()
        .map(|exp| {
            simulate(
                dir,
                exp.stem,
                &cpmg_header(exp.stem, exp.field),
                exp.groups,
                &NU_CPMG,
                &truth,
            )
        })
        .collect();

    let start = dir.join("start.toml");
    fs::write(&start, START).unwrap();
    (paths, start)
}

/// Write `text` to `<dir>/<name>` and return the path.
pub fn write_file(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

pub fn config(experiments: Vec<PathBuf>, parameters: Vec<PathBuf>, output: PathBuf) -> FitConfig {
    FitConfig {
        experiments,
        parameters,
        method: None,
        output,
        exclude: Vec::new(),
        include: Vec::new(),
        order: EvaluationOrder::Parallel,
        quiet: true,
    }
}

pub fn kex() -> ParamName {
    ParamName::new("kex_ab").with_temperature(25.0)
}

pub fn dw(group: &str) -> ParamName {
    ParamName::new("dw_ab")
        .with_group(GroupId::new(group))
        .with_temperature(25.0)
}

pub fn r2(group: &str, field: f64) -> ParamName {
    ParamName::new("r2_a")
        .with_group(GroupId::new(group))
        .with_b0(field)
        .with_temperature(25.0)
}
