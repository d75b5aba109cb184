//! Thermodynamic kinetics across temperatures.

mod common;

use std::fs;

use approx::assert_relative_eq;
use chemex::app::pipeline::run_fit;
use chemex::domain::ParamName;
use chemex::io::{DirectorySink, ResultSink};
use chemex::models::Kinetics;
use chemex::params::ParameterFile;

use common::*;

const TRUTH_EYRING: &str = r#"
[[parameter]]
name = "dh_b"
value = 6.5e3

[[parameter]]
name = "dh_ab"
value = 6.5e4

[[parameter]]
name = "dw_ab"
value = 2.0
"#;

const START_EYRING: &str = r#"
[[parameter]]
name = "dh_b"
value = 6.4e3

[[parameter]]
name = "dh_ab"
value = 6.45e4

[[parameter]]
name = "dw_ab"
value = 2.0
fixed = true
"#;

fn eyring_header(stem: &str, temperature: f64) -> String {
    format!(
        "[experiment]\nname = \"{stem}\"\nmodel = \"cpmg_2st_fast\"\nkinetics = \"2st.eyring\"\n\n[conditions]\nh_larmor_frq = 600.0\ntemperature = {temperature:.1}\nnucleus = \"15N\"\n"
    )
}

#[test]
fn eyring_fit_reports_populations_and_rates_per_temperature() {
    let dir = tempfile::tempdir().unwrap();
    let truth = write_file(dir.path(), "truth.toml", TRUTH_EYRING);
    let start = write_file(dir.path(), "start.toml", START_EYRING);
    let experiments: Vec<_> = [("cpmg_20c", 20.0), ("cpmg_30c", 30.0)]
        .into_iter()
        .map(|(stem, t)| simulate(dir.path(), stem, &eyring_header(stem, t), &["32N-HN"], &NU_CPMG, &truth))
        .collect();

    let output = dir.path().join("Output");
    let result = run_fit(&config(experiments, vec![start], output.clone())).unwrap().result;
    assert!(!result.is_flagged(), "{:?}", result.failure);

    let value = |name: &str| result.parameter(&ParamName::new(name)).unwrap().value;
    assert_relative_eq!(value("dh_b"), 6.5e3, max_relative = 1e-3);
    assert_relative_eq!(value("dh_ab"), 6.5e4, max_relative = 1e-3);
    let thermo = [value("dh_b"), value("ds_b"), value("dh_ab"), value("ds_ab")];

    let mut populations = Vec::new();
    for t in [20.0, 30.0] {
        let ex = Kinetics::TwoStateEyring { kelvin: t + 273.15 }.exchange(&thermo);
        let pb = result.parameter(&ParamName::new("pb").with_temperature(t)).unwrap();
        let kex = result.parameter(&ParamName::new("kex_ab").with_temperature(t)).unwrap();

        for row in [pb, kex] {
            assert!(row.derived, "{} not marked derived", row.name);
            assert!(!row.fixed);
            assert_eq!(row.error, None);
            assert_eq!(row.id, None);
        }
        assert_relative_eq!(pb.value, ex.pb(), max_relative = 1e-12);
        assert_relative_eq!(kex.value, ex.kex(0, 1), max_relative = 1e-12);
        populations.push(pb.value);
    }
    assert!(populations[0] != populations[1]);

    // Derived rows are written but skipped when the file is read back.
    DirectorySink::new(&output).write(&result).unwrap();
    let text = fs::read_to_string(output.join("parameters.toml")).unwrap();
    assert_eq!(text.matches("derived = true").count(), 4);
    let reloaded = ParameterFile::load(&output.join("parameters.toml")).unwrap();
    assert!(reloaded
        .entries
        .iter()
        .all(|e| e.selector.name != "pb" && e.selector.name != "kex_ab"));
    assert_eq!(
        reloaded.entries.len(),
        result.parameters.iter().filter(|p| !p.derived).count()
    );
}
