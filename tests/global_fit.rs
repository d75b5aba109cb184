//! Joint fits over several experiment files.

mod common;

use approx::assert_relative_eq;
use chemex::app::pipeline::run_fit;
use chemex::domain::EvaluationOrder;
use chemex::fit::EngineState;

use common::*;

#[test]
fn shared_class_gets_one_value_from_both_experiments() {
    let dir = tempfile::tempdir().unwrap();
    let (experiments, start) = write_inputs(dir.path(), &[&CPMG_600, &CPMG_800]);
    let run = run_fit(&config(experiments, vec![start], dir.path().join("Output"))).unwrap();
    let result = &run.result;

    assert!(!result.is_flagged(), "{:?}", result.failure);
    assert_eq!(result.transitions.last(), Some(&EngineState::Done));

    // One dw_ab for 32N-HN, informed by both fields; r2_a stays per field.
    let dw_entries = result
        .parameters
        .iter()
        .filter(|p| p.name == "dw_ab" && p.group.as_deref() == Some("32N-HN"))
        .count();
    assert_eq!(dw_entries, 1);
    assert_relative_eq!(result.parameter(&dw("32N-HN")).unwrap().value, 2.0, max_relative = 1e-3);
    assert_relative_eq!(result.parameter(&kex()).unwrap().value, 1000.0, max_relative = 1e-3);
    assert_relative_eq!(result.parameter(&r2("32N-HN", 600.0)).unwrap().value, 10.0, max_relative = 1e-3);
    assert_relative_eq!(result.parameter(&r2("32N-HN", 800.0)).unwrap().value, 12.0, max_relative = 1e-3);

    // Both datasets of 32N-HN read the same registry slot.
    let dw_id = run.inputs.registry.id_of(&dw("32N-HN")).unwrap();
    let readers = run
        .inputs
        .collection
        .iter()
        .filter(|(_, d)| d.bindings.contains(&dw_id))
        .count();
    assert_eq!(readers, 2);
    assert_eq!(
        run.inputs.registry.get(dw_id).value,
        result.parameter(&dw("32N-HN")).unwrap().value
    );
}

#[test]
fn degrees_of_freedom_count_active_points_and_free_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let (experiments, start) = write_inputs(dir.path(), &[&CPMG_600, &CPMG_800]);
    let result = run_fit(&config(experiments, vec![start], dir.path().join("Output")))
        .unwrap()
        .result;

    // kex_ab, dw_ab x2, r2_a x3 (pb fixed)
    assert_eq!(result.statistics.n_free, 6);
    assert_eq!(result.statistics.n_points, 3 * NU_CPMG.len());
    assert_eq!(result.statistics.dof, 3 * NU_CPMG.len() as i64 - 6);
}

#[test]
fn evaluation_order_does_not_change_the_fit() {
    let dir = tempfile::tempdir().unwrap();
    let (experiments, start) = write_inputs(dir.path(), &[&CPMG_600, &CPMG_800]);

    let values: Vec<Vec<f64>> = [
        EvaluationOrder::Parallel,
        EvaluationOrder::Forward,
        EvaluationOrder::Reverse,
    ]
    .into_iter()
    .map(|order| {
        let mut cfg = config(experiments.clone(), vec![start.clone()], dir.path().join("Output"));
        cfg.order = order;
        run_fit(&cfg)
            .unwrap()
            .result
            .parameters
            .iter()
            .map(|p| p.value)
            .collect()
    })
    .collect();

    for other in &values[1..] {
        for (a, b) in values[0].iter().zip(other) {
            assert_relative_eq!(*a, *b, max_relative = 1e-9);
        }
    }
}
