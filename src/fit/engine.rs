//! Global fit engine.
//!
//! The engine walks the stages of a method as an explicit state machine:
//!
//! ```text
//! Idle → StageRunning(1) → StageConverged(1) → … → Done
//!                   └──────────────────────────────→ Failed
//! ```
//!
//! Each stage starts from the registry values left by the previous one and writes
//! its best values back before the next stage starts. A stage that stops early
//! (iteration cap, timeout, cancellation) still writes back its best values; the
//! run then ends in `Failed` and the result carries the diagnostic.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::data::DatasetCollection;
use crate::domain::EvaluationOrder;
use crate::error::FitError;
use crate::filter::ActiveSet;
use crate::fit::{
    FitResult, FittedParameter, PointResidual, Problem, Settings, StageReport, Statistics,
    Termination, independent_clusters, minimize, standard_errors,
};
use crate::method::{FitMethod, StagePlan};
use crate::params::{ParamId, ParameterRegistry, Snapshot};

/// Shared cancellation flag, checked between optimizer iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    StageRunning(usize),
    StageConverged(usize),
    Done,
    Failed,
}

struct StageOutcome {
    values: Snapshot,
    clusters: usize,
    iterations: usize,
    chisqr: f64,
    termination: Termination,
}

pub struct GlobalFitEngine<'a> {
    collection: &'a DatasetCollection,
    registry: &'a mut ParameterRegistry,
    active: ActiveSet,
    plans: Vec<StagePlan>,
    order: EvaluationOrder,
    cancel: CancelToken,
    state: EngineState,
    transitions: Vec<EngineState>,
}

impl<'a> GlobalFitEngine<'a> {
    /// Validate the method against the active set; nothing runs yet.
    pub fn new(
        collection: &'a DatasetCollection,
        registry: &'a mut ParameterRegistry,
        active: ActiveSet,
        method: &FitMethod,
    ) -> Result<Self, FitError> {
        if active.is_empty() {
            return Err(FitError::Configuration {
                message: "no active data points after selection".to_string(),
            });
        }
        let plans = method.plan(registry, &active)?;
        Ok(Self {
            collection,
            registry,
            active,
            plans,
            order: EvaluationOrder::default(),
            cancel: CancelToken::new(),
            state: EngineState::Idle,
            transitions: vec![EngineState::Idle],
        })
    }

    pub fn with_order(mut self, order: EvaluationOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Run every stage and finalize the result. Consumes the engine.
    pub fn run(mut self) -> FitResult {
        let plans = std::mem::take(&mut self.plans);
        info!(
            stages = plans.len(),
            datasets = self.active.datasets().len(),
            points = self.active.n_points(),
            parameters = self.active.params().len(),
            "starting fit"
        );

        let mut stages = Vec::with_capacity(plans.len());
        let mut failure = None;
        let mut final_free: &[ParamId] = &[];

        for plan in &plans {
            self.transition(EngineState::StageRunning(plan.index));
            info!(stage = plan.index, name = %plan.stage.name, free = plan.free.len(), "stage started");

            let started = Instant::now();
            let outcome = self.run_stage(plan, started);
            self.registry.restore(&outcome.values);
            final_free = &plan.free;

            let converged = outcome.termination == Termination::Converged;
            stages.push(StageReport {
                index: plan.index,
                name: plan.stage.name.clone(),
                n_free: plan.free.len(),
                clusters: outcome.clusters,
                iterations: outcome.iterations,
                chisqr: outcome.chisqr,
                converged,
                termination: outcome.termination.reason().to_string(),
                elapsed_ms: started.elapsed().as_millis(),
                parameters: self.active_parameters(&plan.free),
            });

            match outcome.termination {
                Termination::Converged => {
                    info!(
                        stage = plan.index,
                        iterations = outcome.iterations,
                        chisqr = outcome.chisqr,
                        "stage converged"
                    );
                    self.transition(EngineState::StageConverged(plan.index));
                }
                Termination::Cancelled => {
                    warn!(stage = plan.index, iterations = outcome.iterations, "fit cancelled");
                    failure = Some(FitError::Cancelled {
                        stage: plan.index,
                        iterations: outcome.iterations,
                    });
                    break;
                }
                other => {
                    warn!(stage = plan.index, reason = other.reason(), "stage did not converge");
                    failure = Some(FitError::NonConvergence {
                        stage: plan.index,
                        stage_name: plan.stage.name.clone(),
                        iterations: outcome.iterations,
                        reason: other.reason().to_string(),
                    });
                    break;
                }
            }
        }

        let final_free = final_free.to_vec();
        let (parameters, statistics) = self.finalize(&final_free);
        if statistics.is_degenerate() {
            warn!(points = statistics.n_points, free = statistics.n_free, "degenerate fit");
            failure.get_or_insert(FitError::DegenerateFit {
                points: statistics.n_points,
                free: statistics.n_free,
            });
        }

        self.transition(if failure.is_some() {
            EngineState::Failed
        } else {
            EngineState::Done
        });

        FitResult {
            parameters,
            residuals: self.point_residuals(),
            statistics,
            stages,
            transitions: self.transitions,
            failure,
            timestamp: Utc::now(),
        }
    }

    fn transition(&mut self, next: EngineState) {
        debug!(from = ?self.state, to = ?next, "engine transition");
        self.state = next;
        self.transitions.push(next);
    }

    fn run_stage(&self, plan: &StagePlan, started: Instant) -> StageOutcome {
        let settings = Settings::for_stage(&plan.stage, started);
        let mut table = self.registry.snapshot();
        let mut clusters = 1;

        if plan.stage.decompose && !plan.free.is_empty() {
            let parts = independent_clusters(self.collection, self.active.datasets(), &plan.free);
            if parts.len() > 1 {
                clusters = parts.len();
                info!(stage = plan.index, clusters, "fitting independent clusters");
                let start = table.clone();
                let fitted: Vec<(Vec<ParamId>, Vec<f64>, Termination)> = parts
                    .par_iter()
                    .map(|cluster| {
                        let problem = Problem::new(
                            self.collection,
                            &cluster.datasets,
                            start.as_slice(),
                            &cluster.free,
                            self.registry,
                            self.order,
                        );
                        let min = minimize(&problem, &settings, &self.cancel);
                        (cluster.free.clone(), problem.external(&min.internal), min.termination)
                    })
                    .collect();

                for (free, values, termination) in fitted {
                    for (id, v) in free.into_iter().zip(values) {
                        table.set(id, v);
                    }
                    if termination != Termination::Converged {
                        debug!(stage = plan.index, reason = termination.reason(), "cluster stopped early");
                    }
                }
            }
        }

        // Finalizing pass over every active dataset.
        let problem = Problem::new(
            self.collection,
            self.active.datasets(),
            table.as_slice(),
            &plan.free,
            self.registry,
            self.order,
        );
        let min = minimize(&problem, &settings, &self.cancel);
        for (&id, v) in plan.free.iter().zip(problem.external(&min.internal)) {
            table.set(id, v);
        }

        StageOutcome {
            values: table,
            clusters,
            iterations: min.iterations,
            chisqr: min.cost,
            termination: min.termination,
        }
    }

    /// Parameter table and statistics at the registry's current values.
    fn finalize(&self, free: &[ParamId]) -> (Vec<FittedParameter>, Statistics) {
        let problem = Problem::new(
            self.collection,
            self.active.datasets(),
            self.registry.snapshot().as_slice(),
            free,
            self.registry,
            self.order,
        );
        let x = problem.start();
        let r = problem.residuals(&x);
        let statistics = Statistics::compute(r.as_slice(), free.len());

        let errors = statistics.redchi.and_then(|redchi| {
            let jac = problem.jacobian(&x, &r);
            standard_errors(&jac, &problem.derivatives(&x), redchi)
        });
        if errors.is_none() && !free.is_empty() {
            warn!("parameter uncertainties unavailable");
        }

        let mut parameters = self.active_parameters(free);
        if let Some(errors) = errors {
            for (id, err) in free.iter().zip(errors) {
                if let Some(p) = parameters.iter_mut().find(|p| p.id == Some(*id)) {
                    p.error = Some(err);
                }
            }
        }

        let table = self.registry.snapshot();
        for &id in self.active.datasets() {
            for (name, value) in self.collection.get(id).derived(table.as_slice()) {
                match parameters.iter().find(|p| p.key == name) {
                    Some(seen) if seen.derived && seen.value != value => {
                        debug!(param = %name, kept = seen.value, other = value, "derived value differs between datasets");
                    }
                    Some(_) => {}
                    None => parameters.push(FittedParameter::derived(name, value)),
                }
            }
        }
        (parameters, statistics)
    }

    fn active_parameters(&self, free: &[ParamId]) -> Vec<FittedParameter> {
        self.active
            .params()
            .iter()
            .map(|&id| {
                let param = self.registry.get(id);
                FittedParameter::new(id, param, param.value, !free.contains(&id))
            })
            .collect()
    }

    fn point_residuals(&self) -> Vec<PointResidual> {
        let table = self.registry.snapshot();
        let mut out = Vec::with_capacity(self.active.n_points());
        for &id in self.active.datasets() {
            let d = self.collection.get(id);
            let calculated = d.calculate(table.as_slice());
            for (p, c) in d.points.iter().zip(calculated) {
                out.push(PointResidual {
                    dataset: d.name.clone(),
                    group: d.group.to_string(),
                    x: p.x,
                    observed: p.value,
                    error: p.error,
                    calculated: c,
                    residual: (c - p.value) / p.error,
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use approx::assert_relative_eq;

    use super::*;
    use crate::data::ExperimentDescriptor;
    use crate::domain::{GroupId, ParamName};
    use crate::filter::SelectionFilter;
    use crate::models::ModelCatalog;

    fn r1_collection(groups: &[(&str, f64, usize)]) -> (DatasetCollection, ParameterRegistry) {
        let mut text = String::from(
            "[experiment]\nname = \"r1\"\nmodel = \"relax_r1\"\n[conditions]\nh_larmor_frq = 600.0\ntemperature = 25.0\nnucleus = \"15N\"\n",
        );
        for &(g, rate, n) in groups {
            text.push_str(&format!("[[data]]\ngroup = \"{g}\"\npoints = ["));
            for k in 0..n {
                let t = 0.25 * k as f64;
                text.push_str(&format!("[{t}, {}, 0.01],", 2.0 * (-rate * t).exp()));
            }
            text.push_str("]\n");
        }
        let desc = ExperimentDescriptor::parse(&text, Path::new("r1.toml")).unwrap();
        let mut registry = ParameterRegistry::new();
        let mut collection = DatasetCollection::new();
        collection
            .load(&desc, &ModelCatalog::standard(), &mut registry)
            .unwrap();
        (collection, registry)
    }

    fn r1(group: &str) -> ParamName {
        ParamName::new("r1_a")
            .with_group(GroupId::new(group))
            .with_b0(600.0)
            .with_temperature(25.0)
    }

    #[test]
    fn default_method_reaches_done() {
        let (collection, mut registry) = r1_collection(&[("A", 1.2, 6), ("B", 2.5, 6)]);
        let active = ActiveSet::all(&collection);
        let engine =
            GlobalFitEngine::new(&collection, &mut registry, active, &FitMethod::default()).unwrap();
        assert_eq!(engine.state(), EngineState::Idle);
        let result = engine.run();

        assert!(!result.is_flagged());
        assert_eq!(
            result.transitions,
            vec![
                EngineState::Idle,
                EngineState::StageRunning(1),
                EngineState::StageConverged(1),
                EngineState::Done
            ]
        );
        assert_eq!(result.stages[0].clusters, 2);
        assert_relative_eq!(result.parameter(&r1("A")).unwrap().value, 1.2, epsilon = 1e-5);
        assert_relative_eq!(result.parameter(&r1("B")).unwrap().value, 2.5, epsilon = 1e-5);
        assert_eq!(result.statistics.dof, 10);
        assert_eq!(result.residuals.len(), 12);
        assert!(result.parameters.iter().all(|p| p.error.is_some()));
    }

    #[test]
    fn registry_holds_final_values() {
        let (collection, mut registry) = r1_collection(&[("A", 1.2, 6)]);
        let active = ActiveSet::all(&collection);
        let result = GlobalFitEngine::new(&collection, &mut registry, active, &FitMethod::default())
            .unwrap()
            .run();
        let id = registry.id_of(&r1("A")).unwrap();
        assert_eq!(registry.get(id).value, result.parameter(&r1("A")).unwrap().value);
    }

    #[test]
    fn degenerate_fit_is_flagged() {
        let (collection, mut registry) = r1_collection(&[("A", 1.2, 1)]);
        let active = ActiveSet::all(&collection);
        let result = GlobalFitEngine::new(&collection, &mut registry, active, &FitMethod::default())
            .unwrap()
            .run();
        assert_eq!(result.statistics.dof, 0);
        assert!(matches!(
            result.failure,
            Some(FitError::DegenerateFit { points: 1, free: 1 })
        ));
        assert_eq!(result.transitions.last(), Some(&EngineState::Failed));
    }

    #[test]
    fn cancelled_run_keeps_initial_values() {
        let (collection, mut registry) = r1_collection(&[("A", 1.2, 6)]);
        let active = ActiveSet::all(&collection);
        let token = CancelToken::new();
        token.cancel();
        let result = GlobalFitEngine::new(&collection, &mut registry, active, &FitMethod::default())
            .unwrap()
            .with_cancel_token(token)
            .run();
        assert!(matches!(result.failure, Some(FitError::Cancelled { stage: 1, .. })));
        assert_relative_eq!(result.parameter(&r1("A")).unwrap().value, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn iteration_cap_flags_non_convergence_with_best_values() {
        let (collection, mut registry) = r1_collection(&[("A", 1.2, 6)]);
        let active = ActiveSet::all(&collection);
        let method = FitMethod::parse("[[stage]]\nname = \"short\"\nmax_iterations = 1\n", Path::new("m.toml"))
            .unwrap();
        let result = GlobalFitEngine::new(&collection, &mut registry, active, &method)
            .unwrap()
            .run();
        match &result.failure {
            Some(FitError::NonConvergence { stage, iterations, .. }) => {
                assert_eq!(*stage, 1);
                assert_eq!(*iterations, 1);
            }
            other => panic!("unexpected failure: {other:?}"),
        }
        // One accepted step already moves r1_a away from its start.
        assert!(result.parameter(&r1("A")).unwrap().value != 1.0);
        assert!(!result.stages[0].converged);
    }

    #[test]
    fn empty_selection_is_rejected() {
        let (collection, mut registry) = r1_collection(&[("A", 1.2, 6)]);
        let active = SelectionFilter::excluding(&["A"]).apply(&collection).unwrap();
        let err = GlobalFitEngine::new(&collection, &mut registry, active, &FitMethod::default())
            .err()
            .unwrap();
        assert!(matches!(err, FitError::Configuration { .. }));
    }
}
