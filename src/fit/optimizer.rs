//! Bounded nonlinear least squares.
//!
//! A [`Problem`] is one residual function `r(x)` over a subset of the free sharing
//! classes; every other class keeps the value it has in the starting table. `x` lives
//! in the unbounded internal space of [`crate::math::bounds`], so steps never leave
//! the feasible box.
//!
//! [`minimize`] runs Levenberg–Marquardt (or undamped Gauss–Newton with step
//! halving) with a forward-difference Jacobian whose columns are evaluated in
//! parallel.

use std::time::Instant;

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::data::{DatasetCollection, DatasetId};
use crate::domain::{Bounds, EvaluationOrder};
use crate::fit::{CancelToken, ResidualLayout};
use crate::math::{damped_step, derivative, to_external, to_internal};
use crate::method::{FitStage, Optimizer};
use crate::params::{ParamId, ParameterRegistry};

const FD_STEP: f64 = 1.490_116_119_384_765_6e-8;
const LAMBDA_START: f64 = 1e-3;
const LAMBDA_UP: f64 = 11.0;
const LAMBDA_DOWN: f64 = 9.0;
const LAMBDA_MAX: f64 = 1e16;
const MAX_HALVINGS: usize = 30;

pub struct Problem<'a> {
    collection: &'a DatasetCollection,
    layout: ResidualLayout,
    table: Vec<f64>,
    free: Vec<ParamId>,
    bounds: Vec<Bounds>,
    order: EvaluationOrder,
}

impl<'a> Problem<'a> {
    pub fn new(
        collection: &'a DatasetCollection,
        datasets: &[DatasetId],
        table: &[f64],
        free: &[ParamId],
        registry: &ParameterRegistry,
        order: EvaluationOrder,
    ) -> Self {
        Self {
            collection,
            layout: ResidualLayout::new(collection, datasets),
            table: table.to_vec(),
            free: free.to_vec(),
            bounds: free.iter().map(|&id| registry.get(id).bounds).collect(),
            order,
        }
    }

    pub fn n_free(&self) -> usize {
        self.free.len()
    }

    /// Internal coordinates of the starting values.
    pub fn start(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.free.len(),
            self.free
                .iter()
                .zip(&self.bounds)
                .map(|(id, b)| to_internal(self.table[id.index()], b)),
        )
    }

    /// External values of the free classes.
    pub fn external(&self, internal: &DVector<f64>) -> Vec<f64> {
        internal
            .iter()
            .zip(&self.bounds)
            .map(|(&i, b)| to_external(i, b))
            .collect()
    }

    /// `dx/di` of each free class.
    pub fn derivatives(&self, internal: &DVector<f64>) -> Vec<f64> {
        internal
            .iter()
            .zip(&self.bounds)
            .map(|(&i, b)| derivative(i, b))
            .collect()
    }

    /// Full value table with the free classes set from `internal`.
    pub fn table(&self, internal: &DVector<f64>) -> Vec<f64> {
        let mut table = self.table.clone();
        for (id, value) in self.free.iter().zip(self.external(internal)) {
            table[id.index()] = value;
        }
        table
    }

    pub fn residuals(&self, internal: &DVector<f64>) -> DVector<f64> {
        let table = self.table(internal);
        let r = self.layout.residuals(self.collection, &table, self.order);
        DVector::from_vec(r)
    }

    /// Forward-difference Jacobian in internal coordinates.
    pub fn jacobian(&self, internal: &DVector<f64>, r0: &DVector<f64>) -> DMatrix<f64> {
        let columns: Vec<DVector<f64>> = (0..self.free.len())
            .into_par_iter()
            .map(|j| {
                let h = FD_STEP * internal[j].abs().max(1.0);
                let mut shifted = internal.clone();
                shifted[j] += h;
                let mut col = (self.residuals(&shifted) - r0) / h;
                col.iter_mut().filter(|v| !v.is_finite()).for_each(|v| *v = 0.0);
                col
            })
            .collect();
        DMatrix::from_columns(&columns)
    }
}

/// Convergence settings of one stage.
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub optimizer: Optimizer,
    pub tolerance: f64,
    pub step_tolerance: f64,
    pub max_iterations: usize,
    pub deadline: Option<Instant>,
}

impl Settings {
    pub fn for_stage(stage: &FitStage, started: Instant) -> Self {
        Self {
            optimizer: stage.optimizer,
            tolerance: stage.tolerance,
            step_tolerance: stage.step_tolerance,
            max_iterations: stage.max_iterations,
            // A deadline past what `Instant` can represent means no deadline.
            deadline: stage.timeout.and_then(|t| started.checked_add(t)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Converged,
    MaxIterations,
    Timeout,
    Cancelled,
    NonFinite,
}

impl Termination {
    pub fn reason(self) -> &'static str {
        match self {
            Self::Converged => "converged",
            Self::MaxIterations => "iteration limit reached",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::NonFinite => "non-finite residuals at the starting values",
        }
    }
}

/// Best point found (always the lowest cost seen).
#[derive(Debug, Clone)]
pub struct Minimum {
    pub internal: DVector<f64>,
    pub residuals: DVector<f64>,
    pub cost: f64,
    pub iterations: usize,
    pub termination: Termination,
}

pub fn minimize(problem: &Problem<'_>, settings: &Settings, cancel: &CancelToken) -> Minimum {
    let mut x = problem.start();
    let mut r = problem.residuals(&x);
    let mut cost = r.norm_squared();

    let finish = |x, r, cost, iterations, termination| Minimum {
        internal: x,
        residuals: r,
        cost,
        iterations,
        termination,
    };

    if !cost.is_finite() {
        return finish(x, r, cost, 0, Termination::NonFinite);
    }
    if problem.n_free() == 0 {
        return finish(x, r, cost, 0, Termination::Converged);
    }

    let mut lambda = match settings.optimizer {
        Optimizer::LevenbergMarquardt => LAMBDA_START,
        Optimizer::GaussNewton => 0.0,
    };
    let mut small_reductions = 0;

    for iteration in 1..=settings.max_iterations {
        if cancel.is_cancelled() {
            return finish(x, r, cost, iteration - 1, Termination::Cancelled);
        }
        if settings.deadline.is_some_and(|d| Instant::now() >= d) {
            return finish(x, r, cost, iteration - 1, Termination::Timeout);
        }
        if cost == 0.0 {
            return finish(x, r, cost, iteration - 1, Termination::Converged);
        }

        let jac = problem.jacobian(&x, &r);
        let accepted = match settings.optimizer {
            Optimizer::LevenbergMarquardt => lm_step(problem, &jac, &x, &r, cost, &mut lambda),
            Optimizer::GaussNewton => gn_step(problem, &jac, &x, &r, cost),
        };
        let Some((step, x_new, r_new, cost_new)) = accepted else {
            debug!(iteration, cost, "no downhill step; stationary point");
            return finish(x, r, cost, iteration, Termination::Converged);
        };

        let reduction = (cost - cost_new) / cost;
        x = x_new;
        r = r_new;
        cost = cost_new;
        trace!(iteration, cost, lambda, step = step.norm(), "step accepted");

        if step.norm() <= settings.step_tolerance * (x.norm() + settings.step_tolerance) {
            return finish(x, r, cost, iteration, Termination::Converged);
        }
        if reduction < settings.tolerance {
            small_reductions += 1;
            if small_reductions >= 2 {
                return finish(x, r, cost, iteration, Termination::Converged);
            }
        } else {
            small_reductions = 0;
        }
    }

    finish(x, r, cost, settings.max_iterations, Termination::MaxIterations)
}

type Step = (DVector<f64>, DVector<f64>, DVector<f64>, f64);

fn lm_step(
    problem: &Problem<'_>,
    jac: &DMatrix<f64>,
    x: &DVector<f64>,
    r: &DVector<f64>,
    cost: f64,
    lambda: &mut f64,
) -> Option<Step> {
    while *lambda <= LAMBDA_MAX {
        if let Some(step) = damped_step(jac, r, *lambda) {
            let x_new = x + &step;
            let r_new = problem.residuals(&x_new);
            let cost_new = r_new.norm_squared();
            if cost_new.is_finite() && cost_new < cost {
                *lambda = (*lambda / LAMBDA_DOWN).max(1e-12);
                return Some((step, x_new, r_new, cost_new));
            }
        }
        *lambda *= LAMBDA_UP;
    }
    *lambda = LAMBDA_START;
    None
}

fn gn_step(
    problem: &Problem<'_>,
    jac: &DMatrix<f64>,
    x: &DVector<f64>,
    r: &DVector<f64>,
    cost: f64,
) -> Option<Step> {
    let mut step = damped_step(jac, r, 0.0)?;
    for _ in 0..MAX_HALVINGS {
        let x_new = x + &step;
        let r_new = problem.residuals(&x_new);
        let cost_new = r_new.norm_squared();
        if cost_new.is_finite() && cost_new < cost {
            return Some((step, x_new, r_new, cost_new));
        }
        step /= 2.0;
    }
    None
}
