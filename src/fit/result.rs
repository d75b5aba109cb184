//! Fit results.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::ParamName;
use crate::error::FitError;
use crate::fit::{EngineState, Statistics};
use crate::params::{ParamId, Parameter};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FittedParameter {
    /// `None` for derived rows.
    #[serde(skip)]
    pub id: Option<ParamId>,
    #[serde(skip)]
    pub key: ParamName,
    pub name: String,
    pub group: Option<String>,
    pub temperature: Option<f64>,
    pub b0: Option<f64>,
    pub value: f64,
    /// Standard error; `None` for fixed parameters or when the covariance is unavailable.
    pub error: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub fixed: bool,
    /// Computed from other parameters (populations and rates of a kinetics model).
    pub derived: bool,
}

impl FittedParameter {
    pub fn new(id: ParamId, param: &Parameter, value: f64, fixed: bool) -> Self {
        let finite = |v: f64| v.is_finite().then_some(v);
        Self {
            id: Some(id),
            key: param.name.clone(),
            name: param.name.name.clone(),
            group: param.name.group.as_ref().map(ToString::to_string),
            temperature: param.name.temperature.map(|q| q.value()),
            b0: param.name.b0.map(|q| q.value()),
            value,
            error: None,
            min: finite(param.bounds.min),
            max: finite(param.bounds.max),
            fixed,
            derived: false,
        }
    }

    pub fn derived(name: ParamName, value: f64) -> Self {
        Self {
            id: None,
            name: name.name.clone(),
            group: name.group.as_ref().map(ToString::to_string),
            temperature: name.temperature.map(|q| q.value()),
            b0: name.b0.map(|q| q.value()),
            key: name,
            value,
            error: None,
            min: None,
            max: None,
            fixed: false,
            derived: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointResidual {
    pub dataset: String,
    pub group: String,
    pub x: f64,
    pub observed: f64,
    pub error: f64,
    pub calculated: f64,
    /// `(calculated − observed) / error`.
    pub residual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    /// 1-based.
    pub index: usize,
    pub name: String,
    pub n_free: usize,
    pub clusters: usize,
    pub iterations: usize,
    pub chisqr: f64,
    pub converged: bool,
    pub termination: String,
    pub elapsed_ms: u128,
    /// Active parameter values at the end of the stage.
    #[serde(skip)]
    pub parameters: Vec<FittedParameter>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FitResult {
    pub parameters: Vec<FittedParameter>,
    pub residuals: Vec<PointResidual>,
    pub statistics: Statistics,
    pub stages: Vec<StageReport>,
    pub transitions: Vec<EngineState>,
    /// Why the result is best-effort (non-convergence, cancellation, degeneracy).
    pub failure: Option<FitError>,
    pub timestamp: DateTime<Utc>,
}

impl FitResult {
    pub fn is_flagged(&self) -> bool {
        self.failure.is_some()
    }

    pub fn parameter(&self, name: &ParamName) -> Option<&FittedParameter> {
        self.parameters.iter().find(|p| &p.key == name)
    }

    pub fn stage(&self, index: usize) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.index == index)
    }
}
