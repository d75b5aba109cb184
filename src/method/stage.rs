//! Fitting methods: ordered optimization stages.
//!
//! ```toml
//! [[stage]]
//! name = "residue specific"
//! fix = ["pb", "kex_ab"]
//!
//! [[stage]]
//! name = "global"
//! fit = ["pb", "kex_ab"]
//! tolerance = 1e-10
//! max_iterations = 500
//! timeout_secs = 600
//! optimizer = "levenberg-marquardt"
//! ```
//!
//! Parameter status carries over from one stage to the next: a stage starts from the
//! previous stage's free/fixed partition, applies its `fit` selectors, then its
//! `fix` selectors.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::FitError;
use crate::filter::ActiveSet;
use crate::params::{ParamId, ParamSelector, ParameterRegistry};

pub const DEFAULT_TOLERANCE: f64 = 1e-8;
pub const DEFAULT_STEP_TOLERANCE: f64 = 1e-10;
pub const DEFAULT_MAX_ITERATIONS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Optimizer {
    #[default]
    LevenbergMarquardt,
    GaussNewton,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitStage {
    pub name: String,
    pub fit: Vec<ParamSelector>,
    pub fix: Vec<ParamSelector>,
    /// Relative cost reduction considered converged.
    pub tolerance: f64,
    /// Step norm (internal coordinates) considered converged.
    pub step_tolerance: f64,
    pub max_iterations: usize,
    pub timeout: Option<Duration>,
    pub optimizer: Optimizer,
    /// Fit independent clusters separately before the global pass.
    pub decompose: bool,
}

impl Default for FitStage {
    fn default() -> Self {
        Self {
            name: "standard calculation".to_string(),
            fit: Vec::new(),
            fix: Vec::new(),
            tolerance: DEFAULT_TOLERANCE,
            step_tolerance: DEFAULT_STEP_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            timeout: None,
            optimizer: Optimizer::default(),
            decompose: true,
        }
    }
}

/// A stage with its resolved free parameters.
#[derive(Debug, Clone)]
pub struct StagePlan {
    /// 1-based.
    pub index: usize,
    pub stage: FitStage,
    pub free: Vec<ParamId>,
}

#[derive(Debug, Clone)]
pub struct FitMethod {
    pub origin: String,
    pub stages: Vec<FitStage>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MethodFileToml {
    #[serde(default, rename = "stage")]
    stages: Vec<StageToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StageToml {
    name: Option<String>,
    #[serde(default)]
    fit: Vec<String>,
    #[serde(default)]
    fix: Vec<String>,
    tolerance: Option<f64>,
    step_tolerance: Option<f64>,
    max_iterations: Option<usize>,
    timeout_secs: Option<f64>,
    optimizer: Option<Optimizer>,
    decompose: Option<bool>,
}

impl Default for FitMethod {
    /// One stage freeing every active parameter not fixed by its descriptor.
    fn default() -> Self {
        Self {
            origin: "default method".to_string(),
            stages: vec![FitStage::default()],
        }
    }
}

impl FitMethod {
    pub fn load(path: &Path) -> Result<Self, FitError> {
        let text = std::fs::read_to_string(path).map_err(|e| FitError::InvalidMethod {
            origin: path.display().to_string(),
            stage: None,
            message: format!("cannot read file: {e}"),
        })?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, FitError> {
        let origin = path.display().to_string();
        let invalid = |stage: Option<usize>, message: String| FitError::InvalidMethod {
            origin: origin.clone(),
            stage,
            message,
        };

        let raw: MethodFileToml = toml::from_str(text).map_err(|e| invalid(None, e.to_string()))?;

        let mut stages = Vec::with_capacity(raw.stages.len());
        for (i, s) in raw.stages.into_iter().enumerate() {
            let index = i + 1;
            let selectors = |list: Vec<String>| {
                list.iter()
                    .map(|t| ParamSelector::parse(t))
                    .collect::<Result<Vec<_>, _>>()
            };
            let fit = selectors(s.fit).map_err(|m| invalid(Some(index), m))?;
            let fix = selectors(s.fix).map_err(|m| invalid(Some(index), m))?;

            let defaults = FitStage::default();
            let tolerance = s.tolerance.unwrap_or(defaults.tolerance);
            let step_tolerance = s.step_tolerance.unwrap_or(defaults.step_tolerance);
            if !(tolerance > 0.0 && step_tolerance >= 0.0) {
                return Err(invalid(Some(index), "tolerances must be positive".to_string()));
            }
            let max_iterations = s.max_iterations.unwrap_or(defaults.max_iterations);
            if max_iterations == 0 {
                return Err(invalid(Some(index), "max_iterations must be at least 1".to_string()));
            }
            let timeout = match s.timeout_secs {
                Some(secs) if secs > 0.0 => Some(
                    Duration::try_from_secs_f64(secs)
                        .map_err(|e| invalid(Some(index), format!("invalid timeout_secs {secs}: {e}")))?,
                ),
                Some(secs) => {
                    return Err(invalid(Some(index), format!("invalid timeout_secs {secs}")));
                }
                None => None,
            };

            stages.push(FitStage {
                name: s.name.unwrap_or_else(|| format!("stage {index}")),
                fit,
                fix,
                tolerance,
                step_tolerance,
                max_iterations,
                timeout,
                optimizer: s.optimizer.unwrap_or_default(),
                decompose: s.decompose.unwrap_or(defaults.decompose),
            });
        }

        Ok(Self { origin, stages })
    }

    /// Resolve every stage's free set against the active parameters.
    pub fn plan(
        &self,
        registry: &ParameterRegistry,
        active: &ActiveSet,
    ) -> Result<Vec<StagePlan>, FitError> {
        if self.stages.is_empty() {
            return Err(FitError::InvalidMethod {
                origin: self.origin.clone(),
                stage: None,
                message: "method has no stages".to_string(),
            });
        }

        // Active classes only; status starts from the descriptors' fixed flags.
        let mut fixed: BTreeMap<ParamId, bool> = active
            .params()
            .iter()
            .map(|&id| (id, registry.get(id).fixed))
            .collect();

        let mut plans = Vec::with_capacity(self.stages.len());
        for (i, stage) in self.stages.iter().enumerate() {
            let index = i + 1;
            for selector in &stage.fit {
                let ids: Vec<ParamId> = registry
                    .resolve(selector)
                    .into_iter()
                    .filter(|id| active.contains_param(*id))
                    .collect();
                if ids.is_empty() {
                    return Err(FitError::InvalidMethod {
                        origin: self.origin.clone(),
                        stage: Some(index),
                        message: format!(
                            "stage {index} ('{}') frees '{selector}', which matches no active parameter",
                            stage.name
                        ),
                    });
                }
                for id in ids {
                    fixed.insert(id, false);
                }
            }
            for selector in &stage.fix {
                let ids: Vec<ParamId> = registry
                    .resolve(selector)
                    .into_iter()
                    .filter(|id| active.contains_param(*id))
                    .collect();
                if ids.is_empty() {
                    warn!(stage = index, selector = %selector, "fix selector matches no active parameter");
                }
                for id in ids {
                    fixed.insert(id, true);
                }
            }

            let free = fixed
                .iter()
                .filter(|&(_, &is_fixed)| !is_fixed)
                .map(|(&id, _)| id)
                .collect();
            plans.push(StagePlan {
                index,
                stage: stage.clone(),
                free,
            });
        }
        Ok(plans)
    }
}
