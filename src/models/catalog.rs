//! Model catalog.
//!
//! A catalog maps a model key (`cpmg_2st_cr`, `cest_2st`, ...) to a builder. At load
//! time the builder receives the dataset's conditions and constants and returns an
//! immutable [`ModelFn`] shared by every point of that dataset. Adding a model means
//! registering another entry; the engine never matches on model keys.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::{Conditions, GroupId, ParamName};
use crate::error::FitError;
use crate::models::Kinetics;

/// How the parameters a slot binds to are shared between datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// One value for the whole run (thermodynamic parameters).
    Global,
    /// One value per temperature (populations, exchange rates).
    Temperature,
    /// One value per group and temperature (chemical shifts).
    GroupTemperature,
    /// One value per group, field and temperature (relaxation rates).
    GroupFieldTemperature,
}

/// A parameter a model reads, with the default constraints it registers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotSpec {
    pub name: &'static str,
    pub scope: Scope,
    pub default: f64,
    pub min: f64,
    pub max: f64,
    pub fixed: bool,
}

impl SlotSpec {
    pub const fn new(name: &'static str, scope: Scope, default: f64) -> Self {
        Self {
            name,
            scope,
            default,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            fixed: false,
        }
    }

    pub const fn min(mut self, min: f64) -> Self {
        self.min = min;
        self
    }

    pub const fn range(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub const fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }

    /// Sharing class of this slot for a dataset.
    pub fn param_name(&self, group: &GroupId, conditions: &Conditions) -> ParamName {
        let name = ParamName::new(self.name);
        match self.scope {
            Scope::Global => name,
            Scope::Temperature => name.with_temperature(conditions.temperature),
            Scope::GroupTemperature => name
                .with_group(group.clone())
                .with_temperature(conditions.temperature),
            Scope::GroupFieldTemperature => name
                .with_group(group.clone())
                .with_b0(conditions.h_larmor_frq)
                .with_temperature(conditions.temperature),
        }
    }
}

/// Post-processing applied to a dataset's raw predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scaling {
    #[default]
    None,
    /// Least-squares intensity scale `Σ(cal·obs/σ²) / Σ(cal²/σ²)`.
    Analytic,
}

/// Per-dataset model function.
///
/// `values` holds one entry per slot, in [`ModelFn::slots`] order. `predict` must be
/// pure: the same inputs always give the same output.
pub trait ModelFn: Send + Sync + fmt::Debug {
    fn slots(&self) -> &[SlotSpec];

    fn predict(&self, values: &[f64], x: f64) -> f64;

    fn scaling(&self) -> Scaling {
        Scaling::None
    }

    /// Reject independent-variable values the model cannot evaluate.
    fn check_x(&self, _x: f64) -> Result<(), String> {
        Ok(())
    }

    /// Exchange kinetics read from the leading slots, if any.
    fn kinetics(&self) -> Option<Kinetics> {
        None
    }

    /// Whether a point takes part in the fit once parameter files are applied.
    fn keep_point(&self, _values: &[f64], _x: f64) -> bool {
        true
    }
}

/// Everything a builder may read from an experiment descriptor.
#[derive(Debug, Clone)]
pub struct ModelContext {
    pub key: String,
    /// Descriptor path, for diagnostics.
    pub origin: String,
    pub conditions: Conditions,
    pub kinetics: Option<String>,
    pub constants: BTreeMap<String, f64>,
}

impl ModelContext {
    pub fn constant(&self, name: &str) -> Result<f64, FitError> {
        self.constants.get(name).copied().ok_or_else(|| {
            FitError::parse(
                self.origin.clone(),
                format!("model '{}' requires constant '{name}'", self.key),
            )
        })
    }

    pub fn constant_or(&self, name: &str, default: f64) -> f64 {
        self.constants.get(name).copied().unwrap_or(default)
    }
}

pub type ModelBuilder = fn(&ModelContext) -> Result<Arc<dyn ModelFn>, FitError>;

#[derive(Clone)]
pub struct ModelEntry {
    pub key: String,
    pub description: String,
    builder: ModelBuilder,
}

impl ModelEntry {
    pub fn new(key: &str, description: &str, builder: ModelBuilder) -> Self {
        Self {
            key: key.to_string(),
            description: description.to_string(),
            builder,
        }
    }

    pub fn build(&self, ctx: &ModelContext) -> Result<Arc<dyn ModelFn>, FitError> {
        (self.builder)(ctx)
    }
}

impl fmt::Debug for ModelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelEntry")
            .field("key", &self.key)
            .field("description", &self.description)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    entries: BTreeMap<String, ModelEntry>,
}

impl ModelCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog with every built-in experiment.
    pub fn standard() -> Self {
        let mut catalog = Self::empty();
        catalog.register(ModelEntry::new(
            "cpmg_2st_cr",
            "CPMG R2,eff, two-state Carver-Richards",
            crate::models::cpmg::build_carver_richards,
        ));
        catalog.register(ModelEntry::new(
            "cpmg_2st_fast",
            "CPMG R2,eff, two-state fast-exchange limit",
            crate::models::cpmg::build_fast_exchange,
        ));
        catalog.register(ModelEntry::new(
            "cest_2st",
            "CEST intensities, two-state Bloch-McConnell",
            crate::models::cest::build_two_state,
        ));
        catalog.register(ModelEntry::new(
            "cest_3st",
            "CEST intensities, three-state Bloch-McConnell",
            crate::models::cest::build_three_state,
        ));
        catalog.register(ModelEntry::new(
            "relax_r1",
            "longitudinal relaxation decay",
            crate::models::relaxation::build_r1_decay,
        ));
        catalog
    }

    /// Add or replace an entry.
    pub fn register(&mut self, entry: ModelEntry) {
        self.entries.insert(entry.key.to_lowercase(), entry);
    }

    pub fn get(&self, key: &str, origin: &str) -> Result<&ModelEntry, FitError> {
        self.entries
            .get(&key.trim().to_lowercase())
            .ok_or_else(|| FitError::UnknownModel {
                key: key.to_string(),
                origin: origin.to_string(),
            })
    }
}

/// Factor applied to raw predictions of a dataset.
pub fn scale_factor(scaling: Scaling, cal: &[f64], obs: &[f64], err: &[f64]) -> f64 {
    if scaling == Scaling::None {
        return 1.0;
    }
    let (mut num, mut den) = (0.0, 0.0);
    for ((&c, &o), &e) in cal.iter().zip(obs).zip(err) {
        let w = 1.0 / (e * e);
        num += c * o * w;
        den += c * c * w;
    }
    if den > 0.0 { num / den } else { 1.0 }
}
