//! Parameter registry.
//!
//! The registry is an arena of sharing classes. Datasets, stages and the optimizer
//! hold [`ParamId`] keys into it; none of them owns a copy of a value. Updating a
//! class therefore updates it for every dataset that references it.
//!
//! Constraint merging rules:
//!
//! - registering an existing class intersects the bounds; an empty intersection is
//!   a `Conflict` naming both origins
//! - an explicit (user supplied) value outside the merged bounds is a `Conflict`
//! - model defaults are clamped into the merged bounds
//! - model defaults never override a user's value or fixed flag

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{Bounds, ParamName};
use crate::error::FitError;
use crate::params::ParamSelector;

/// Index of a sharing class in the registry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ParamId(usize);

impl ParamId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Where a descriptor comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// Default declared by a model; yields to anything explicit.
    ModelDefault,
    /// Parameter file or method entry.
    Explicit,
}

/// One set of constraints for one sharing class.
#[derive(Debug, Clone)]
pub struct ParamDescriptor {
    pub name: ParamName,
    pub value: Option<f64>,
    pub bounds: Bounds,
    pub fixed: Option<bool>,
    pub source: ValueSource,
    /// Descriptor path or model key, used in diagnostics.
    pub origin: String,
}

impl ParamDescriptor {
    pub fn model_default(name: ParamName, origin: impl Into<String>) -> Self {
        Self {
            name,
            value: None,
            bounds: Bounds::UNBOUNDED,
            fixed: None,
            source: ValueSource::ModelDefault,
            origin: origin.into(),
        }
    }

    pub fn explicit(name: ParamName, origin: impl Into<String>) -> Self {
        Self {
            source: ValueSource::Explicit,
            ..Self::model_default(name, origin)
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_fixed(mut self, fixed: bool) -> Self {
        self.fixed = Some(fixed);
        self
    }
}

/// A registered sharing class.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: ParamName,
    pub value: f64,
    pub bounds: Bounds,
    pub fixed: bool,
    /// Every descriptor origin that contributed to this class.
    pub origins: Vec<String>,
    value_is_explicit: bool,
    fixed_is_explicit: bool,
}

impl Parameter {
    fn origin_list(&self) -> String {
        self.origins.join(", ")
    }
}

/// Values of every registered class, indexed by [`ParamId`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    values: Vec<f64>,
}

impl Snapshot {
    pub fn value(&self, id: ParamId) -> f64 {
        self.values[id.0]
    }

    pub fn set(&mut self, id: ParamId, value: f64) {
        self.values[id.0] = value;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamId, f64)> + '_ {
        self.values.iter().enumerate().map(|(i, &v)| (ParamId(i), v))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParameterRegistry {
    params: Vec<Parameter>,
    index: HashMap<ParamName, ParamId>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, id: ParamId) -> &Parameter {
        &self.params[id.0]
    }

    pub fn id_of(&self, name: &ParamName) -> Option<ParamId> {
        self.index.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamId, &Parameter)> {
        self.params.iter().enumerate().map(|(i, p)| (ParamId(i), p))
    }

    /// Register a sharing class, merging constraints into an existing one.
    pub fn register(&mut self, desc: ParamDescriptor) -> Result<ParamId, FitError> {
        if let Some(id) = self.id_of(&desc.name) {
            self.merge(id, desc)?;
            return Ok(id);
        }

        if desc.bounds.min > desc.bounds.max {
            return Err(conflict(
                &desc.name,
                &desc.origin,
                format!("empty bounds {}", desc.bounds),
            ));
        }

        let explicit = desc.source == ValueSource::Explicit;
        let value = match desc.value {
            Some(v) if explicit && !desc.bounds.contains(v) => {
                return Err(conflict(
                    &desc.name,
                    &desc.origin,
                    format!("value {v} lies outside bounds {}", desc.bounds),
                ));
            }
            Some(v) => clamp_default(&desc.name, v, &desc.bounds),
            None => clamp_default(&desc.name, 0.0, &desc.bounds),
        };

        let id = ParamId(self.params.len());
        debug!(param = %desc.name, value, origin = %desc.origin, "registered parameter");
        self.params.push(Parameter {
            name: desc.name.clone(),
            value,
            bounds: desc.bounds,
            fixed: desc.fixed.unwrap_or(false),
            origins: vec![desc.origin],
            value_is_explicit: explicit && desc.value.is_some(),
            fixed_is_explicit: explicit && desc.fixed.is_some(),
        });
        self.index.insert(desc.name, id);
        Ok(id)
    }

    fn merge(&mut self, id: ParamId, desc: ParamDescriptor) -> Result<(), FitError> {
        let param = &mut self.params[id.0];
        let explicit = desc.source == ValueSource::Explicit;

        let Some(merged) = param.bounds.intersect(&desc.bounds) else {
            return Err(conflict(
                &param.name,
                &format!("{} vs {}", param.origin_list(), desc.origin),
                format!(
                    "bounds {} from '{}' do not overlap {} from '{}'",
                    desc.bounds,
                    desc.origin,
                    param.bounds,
                    param.origin_list()
                ),
            ));
        };

        match desc.value {
            Some(v) if explicit => {
                if !merged.contains(v) {
                    return Err(conflict(
                        &param.name,
                        &desc.origin,
                        format!("value {v} lies outside merged bounds {merged}"),
                    ));
                }
                param.value = v;
                param.value_is_explicit = true;
            }
            Some(v) if !param.value_is_explicit => param.value = v,
            _ => {}
        }

        if !merged.contains(param.value) {
            if param.value_is_explicit {
                return Err(conflict(
                    &param.name,
                    &format!("{} vs {}", param.origin_list(), desc.origin),
                    format!("value {} lies outside merged bounds {merged}", param.value),
                ));
            }
            param.value = clamp_default(&param.name, param.value, &merged);
        }
        param.bounds = merged;

        if let Some(fixed) = desc.fixed {
            if explicit || !param.fixed_is_explicit {
                param.fixed = fixed;
                param.fixed_is_explicit |= explicit;
            }
        }

        if !param.origins.contains(&desc.origin) {
            param.origins.push(desc.origin);
        }
        Ok(())
    }

    /// Apply a parameter-file entry.
    ///
    /// The selector may name a class partially (`dw_ab` for every group). Entries
    /// that match nothing register a new class when the selector is concrete; such
    /// classes stay inactive unless a dataset references them.
    pub fn apply(
        &mut self,
        selector: &ParamSelector,
        template: ParamDescriptor,
    ) -> Result<Vec<ParamId>, FitError> {
        let ids = self.resolve(selector);
        if ids.is_empty() {
            return match selector.exact_name() {
                Some(name) => {
                    warn!(
                        selector = %selector,
                        origin = %template.origin,
                        "parameter matches no model parameter; registering it as unused"
                    );
                    let id = self.register(ParamDescriptor { name, ..template })?;
                    Ok(vec![id])
                }
                None => {
                    warn!(selector = %selector, origin = %template.origin, "pattern matches no parameter");
                    Ok(Vec::new())
                }
            };
        }

        for &id in &ids {
            let name = self.params[id.0].name.clone();
            self.register(ParamDescriptor {
                name,
                ..template.clone()
            })?;
        }
        Ok(ids)
    }

    /// Every class the selector matches, in registration order.
    pub fn resolve(&self, selector: &ParamSelector) -> Vec<ParamId> {
        self.iter()
            .filter(|(_, p)| selector.matches(&p.name))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            values: self.params.iter().map(|p| p.value).collect(),
        }
    }

    /// Write snapshot values back; classes registered after the snapshot are left
    /// untouched.
    pub fn restore(&mut self, snapshot: &Snapshot) {
        for (param, &v) in self.params.iter_mut().zip(&snapshot.values) {
            param.value = v;
        }
    }
}

fn conflict(name: &ParamName, origin: &str, message: String) -> FitError {
    FitError::Conflict {
        parameter: name.to_string(),
        origin: origin.to_string(),
        message,
    }
}

fn clamp_default(name: &ParamName, value: f64, bounds: &Bounds) -> f64 {
    let clamped = bounds.clamp(value);
    if clamped != value {
        warn!(param = %name, value, clamped, "default value clamped into bounds");
    }
    clamped
}
