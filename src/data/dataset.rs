//! Datasets: ordered points sharing one model function.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{Conditions, GroupId, ParamName};
use crate::models::{ModelFn, scale_factor};
use crate::params::ParamId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DatasetId(pub(crate) usize);

impl DatasetId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One observation: independent variable, measured value and its uncertainty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub x: f64,
    pub value: f64,
    pub error: f64,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    /// `<experiment>/<group>`, unique within a collection.
    pub name: String,
    pub experiment: String,
    pub origin: PathBuf,
    pub group: GroupId,
    pub model_key: String,
    pub kinetics: Option<String>,
    pub conditions: Conditions,
    pub constants: BTreeMap<String, f64>,
    pub model: Arc<dyn ModelFn>,
    /// Sharing class of each model slot, in slot order.
    pub bindings: Vec<ParamId>,
    pub points: Vec<DataPoint>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Slot values picked out of a full value table indexed by `ParamId`.
    pub fn gather(&self, table: &[f64]) -> Vec<f64> {
        self.bindings.iter().map(|id| table[id.index()]).collect()
    }

    /// Back-calculated values at every point, scaling included.
    pub fn calculate(&self, table: &[f64]) -> Vec<f64> {
        let values = self.gather(table);
        let mut cal: Vec<f64> = self
            .points
            .iter()
            .map(|p| self.model.predict(&values, p.x))
            .collect();
        let scale = self.scale(&cal);
        if scale != 1.0 {
            cal.iter_mut().for_each(|c| *c *= scale);
        }
        cal
    }

    /// Populations and rates implied by the dataset's kinetics, keyed by temperature.
    pub fn derived(&self, table: &[f64]) -> Vec<(ParamName, f64)> {
        let Some(kinetics) = self.model.kinetics() else {
            return Vec::new();
        };
        let values = self.gather(table);
        kinetics
            .derived(&values[..kinetics.slots().len()])
            .into_iter()
            .map(|(name, value)| {
                (
                    ParamName::new(name).with_temperature(self.conditions.temperature),
                    value,
                )
            })
            .collect()
    }

    fn scale(&self, raw: &[f64]) -> f64 {
        let obs: Vec<f64> = self.points.iter().map(|p| p.value).collect();
        let err: Vec<f64> = self.points.iter().map(|p| p.error).collect();
        scale_factor(self.model.scaling(), raw, &obs, &err)
    }

    /// Write `(calculated - observed) / error` for every point into `out`.
    pub fn residuals_into(&self, table: &[f64], out: &mut [f64]) {
        let cal = self.calculate(table);
        for ((slot, p), c) in out.iter_mut().zip(&self.points).zip(cal) {
            *slot = (c - p.value) / p.error;
        }
    }

    /// Drop the points the model excludes at the current values; returns how many.
    pub fn filter_points(&mut self, table: &[f64]) -> usize {
        let values = self.gather(table);
        let before = self.points.len();
        let model = Arc::clone(&self.model);
        self.points.retain(|p| model.keep_point(&values, p.x));
        before - self.points.len()
    }

    /// Identity used to detect the same experiment loaded twice.
    pub(crate) fn identity(&self) -> String {
        let c = &self.conditions;
        let constants: Vec<String> = self
            .constants
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!(
            "{}|{}|{}|{}|{:?}|{:?}|{:?}|{}",
            self.group,
            self.model_key,
            c.h_larmor_frq,
            c.temperature,
            c.nucleus,
            c.p_total,
            c.l_total,
            constants.join(",")
        )
    }
}
