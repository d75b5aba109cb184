//! Parameter descriptor files.
//!
//! ```toml
//! [[parameter]]
//! name = "dw_ab"
//! group = "32N-HN"
//! value = 2.0
//! min = 0.0
//!
//! [[parameter]]
//! name = "pb"
//! temperature = 25.0
//! value = 0.05
//! fixed = true
//! ```
//!
//! The `error` column written next to fitted values is accepted and ignored, and
//! `derived = true` rows are skipped, so output files can be loaded back as input.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::domain::{Bounds, ParamName, Qualifier};
use crate::error::FitError;
use crate::params::{ParamDescriptor, ParamId, ParamSelector, ParameterRegistry};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ParameterFileToml {
    #[serde(default, rename = "parameter")]
    parameters: Vec<ParameterEntryToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ParameterEntryToml {
    name: String,
    group: Option<String>,
    groups: Option<Vec<String>>,
    temperature: Option<f64>,
    b0: Option<f64>,
    value: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
    fixed: Option<bool>,
    #[allow(dead_code)]
    error: Option<f64>,
    #[serde(default)]
    derived: bool,
}

/// One entry of a parameter file: which classes it targets and what it sets.
#[derive(Debug, Clone)]
pub struct ParameterEntry {
    pub selector: ParamSelector,
    pub value: Option<f64>,
    pub bounds: Bounds,
    pub fixed: Option<bool>,
}

/// A parsed parameter file.
#[derive(Debug, Clone)]
pub struct ParameterFile {
    pub path: PathBuf,
    pub entries: Vec<ParameterEntry>,
}

impl ParameterFile {
    pub fn load(path: &Path) -> Result<Self, FitError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| FitError::parse(path.display().to_string(), format!("cannot read file: {e}")))?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, FitError> {
        let origin = path.display().to_string();
        let raw: ParameterFileToml =
            toml::from_str(text).map_err(|e| FitError::parse(origin.clone(), e.to_string()))?;

        let entries = raw
            .parameters
            .into_iter()
            .enumerate()
            .filter(|(_, entry)| !entry.derived)
            .map(|(i, entry)| entry_from_toml(entry).map_err(|m| FitError::parse(origin.clone(), format!("parameter #{}: {m}", i + 1))))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Apply every entry to the registry, in file order.
    pub fn apply_to(&self, registry: &mut ParameterRegistry) -> Result<Vec<ParamId>, FitError> {
        let origin = self.path.display().to_string();
        let mut touched = Vec::new();
        for entry in &self.entries {
            let mut template =
                ParamDescriptor::explicit(ParamName::new(&entry.selector.name), origin.clone())
                    .with_bounds(entry.bounds);
            template.value = entry.value;
            template.fixed = entry.fixed;
            touched.extend(registry.apply(&entry.selector, template)?);
        }
        info!(path = %origin, entries = self.entries.len(), classes = touched.len(), "applied parameter file");
        Ok(touched)
    }
}

fn entry_from_toml(raw: ParameterEntryToml) -> Result<ParameterEntry, String> {
    let mut selector = ParamSelector::parse(&raw.name)?;

    let listed = match (raw.group, raw.groups) {
        (Some(_), Some(_)) => return Err("'group' and 'groups' are mutually exclusive".to_string()),
        (Some(g), None) => Some(vec![g]),
        (None, Some(gs)) if gs.is_empty() => return Err("'groups' is empty".to_string()),
        (None, gs) => gs,
    };
    if let Some(groups) = listed {
        if selector.groups.is_some() {
            return Err(format!(
                "'{}' already carries a group list; drop the 'group'/'groups' key",
                raw.name
            ));
        }
        selector = selector.with_groups(groups);
    }

    selector.temperature = raw.temperature.map(Qualifier::from_f64);
    selector.b0 = raw.b0.map(Qualifier::from_f64);

    let bounds = Bounds::new(raw.min, raw.max);
    if bounds.min > bounds.max {
        return Err(format!("min {} is greater than max {}", bounds.min, bounds.max));
    }

    Ok(ParameterEntry {
        selector,
        value: raw.value,
        bounds,
        fixed: raw.fixed,
    })
}
