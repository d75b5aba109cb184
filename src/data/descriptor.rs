//! Experiment descriptor files.
//!
//! ```toml
//! [experiment]
//! name = "cpmg_15n_600mhz"
//! model = "cpmg_2st_cr"
//! kinetics = "2st.pb_kex"      # optional
//!
//! [conditions]
//! h_larmor_frq = 600.0
//! temperature = 25.0
//! nucleus = "15N"
//!
//! [constants]                  # model specific
//!
//! [[data]]
//! group = "32N-HN"
//! points = [[50.0, 12.1, 0.3], [100.0, 11.4, 0.3]]
//!
//! [[data]]
//! group = "33N-HN"
//! file = "33N-HN.csv"          # columns x,value,error; relative to this file
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::DataPoint;
use crate::domain::{Conditions, GroupId, Nucleus};
use crate::error::FitError;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExperimentFileToml {
    experiment: ExperimentToml,
    conditions: ConditionsToml,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    constants: BTreeMap<String, f64>,
    #[serde(default)]
    data: Vec<DataBlockToml>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExperimentToml {
    name: String,
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kinetics: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConditionsToml {
    h_larmor_frq: f64,
    temperature: f64,
    nucleus: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    p_total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    l_total: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DataBlockToml {
    group: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    points: Option<Vec<[f64; 3]>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<String>,
}

/// One `[[data]]` block: the points of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    pub group: GroupId,
    pub points: Vec<DataPoint>,
}

/// A parsed experiment descriptor with its data blocks resolved.
#[derive(Debug, Clone)]
pub struct ExperimentDescriptor {
    pub path: PathBuf,
    pub name: String,
    pub model: String,
    pub kinetics: Option<String>,
    pub conditions: Conditions,
    pub constants: BTreeMap<String, f64>,
    pub blocks: Vec<DataBlock>,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    x: f64,
    value: f64,
    error: f64,
}

impl ExperimentDescriptor {
    pub fn load(path: &Path) -> Result<Self, FitError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| FitError::parse(path.display().to_string(), format!("cannot read file: {e}")))?;
        Self::parse(&text, path)
    }

    /// Parse descriptor text; `file = ...` blocks are read relative to `path`.
    pub fn parse(text: &str, path: &Path) -> Result<Self, FitError> {
        let origin = path.display().to_string();
        let raw: ExperimentFileToml =
            toml::from_str(text).map_err(|e| FitError::parse(origin.clone(), e.to_string()))?;

        let nucleus = Nucleus::parse(&raw.conditions.nucleus).ok_or_else(|| {
            FitError::parse(
                origin.clone(),
                format!("unknown nucleus '{}'", raw.conditions.nucleus),
            )
        })?;
        let c = &raw.conditions;
        if !(c.h_larmor_frq.is_finite() && c.h_larmor_frq > 0.0) {
            return Err(FitError::parse(origin, "h_larmor_frq must be positive"));
        }
        if !c.temperature.is_finite() {
            return Err(FitError::parse(origin, "temperature must be finite"));
        }
        let conditions = Conditions {
            h_larmor_frq: c.h_larmor_frq,
            temperature: c.temperature,
            nucleus,
            p_total: c.p_total,
            l_total: c.l_total,
        };

        if raw.data.is_empty() {
            return Err(FitError::parse(origin, "descriptor has no [[data]] block"));
        }

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let blocks = raw
            .data
            .into_iter()
            .map(|block| read_block(block, base, &origin))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            path: path.to_path_buf(),
            name: raw.experiment.name,
            model: raw.experiment.model.trim().to_lowercase(),
            kinetics: raw.experiment.kinetics,
            conditions,
            constants: raw.constants,
            blocks,
        })
    }

    /// Serialize with every block pointing at a data file instead of inline points.
    pub fn to_toml_with_files(&self, files: &[(GroupId, String)]) -> Result<String, FitError> {
        let raw = ExperimentFileToml {
            experiment: ExperimentToml {
                name: self.name.clone(),
                model: self.model.clone(),
                kinetics: self.kinetics.clone(),
            },
            conditions: ConditionsToml {
                h_larmor_frq: self.conditions.h_larmor_frq,
                temperature: self.conditions.temperature,
                nucleus: nucleus_label(self.conditions.nucleus).to_string(),
                p_total: self.conditions.p_total,
                l_total: self.conditions.l_total,
            },
            constants: self.constants.clone(),
            data: files
                .iter()
                .map(|(group, file)| DataBlockToml {
                    group: group.to_string(),
                    points: None,
                    file: Some(file.clone()),
                })
                .collect(),
        };
        toml::to_string(&raw).map_err(|e| FitError::parse(self.path.display().to_string(), e.to_string()))
    }
}

fn nucleus_label(nucleus: Nucleus) -> &'static str {
    match nucleus {
        Nucleus::H1 => "1H",
        Nucleus::C13 => "13C",
        Nucleus::N15 => "15N",
        Nucleus::F19 => "19F",
        Nucleus::P31 => "31P",
    }
}

fn read_block(block: DataBlockToml, base: &Path, origin: &str) -> Result<DataBlock, FitError> {
    let group = GroupId::new(&block.group);
    if group.as_str().is_empty() {
        return Err(FitError::parse(origin, "data block with an empty group"));
    }

    let points = match (block.points, block.file) {
        (Some(points), None) => points
            .into_iter()
            .map(|[x, value, error]| DataPoint { x, value, error })
            .collect(),
        (None, Some(file)) => read_points_csv(&base.join(file))?,
        _ => {
            return Err(FitError::parse(
                origin,
                format!("group '{group}': exactly one of 'points' or 'file' is required"),
            ));
        }
    };

    if points.is_empty() {
        return Err(FitError::parse(origin, format!("group '{group}' has no points")));
    }
    for (i, p) in points.iter().enumerate() {
        if !(p.x.is_finite() && p.value.is_finite()) {
            return Err(FitError::parse(
                origin,
                format!("group '{group}', point {}: non-finite value", i + 1),
            ));
        }
        if !(p.error.is_finite() && p.error > 0.0) {
            return Err(FitError::parse(
                origin,
                format!("group '{group}', point {}: uncertainty must be positive", i + 1),
            ));
        }
    }

    Ok(DataBlock { group, points })
}

/// Read a `x,value,error` table.
pub fn read_points_csv(path: &Path) -> Result<Vec<DataPoint>, FitError> {
    let origin = path.display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(|e| FitError::parse(origin.clone(), format!("cannot open data file: {e}")))?;

    let mut points = Vec::new();
    for (i, row) in reader.deserialize::<CsvRow>().enumerate() {
        // +2: header line and 1-based numbering
        let row = row.map_err(|e| FitError::parse(origin.clone(), format!("line {}: {e}", i + 2)))?;
        points.push(DataPoint {
            x: row.x,
            value: row.value,
            error: row.error,
        });
    }
    Ok(points)
}
