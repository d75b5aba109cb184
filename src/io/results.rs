//! Persist fit results.
//!
//! [`DirectorySink`] lays a result out as:
//!
//! ```text
//! <output>/
//!   parameters.toml               fitted values (loadable with -p)
//!   residuals.csv                 one row per active point
//!   statistics.json               statistics, stage reports, failure
//!   stages/<n>-<name>/parameters.toml
//! ```

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::{AppError, EXIT_OUTPUT, FitError};
use crate::fit::{EngineState, FitResult, FittedParameter, StageReport, Statistics};

/// Destination for a finalized fit result.
pub trait ResultSink {
    fn write(&mut self, result: &FitResult) -> Result<(), AppError>;
}

#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

#[derive(Serialize)]
struct ParameterFileOut<'a> {
    parameter: Vec<ParameterRow<'a>>,
}

#[derive(Serialize)]
struct ParameterRow<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    b0: Option<f64>,
    value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<f64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    fixed: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    derived: bool,
}

#[derive(Serialize)]
struct StatisticsFile<'a> {
    flagged: bool,
    failure: Option<&'a FitError>,
    statistics: &'a Statistics,
    stages: &'a [StageReport],
    transitions: &'a [EngineState],
    timestamp: DateTime<Utc>,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResultSink for DirectorySink {
    fn write(&mut self, result: &FitResult) -> Result<(), AppError> {
        create_dir(&self.root)?;

        write_parameters(&self.root.join("parameters.toml"), &result.parameters)?;
        write_residuals(&self.root.join("residuals.csv"), result)?;

        let stats = StatisticsFile {
            flagged: result.is_flagged(),
            failure: result.failure.as_ref(),
            statistics: &result.statistics,
            stages: &result.stages,
            transitions: &result.transitions,
            timestamp: result.timestamp,
        };
        let path = self.root.join("statistics.json");
        let file = File::create(&path).map_err(|e| output_error(&path, e))?;
        serde_json::to_writer_pretty(file, &stats).map_err(|e| output_error(&path, e))?;

        for stage in &result.stages {
            let dir = self
                .root
                .join("stages")
                .join(format!("{}-{}", stage.index, slug(&stage.name)));
            create_dir(&dir)?;
            write_parameters(&dir.join("parameters.toml"), &stage.parameters)?;
        }

        info!(path = %self.root.display(), flagged = result.is_flagged(), "results written");
        Ok(())
    }
}

/// Write parameters in the parameter-descriptor format.
pub fn write_parameters(path: &Path, parameters: &[FittedParameter]) -> Result<(), AppError> {
    let out = ParameterFileOut {
        parameter: parameters
            .iter()
            .map(|p| ParameterRow {
                name: &p.name,
                group: p.group.as_deref(),
                temperature: p.temperature,
                b0: p.b0,
                value: p.value,
                error: p.error.filter(|e| e.is_finite()),
                min: p.min,
                max: p.max,
                fixed: p.fixed,
                derived: p.derived,
            })
            .collect(),
    };
    let text = toml::to_string(&out).map_err(|e| output_error(path, e))?;
    fs::write(path, text).map_err(|e| output_error(path, e))
}

fn write_residuals(path: &Path, result: &FitResult) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| output_error(path, e))?;
    for row in &result.residuals {
        writer.serialize(row).map_err(|e| output_error(path, e))?;
    }
    writer.flush().map_err(|e| output_error(path, e))
}

pub(crate) fn create_dir(path: &Path) -> Result<(), AppError> {
    fs::create_dir_all(path).map_err(|e| output_error(path, e))
}

pub(crate) fn output_error(path: &Path, err: impl std::fmt::Display) -> AppError {
    AppError::new(EXIT_OUTPUT, format!("failed to write '{}': {err}", path.display()))
}

/// Lowercase, filesystem-friendly stage name.
fn slug(name: &str) -> String {
    let slug: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if slug.is_empty() { "stage".to_string() } else { slug }
}
