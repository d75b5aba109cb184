//! Error types.
//!
//! Two layers:
//!
//! - [`FitError`]: the engine's taxonomy. Descriptor/configuration errors abort a
//!   run before any optimization starts; runtime variants (`NonConvergence`,
//!   `Cancelled`, `DegenerateFit`) are attached to a finished `FitResult` as a flag.
//! - [`AppError`]: what the binary reports (message + process exit code).

use serde::Serialize;

/// Exit code for configuration and input errors (nothing written).
pub const EXIT_CONFIG: u8 = 2;
/// Exit code for a flagged, best-effort result (result written).
pub const EXIT_FLAGGED: u8 = 3;
/// Exit code for output failures.
pub const EXIT_OUTPUT: u8 = 4;

/// Engine error taxonomy.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitError {
    /// Malformed descriptor (experiment, parameter, method or data file).
    #[error("{origin}: {message}")]
    Parse { origin: String, message: String },

    /// Incompatible constraints for one sharing class.
    #[error("conflicting constraints for '{parameter}' ({origin}): {message}")]
    Conflict {
        parameter: String,
        origin: String,
        message: String,
    },

    /// Two datasets claim the same (group, model, conditions) identity.
    #[error("duplicate dataset for group '{group}' and model '{model}': '{first}' and '{second}'")]
    DuplicateDataset {
        group: String,
        model: String,
        first: String,
        second: String,
    },

    /// Unknown experiment model or kinetics key.
    #[error("{origin}: unknown model '{key}'")]
    UnknownModel { key: String, origin: String },

    /// Invalid fitting method (empty, or a stage frees inactive parameters).
    #[error("{origin}: {message}")]
    InvalidMethod {
        origin: String,
        stage: Option<usize>,
        message: String,
    },

    /// Inconsistent run configuration (e.g. a group both included and excluded).
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The optimizer stopped before meeting the stage's convergence criterion.
    #[error("stage {stage} ('{stage_name}') did not converge after {iterations} iterations ({reason})")]
    NonConvergence {
        stage: usize,
        stage_name: String,
        iterations: usize,
        reason: String,
    },

    /// The run was cancelled between iterations.
    #[error("fit cancelled during stage {stage} after {iterations} iterations")]
    Cancelled { stage: usize, iterations: usize },

    /// Degrees of freedom are not positive.
    #[error("degenerate fit: {points} active points for {free} free parameters")]
    DegenerateFit { points: usize, free: usize },
}

impl FitError {
    /// Helper for [`FitError::Parse`].
    pub fn parse(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            origin: origin.into(),
            message: message.into(),
        }
    }

    /// Whether this error is detected before optimization (load/validate phase).
    pub fn is_configuration(&self) -> bool {
        !matches!(
            self,
            Self::NonConvergence { .. } | Self::Cancelled { .. } | Self::DegenerateFit { .. }
        )
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_configuration() {
            EXIT_CONFIG
        } else {
            EXIT_FLAGGED
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        Self::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
