//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - identities (`GroupId`, `ParamName`, `Qualifier`)
//! - value constraints (`Bounds`) and experiment conditions (`Conditions`)
//! - run configuration derived from the CLI (`FitConfig`, `SimulateConfig`)

pub mod types;

pub use types::*;
