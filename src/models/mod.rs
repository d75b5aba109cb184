//! Experiment models.
//!
//! Models are pure functions of `(parameter values, x)` built once per dataset, so
//! fitting code stays generic over experiments.

pub mod catalog;
pub mod cest;
pub mod cpmg;
pub mod kinetics;
pub mod relaxation;

pub use catalog::*;
pub use kinetics::*;
