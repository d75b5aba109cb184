//! `chemex` library crate.
//!
//! The binary (`chemex`) is a thin wrapper around this library so that:
//!
//! - the fitting engine is testable without spawning processes
//! - new experiment models can be registered from other crates
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod filter;
pub mod fit;
pub mod io;
pub mod logging;
pub mod math;
pub mod method;
pub mod models;
pub mod params;
pub mod report;
