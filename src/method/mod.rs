//! Fitting methods (multi-stage optimization schedules).

pub mod stage;

pub use stage::*;
