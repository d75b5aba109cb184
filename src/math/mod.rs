//! Mathematical utilities: bounded parameter transforms and linear least squares.

pub mod bounds;
pub mod ols;

pub use bounds::*;
pub use ols::*;
