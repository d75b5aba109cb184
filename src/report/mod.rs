//! Reporting utilities: residual rankings and formatted terminal output.

pub mod format;

pub use format::*;

use crate::fit::{FitResult, PointResidual};

/// The `top_n` points with the largest normalized residual magnitude.
pub fn worst_residuals(result: &FitResult, top_n: usize) -> Vec<PointResidual> {
    let mut sorted = result.residuals.clone();
    sorted.sort_by(|a, b| {
        b.residual
            .abs()
            .partial_cmp(&a.residual.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted.truncate(top_n);
    sorted
}
