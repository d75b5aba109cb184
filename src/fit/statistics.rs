//! Goodness-of-fit statistics and parameter uncertainties.

use nalgebra::DMatrix;
use serde::Serialize;

use crate::fit::chi_square;
use crate::math::normal_pseudo_inverse;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    /// Active data points.
    pub n_points: usize,
    /// Parameters free in the final stage.
    pub n_free: usize,
    /// `n_points − n_free`; may be ≤ 0 for a degenerate fit.
    pub dof: i64,
    pub chisqr: f64,
    /// `chisqr / dof`, when `dof > 0`.
    pub redchi: Option<f64>,
    pub aic: f64,
    pub bic: f64,
}

impl Statistics {
    pub fn compute(residuals: &[f64], n_free: usize) -> Self {
        let n_points = residuals.len();
        let chisqr = chi_square(residuals);
        let dof = n_points as i64 - n_free as i64;
        let redchi = (dof > 0).then(|| chisqr / dof as f64);

        let n = n_points.max(1) as f64;
        let k = n_free as f64;
        let neg2_log_likelihood = n * (chisqr / n).ln();
        Self {
            n_points,
            n_free,
            dof,
            chisqr,
            redchi,
            aic: neg2_log_likelihood + 2.0 * k,
            bic: neg2_log_likelihood + n.ln() * k,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.dof <= 0
    }
}

/// Standard errors of the free parameters, in external coordinates.
///
/// `jac` is the Jacobian in internal coordinates and `derivatives` the `dx/di` of
/// each column. The covariance `(JᵀJ)⁺` is scaled by the reduced χ².
pub fn standard_errors(jac: &DMatrix<f64>, derivatives: &[f64], redchi: f64) -> Option<Vec<f64>> {
    if jac.ncols() == 0 {
        return Some(Vec::new());
    }
    let cov = normal_pseudo_inverse(jac)?;
    let errors = derivatives
        .iter()
        .enumerate()
        .map(|(k, d)| d.abs() * (cov[(k, k)] * redchi).max(0.0).sqrt())
        .collect();
    Some(errors)
}
