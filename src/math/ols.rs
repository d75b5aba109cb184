//! Linear least squares solves used by the nonlinear optimizer.
//!
//! Every Levenberg–Marquardt step is the solution of a small, possibly
//! rank-deficient linear least squares problem:
//!
//! ```text
//! minimize ‖ [J; √λ·D] δ + [r; 0] ‖²
//! ```
//!
//! We solve it with SVD so tall and near-singular systems are handled alike.
//! (Nalgebra's `QR::solve` is intended for square systems.)

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Damped Gauss–Newton step `δ` for residuals `r` and Jacobian `J`.
///
/// `lambda = 0` gives the plain Gauss–Newton step. The damping is scaled by the
/// column norms of `J` (Marquardt scaling), so parameters with very different
/// magnitudes are damped alike.
pub fn damped_step(jac: &DMatrix<f64>, r: &DVector<f64>, lambda: f64) -> Option<DVector<f64>> {
    let (n, m) = jac.shape();
    if lambda <= 0.0 {
        return solve_least_squares(jac, &(-r));
    }

    let mut a = DMatrix::<f64>::zeros(n + m, m);
    a.view_mut((0, 0), (n, m)).copy_from(jac);
    for j in 0..m {
        let scale = jac.column(j).norm().max(1e-12);
        a[(n + j, j)] = lambda.sqrt() * scale;
    }
    let mut b = DVector::<f64>::zeros(n + m);
    b.rows_mut(0, n).copy_from(&(-r));
    solve_least_squares(&a, &b)
}

/// Moore–Penrose inverse of `JᵀJ`, or `None` when it cannot be formed.
pub fn normal_pseudo_inverse(jac: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let jtj = jac.transpose() * jac;
    let inv = jtj.pseudo_inverse(1e-12).ok()?;
    inv.iter().all(|v| v.is_finite()).then_some(inv)
}
