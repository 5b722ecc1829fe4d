//! Least squares solvers.
//!
//! The forecaster solves one linear regression per fit:
//!
//! ```text
//! minimize Σ (y_i - x_i^T β)^2 + λ ||β||^2
//! ```
//!
//! The design matrix has one row per training hour (tens of thousands) and a
//! few dozen columns, so the fitter accumulates the normal equations
//! `XᵀX β = Xᵀy` row by row and solves the small square system here:
//! Cholesky first, SVD when the system is not positive definite.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Progressively looser tolerances before giving up.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve `(XᵀX + ridge·I) β = Xᵀy` given the accumulated `XᵀX` and `Xᵀy`.
pub fn solve_normal_equations(
    xtx: &DMatrix<f64>,
    xty: &DVector<f64>,
    ridge: f64,
) -> Option<DVector<f64>> {
    let n = xtx.nrows();
    if n == 0 || xtx.ncols() != n || xty.len() != n {
        return None;
    }
    let a = xtx + DMatrix::<f64>::identity(n, n) * ridge;

    if let Some(chol) = a.clone().cholesky() {
        let beta = chol.solve(xty);
        if beta.iter().all(|v| v.is_finite()) {
            return Some(beta);
        }
    }
    solve_least_squares(&a, xty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn normal_equations_match_direct_solve() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let y = DVector::from_row_slice(&[1.0, 3.0, 5.0, 7.0]);
        let xtx = x.transpose() * &x;
        let xty = x.transpose() * &y;

        let beta = solve_normal_equations(&xtx, &xty, 0.0).unwrap();
        assert!((beta[0] - 1.0).abs() < 1e-10);
        assert!((beta[1] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn singular_systems_fall_back_to_svd() {
        // Rank one: Cholesky breaks down on the second pivot.
        let xtx = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let xty = DVector::from_row_slice(&[2.0, 2.0]);

        let beta = solve_normal_equations(&xtx, &xty, 0.0).unwrap();
        assert!((beta[0] + beta[1] - 2.0).abs() < 1e-8);
        assert!(solve_normal_equations(&xtx, &DVector::zeros(3), 0.0).is_none());
    }
}
