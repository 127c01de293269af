//! Weighted least squares plane solver.
//!
//! We repeatedly solve small linear problems of the form:
//!
//! ```text
//! minimize Σ w_i² (a + x_i·b - z_i)²
//! ```
//!
//! where `w_i` is a row multiplier (`1/sigz_i` for the initial guess, or no
//! weighting at all for the exact fits through random starting points).
//!
//! Implementation choices:
//! - We scale rows by `w_i` and solve an ordinary least squares problem.
//! - SVD handles both the square case (exactly `p` points) and tall systems.
//! - A rank check on the singular values turns a singular design into an
//!   explicit `Degenerate` error instead of a minimum-norm answer.

use nalgebra::{DMatrix, DVector};

use crate::domain::Observations;
use crate::error::FitError;

/// Singular values below `RANK_TOL * s_max` mark the design as singular.
const RANK_TOL: f64 = 1e-12;

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the design matrix is rank deficient.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    if x.nrows() < x.ncols() {
        return None;
    }
    let svd = x.clone().svd(true, true);
    let s_max = svd.singular_values.max();
    if !(s_max.is_finite() && s_max > 0.0) {
        return None;
    }
    if svd.singular_values.iter().any(|&s| s <= RANK_TOL * s_max) {
        return None;
    }
    let beta = svd.solve(y, 0.0).ok()?;
    beta.iter().all(|v| v.is_finite()).then_some(beta)
}

/// Row weighting for [`solve_plane`].
#[derive(Debug, Clone, Copy)]
pub enum RowWeights<'a> {
    /// Every row counts equally.
    Unweighted,
    /// Rows scaled by `1 / sigz_i` (errors in `x` ignored).
    InverseSigz,
    /// Explicit per-row multipliers, aligned with the selected indices.
    Sqrt(&'a [f64]),
}

/// Fit `z = a + x·b` on the points listed in `idx`.
pub fn solve_plane(
    obs: &Observations,
    idx: &[usize],
    weights: RowWeights<'_>,
) -> Result<Vec<f64>, FitError> {
    let p = obs.n_params();
    let k = idx.len();
    if let RowWeights::Sqrt(w) = weights {
        if w.len() != k {
            return Err(FitError::ShapeMismatch {
                what: "row weights",
                expected: k,
                got: w.len(),
            });
        }
    }

    let mut xw = DMatrix::<f64>::zeros(k, p);
    let mut zw = DVector::<f64>::zeros(k);
    for (row, &i) in idx.iter().enumerate() {
        let sw = match weights {
            RowWeights::Unweighted => 1.0,
            RowWeights::InverseSigz => 1.0 / obs.sigz()[i],
            RowWeights::Sqrt(w) => w[row],
        };
        xw[(row, 0)] = sw;
        for (j, &xj) in obs.x_row(i).iter().enumerate() {
            xw[(row, j + 1)] = xj * sw;
        }
        zw[row] = obs.z()[i] * sw;
    }

    solve_least_squares(&xw, &zw)
        .map(|beta| beta.iter().copied().collect())
        .ok_or(FitError::Degenerate)
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
    fn exact_plane_through_three_points() {
        // z = 1 + 2 x1 - x2
        let obs = Observations::new(
            vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0], vec![5.0, 5.0]],
            vec![1.0, 3.0, 0.0, 100.0],
            vec![vec![0.0, 0.0]; 4],
            vec![1.0; 4],
        )
        .unwrap();
        let abc = solve_plane(&obs, &[0, 1, 2], RowWeights::Unweighted).unwrap();
        assert!((abc[0] - 1.0).abs() < 1e-12);
        assert!((abc[1] - 2.0).abs() < 1e-12);
        assert!((abc[2] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn weights_pull_towards_precise_points() {
        let obs = Observations::from_flat(
            1,
            vec![0.0, 1.0, 2.0],
            vec![0.0, 1.0, 5.0],
            vec![0.0; 3],
            vec![0.01, 0.01, 100.0],
        )
        .unwrap();
        let abc = solve_plane(&obs, &[0, 1, 2], RowWeights::InverseSigz).unwrap();
        assert!((abc[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn coincident_points_are_degenerate() {
        let obs = Observations::from_flat(
            1,
            vec![1.0, 1.0, 1.0],
            vec![2.0, 2.0, 2.0],
            vec![0.1; 3],
            vec![0.1; 3],
        )
        .unwrap();
        let err = solve_plane(&obs, &[0, 1], RowWeights::Unweighted).unwrap_err();
        assert_eq!(err, FitError::Degenerate);
    }
}
