//! Levenberg–Marquardt refinement of plane coefficients.
//!
//! Minimizes `Σ r_i²` over the selected points, where `r_i` is the
//! errors-in-variables residual from [`crate::math::residuals`]. The Jacobian
//! is analytic:
//!
//! ```text
//! d   = a + x·b - z,   s = sqrt(Σ_j sigx_j² b_j² + sigz²)
//! ∂r/∂a   = 1 / s
//! ∂r/∂b_j = x_j / s - d sigx_j² b_j / s³
//! ```
//!
//! Parameter errors come from the diagonal of `(JᵀJ)⁻¹` at the solution.
//! Correlations between coefficients are not reported.

use nalgebra::{DMatrix, DVector};

use crate::domain::{FitOutcome, Observations};
use crate::math::residuals::{chi2, effective_sigma, plane_value};

/// Stopping rules for [`refine`].
#[derive(Debug, Clone, Copy)]
pub struct LmOptions {
    pub max_iter: usize,
    /// Relative decrease of `chi2` below which we stop.
    pub ftol: f64,
    /// Relative step size below which we stop.
    pub xtol: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iter: 200,
            ftol: 1e-12,
            xtol: 1e-12,
        }
    }
}

const LAMBDA_START: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e16;
const MAX_VARIANCE_INFLATION: f64 = 1e10;

/// Refine `abc0` on the points in `idx`.
///
/// Never fails: a singular or indefinite covariance yields
/// [`FitOutcome::Degenerate`] carrying the last coefficients.
pub fn refine(obs: &Observations, idx: &[usize], abc0: &[f64], opts: &LmOptions) -> FitOutcome {
    let p = abc0.len();
    let mut abc = abc0.to_vec();
    if idx.len() < p {
        return FitOutcome::Degenerate { abc };
    }

    let (mut jtj, mut jtr, mut chi2_cur) = normal_equations(obs, idx, &abc);
    if !chi2_cur.is_finite() {
        return FitOutcome::Degenerate { abc };
    }

    let mut lambda = LAMBDA_START;
    let mut iter = 0;
    while iter < opts.max_iter && chi2_cur > 0.0 {
        iter += 1;

        let mut damped = jtj.clone();
        for k in 0..p {
            damped[(k, k)] += lambda * jtj[(k, k)].max(f64::EPSILON);
        }
        let Some(chol) = damped.cholesky() else {
            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                break;
            }
            continue;
        };
        let step = chol.solve(&(-&jtr));

        let trial: Vec<f64> = abc.iter().zip(step.iter()).map(|(a, d)| a + d).collect();
        let chi2_trial = chi2(&trial, obs, idx);

        if chi2_trial.is_finite() && chi2_trial <= chi2_cur {
            let gain = chi2_cur - chi2_trial;
            let abc_norm = abc.iter().map(|v| v * v).sum::<f64>().sqrt();
            let small_step = step.norm() <= opts.xtol * (abc_norm + opts.xtol);

            abc = trial;
            (jtj, jtr, chi2_cur) = normal_equations(obs, idx, &abc);
            lambda = (lambda / 10.0).max(f64::EPSILON);

            if small_step || gain <= opts.ftol * chi2_cur {
                break;
            }
        } else {
            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                break;
            }
        }
    }

    match parameter_errors(&jtj) {
        Some(abc_err) if chi2_cur.is_finite() => FitOutcome::Converged {
            abc,
            abc_err,
            chi2: chi2_cur,
        },
        _ => FitOutcome::Degenerate { abc },
    }
}

/// Accumulate `JᵀJ`, `Jᵀr` and `Σ r²` over `idx`.
fn normal_equations(
    obs: &Observations,
    idx: &[usize],
    abc: &[f64],
) -> (DMatrix<f64>, DVector<f64>, f64) {
    let p = abc.len();
    let mut jtj = DMatrix::<f64>::zeros(p, p);
    let mut jtr = DVector::<f64>::zeros(p);
    let mut sum_sq = 0.0;
    let mut row = vec![0.0; p];

    for &i in idx {
        let x = obs.x_row(i);
        let sigx = obs.sigx_row(i);
        let d = plane_value(abc, x) - obs.z()[i];
        let s = effective_sigma(abc, sigx, obs.sigz()[i]);
        let r = d / s;
        let s3 = s * s * s;

        row[0] = 1.0 / s;
        for j in 0..x.len() {
            let b = abc[j + 1];
            row[j + 1] = x[j] / s - d * sigx[j] * sigx[j] * b / s3;
        }

        for a in 0..p {
            jtr[a] += row[a] * r;
            for b in a..p {
                jtj[(a, b)] += row[a] * row[b];
            }
        }
        sum_sq += r * r;
    }

    for a in 0..p {
        for b in 0..a {
            jtj[(a, b)] = jtj[(b, a)];
        }
    }
    (jtj, jtr, sum_sq)
}

/// Square root of the diagonal of `(JᵀJ)⁻¹`, or `None` when it cannot be formed.
fn parameter_errors(jtj: &DMatrix<f64>) -> Option<Vec<f64>> {
    let cov = jtj.clone().cholesky()?.inverse();
    let diag: Vec<f64> = cov.diagonal().iter().copied().collect();
    if diag.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return None;
    }
    // Huge variance inflation means the information matrix is singular to
    // working precision even though Cholesky went through.
    let singular = diag
        .iter()
        .zip(jtj.diagonal().iter())
        .any(|(c, j)| *j <= 0.0 || c * j > MAX_VARIANCE_INFLATION);
    if singular {
        return None;
    }
    Some(diag.into_iter().map(f64::sqrt).collect())
}
