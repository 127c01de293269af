//! Robust plane fitting entry points.
//!
//! `fit_plane` validates the input, centers `x` on the pivot, estimates the
//! intrinsic scatter, then reruns LTS + clipping once more at that scatter to
//! produce the reported fit.

use log::{debug, warn};

use crate::domain::{FitConfig, FitResult, Observations};
use crate::error::FitError;
use crate::fit::options::SearchOptions;
use crate::fit::scatter::estimate_scatter;
use crate::fit::trim::find_outliers;
use crate::math::{raw_residuals, std_ddof};

/// Fit `z = a + Σ b_j (x_j - pivot_j)` robustly.
pub fn fit_plane(obs: &Observations, config: &FitConfig) -> Result<FitResult, FitError> {
    config.validate()?;

    let n = obs.len();
    let m = obs.dim();
    let p = m + 1;
    if n < 2 * p {
        return Err(FitError::InsufficientData {
            needed: 2 * p,
            got: n,
        });
    }

    let pivot = resolve_pivot(config.pivot.as_deref(), m)?;
    let h = inlier_count(n, p, config.frac)?;
    let centered = obs.centered(&pivot);
    let opts = SearchOptions::from_config(config);

    let scatter = estimate_scatter(&centered, h, &opts);
    let fit = find_outliers(&centered, scatter.sig_int, h, &opts);

    let n_inliers = fit.n_inliers();
    let res = raw_residuals(fit.outcome.abc(), &centered);
    let rms = std_ddof(
        res.into_iter().zip(&fit.mask).filter(|(_, m)| **m).map(|(r, _)| r),
        p,
    );
    if fit.outcome.is_degenerate() {
        warn!("final refinement is degenerate; coefficient errors are infinite");
    }
    debug!(
        "fit_plane: n={n} m={m} h={h} inliers={n_inliers} sig_int={:.4e} chi2={:.4e}",
        scatter.sig_int,
        fit.outcome.chi2()
    );

    Ok(FitResult {
        abc: fit.outcome.abc().to_vec(),
        abc_err: fit.outcome.abc_err(),
        chi2: fit.outcome.chi2(),
        degenerate: fit.outcome.is_degenerate(),
        mask: fit.mask,
        sig_int: scatter.sig_int,
        sig_int_err: scatter.sig_int_err,
        rms,
        n_inliers,
        pivot,
    })
}

/// Fit a straight line `z = a + b (x - pivot)`.
pub fn fit_line(
    x: &[f64],
    z: &[f64],
    sigx: &[f64],
    sigz: &[f64],
    config: &FitConfig,
) -> Result<FitResult, FitError> {
    let obs = Observations::from_flat(1, x.to_vec(), z.to_vec(), sigx.to_vec(), sigz.to_vec())?;
    fit_plane(&obs, config)
}

/// Inlier count for the LTS stage.
///
/// Without `frac` this is the breakdown minimum `(n + p + 1) / 2`. An explicit
/// `frac` is rounded to a count and must not fall below that minimum.
pub fn inlier_count(n: usize, p: usize, frac: Option<f64>) -> Result<usize, FitError> {
    let h_min = (n + p + 1) / 2;
    let Some(frac) = frac else {
        return Ok(h_min.min(n));
    };
    let h = (frac * n as f64).round() as usize;
    if h < h_min {
        return Err(FitError::InvalidConfig(format!(
            "frac = {frac} keeps {h} of {n} points, below the breakdown minimum of {h_min}"
        )));
    }
    Ok(h.min(n))
}

fn resolve_pivot(pivot: Option<&[f64]>, m: usize) -> Result<Vec<f64>, FitError> {
    let Some(pivot) = pivot else {
        warn!("no pivot given; using the origin (a central value such as the median of x decorrelates the intercept)");
        return Ok(vec![0.0; m]);
    };
    if pivot.len() != m {
        return Err(FitError::ShapeMismatch {
            what: "pivot",
            expected: m,
            got: pivot.len(),
        });
    }
    if let Some(index) = pivot.iter().position(|v| !v.is_finite()) {
        return Err(FitError::NonFinite {
            what: "pivot",
            index,
        });
    }
    Ok(pivot.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_inlier_count_is_breakdown_minimum() {
        assert_eq!(inlier_count(100, 2, None).unwrap(), 51);
        assert_eq!(inlier_count(100, 3, None).unwrap(), 52);
        assert_eq!(inlier_count(100, 2, Some(1.0)).unwrap(), 100);
        assert_eq!(inlier_count(100, 2, Some(0.8)).unwrap(), 80);
    }

    #[test]
    fn sub_minimum_frac_is_rejected() {
        let err = inlier_count(100, 2, Some(0.5)).unwrap_err();
        assert!(matches!(err, FitError::InvalidConfig(_)));
    }

    #[test]
    fn too_few_points_is_an_input_error() {
        let obs = Observations::from_flat(2, vec![0.0; 10], vec![0.0; 5], vec![0.1; 10], vec![0.1; 5]).unwrap();
        let err = fit_plane(&obs, &FitConfig::default()).unwrap_err();
        assert_eq!(err, FitError::InsufficientData { needed: 6, got: 5 });
    }

    #[test]
    fn pivot_shape_is_checked() {
        let obs = Observations::from_flat(1, (0..8).map(f64::from).collect(), vec![1.0; 8], vec![0.1; 8], vec![0.1; 8])
            .unwrap();
        let config = FitConfig {
            pivot: Some(vec![0.0, 1.0]),
            ..FitConfig::default()
        };
        assert!(matches!(
            fit_plane(&obs, &config),
            Err(FitError::ShapeMismatch { what: "pivot", .. })
        ));
        let config = FitConfig {
            pivot: Some(vec![f64::INFINITY]),
            ..FitConfig::default()
        };
        assert!(matches!(fit_plane(&obs, &config), Err(FitError::NonFinite { .. })));
    }

    #[test]
    fn fit_line_rejects_mismatched_lengths() {
        let err = fit_line(&[1.0, 2.0], &[1.0], &[0.1, 0.1], &[0.1, 0.1], &FitConfig::default()).unwrap_err();
        assert!(err.is_input_error());
    }

    #[test]
    fn identical_points_return_a_degenerate_result() {
        let obs = Observations::from_flat(1, vec![2.0; 12], vec![5.0; 12], vec![0.1; 12], vec![0.1; 12]).unwrap();
        let config = FitConfig {
            n_starts: 20,
            ..FitConfig::default()
        };
        let fit = fit_plane(&obs, &config).unwrap();
        assert!(fit.degenerate);
        assert!(fit.abc_err.iter().all(|e| e.is_infinite()));
        assert_eq!(fit.sig_int, 0.0);
    }
}
