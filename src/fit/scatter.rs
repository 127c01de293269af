//! Intrinsic scatter estimation.
//!
//! `sig_int` is the value at which the robust fit has a reduced chi-squared of
//! exactly one:
//!
//! ```text
//! err(s) = chi2(s) / (h - p) - 1 = 0
//! ```
//!
//! where `chi2(s)` and the inlier count `h` come from a full LTS + clipping run
//! with `s` folded into `sigz`. The upper 1-sigma bound solves the same
//! equation with `chi2` shifted by its expected fluctuation `sqrt(2 (h - p))`.
//!
//! `err` decreases with `s`; the bracket starts at `[0, s1]` with `s1` the
//! inlier residual spread inflated by `1 + 3 / sqrt(2h)`, and is widened if the
//! sign does not change there.

use log::{debug, warn};

use crate::domain::Observations;
use crate::fit::options::SearchOptions;
use crate::fit::trim::{find_outliers, TrimmedFit};
use crate::math::{brent, raw_residuals, std_ddof};

/// How many times the upper bracket may be doubled.
const MAX_BRACKET_EXPANSIONS: usize = 10;

/// Estimated intrinsic scatter and its upper 1-sigma error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScatterEstimate {
    pub sig_int: f64,
    pub sig_int_err: f64,
}

impl ScatterEstimate {
    const ZERO: Self = Self {
        sig_int: 0.0,
        sig_int_err: 0.0,
    };
}

/// Find `sig_int` (and its error) for inlier count `h`.
pub fn estimate_scatter(obs: &Observations, h: usize, opts: &SearchOptions) -> ScatterEstimate {
    if !opts.fit_scatter {
        return ScatterEstimate::ZERO;
    }
    let p = obs.n_params();
    let excess = |sig: f64, offset: f64| find_outliers(obs, sig, h, opts).chi2_excess(p, offset);

    let base = find_outliers(obs, 0.0, h, opts);
    let err0 = base.chi2_excess(p, 0.0);
    if err0.is_nan() || err0 == f64::INFINITY {
        warn!("fit at zero intrinsic scatter is degenerate; reporting sig_int = 0");
        return ScatterEstimate::ZERO;
    }

    let sig1 = upper_guess(obs, &base, h);
    if !(sig1.is_finite() && sig1 > 0.0) {
        warn!("cannot bound the intrinsic scatter (residual spread {sig1}); reporting sig_int = 0");
        return ScatterEstimate::ZERO;
    }

    let sig_int = if err0 <= 0.0 {
        debug!("measurement errors explain the scatter (err(0) = {err0:.4}); sig_int = 0");
        0.0
    } else {
        match solve(|s| excess(s, 0.0), 0.0, err0, sig1, opts) {
            Some(root) => root,
            None => {
                warn!("no sign change of the reduced chi2 excess up to sig_int = {sig1:.4e}");
                return ScatterEstimate {
                    sig_int: sig1,
                    sig_int_err: f64::INFINITY,
                };
            }
        }
    };

    let err_lo = excess(sig_int, 1.0);
    let sig_int_err = if err_lo <= 0.0 {
        0.0
    } else if err_lo.is_finite() {
        match solve(|s| excess(s, 1.0), sig_int, err_lo, sig1.max(2.0 * sig_int), opts) {
            Some(upper) => upper - sig_int,
            None => {
                warn!("upper bound of sig_int could not be bracketed");
                f64::INFINITY
            }
        }
    } else {
        f64::INFINITY
    };

    debug!("sig_int = {sig_int:.6e} (+{sig_int_err:.3e})");
    ScatterEstimate {
        sig_int,
        sig_int_err,
    }
}

/// Residual spread of the inliers, inflated by the small-sample factor.
fn upper_guess(obs: &Observations, base: &TrimmedFit, h: usize) -> f64 {
    let res = raw_residuals(base.outcome.abc(), obs);
    let spread = std_ddof(
        res.into_iter().zip(&base.mask).filter(|(_, m)| **m).map(|(r, _)| r),
        obs.n_params(),
    );
    spread * (1.0 + 3.0 / (2.0 * h as f64).sqrt())
}

/// Root of a decreasing `f` above `lo` (where `f(lo) = f_lo > 0`).
///
/// Doubles `hi` until `f(hi) <= 0`, then runs Brent on the bracket.
fn solve<F>(mut f: F, lo: f64, f_lo: f64, hi: f64, opts: &SearchOptions) -> Option<f64>
where
    F: FnMut(f64) -> f64,
{
    let (mut lo, mut f_lo, mut hi) = (lo, f_lo, hi);
    for _ in 0..=MAX_BRACKET_EXPANSIONS {
        let f_hi = f(hi);
        if f_hi <= 0.0 {
            let tol = opts.root_tol * hi;
            let res = brent(&mut f, lo, hi, f_lo, f_hi, tol, opts.max_root_iter);
            if !res.converged {
                warn!(
                    "intrinsic scatter search stopped after {} iterations; using best estimate",
                    res.iterations
                );
            }
            return Some(res.root);
        }
        if f_hi.is_finite() {
            lo = hi;
            f_lo = f_hi;
        }
        hi *= 2.0;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scattered_line(extra: f64) -> Observations {
        // Alternating +/- offsets of size `extra` on top of an exact line.
        let n = 60;
        let xs: Vec<f64> = (0..n).map(|i| i as f64 * 0.1).collect();
        let zs: Vec<f64> = xs
            .iter()
            .enumerate()
            .map(|(i, x)| 1.0 + x + if i % 2 == 0 { extra } else { -extra })
            .collect();
        Observations::from_flat(1, xs, zs, vec![0.0; n], vec![0.05; n]).unwrap()
    }

    fn opts() -> SearchOptions {
        SearchOptions {
            n_starts: 40,
            parallel: false,
            ..SearchOptions::default()
        }
    }

    #[test]
    fn overestimated_errors_give_zero_scatter() {
        let obs = scattered_line(0.01);
        let est = estimate_scatter(&obs, 60, &opts());
        assert_eq!(est.sig_int, 0.0);
    }

    #[test]
    fn recovers_injected_scatter() {
        // Residuals of ±0.2 against sigz = 0.05: reduced chi2 = 1 needs
        // 0.05² + s² ≈ 0.2² * n / (n - 2).
        let obs = scattered_line(0.2);
        let est = estimate_scatter(&obs, 60, &opts());
        let expected = (0.04 * 60.0 / 58.0 - 0.0025f64).sqrt();
        assert!((est.sig_int - expected).abs() < 1e-3, "sig_int = {}", est.sig_int);
        assert!(est.sig_int_err > 0.0 && est.sig_int_err.is_finite());
    }

    #[test]
    fn disabled_scatter_is_zero() {
        let obs = scattered_line(0.2);
        let est = estimate_scatter(
            &obs,
            60,
            &SearchOptions {
                fit_scatter: false,
                ..opts()
            },
        );
        assert_eq!(est, ScatterEstimate::ZERO);
    }
}
