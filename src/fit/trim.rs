//! Inside-out outlier clipping.
//!
//! Starting from the FAST-LTS subset, we repeatedly:
//!
//! - compute normalized residuals of *all* points
//! - estimate their spread over the current inliers
//! - keep every point with `|r| <= clip * sigma`
//! - refit on the new inliers
//!
//! until the mask stops changing. Unlike the LTS stage the inlier count is
//! free to grow or shrink here.

use log::{debug, warn};

use crate::domain::{FitOutcome, Observations};
use crate::fit::lts::{fast_lts, LtsFit};
use crate::fit::options::SearchOptions;
use crate::math::{normalized_residuals, refine, std_ddof, LmOptions};

/// Robust fit after clipping.
#[derive(Debug, Clone)]
pub struct TrimmedFit {
    pub outcome: FitOutcome,
    pub mask: Vec<bool>,
    pub iterations: usize,
    /// False when the iteration cap was hit or the pass had to stop early.
    pub converged: bool,
}

impl TrimmedFit {
    pub fn n_inliers(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    /// `chi2 / (n_inliers - p) - 1 + offset * sqrt(2 / (n_inliers - p))`.
    ///
    /// Zero when the reduced chi-squared equals one (`offset = 0`), or sits one
    /// standard deviation below it (`offset = 1`). Infinite for degenerate fits.
    pub fn chi2_excess(&self, p: usize, offset: f64) -> f64 {
        let inliers = self.n_inliers();
        if inliers <= p {
            return f64::INFINITY;
        }
        let dof = (inliers - p) as f64;
        (self.outcome.chi2() + offset * (2.0 * dof).sqrt()) / dof - 1.0
    }
}

/// LTS search followed by clipping, at trial intrinsic scatter `sig_int`.
///
/// With `h >= n` outlier detection is off and the plain all-point fit is returned.
pub fn find_outliers(obs: &Observations, sig_int: f64, h: usize, opts: &SearchOptions) -> TrimmedFit {
    let obs = obs.with_intrinsic_scatter(sig_int);
    let start = fast_lts(&obs, h, opts);
    if h >= obs.len() {
        return TrimmedFit {
            outcome: start.outcome,
            mask: start.mask,
            iterations: 0,
            converged: true,
        };
    }
    clip_outliers(&obs, start, opts.clip, opts.max_trim_iter, &opts.lm)
}

/// Iterate clip-and-refit from `start` until the inlier mask is stable.
pub fn clip_outliers(
    obs: &Observations,
    start: LtsFit,
    clip: f64,
    max_iter: usize,
    lm: &LmOptions,
) -> TrimmedFit {
    let p = obs.n_params();
    let LtsFit {
        mut outcome,
        mut mask,
    } = start;

    for iter in 1..=max_iter {
        let res = normalized_residuals(outcome.abc(), obs);
        let sigma = std_ddof(
            res.iter().zip(&mask).filter(|(_, m)| **m).map(|(r, _)| *r),
            p,
        );
        if !sigma.is_finite() {
            warn!("residual spread is not finite; stopping outlier clipping");
            return TrimmedFit {
                outcome,
                mask,
                iterations: iter,
                converged: false,
            };
        }

        let next: Vec<bool> = res.iter().map(|r| r.abs() <= clip * sigma).collect();
        if next == mask {
            debug!(
                "clipping converged after {iter} iteration(s), {} inliers",
                mask.iter().filter(|&&m| m).count()
            );
            return TrimmedFit {
                outcome,
                mask,
                iterations: iter,
                converged: true,
            };
        }

        let idx: Vec<usize> = next
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect();
        if idx.len() <= p {
            warn!("clipping left {} points for {p} parameters; keeping previous inliers", idx.len());
            return TrimmedFit {
                outcome,
                mask,
                iterations: iter,
                converged: false,
            };
        }

        mask = next;
        outcome = refine(obs, &idx, outcome.abc(), lm);
        if outcome.is_degenerate() {
            warn!("refit on {} clipped inliers is degenerate", idx.len());
            return TrimmedFit {
                outcome,
                mask,
                iterations: iter,
                converged: false,
            };
        }
    }

    warn!("outlier clipping did not settle within {max_iter} iterations; using last mask");
    TrimmedFit {
        outcome,
        mask,
        iterations: max_iter,
        converged: false,
    }
}
