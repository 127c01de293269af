//! FAST-LTS subset search (Rousseeuw & van Driessen).
//!
//! Given a target inlier count `h`, we look for the `h`-subset whose
//! errors-in-variables fit has the smallest `chi2`:
//!
//! 1. draw `n_starts` random minimal subsets (`p` points) and put an exact
//!    plane through each
//! 2. apply a few C-steps to every start (residuals → keep best `h` → refit)
//! 3. iterate the `n_best` lowest-`chi2` starts to C-step convergence and keep
//!    the overall best
//!
//! All random draws happen up front from a seeded `StdRng`, so the starts can
//! be evaluated in parallel and the result does not depend on scheduling.

use log::{debug, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use rayon::prelude::*;

use crate::domain::{FitOutcome, Observations};
use crate::fit::options::SearchOptions;
use crate::math::{
    all_close, normalized_residuals, refine, solve_plane, LmOptions, RowWeights,
};

/// Safety cap on C-steps when iterating to convergence.
const MAX_CONVERGE_STEPS: usize = 100;

/// Best `h`-subset fit.
#[derive(Debug, Clone)]
pub struct LtsFit {
    pub outcome: FitOutcome,
    /// Exactly `h` entries are `true` (all of them when `h == n`).
    pub mask: Vec<bool>,
}

#[derive(Debug, Clone)]
struct Candidate {
    idx: usize,
    outcome: FitOutcome,
    subset: Vec<usize>,
}

/// Run the FAST-LTS search for inlier count `h`.
///
/// `obs` must already carry any trial intrinsic scatter in its `sigz`.
pub fn fast_lts(obs: &Observations, h: usize, opts: &SearchOptions) -> LtsFit {
    let n = obs.len();
    if h >= n {
        return full_fit(obs, &opts.lm);
    }
    let p = obs.n_params();

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let starts: Vec<Vec<usize>> = (0..opts.n_starts)
        .map(|_| index::sample(&mut rng, n, p).into_vec())
        .collect();

    let run = |(idx, sample): (usize, &Vec<usize>)| {
        run_start(obs, sample, h, opts.c_steps, &opts.lm).map(|(outcome, subset)| Candidate {
            idx,
            outcome,
            subset,
        })
    };
    let mut candidates: Vec<Candidate> = if opts.parallel {
        starts.par_iter().enumerate().filter_map(run).collect()
    } else {
        starts.iter().enumerate().filter_map(run).collect()
    };

    if candidates.is_empty() {
        warn!("every random start was degenerate; falling back to a plain fit of all points");
        let fallback = full_fit(obs, &opts.lm);
        let subset = best_subset(obs, fallback.outcome.abc(), h);
        return LtsFit {
            outcome: fallback.outcome,
            mask: subset_mask(n, &subset),
        };
    }

    sort_candidates(&mut candidates);
    candidates.truncate(opts.n_best);

    let converge = |c: &Candidate| {
        let (outcome, subset) = converge_c_steps(obs, c.outcome.abc(), h, MAX_CONVERGE_STEPS, &opts.lm);
        Candidate {
            idx: c.idx,
            outcome,
            subset,
        }
    };
    let mut refined: Vec<Candidate> = if opts.parallel {
        candidates.par_iter().map(converge).collect()
    } else {
        candidates.iter().map(converge).collect()
    };
    sort_candidates(&mut refined);

    let best = refined.swap_remove(0);
    if best.outcome.is_degenerate() {
        warn!("best LTS candidate is degenerate (h = {h}, n = {n})");
    }
    debug!(
        "fast_lts: h={h} n={n} best start #{} chi2={:.6e}",
        best.idx,
        best.outcome.chi2()
    );
    LtsFit {
        mask: subset_mask(n, &best.subset),
        outcome: best.outcome,
    }
}

/// Single refinement over every point (outlier detection disabled).
pub fn full_fit(obs: &Observations, lm: &LmOptions) -> LtsFit {
    let n = obs.len();
    let all: Vec<usize> = (0..n).collect();
    let outcome = match solve_plane(obs, &all, RowWeights::InverseSigz) {
        Ok(abc0) => refine(obs, &all, &abc0, lm),
        Err(_) => FitOutcome::Degenerate {
            abc: flat_plane(obs),
        },
    };
    LtsFit {
        outcome,
        mask: vec![true; n],
    }
}

/// Exact plane through `sample`, followed by `c_steps` C-steps.
fn run_start(
    obs: &Observations,
    sample: &[usize],
    h: usize,
    c_steps: usize,
    lm: &LmOptions,
) -> Option<(FitOutcome, Vec<usize>)> {
    let mut abc = solve_plane(obs, sample, RowWeights::Unweighted).ok()?;
    let mut last = None;
    for _ in 0..c_steps {
        let subset = best_subset(obs, &abc, h);
        let outcome = refine(obs, &subset, &abc, lm);
        abc = outcome.abc().to_vec();
        last = Some((outcome, subset));
    }
    last
}

/// Repeat C-steps until the coefficients stop changing, at most `max_steps` times.
fn converge_c_steps(
    obs: &Observations,
    abc0: &[f64],
    h: usize,
    max_steps: usize,
    lm: &LmOptions,
) -> (FitOutcome, Vec<usize>) {
    let mut abc = abc0.to_vec();
    let mut subset = best_subset(obs, &abc, h);
    let mut outcome = refine(obs, &subset, &abc, lm);
    for _ in 1..max_steps {
        if outcome.is_degenerate() || all_close(&abc, outcome.abc(), 1e-5, 1e-8) {
            return (outcome, subset);
        }
        abc = outcome.abc().to_vec();
        subset = best_subset(obs, &abc, h);
        outcome = refine(obs, &subset, &abc, lm);
    }
    if !outcome.is_degenerate() && !all_close(&abc, outcome.abc(), 1e-5, 1e-8) {
        warn!("C-steps did not settle within {max_steps} steps; using last subset");
    }
    (outcome, subset)
}

/// Indices of the `h` points with the smallest absolute normalized residual,
/// in ascending index order. Ties break on the lower index.
pub fn best_subset(obs: &Observations, abc: &[f64], h: usize) -> Vec<usize> {
    let res: Vec<f64> = normalized_residuals(abc, obs)
        .into_iter()
        .map(|r| if r.is_nan() { f64::INFINITY } else { r.abs() })
        .collect();
    let mut order: Vec<usize> = (0..res.len()).collect();
    order.sort_by(|&i, &j| res[i].total_cmp(&res[j]).then(i.cmp(&j)));
    order.truncate(h);
    order.sort_unstable();
    order
}

fn subset_mask(n: usize, subset: &[usize]) -> Vec<bool> {
    let mut mask = vec![false; n];
    for &i in subset {
        mask[i] = true;
    }
    mask
}

/// Deterministic ranking: lowest `chi2` first, ties broken by start index.
fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        a.outcome
            .chi2()
            .total_cmp(&b.outcome.chi2())
            .then(a.idx.cmp(&b.idx))
    });
}

/// Horizontal plane through the mean of `z`, used when nothing else can be solved.
fn flat_plane(obs: &Observations) -> Vec<f64> {
    let mut abc = vec![0.0; obs.n_params()];
    abc[0] = obs.z().iter().sum::<f64>() / obs.len() as f64;
    abc
}
