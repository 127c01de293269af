//! Options shared by the search stages, derived once from [`FitConfig`].

use crate::domain::FitConfig;
use crate::math::LmOptions;

/// Settings that drive the robust search.
///
/// The trial intrinsic scatter is deliberately not part of this struct: every
/// stage receives it as an explicit argument.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub clip: f64,
    pub seed: u64,
    pub n_starts: usize,
    pub n_best: usize,
    pub c_steps: usize,
    pub max_trim_iter: usize,
    pub parallel: bool,
    pub fit_scatter: bool,
    pub root_tol: f64,
    pub max_root_iter: usize,
    pub lm: LmOptions,
}

impl SearchOptions {
    pub fn from_config(config: &FitConfig) -> Self {
        Self {
            clip: config.clip,
            seed: config.seed,
            n_starts: config.n_starts,
            n_best: config.n_best,
            c_steps: config.c_steps,
            max_trim_iter: config.max_trim_iter,
            parallel: config.parallel,
            fit_scatter: config.fit_scatter,
            root_tol: config.root_tol,
            max_root_iter: config.max_root_iter,
            lm: LmOptions::default(),
        }
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from_config(&FitConfig::default())
    }
}
