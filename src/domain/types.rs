//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - handed to external reporting / plotting code
//! - stored next to the data they describe

use serde::{Deserialize, Serialize};

use crate::error::FitError;

/// Default clipping threshold in units of the residual standard deviation.
pub const DEFAULT_CLIP: f64 = 2.6;

/// Number of random starting subsets drawn by the FAST-LTS search.
pub const DEFAULT_N_STARTS: usize = 500;

/// Number of best starts that are iterated to full C-step convergence.
pub const DEFAULT_N_BEST: usize = 10;

/// C-steps applied to every random start before ranking.
pub const DEFAULT_C_STEPS: usize = 3;

/// Iteration cap of the inside-out clipping pass.
pub const DEFAULT_MAX_TRIM_ITER: usize = 50;

/// A validated observation set.
///
/// Independent variables are stored row-major: point `i` occupies
/// `x[i * m .. (i + 1) * m]`, with the same layout for `sigx`.
///
/// Deserialization goes through [`Observations::from_flat`], so a stored set
/// is validated exactly like one built in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawObservations")]
pub struct Observations {
    m: usize,
    x: Vec<f64>,
    z: Vec<f64>,
    sigx: Vec<f64>,
    sigz: Vec<f64>,
}

impl Observations {
    /// Build an observation set from per-point rows.
    ///
    /// Every `x` / `sigx` row must have the same length `m >= 1`, all arrays
    /// must describe the same number of points, every value must be finite,
    /// `sigx >= 0` and `sigz > 0`.
    pub fn new(
        x: Vec<Vec<f64>>,
        z: Vec<f64>,
        sigx: Vec<Vec<f64>>,
        sigz: Vec<f64>,
    ) -> Result<Self, FitError> {
        let m = x.first().map(|row| row.len()).unwrap_or(0);
        for row in &x {
            check_len("x row length", m, row.len())?;
        }
        for row in &sigx {
            check_len("sigx row length", m, row.len())?;
        }
        if sigx.len() != x.len() {
            return Err(FitError::ShapeMismatch {
                what: "sigx rows",
                expected: x.len(),
                got: sigx.len(),
            });
        }
        let x = x.into_iter().flatten().collect();
        let sigx = sigx.into_iter().flatten().collect();
        Self::from_flat(m, x, z, sigx, sigz)
    }

    /// Build an observation set from row-major flattened `x` / `sigx`.
    pub fn from_flat(
        m: usize,
        x: Vec<f64>,
        z: Vec<f64>,
        sigx: Vec<f64>,
        sigz: Vec<f64>,
    ) -> Result<Self, FitError> {
        if m == 0 {
            return Err(FitError::ShapeMismatch {
                what: "independent dimensions",
                expected: 1,
                got: 0,
            });
        }
        let n = z.len();
        if n == 0 {
            return Err(FitError::InsufficientData { needed: 1, got: 0 });
        }
        check_len("x", n * m, x.len())?;
        check_len("sigx", n * m, sigx.len())?;
        check_len("sigz", n, sigz.len())?;

        check_finite("x", &x)?;
        check_finite("z", &z)?;
        check_finite("sigx", &sigx)?;
        check_finite("sigz", &sigz)?;

        if let Some(index) = sigx.iter().position(|&s| s < 0.0) {
            return Err(FitError::InvalidUncertainty { what: "sigx", index });
        }
        if let Some(index) = sigz.iter().position(|&s| s <= 0.0) {
            return Err(FitError::InvalidUncertainty { what: "sigz", index });
        }

        Ok(Self {
            m,
            x,
            z,
            sigx,
            sigz,
        })
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.z.len()
    }

    /// Always false for a validated set; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    /// Number of independent variables `m`.
    pub fn dim(&self) -> usize {
        self.m
    }

    /// Number of plane coefficients `p = m + 1`.
    pub fn n_params(&self) -> usize {
        self.m + 1
    }

    pub fn x_row(&self, i: usize) -> &[f64] {
        &self.x[i * self.m..(i + 1) * self.m]
    }

    pub fn sigx_row(&self, i: usize) -> &[f64] {
        &self.sigx[i * self.m..(i + 1) * self.m]
    }

    pub fn z(&self) -> &[f64] {
        &self.z
    }

    pub fn sigz(&self) -> &[f64] {
        &self.sigz
    }

    /// Per-dimension median of `x`, a good default pivot.
    pub fn median_pivot(&self) -> Vec<f64> {
        (0..self.m)
            .map(|j| {
                let mut column: Vec<f64> = (0..self.len()).map(|i| self.x[i * self.m + j]).collect();
                crate::math::median_mut(&mut column).unwrap_or(0.0)
            })
            .collect()
    }

    /// Copy of the set with `pivot` subtracted from every `x` row.
    pub fn centered(&self, pivot: &[f64]) -> Self {
        let x = self
            .x
            .chunks(self.m)
            .flat_map(|row| row.iter().zip(pivot).map(|(v, p)| v - p))
            .collect();
        Self {
            x,
            ..self.clone()
        }
    }

    /// Copy of the set with `sig_int` added in quadrature to every `sigz`.
    pub fn with_intrinsic_scatter(&self, sig_int: f64) -> Self {
        if sig_int <= 0.0 {
            return self.clone();
        }
        let sigz = self.sigz.iter().map(|s| s.hypot(sig_int)).collect();
        Self {
            sigz,
            ..self.clone()
        }
    }

    /// Copy of the set with every `sigz` multiplied by `factor`.
    pub fn with_scaled_sigz(&self, factor: f64) -> Self {
        let sigz = self.sigz.iter().map(|s| s * factor).collect();
        Self {
            sigz,
            ..self.clone()
        }
    }
}

/// Unvalidated wire form of [`Observations`].
#[derive(Deserialize)]
struct RawObservations {
    m: usize,
    x: Vec<f64>,
    z: Vec<f64>,
    sigx: Vec<f64>,
    sigz: Vec<f64>,
}

impl TryFrom<RawObservations> for Observations {
    type Error = FitError;

    fn try_from(raw: RawObservations) -> Result<Self, Self::Error> {
        Observations::from_flat(raw.m, raw.x, raw.z, raw.sigx, raw.sigz)
    }
}

fn check_len(what: &'static str, expected: usize, got: usize) -> Result<(), FitError> {
    if expected == got {
        Ok(())
    } else {
        Err(FitError::ShapeMismatch {
            what,
            expected,
            got,
        })
    }
}

fn check_finite(what: &'static str, values: &[f64]) -> Result<(), FitError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(FitError::NonFinite { what, index }),
        None => Ok(()),
    }
}

/// Fit configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    /// Clipping threshold (in residual standard deviations) of the inside-out pass.
    pub clip: f64,
    /// Minimum inlier fraction in `[0.5, 1]`.
    ///
    /// `None` uses the breakdown minimum `h = (n + p + 1) / 2`. `Some(1.0)`
    /// disables outlier detection.
    pub frac: Option<f64>,
    /// Reference point subtracted from `x`. `None` means the origin.
    pub pivot: Option<Vec<f64>>,
    /// Estimate the intrinsic scatter. When false it is fixed at zero.
    pub fit_scatter: bool,
    /// Seed of the multi-start generator.
    pub seed: u64,
    pub n_starts: usize,
    pub n_best: usize,
    pub c_steps: usize,
    pub max_trim_iter: usize,
    /// Evaluate random starts on the rayon pool. Results do not depend on it.
    pub parallel: bool,
    /// Root-finding tolerance, relative to the scatter search bracket.
    pub root_tol: f64,
    pub max_root_iter: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            clip: DEFAULT_CLIP,
            frac: None,
            pivot: None,
            fit_scatter: true,
            seed: 0,
            n_starts: DEFAULT_N_STARTS,
            n_best: DEFAULT_N_BEST,
            c_steps: DEFAULT_C_STEPS,
            max_trim_iter: DEFAULT_MAX_TRIM_ITER,
            parallel: true,
            root_tol: 1e-6,
            max_root_iter: 100,
        }
    }
}

impl FitConfig {
    /// Check settings that do not depend on the data.
    pub fn validate(&self) -> Result<(), FitError> {
        if !(self.clip.is_finite() && self.clip > 0.0) {
            return Err(FitError::InvalidConfig(format!(
                "clip must be finite and > 0, got {}",
                self.clip
            )));
        }
        if let Some(frac) = self.frac {
            if !(frac.is_finite() && (0.5..=1.0).contains(&frac)) {
                return Err(FitError::InvalidConfig(format!(
                    "frac must lie in [0.5, 1], got {frac}"
                )));
            }
        }
        if self.n_starts == 0 || self.n_best == 0 || self.c_steps == 0 {
            return Err(FitError::InvalidConfig(
                "n_starts, n_best and c_steps must all be >= 1".to_string(),
            ));
        }
        if self.max_trim_iter == 0 || self.max_root_iter == 0 {
            return Err(FitError::InvalidConfig(
                "iteration caps must be >= 1".to_string(),
            ));
        }
        if !(self.root_tol.is_finite() && self.root_tol > 0.0) {
            return Err(FitError::InvalidConfig(format!(
                "root_tol must be finite and > 0, got {}",
                self.root_tol
            )));
        }
        Ok(())
    }
}

/// Outcome of a single nonlinear refinement.
///
/// Degenerate refinements (singular or indefinite covariance) carry the last
/// coefficients but no errors; they rank behind every converged candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum FitOutcome {
    Converged {
        abc: Vec<f64>,
        abc_err: Vec<f64>,
        chi2: f64,
    },
    Degenerate {
        abc: Vec<f64>,
    },
}

impl FitOutcome {
    pub fn abc(&self) -> &[f64] {
        match self {
            FitOutcome::Converged { abc, .. } | FitOutcome::Degenerate { abc } => abc,
        }
    }

    /// Ranking key: degenerate outcomes compare as `+inf`.
    pub fn chi2(&self) -> f64 {
        match self {
            FitOutcome::Converged { chi2, .. } => *chi2,
            FitOutcome::Degenerate { .. } => f64::INFINITY,
        }
    }

    /// 1-sigma errors; infinite for degenerate outcomes.
    pub fn abc_err(&self) -> Vec<f64> {
        match self {
            FitOutcome::Converged { abc_err, .. } => abc_err.clone(),
            FitOutcome::Degenerate { abc } => vec![f64::INFINITY; abc.len()],
        }
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self, FitOutcome::Degenerate { .. })
    }
}

/// Final result of a robust plane fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// `[a, b_1 .. b_m]` for `z = a + Σ b_j (x_j - pivot_j)`.
    pub abc: Vec<f64>,
    pub abc_err: Vec<f64>,
    /// `true` for points kept in the final fit.
    pub mask: Vec<bool>,
    pub sig_int: f64,
    pub sig_int_err: f64,
    /// Standard deviation (ddof = p) of raw residuals over the inliers.
    pub rms: f64,
    /// Sum of squared normalized residuals over the inliers.
    pub chi2: f64,
    pub n_inliers: usize,
    pub pivot: Vec<f64>,
    /// Set when the final refinement could not estimate a covariance.
    pub degenerate: bool,
}

impl FitResult {
    /// Evaluate the fitted plane at `x` (uncentered coordinates).
    ///
    /// `x` must have one value per slope.
    pub fn predict(&self, x: &[f64]) -> f64 {
        debug_assert_eq!(x.len(), self.pivot.len(), "predict: wrong number of coordinates");
        self.abc[0]
            + x.iter()
                .zip(&self.pivot)
                .zip(&self.abc[1..])
                .map(|((xj, pj), bj)| bj * (xj - pj))
                .sum::<f64>()
    }

    /// Raw residuals `model - z` for every point of `obs`.
    pub fn residuals(&self, obs: &Observations) -> Vec<f64> {
        (0..obs.len())
            .map(|i| self.predict(obs.x_row(i)) - obs.z()[i])
            .collect()
    }

    /// Indices of rejected points.
    pub fn outliers(&self) -> Vec<usize> {
        self.mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| (!keep).then_some(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> Observations {
        Observations::new(
            vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]],
            vec![1.0, 2.0, 3.0],
            vec![vec![0.1, 0.1]; 3],
            vec![0.2; 3],
        )
        .unwrap()
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = Observations::new(
            vec![vec![1.0, 2.0], vec![1.0]],
            vec![1.0, 2.0],
            vec![vec![0.1, 0.1], vec![0.1]],
            vec![0.1, 0.1],
        )
        .unwrap_err();
        assert!(matches!(err, FitError::ShapeMismatch { what: "x row length", .. }));

        let err = Observations::new(
            vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            vec![1.0, 2.0],
            vec![vec![0.1, 0.1], vec![0.1]],
            vec![0.1, 0.1],
        )
        .unwrap_err();
        assert_eq!(
            err,
            FitError::ShapeMismatch {
                what: "sigx row length",
                expected: 2,
                got: 1
            }
        );
    }

    #[test]
    fn deserialization_validates() {
        let ragged = r#"{"m":1,"x":[0.0,1.0],"z":[1.0,2.0,3.0,4.0,5.0],"sigx":[0.1],"sigz":[0.1,0.1,0.1,0.1,0.1]}"#;
        let err = serde_json::from_str::<Observations>(ragged).unwrap_err();
        assert!(err.to_string().contains("shape mismatch in x: expected 5, got 2"), "{err}");

        let no_dims = r#"{"m":0,"x":[],"z":[1.0,2.0],"sigx":[],"sigz":[0.1,0.1]}"#;
        assert!(serde_json::from_str::<Observations>(no_dims).is_err());

        let obs = tiny();
        let json = serde_json::to_string(&obs).unwrap();
        assert_eq!(serde_json::from_str::<Observations>(&json).unwrap(), obs);
    }

    #[test]
    fn rejects_non_finite_and_bad_sigmas() {
        let err = Observations::from_flat(1, vec![1.0, f64::NAN], vec![1.0, 2.0], vec![0.1; 2], vec![0.1; 2])
            .unwrap_err();
        assert_eq!(err, FitError::NonFinite { what: "x", index: 1 });

        let err = Observations::from_flat(1, vec![1.0, 2.0], vec![1.0, 2.0], vec![0.1; 2], vec![0.1, 0.0])
            .unwrap_err();
        assert_eq!(err, FitError::InvalidUncertainty { what: "sigz", index: 1 });

        let err = Observations::from_flat(1, vec![1.0, 2.0], vec![1.0, 2.0], vec![-0.1, 0.1], vec![0.1; 2])
            .unwrap_err();
        assert_eq!(err, FitError::InvalidUncertainty { what: "sigx", index: 0 });
    }

    #[test]
    fn median_pivot_and_centering() {
        let obs = tiny();
        assert_eq!(obs.median_pivot(), vec![2.0, 20.0]);
        let c = obs.centered(&[2.0, 20.0]);
        assert_eq!(c.x_row(0), &[-1.0, -10.0]);
        assert_eq!(c.z(), obs.z());
    }

    #[test]
    fn scatter_is_added_in_quadrature() {
        let obs = tiny().with_intrinsic_scatter(0.15);
        assert!((obs.sigz()[0] - 0.25).abs() < 1e-12);
        assert_eq!(tiny().with_intrinsic_scatter(0.0), tiny());
    }

    #[test]
    fn config_validation() {
        assert!(FitConfig::default().validate().is_ok());
        let bad = FitConfig {
            frac: Some(0.4),
            ..FitConfig::default()
        };
        assert!(matches!(bad.validate(), Err(FitError::InvalidConfig(_))));
        let bad = FitConfig {
            clip: 0.0,
            ..FitConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn degenerate_outcome_ranks_last() {
        let d = FitOutcome::Degenerate { abc: vec![1.0, 2.0] };
        assert!(d.chi2().is_infinite());
        assert!(d.abc_err().iter().all(|e| e.is_infinite()));
    }

    #[test]
    fn predict_uses_pivot() {
        let result = FitResult {
            abc: vec![1.0, 2.0],
            abc_err: vec![0.1, 0.1],
            mask: vec![true, false],
            sig_int: 0.0,
            sig_int_err: 0.0,
            rms: 0.0,
            chi2: 0.0,
            n_inliers: 1,
            pivot: vec![3.0],
            degenerate: false,
        };
        assert_eq!(result.predict(&[4.0]), 3.0);
        assert_eq!(result.outliers(), vec![1]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "wrong number of coordinates")]
    fn predict_rejects_short_coordinates() {
        let result = FitResult {
            abc: vec![1.0, 2.0, 3.0],
            abc_err: vec![0.1; 3],
            mask: vec![true],
            sig_int: 0.0,
            sig_int_err: 0.0,
            rms: 0.0,
            chi2: 0.0,
            n_inliers: 1,
            pivot: vec![0.0, 0.0],
            degenerate: false,
        };
        result.predict(&[1.0]);
    }
}
