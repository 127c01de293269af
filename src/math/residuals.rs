//! Errors-in-variables residuals.
//!
//! The deviation of point `i` from the plane is normalized by its effective
//! standard deviation, which combines `sigz_i` with the `x` uncertainties
//! propagated through the current slopes:
//!
//! ```text
//! r_i = (a + x_i·b - z_i) / sqrt(Σ_j sigx_ij² b_j² + sigz_i²)
//! ```
//!
//! The denominator depends on `b`, so residuals must be recomputed whenever
//! the coefficients change.

use crate::domain::Observations;

/// Plane value `a + x·b`.
pub fn plane_value(abc: &[f64], x: &[f64]) -> f64 {
    abc[0] + x.iter().zip(&abc[1..]).map(|(xj, bj)| xj * bj).sum::<f64>()
}

/// Effective 1-sigma width of point `i` for slopes `abc[1..]`.
pub fn effective_sigma(abc: &[f64], sigx: &[f64], sigz: f64) -> f64 {
    let var_x: f64 = sigx
        .iter()
        .zip(&abc[1..])
        .map(|(s, b)| (s * b) * (s * b))
        .sum();
    (var_x + sigz * sigz).sqrt()
}

/// Normalized residual of point `i`.
pub fn normalized_residual(abc: &[f64], obs: &Observations, i: usize) -> f64 {
    let d = plane_value(abc, obs.x_row(i)) - obs.z()[i];
    d / effective_sigma(abc, obs.sigx_row(i), obs.sigz()[i])
}

/// Normalized residuals of every point.
pub fn normalized_residuals(abc: &[f64], obs: &Observations) -> Vec<f64> {
    (0..obs.len())
        .map(|i| normalized_residual(abc, obs, i))
        .collect()
}

/// Raw residuals `a + x·b - z` of every point.
pub fn raw_residuals(abc: &[f64], obs: &Observations) -> Vec<f64> {
    (0..obs.len())
        .map(|i| plane_value(abc, obs.x_row(i)) - obs.z()[i])
        .collect()
}

/// Sum of squared normalized residuals over `idx`.
pub fn chi2(abc: &[f64], obs: &Observations, idx: &[usize]) -> f64 {
    idx.iter()
        .map(|&i| {
            let r = normalized_residual(abc, obs, i);
            r * r
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> Observations {
        Observations::from_flat(
            1,
            vec![0.0, 1.0, 2.0],
            vec![2.0, 5.0, 9.0],
            vec![0.3, 0.3, 0.3],
            vec![0.4, 0.4, 0.4],
        )
        .unwrap()
    }

    #[test]
    fn x_errors_propagate_through_slope() {
        // slope 0 => only sigz counts; slope 1 => sqrt(0.3² + 0.4²) = 0.5
        assert!((effective_sigma(&[0.0, 0.0], &[0.3], 0.4) - 0.4).abs() < 1e-15);
        assert!((effective_sigma(&[0.0, 1.0], &[0.3], 0.4) - 0.5).abs() < 1e-15);
    }

    #[test]
    fn residual_sign_is_model_minus_data() {
        let obs = line();
        let abc = [2.0, 3.0];
        let sig = effective_sigma(&abc, &[0.3], 0.4);
        let r = normalized_residuals(&abc, &obs);
        assert_eq!(r[0], 0.0);
        assert_eq!(r[1], 0.0);
        assert!((r[2] - (-1.0 / sig)).abs() < 1e-12);
        assert_eq!(raw_residuals(&abc, &obs), vec![0.0, 0.0, -1.0]);
        assert!((chi2(&abc, &obs, &[0, 1, 2]) - 1.0 / (sig * sig)).abs() < 1e-12);
    }
}
