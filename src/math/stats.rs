//! Small descriptive statistics helpers.

/// Median of `values` (sorted in place). `None` for an empty slice.
pub fn median_mut(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Standard deviation with `ddof` degrees of freedom removed.
///
/// Returns NaN when `values.len() <= ddof`.
pub fn std_ddof<I>(values: I, ddof: usize) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let values: Vec<f64> = values.into_iter().collect();
    let n = values.len();
    if n <= ddof {
        return f64::NAN;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let ss: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    (ss / (n - ddof) as f64).sqrt()
}

/// Element-wise `|a - b| <= atol + rtol |b|`.
pub fn all_close(a: &[f64], b: &[f64], rtol: f64, atol: f64) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| (x - y).abs() <= atol + rtol * y.abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_odd_and_even() {
        assert_eq!(median_mut(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median_mut(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median_mut(&mut []), None);
    }

    #[test]
    fn std_with_ddof() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!((std_ddof(v, 0) - 1.25f64.sqrt()).abs() < 1e-12);
        assert!((std_ddof(v, 1) - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!(std_ddof([1.0], 1).is_nan());
    }

    #[test]
    fn closeness() {
        assert!(all_close(&[1.0, 2.0], &[1.0 + 1e-9, 2.0], 1e-5, 1e-8));
        assert!(!all_close(&[1.0], &[1.1], 1e-5, 1e-8));
    }
}
