//! Scalar root finding (Brent's method).
//!
//! The caller supplies a bracket `[a, b]` with `f(a)` and `f(b)` of opposite
//! sign. The function values at the end points are passed in because the
//! scatter search already evaluated them while looking for a bracket, and each
//! evaluation is a full robust fit.

/// Result of a bracketed root search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootResult {
    pub root: f64,
    pub iterations: usize,
    /// False when `max_iter` was reached before the bracket shrank below `tol`.
    pub converged: bool,
}

/// Find a sign change of `f` inside `[a, b]`.
///
/// `fa` and `fb` must have opposite signs (or one of them be zero).
pub fn brent<F>(mut f: F, a: f64, b: f64, fa: f64, fb: f64, tol: f64, max_iter: usize) -> RootResult
where
    F: FnMut(f64) -> f64,
{
    if fa == 0.0 {
        return RootResult {
            root: a,
            iterations: 0,
            converged: true,
        };
    }
    if fb == 0.0 {
        return RootResult {
            root: b,
            iterations: 0,
            converged: true,
        };
    }

    let (mut a, mut b, mut fa, mut fb) = (a, b, fa, fb);
    let (mut c, mut fc) = (b, fb);
    let mut d = b - a;
    let mut e = d;

    for iter in 1..=max_iter {
        if (fb > 0.0) == (fc > 0.0) {
            c = a;
            fc = fa;
            d = b - a;
            e = d;
        }
        if fc.abs() < fb.abs() {
            a = b;
            b = c;
            c = a;
            fa = fb;
            fb = fc;
            fc = fa;
        }

        let tol1 = 2.0 * f64::EPSILON * b.abs() + 0.5 * tol;
        let xm = 0.5 * (c - b);
        if xm.abs() <= tol1 || fb == 0.0 {
            return RootResult {
                root: b,
                iterations: iter,
                converged: true,
            };
        }

        if e.abs() >= tol1 && fa.abs() > fb.abs() {
            // Inverse quadratic interpolation, or secant when only two points are distinct.
            let s = fb / fa;
            let (mut p, mut q) = if a == c {
                (2.0 * xm * s, 1.0 - s)
            } else {
                let q = fa / fc;
                let r = fb / fc;
                (
                    s * (2.0 * xm * q * (q - r) - (b - a) * (r - 1.0)),
                    (q - 1.0) * (r - 1.0) * (s - 1.0),
                )
            };
            if p > 0.0 {
                q = -q;
            }
            p = p.abs();
            let min1 = 3.0 * xm * q - (tol1 * q).abs();
            let min2 = (e * q).abs();
            if 2.0 * p < min1.min(min2) {
                e = d;
                d = p / q;
            } else {
                d = xm;
                e = d;
            }
        } else {
            d = xm;
            e = d;
        }

        a = b;
        fa = fb;
        b += if d.abs() > tol1 { d } else { tol1.copysign(xm) };
        fb = f(b);
    }

    RootResult {
        root: b,
        iterations: max_iter,
        converged: false,
    }
}
