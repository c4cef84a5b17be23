//! Implicit reparameterization for `Gamma(alpha, 1)` draws.
//!
//! A draw `g` with CDF `F(g; alpha)` moves with its shape parameter as
//!
//! ```text
//! dg/dalpha = -(dF/dalpha)(g; alpha) / f(g; alpha)
//! ```
//!
//! where `f` is the density. `F` is the regularized lower incomplete gamma
//! function; its `alpha` derivative is taken by central differences on
//! whichever of `P` / `Q` is numerically accurate at `(alpha, g)`.

const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

const MAX_ITER: usize = 10_000;
const EPS: f64 = 1e-15;
const TINY: f64 = 1e-300;

/// `ln Γ(x)` for `x > 0`.
pub(crate) fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let t = x + 7.5;
    let mut acc = LANCZOS[0];
    for (i, c) in LANCZOS.iter().enumerate().skip(1) {
        acc += c / (x + i as f64);
    }
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
}

/// `P(a, x)` by its power series; accurate for `x < a + 1`.
fn lower_series(a: f64, x: f64) -> f64 {
    let mut n = a;
    let mut term = 1.0 / a;
    let mut sum = term;
    for _ in 0..MAX_ITER {
        n += 1.0;
        term *= x / n;
        sum += term;
        if term.abs() < sum.abs() * EPS {
            break;
        }
    }
    (sum.ln() + a * x.ln() - x - ln_gamma(a)).exp()
}

/// `Q(a, x)` by Lentz's continued fraction; accurate for `x >= a + 1`.
fn upper_fraction(a: f64, x: f64) -> f64 {
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / TINY;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..MAX_ITER {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < TINY {
            d = TINY;
        }
        c = b + an / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let step = d * c;
        h *= step;
        if (step - 1.0).abs() < EPS {
            break;
        }
    }
    (a * x.ln() - x - ln_gamma(a)).exp() * h
}

/// Regularized lower incomplete gamma `P(a, x)`.
pub(crate) fn regularized_lower(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        0.0
    } else if x < a + 1.0 {
        lower_series(a, x)
    } else {
        1.0 - upper_fraction(a, x)
    }
}

/// `dg/dalpha` for a draw `g ~ Gamma(alpha, 1)`. Returns `0` where the
/// density underflows.
pub(crate) fn reparam_slope(alpha: f64, g: f64) -> f64 {
    if !(g > 0.0 && alpha > 0.0) {
        return 0.0;
    }
    let h = alpha * 1e-5;
    let d_cdf = if g < alpha + 1.0 {
        (lower_series(alpha + h, g) - lower_series(alpha - h, g)) / (2.0 * h)
    } else {
        -(upper_fraction(alpha + h, g) - upper_fraction(alpha - h, g)) / (2.0 * h)
    };
    let ln_density = (alpha - 1.0) * g.ln() - g - ln_gamma(alpha);
    let slope = -d_cdf * (-ln_density).exp();
    if slope.is_finite() {
        slope
    } else {
        0.0
    }
}
