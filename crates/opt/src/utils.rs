use libm::{erf, erfc, exp, expm1, log, log1p};

const SQRT_2: f64 = std::f64::consts::SQRT_2;
const INV_SQRT_2: f64 = 0.7071067811865475;
const SQRT_2PI: f64 = 2.5066282746310002;
const LOG_2PI_OVER_2: f64 = 0.9189385332046727; // log(2π)/2
const LOG_PI_OVER_2_ALL_OVER_2: f64 = 0.2257913526447274; // log(π/2)/2

/// Variance under which a prediction is considered deterministic
pub(crate) const VAR_EPSILON: f64 = 10000. * f64::EPSILON;

/// Cumulative distribution function of Standard Normal at x
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Probability density function of Standard Normal at x
pub fn norm_pdf(x: f64) -> f64 {
    exp(-0.5 * x * x) / SQRT_2PI
}

fn erfcx(u: f64) -> f64 {
    exp(u * u) * erfc(u)
}

fn log1mexp(x: f64) -> f64 {
    if x > -std::f64::consts::LN_2 {
        log(-expm1(x))
    } else {
        log1p(-exp(x))
    }
}

/// log(φ(u) + u Φ(u)) computed without underflow for very negative `u`
pub fn log_ei_helper(u: f64) -> f64 {
    if u > -1.0 {
        log(norm_pdf(u) + u * 0.5 * (1.0 + erf(u / SQRT_2)))
    } else {
        let log_phi_u = -0.5 * u * u - LOG_2PI_OVER_2;

        let log_term = if u > -1. / f64::sqrt(1e-6) {
            let w = log(erfcx(-INV_SQRT_2 * u) * u.abs()) + LOG_PI_OVER_2_ALL_OVER_2;
            log1mexp(w)
        } else {
            -2.0 * log(u.abs())
        };

        log_phi_u + log_term
    }
}

/// Expected value of `(threshold - Y)+` where `Y ~ N(mean, sigma²)`.
///
/// A `-inf` threshold gives 0, a null sigma gives the plain positive part.
pub fn expected_shortfall(threshold: f64, mean: f64, sigma: f64) -> f64 {
    if threshold == f64::NEG_INFINITY {
        return 0.;
    }
    if sigma * sigma < VAR_EPSILON {
        return (threshold - mean).max(0.);
    }
    let u = (threshold - mean) / sigma;
    sigma * (u * norm_cdf(u) + norm_pdf(u))
}

/// Probability for a gaussian prediction to be lower than `threshold`
pub fn prob_below(threshold: f64, mean: f64, var: f64) -> f64 {
    if var.abs() < VAR_EPSILON {
        if mean <= threshold {
            1.
        } else {
            0.
        }
    } else {
        norm_cdf((threshold - mean) / var.sqrt())
    }
}
