//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1]
//! Seed: EMA at the first finite observation equals that observation, so
//! the series is defined from the first bar on (no warmup window).

/// EMA with span `span` (`alpha = 2 / (span + 1)`).
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span.max(1) as f64 + 1.0);
    ewm(values, alpha)
}

/// Exponentially weighted mean seeded with the first finite observation.
///
/// NaN inputs hold the previous value (they carry no weight); leading NaNs
/// stay NaN.
pub fn ewm(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut result = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match (prev, v.is_nan()) {
            (None, true) => None,
            (None, false) => Some(v),
            (Some(p), true) => Some(p),
            (Some(p), false) => Some(alpha * v + (1.0 - alpha) * p),
        };
        result.push(next.unwrap_or(f64::NAN));
        prev = next;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn ema_seeds_with_first_value() {
        let out = ema(&[10.0, 11.0, 12.0], 3);
        // alpha = 0.5
        assert_approx(out[0], 10.0, DEFAULT_EPSILON);
        assert_approx(out[1], 10.5, DEFAULT_EPSILON);
        assert_approx(out[2], 11.25, DEFAULT_EPSILON);
    }

    #[test]
    fn constant_series_is_fixed_point() {
        let out = ema(&[7.0; 20], 9);
        assert!(out.iter().all(|v| (v - 7.0).abs() < DEFAULT_EPSILON));
    }

    #[test]
    fn leading_nan_stays_nan() {
        let out = ewm(&[f64::NAN, 4.0, 6.0], 0.5);
        assert!(out[0].is_nan());
        assert_approx(out[1], 4.0, DEFAULT_EPSILON);
        assert_approx(out[2], 5.0, DEFAULT_EPSILON);
    }
}
