//! Simple Moving Average (SMA) and the other trailing-window reductions.
//!
//! All functions take a value series and return a series of the same length.
//! Index `i` covers `values[i + 1 - period..=i]`; the first `period - 1`
//! entries are NaN, and any window containing a NaN yields NaN.

/// Rolling mean over `period` values.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut sum = 0.0;
    let mut nan_count = 0usize;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            nan_count += 1;
        } else {
            sum += v;
        }

        if i >= period {
            let leaving = values[i - period];
            if leaving.is_nan() {
                nan_count -= 1;
            } else {
                sum -= leaving;
            }
        }

        if i + 1 >= period && nan_count == 0 {
            result[i] = sum / period as f64;
        }
    }
    result
}

/// Rolling sample standard deviation (n - 1 denominator).
///
/// A window of one value has no sample deviation and stays NaN.
pub fn rolling_std(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period < 2 || n < period {
        return result;
    }

    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mean = window.iter().sum::<f64>() / period as f64;
        let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (period - 1) as f64;
        result[i] = var.sqrt();
    }
    result
}

/// Rolling maximum over `period` values.
pub fn rolling_max(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        result[i] = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    }
    result
}

/// Shift a series forward by one bar: `out[i] = values[i - 1]`, `out[0] = NaN`.
pub fn shift_one(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if !values.is_empty() {
        out.push(f64::NAN);
        out.extend_from_slice(&values[..values.len() - 1]);
    }
    out
}
