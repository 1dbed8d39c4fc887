//! Relative Strength Index (RSI).
//!
//! Wilder smoothing (`alpha = 1 / period`) of per-bar gains and losses,
//! where the first bar contributes a zero change. The value is undefined
//! until `period` observations have been seen and wherever both averages
//! are zero; undefined positions are reported as the neutral value 50.
//! avg_loss == 0 with avg_gain > 0 → RSI = 100.

use super::ema::ewm;

pub const RSI_NEUTRAL: f64 = 50.0;

pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let period = period.max(1);

    let mut gains = Vec::with_capacity(n);
    let mut losses = Vec::with_capacity(n);
    for i in 0..n {
        let change = if i == 0 { 0.0 } else { closes[i] - closes[i - 1] };
        // NaN changes count as flat
        gains.push(if change > 0.0 { change } else { 0.0 });
        losses.push(if change < 0.0 { -change } else { 0.0 });
    }

    let alpha = 1.0 / period as f64;
    let avg_gain = ewm(&gains, alpha);
    let avg_loss = ewm(&losses, alpha);

    (0..n)
        .map(|i| {
            if i + 1 < period {
                return RSI_NEUTRAL;
            }
            let (g, l) = (avg_gain[i], avg_loss[i]);
            if l == 0.0 {
                if g > 0.0 {
                    100.0
                } else {
                    RSI_NEUTRAL
                }
            } else {
                100.0 - 100.0 / (1.0 + g / l)
            }
        })
        .collect()
}
