//! Derived metrics computed from raw price history before classification.

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Default volatility when the provider returned a series too short to be
/// meaningful. Routes the symbol into the very-high-risk band.
pub const VOLATILITY_NO_HISTORY_PCT: f64 = 100.0;

/// Default volatility when the price-history fetch itself failed.
pub const VOLATILITY_FETCH_FAILED_PCT: f64 = 50.0;

const MIN_CLOSES: usize = 10;

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Annualized standard deviation of daily close-to-close returns, in percent.
/// Sample stdev (n-1 denominator) over sqrt(252), matching the convention the
/// rest of the scoring assumes.
pub fn annualized_volatility_pct(closes: &[f64]) -> f64 {
    if closes.len() < MIN_CLOSES {
        return VOLATILITY_NO_HISTORY_PCT;
    }

    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();

    if returns.len() < 2 {
        return VOLATILITY_NO_HISTORY_PCT;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);

    round2(variance.sqrt() * TRADING_DAYS_PER_YEAR.sqrt() * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_series_defaults_to_no_history_volatility() {
        assert_eq!(annualized_volatility_pct(&[1.0; 9]), 100.0);
        assert_eq!(annualized_volatility_pct(&[]), 100.0);
    }

    #[test]
    fn constant_series_has_zero_volatility() {
        assert_eq!(annualized_volatility_pct(&[50.0; 30]), 0.0);
    }

    #[test]
    fn alternating_series_is_annualized_sample_stdev() {
        // Daily returns alternate +1% / ~-0.99%; stdev is ~1% -> ~15.9%
        // annualized. Just pin the rough band, the exact value is rounding
        // sensitive.
        let mut closes = vec![100.0];
        for i in 0..29 {
            let last = *closes.last().unwrap();
            let next = if i % 2 == 0 { last * 1.01 } else { last * 0.99 };
            closes.push(next);
        }
        let vol = annualized_volatility_pct(&closes);
        assert!(vol > 10.0 && vol < 20.0, "vol={vol}");
    }

    #[test]
    fn round2_keeps_two_decimals() {
        assert_eq!(round2(3.14159), 3.14);
        assert_eq!(round2(2.71828), 2.72);
        assert_eq!(round2(3.1000001), 3.1);
    }
}
