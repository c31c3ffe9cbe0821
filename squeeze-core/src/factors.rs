//! Factor score functions.
//!
//! Each maps one raw market signal to a 0–100 sub-score. All are total over
//! finite input: divisions are guarded and results clamped. Missing data
//! (zero or negative volatility, prices or volumes) maps to the neutral
//! score 50 where the factor has a neutral reading.

use serde::{Deserialize, Serialize};

use crate::config::MarginTiers;

/// Score returned when a factor's inputs are missing.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Trading days per year used to annualize volatility.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Historical range of daily borrow-balance changes, `(min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BorrowRange {
    pub min: f64,
    pub max: f64,
}

impl Default for BorrowRange {
    fn default() -> Self {
        Self {
            min: -1_000_000.0,
            max: 1_000_000.0,
        }
    }
}

/// Borrow factor: short covering (negative change) scores high.
///
/// - `change >= 0`: `max(0, 30 − change/max·30)`, so new shorting lands in 0–30.
/// - `change < 0`: `min(100, 50 + |change|/|min|·50)`, so covering lands in 50–100.
///
/// A zero bound cannot be used as a denominator: with `max == 0` an unchanged
/// balance scores 30 and any increase 0; with `min == 0` any decrease scores 100.
/// A negative `max` runs through the formula and is clamped to [0,100].
pub fn borrow_score(change: f64, range: BorrowRange) -> f64 {
    if change >= 0.0 {
        if range.max == 0.0 {
            return if change == 0.0 { 30.0 } else { 0.0 };
        }
        return (30.0 - change / range.max * 30.0).clamp(0.0, 100.0);
    }

    let denom = range.min.abs();
    if denom == 0.0 {
        return 100.0;
    }
    let normalized = change.abs() / denom;
    (NEUTRAL_SCORE + normalized * 50.0).min(100.0)
}

/// Gamma factor: implied volatility below realized volatility scores high.
///
/// `divergence = (hv − iv) / hv`. Positive divergence (options cheap)
/// scores `50 + 100·d`; otherwise `50 + 50·d`. Clamped to [0,100].
pub fn gamma_score(iv: f64, hv: f64) -> f64 {
    if iv <= 0.0 || hv <= 0.0 {
        return NEUTRAL_SCORE;
    }

    let divergence = (hv - iv) / hv;
    if divergence > 0.0 {
        (NEUTRAL_SCORE + divergence * 100.0).min(100.0)
    } else {
        (NEUTRAL_SCORE + divergence * 50.0).max(0.0)
    }
}

/// Margin factor: a higher short/margin ratio (crowded shorts) scores high.
///
/// Piecewise linear over the configured tiers:
/// `[0,tier1) → 0..40`, `[tier1,tier2) → 40..70`, `[tier2,tier3) → 70..100`,
/// `>= tier3 → 100`. Non-decreasing in `ratio`.
pub fn margin_score(ratio: f64, tiers: &MarginTiers) -> f64 {
    let MarginTiers {
        tier1,
        tier2,
        tier3,
    } = *tiers;

    if ratio <= 0.0 {
        return 0.0;
    }
    if ratio >= tier3 {
        return 100.0;
    }

    let score = if ratio >= tier2 {
        70.0 + interpolate(ratio, tier2, tier3) * 30.0
    } else if ratio >= tier1 {
        40.0 + interpolate(ratio, tier1, tier2) * 30.0
    } else {
        interpolate(ratio, 0.0, tier1) * 40.0
    };
    score.clamp(0.0, 100.0)
}

/// Position of `x` within `[lo, hi)` as a 0–1 fraction. Zero-width spans map to 0.
fn interpolate(x: f64, lo: f64, hi: f64) -> f64 {
    let width = hi - lo;
    if width <= 0.0 {
        return 0.0;
    }
    ((x - lo) / width).clamp(0.0, 1.0)
}

/// Momentum factor: a price breakout on heavy volume scores high.
///
/// Base `50 ± min(25, |Δ|·500)` from the daily price change, then a volume
/// bonus by `volume / avg_volume` (>2.0 → +25, >1.5 → +15, >1.0 → +5,
/// else −10) and +10 when `price` clears `resistance`.
pub fn momentum_score(
    price: f64,
    prev_price: f64,
    volume: u64,
    avg_volume: f64,
    resistance: Option<f64>,
) -> f64 {
    if prev_price <= 0.0 || avg_volume <= 0.0 {
        return NEUTRAL_SCORE;
    }

    let price_change = (price - prev_price) / prev_price;
    let base = NEUTRAL_SCORE + (price_change * 500.0).clamp(-25.0, 25.0);

    let volume_ratio = volume as f64 / avg_volume;
    let volume_bonus = if volume_ratio > 2.0 {
        25.0
    } else if volume_ratio > 1.5 {
        15.0
    } else if volume_ratio > 1.0 {
        5.0
    } else {
        -10.0
    };

    let breakout_bonus = match resistance {
        Some(level) if price > level => 10.0,
        _ => 0.0,
    };

    (base + volume_bonus + breakout_bonus).clamp(0.0, 100.0)
}

/// Annualized historical volatility of log returns over the trailing `window`.
///
/// Uses the last `window + 1` closes and the sample standard deviation
/// (n − 1). Returns `None` with too little history, a window below 2, or
/// any non-positive close in the window.
pub fn historical_volatility(closes: &[f64], window: usize) -> Option<f64> {
    if window < 2 || closes.len() < window + 1 {
        return None;
    }

    let tail = &closes[closes.len() - (window + 1)..];
    if tail.iter().any(|&c| c <= 0.0 || !c.is_finite()) {
        return None;
    }

    let returns: Vec<f64> = tail.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);

    Some(variance.sqrt() * TRADING_DAYS_PER_YEAR.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RANGE: BorrowRange = BorrowRange {
        min: -1_000_000.0,
        max: 1_000_000.0,
    };

    #[test]
    fn borrow_heavy_covering_scores_high() {
        assert!(borrow_score(-500_000.0, RANGE) >= 70.0);
        assert_eq!(borrow_score(-2_000_000.0, RANGE), 100.0);
    }

    #[test]
    fn borrow_heavy_shorting_scores_low() {
        assert!(borrow_score(800_000.0, RANGE) <= 30.0);
        assert_eq!(borrow_score(2_000_000.0, RANGE), 0.0);
    }

    #[test]
    fn borrow_unchanged_scores_thirty() {
        assert_eq!(borrow_score(0.0, RANGE), 30.0);
    }

    #[test]
    fn borrow_degenerate_range_is_guarded() {
        let flat = BorrowRange { min: 0.0, max: 0.0 };
        assert_eq!(borrow_score(0.0, flat), 30.0);
        assert_eq!(borrow_score(10.0, flat), 0.0);
        assert_eq!(borrow_score(-10.0, flat), 100.0);
    }

    #[test]
    fn borrow_negative_max_uses_formula() {
        let shrinking = BorrowRange {
            min: -100.0,
            max: -100.0,
        };
        assert_eq!(borrow_score(10.0, shrinking), 33.0);
        assert_eq!(borrow_score(0.0, shrinking), 30.0);
        assert_eq!(borrow_score(1_000.0, shrinking), 100.0);
    }

    #[test]
    fn gamma_cheap_options_score_high() {
        assert!(gamma_score(0.20, 0.30) >= 70.0);
    }

    #[test]
    fn gamma_rich_options_score_low() {
        assert!(gamma_score(0.40, 0.25) <= 40.0);
    }

    #[test]
    fn gamma_missing_data_is_neutral() {
        assert_eq!(gamma_score(0.0, 0.3), NEUTRAL_SCORE);
        assert_eq!(gamma_score(0.3, 0.0), NEUTRAL_SCORE);
        assert_eq!(gamma_score(-0.1, -0.1), NEUTRAL_SCORE);
    }

    #[test]
    fn gamma_equal_vols_is_neutral() {
        assert_eq!(gamma_score(0.3, 0.3), NEUTRAL_SCORE);
    }

    #[test]
    fn margin_tier_boundaries() {
        let tiers = MarginTiers::default();
        assert_eq!(margin_score(0.0, &tiers), 0.0);
        assert_eq!(margin_score(-3.0, &tiers), 0.0);
        assert!((margin_score(5.0, &tiers) - 40.0).abs() < 1e-9);
        assert!((margin_score(10.0, &tiers) - 70.0).abs() < 1e-9);
        assert!((margin_score(15.0, &tiers) - 85.0).abs() < 1e-9);
        assert_eq!(margin_score(20.0, &tiers), 100.0);
        assert_eq!(margin_score(55.0, &tiers), 100.0);
    }

    #[test]
    fn margin_interpolates_within_first_tier() {
        let tiers = MarginTiers::default();
        assert!((margin_score(2.5, &tiers) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn momentum_breakout_on_volume() {
        // +3.4% on 2.5x volume
        let score = momentum_score(600.0, 580.0, 50_000_000, 20_000_000.0, None);
        assert!((score - 92.241_379).abs() < 1e-3);
    }

    #[test]
    fn momentum_resistance_bonus() {
        let without = momentum_score(101.0, 100.0, 1_200, 1_000.0, None);
        let with = momentum_score(101.0, 100.0, 1_200, 1_000.0, Some(100.5));
        assert!((with - without - 10.0).abs() < 1e-9);
        let below = momentum_score(101.0, 100.0, 1_200, 1_000.0, Some(105.0));
        assert_eq!(below, without);
    }

    #[test]
    fn momentum_selloff_on_light_volume() {
        // -10% caps at -25, light volume -10
        assert_eq!(momentum_score(90.0, 100.0, 100, 1_000.0, None), 15.0);
    }

    #[test]
    fn momentum_missing_history_is_neutral() {
        assert_eq!(momentum_score(100.0, 0.0, 1_000, 1_000.0, None), NEUTRAL_SCORE);
        assert_eq!(momentum_score(100.0, 99.0, 1_000, 0.0, None), NEUTRAL_SCORE);
    }

    #[test]
    fn hv_of_constant_series_is_zero() {
        let closes = vec![100.0; 25];
        assert_eq!(historical_volatility(&closes, 20), Some(0.0));
    }

    #[test]
    fn hv_needs_window_plus_one_closes() {
        let closes = vec![100.0; 20];
        assert_eq!(historical_volatility(&closes, 20), None);
    }

    #[test]
    fn hv_alternating_returns() {
        // Log returns alternate +r, -r, so mean ~0 and the std is ~r.
        let r: f64 = 0.01;
        let mut closes = vec![100.0];
        for i in 0..20 {
            let last = *closes.last().unwrap();
            let step = if i % 2 == 0 { r } else { -r };
            closes.push(last * step.exp());
        }
        let hv = historical_volatility(&closes, 20).unwrap();
        let expected = (r * r * 20.0 / 19.0).sqrt() * TRADING_DAYS_PER_YEAR.sqrt();
        assert!((hv - expected).abs() < 1e-9);
    }

    #[test]
    fn hv_rejects_non_positive_close() {
        let mut closes = vec![100.0; 22];
        closes[15] = 0.0;
        assert_eq!(historical_volatility(&closes, 20), None);
    }
}
