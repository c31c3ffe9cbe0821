//! Forced-redemption day counter and warning classifier.
//!
//! A CB issuer may call the bond once the underlying closes at or above
//! `trigger_threshold_pct`% of the conversion price for
//! `trigger_days_required` consecutive trading days. The only state is the
//! consecutive-day counter, and it belongs to the caller: each call takes
//! yesterday's count and returns today's.
//!
//! Warning level is a pure function of the counter:
//!
//! | counter                           | level    |
//! |-----------------------------------|----------|
//! | `>= days_required`                | CRITICAL |
//! | `>= days_required × warning_frac` | WARNING  |
//! | `>= days_required × caution_frac` | CAUTION  |
//! | otherwise                         | SAFE     |
//!
//! The fractional boundaries are compared as raw floats. With defaults the
//! CAUTION line is 9.9, so day 10 is the first CAUTION day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::CbConfig;
use crate::squeeze::round2;

/// Redemption proximity, ordered `Safe < Caution < Warning < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningLevel {
    Safe,
    Caution,
    Warning,
    Critical,
}

impl WarningLevel {
    pub const ALL: [WarningLevel; 4] = [
        WarningLevel::Safe,
        WarningLevel::Caution,
        WarningLevel::Warning,
        WarningLevel::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Caution => "CAUTION",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }

    /// Classify a consecutive-day count.
    pub fn classify(consecutive_days: u32, config: &CbConfig) -> Self {
        let days = f64::from(consecutive_days);
        if consecutive_days >= config.trigger_days_required {
            Self::Critical
        } else if days >= config.warning_days() {
            Self::Warning
        } else if days >= config.caution_days() {
            Self::Caution
        } else {
            Self::Safe
        }
    }
}

impl std::fmt::Display for WarningLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WarningLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SAFE" => Ok(Self::Safe),
            "CAUTION" => Ok(Self::Caution),
            "WARNING" => Ok(Self::Warning),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(format!("unknown warning level '{other}'")),
        }
    }
}

/// One CB's market observation for one trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CbObservation {
    pub cb_id: String,
    pub underlying_id: String,
    pub trade_date: NaiveDate,
    /// Underlying close.
    pub price: f64,
    pub conversion_price: f64,
    /// Remaining outstanding balance (100M TWD).
    pub outstanding_balance: f64,
    /// Previous day's outstanding balance, if known.
    pub previous_balance: Option<f64>,
}

/// Warning state of one CB after one trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CbWarningResult {
    pub cb_id: String,
    pub underlying_id: String,
    pub trade_date: NaiveDate,
    pub price: f64,
    pub conversion_price: f64,
    /// `price / conversion_price × 100`, 0 when the conversion price is unusable.
    pub price_ratio: f64,
    pub is_above_trigger: bool,
    pub consecutive_days: u32,
    pub days_remaining: u32,
    /// Percent of `trigger_days_required` already served, capped at 100.
    pub trigger_progress: f64,
    pub outstanding_balance: f64,
    pub balance_change_pct: f64,
    pub warning_level: WarningLevel,
    pub comment: String,
}

/// Advance one CB by one trading day.
pub fn calculate_warning(
    observation: &CbObservation,
    previous_consecutive_days: u32,
    config: &CbConfig,
) -> CbWarningResult {
    let CbObservation {
        price,
        conversion_price,
        outstanding_balance,
        previous_balance,
        ..
    } = *observation;

    let price_ratio = if conversion_price > 0.0 {
        price / conversion_price * 100.0
    } else {
        0.0
    };

    let trigger_price = conversion_price * (config.trigger_threshold_pct / 100.0);
    let is_above_trigger = price >= trigger_price;

    let consecutive_days = if is_above_trigger {
        previous_consecutive_days.saturating_add(1)
    } else if config.reset_on_below {
        0
    } else {
        previous_consecutive_days
    };

    let required = config.trigger_days_required;
    let trigger_progress =
        (f64::from(consecutive_days) / f64::from(required) * 100.0).min(100.0);
    let days_remaining = required.saturating_sub(consecutive_days);

    let balance_change_pct = match previous_balance {
        Some(prev) if prev > 0.0 => (outstanding_balance - prev) / prev * 100.0,
        _ => 0.0,
    };

    let warning_level = WarningLevel::classify(consecutive_days, config);
    let comment = warning_comment(
        warning_level,
        consecutive_days,
        days_remaining,
        price_ratio,
        outstanding_balance,
        config,
    );

    CbWarningResult {
        cb_id: observation.cb_id.clone(),
        underlying_id: observation.underlying_id.clone(),
        trade_date: observation.trade_date,
        price,
        conversion_price,
        price_ratio: round2(price_ratio),
        is_above_trigger,
        consecutive_days,
        days_remaining,
        trigger_progress: round2(trigger_progress),
        outstanding_balance,
        balance_change_pct: round2(balance_change_pct),
        warning_level,
        comment,
    }
}

fn warning_comment(
    level: WarningLevel,
    days: u32,
    days_remaining: u32,
    price_ratio: f64,
    balance: f64,
    config: &CbConfig,
) -> String {
    match level {
        WarningLevel::Critical => format!(
            "Redemption threshold reached: {days} consecutive days at or above {}% of \
             conversion price; {balance:.2} (100M TWD) outstanding may face conversion pressure",
            config.trigger_threshold_pct
        ),
        WarningLevel::Warning => format!(
            "High alert: {days} consecutive days, only {days_remaining} days until forced \
             redemption can trigger; balance {balance:.2} (100M TWD)"
        ),
        WarningLevel::Caution => format!(
            "Monitor: {days} consecutive days above trigger, price/conversion = {price_ratio:.1}%"
        ),
        WarningLevel::Safe => format!(
            "Safe: price/conversion = {price_ratio:.1}%, no near-term redemption risk"
        ),
    }
}

/// Stateless calculator bound to a `CbConfig` snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct CbWarningCalculator {
    config: CbConfig,
}

impl CbWarningCalculator {
    pub fn new(config: CbConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CbConfig {
        &self.config
    }

    pub fn calculate_warning(
        &self,
        observation: &CbObservation,
        previous_consecutive_days: u32,
    ) -> CbWarningResult {
        calculate_warning(observation, previous_consecutive_days, &self.config)
    }

    /// Fold the day step over a time-ordered series for one CB.
    pub fn track_series(
        &self,
        observations: &[CbObservation],
        initial_days: u32,
    ) -> Vec<CbWarningResult> {
        track_warnings(observations, initial_days, &self.config)
    }
}

/// Fold `calculate_warning` over a time-ordered series for one CB.
///
/// `state_t = step(state_{t-1}, observation_t)`, starting from
/// `initial_days`. When an observation carries no previous balance, the
/// prior day's outstanding balance is threaded in.
pub fn track_warnings(
    observations: &[CbObservation],
    initial_days: u32,
    config: &CbConfig,
) -> Vec<CbWarningResult> {
    let mut days = initial_days;
    let mut carried_balance: Option<f64> = None;

    observations
        .iter()
        .map(|obs| {
            let result = match (obs.previous_balance, carried_balance) {
                (None, Some(_)) => {
                    let threaded = CbObservation {
                        previous_balance: carried_balance,
                        ..obs.clone()
                    };
                    calculate_warning(&threaded, days, config)
                }
                _ => calculate_warning(obs, days, config),
            };
            days = result.consecutive_days;
            carried_balance = Some(obs.outstanding_balance);
            result
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(price: f64, conversion_price: f64) -> CbObservation {
        CbObservation {
            cb_id: "23301".into(),
            underlying_id: "2330".into(),
            trade_date: NaiveDate::from_ymd_opt(2026, 1, 19).unwrap(),
            price,
            conversion_price,
            outstanding_balance: 35.0,
            previous_balance: None,
        }
    }

    fn calc() -> CbWarningCalculator {
        CbWarningCalculator::default()
    }

    #[test]
    fn price_ratio_and_trigger() {
        let r = calc().calculate_warning(&obs(1100.0, 850.0), 0);
        assert!((r.price_ratio - 129.41).abs() < 1e-9);
        assert!(!r.is_above_trigger);
        assert_eq!(r.consecutive_days, 0);
        assert_eq!(r.warning_level, WarningLevel::Safe);
    }

    #[test]
    fn equality_counts_as_above() {
        let r = calc().calculate_warning(&obs(130.0, 100.0), 0);
        assert!(r.is_above_trigger);
        assert_eq!(r.consecutive_days, 1);
    }

    #[test]
    fn zero_conversion_price_is_guarded() {
        let r = calc().calculate_warning(&obs(50.0, 0.0), 3);
        assert_eq!(r.price_ratio, 0.0);
        // Trigger price collapses to 0, so any non-negative price is above it.
        assert!(r.is_above_trigger);
        assert_eq!(r.consecutive_days, 4);
    }

    #[test]
    fn day_fifteen_is_caution_at_half_progress() {
        let r = calc().calculate_warning(&obs(140.0, 100.0), 14);
        assert_eq!(r.consecutive_days, 15);
        assert_eq!(r.trigger_progress, 50.0);
        assert_eq!(r.days_remaining, 15);
        assert_eq!(r.warning_level, WarningLevel::Caution);
        assert!(r.comment.starts_with("Monitor: 15 consecutive days"));
    }

    #[test]
    fn day_thirty_is_critical() {
        let r = calc().calculate_warning(&obs(140.0, 100.0), 29);
        assert_eq!(r.consecutive_days, 30);
        assert_eq!(r.trigger_progress, 100.0);
        assert_eq!(r.days_remaining, 0);
        assert_eq!(r.warning_level, WarningLevel::Critical);
        assert!(r.comment.contains("35.00"));
    }

    #[test]
    fn progress_caps_past_requirement() {
        let r = calc().calculate_warning(&obs(140.0, 100.0), 44);
        assert_eq!(r.consecutive_days, 45);
        assert_eq!(r.trigger_progress, 100.0);
        assert_eq!(r.days_remaining, 0);
    }

    #[test]
    fn raw_float_boundaries() {
        let cb = CbConfig::default();
        assert_eq!(WarningLevel::classify(9, &cb), WarningLevel::Safe);
        assert_eq!(WarningLevel::classify(10, &cb), WarningLevel::Caution);
        assert_eq!(WarningLevel::classify(19, &cb), WarningLevel::Caution);
        assert_eq!(WarningLevel::classify(20, &cb), WarningLevel::Warning);
        assert_eq!(WarningLevel::classify(29, &cb), WarningLevel::Warning);
        assert_eq!(WarningLevel::classify(30, &cb), WarningLevel::Critical);
    }

    #[test]
    fn below_trigger_resets_by_default() {
        let r = calc().calculate_warning(&obs(120.0, 100.0), 12);
        assert!(!r.is_above_trigger);
        assert_eq!(r.consecutive_days, 0);
    }

    #[test]
    fn below_trigger_holds_when_configured() {
        let calc = CbWarningCalculator::new(CbConfig {
            reset_on_below: false,
            ..CbConfig::default()
        });
        let r = calc.calculate_warning(&obs(120.0, 100.0), 12);
        assert_eq!(r.consecutive_days, 12);
        assert_eq!(r.warning_level, WarningLevel::Caution);
    }

    #[test]
    fn balance_change_guarded() {
        let mut o = obs(100.0, 100.0);
        o.previous_balance = Some(50.0);
        let r = calc().calculate_warning(&o, 0);
        assert_eq!(r.balance_change_pct, -30.0);

        o.previous_balance = Some(0.0);
        assert_eq!(calc().calculate_warning(&o, 0).balance_change_pct, 0.0);
        o.previous_balance = None;
        assert_eq!(calc().calculate_warning(&o, 0).balance_change_pct, 0.0);
    }

    #[test]
    fn warning_comment_mentions_remaining_days() {
        let r = calc().calculate_warning(&obs(140.0, 100.0), 24);
        assert_eq!(r.warning_level, WarningLevel::Warning);
        assert!(r.comment.contains("only 5 days"));
    }

    #[test]
    fn safe_comment_reports_ratio() {
        let r = calc().calculate_warning(&obs(110.0, 100.0), 0);
        assert!(r.comment.contains("110.0%"));
    }

    #[test]
    fn series_fold_counts_and_resets() {
        let prices = [140.0, 140.0, 140.0, 120.0, 135.0, 136.0];
        let series: Vec<CbObservation> = prices
            .iter()
            .enumerate()
            .map(|(i, &p)| CbObservation {
                trade_date: NaiveDate::from_ymd_opt(2026, 2, 2).unwrap()
                    + chrono::Duration::days(i as i64),
                outstanding_balance: 35.0 - i as f64,
                ..obs(p, 100.0)
            })
            .collect();

        let results = calc().track_series(&series, 0);
        let days: Vec<u32> = results.iter().map(|r| r.consecutive_days).collect();
        assert_eq!(days, vec![1, 2, 3, 0, 1, 2]);
        // Balance is threaded from the previous day.
        assert_eq!(results[0].balance_change_pct, 0.0);
        assert!((results[1].balance_change_pct - (-1.0 / 35.0 * 100.0)).abs() < 0.01);
    }

    #[test]
    fn level_order_is_total() {
        assert!(WarningLevel::Safe < WarningLevel::Caution);
        assert!(WarningLevel::Caution < WarningLevel::Warning);
        assert!(WarningLevel::Warning < WarningLevel::Critical);
        assert_eq!("critical".parse::<WarningLevel>().unwrap(), WarningLevel::Critical);
        assert!("RED".parse::<WarningLevel>().is_err());
    }
}
