//! Integration tests for the public scoring API.
//!
//! Tests:
//! 1. End-to-end squeeze scenario under default and reloaded configs
//! 2. CB warning lifecycle across a month of closes
//! 3. CB redemption is absorbing
//! 4. Engines bound to a snapshot are unaffected by a later reload

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing_subscriber::EnvFilter;

use squeeze_core::config::{KEY_THRESHOLD_BULLISH, KEY_WEIGHT_BORROW};
use squeeze_core::{
    calculate_cb_score, BorrowRange, CbObservation, ConfigHandle, EngineConfig, SqueezeEngine,
    SqueezeInputs, Trend, WarningLevel,
};

/// Route engine logs to the test harness; `RUST_LOG=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn tsmc_inputs() -> SqueezeInputs {
    SqueezeInputs {
        ticker: "2330".into(),
        borrow_change: -500_000.0,
        margin_ratio: 18.0,
        iv: 0.22,
        hv: 0.32,
        price: 600.0,
        prev_price: 580.0,
        volume: 50_000_000,
        avg_volume: 20_000_000.0,
        borrow_range: BorrowRange::default(),
        resistance: None,
    }
}

fn daily(day: u32, price: f64) -> CbObservation {
    CbObservation {
        cb_id: "24541".into(),
        underlying_id: "2454".into(),
        trade_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap() + chrono::Duration::days(day as i64),
        price,
        conversion_price: 1000.0,
        outstanding_balance: 25.0,
        previous_balance: None,
    }
}

// ──────────────────────────────────────────────
// Squeeze
// ──────────────────────────────────────────────

#[test]
fn default_config_scenario_is_bullish() {
    let engine = ConfigHandle::default().squeeze_engine();
    let signal = engine.calculate_squeeze_score(&tsmc_inputs());
    assert_eq!(signal.trend, Trend::Bullish);
    assert!(signal.score >= 70);
}

#[test]
fn raised_threshold_demotes_scenario() {
    init_tracing();
    let handle = ConfigHandle::default();
    let mut values = BTreeMap::new();
    values.insert(KEY_THRESHOLD_BULLISH.to_string(), "90".to_string());
    handle.reload_from_key_values(&values).unwrap();

    let signal = handle
        .squeeze_engine()
        .calculate_squeeze_score(&tsmc_inputs());
    assert_eq!(signal.trend, Trend::Neutral);
    assert!(signal.comment.contains("clearer direction"));
}

#[test]
fn engine_keeps_its_snapshot_after_reload() {
    init_tracing();
    let handle = ConfigHandle::default();
    let before = handle.squeeze_engine();

    let mut values = BTreeMap::new();
    values.insert(KEY_WEIGHT_BORROW.to_string(), "5".to_string());
    handle.reload_from_key_values(&values).unwrap();

    let after = handle.squeeze_engine();
    assert!((before.config().weights.borrow - 0.35).abs() < 1e-12);
    assert!(after.config().weights.borrow > 0.8);
    assert!(after.config().validate());
}

#[test]
fn toml_config_drives_engine() {
    let config = EngineConfig::from_toml_str(
        r#"
        [scoring.margin_tiers]
        tier1 = 2.0
        tier2 = 4.0
        tier3 = 8.0
        "#,
    )
    .unwrap();
    let engine = SqueezeEngine::new(config.scoring);
    let mut inputs = tsmc_inputs();
    inputs.margin_ratio = 8.0;
    assert_eq!(engine.calculate_squeeze_score(&inputs).factors.margin, 100.0);
}

// ──────────────────────────────────────────────
// CB lifecycle
// ──────────────────────────────────────────────

#[test]
fn month_above_trigger_walks_through_every_level() {
    let calc = ConfigHandle::default().cb_calculator();
    let series: Vec<CbObservation> = (0..30).map(|d| daily(d, 1350.0)).collect();
    let results = calc.track_series(&series, 0);

    let level_on = |day: usize| results[day - 1].warning_level;
    assert_eq!(level_on(9), WarningLevel::Safe);
    assert_eq!(level_on(10), WarningLevel::Caution);
    assert_eq!(level_on(19), WarningLevel::Caution);
    assert_eq!(level_on(20), WarningLevel::Warning);
    assert_eq!(level_on(29), WarningLevel::Warning);
    assert_eq!(level_on(30), WarningLevel::Critical);
    assert_eq!(results[29].days_remaining, 0);
}

#[test]
fn single_dip_resets_the_month() {
    let calc = ConfigHandle::default().cb_calculator();
    let mut series: Vec<CbObservation> = (0..25).map(|d| daily(d, 1350.0)).collect();
    series[20].price = 1200.0;
    let results = calc.track_series(&series, 0);

    assert_eq!(results[19].consecutive_days, 20);
    assert_eq!(results[20].consecutive_days, 0);
    assert_eq!(results[24].consecutive_days, 4);
    assert_eq!(results[24].warning_level, WarningLevel::Safe);
}

#[test]
fn carried_counter_resumes_from_previous_run() {
    let calc = ConfigHandle::default().cb_calculator();
    let results = calc.track_series(&[daily(0, 1350.0)], 14);
    assert_eq!(results[0].consecutive_days, 15);
    assert_eq!(results[0].trigger_progress, 50.0);
    assert_eq!(results[0].warning_level, WarningLevel::Caution);
}

#[test]
fn announced_redemption_is_absorbing() {
    for premium in [-20.0, -5.0, 0.0, 5.0, 20.0, 50.0] {
        for remaining in [0.0, 0.2, 0.4, 0.6, 0.8, 1.0] {
            for days in [0, 5, 10, 15, 25, 30] {
                assert_eq!(calculate_cb_score(premium, remaining, days, true), 100.0);
                let open = calculate_cb_score(premium, remaining, days, false);
                assert!((0.0..=100.0).contains(&open));
            }
        }
    }
}
