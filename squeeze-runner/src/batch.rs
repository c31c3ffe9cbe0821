//! Batch scoring over daily rows.
//!
//! - `snapshots_from_history`: derive one scoring row per ticker from raw daily bars
//! - `mean_call_iv`: a ticker's IV from its warrant quotes
//! - `batch_squeeze_scores`: row-parallel squeeze scoring
//! - `batch_cb_warnings`: join CB issues to closes and prior tracking, then step each CB
//!
//! Output row order always equals input row order, parallel or not.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use squeeze_core::{
    calculate_warning, historical_volatility, BorrowRange, CbConfig, CbObservation,
    CbWarningResult, SqueezeEngine, SqueezeInputs, SqueezeSignal, Trend, WarningLevel,
};

/// Trailing returns used for HV20.
pub const HV_WINDOW: usize = 20;

/// Trailing days (latest included) in the average-volume window.
pub const AVG_VOLUME_WINDOW: usize = 20;

// ── Options ──────────────────────────────────────────────────────────

/// Execution options shared by the batch entry points.
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub parallel: bool,
    pub borrow_range: BorrowRange,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            borrow_range: BorrowRange::default(),
        }
    }
}

impl BatchOptions {
    /// Enables or disables rayon execution.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_borrow_range(mut self, borrow_range: BorrowRange) -> Self {
        self.borrow_range = borrow_range;
        self
    }
}

// ── Squeeze rows ─────────────────────────────────────────────────────

/// Raw daily metrics for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub ticker: String,
    pub trade_date: NaiveDate,
    pub close_price: f64,
    pub volume: u64,
    /// Day-over-day change in securities-borrowing balance, shares.
    pub borrowing_balance_change: f64,
    /// Margin short / margin long, percent.
    pub margin_ratio: f64,
    /// Average call-warrant IV; 0 when no warrant data is available.
    #[serde(default)]
    pub implied_volatility: f64,
}

/// Warrant side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarrantKind {
    Call,
    Put,
}

/// One warrant's implied volatility on an underlying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarrantQuote {
    pub warrant_id: String,
    #[serde(rename = "warrant_type")]
    pub kind: WarrantKind,
    pub implied_volatility: f64,
}

/// Mean IV over call warrants; 0 when there are none. Puts are ignored.
pub fn mean_call_iv(warrants: &[WarrantQuote]) -> f64 {
    let (sum, count) = warrants
        .iter()
        .filter(|w| w.kind == WarrantKind::Call)
        .fold((0.0, 0usize), |(sum, count), w| (sum + w.implied_volatility, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// One ticker's scoring row on the analysis date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub ticker: String,
    pub trade_date: NaiveDate,
    pub close_price: f64,
    pub prev_close: f64,
    pub volume: u64,
    pub avg_volume_20d: f64,
    pub borrowing_balance_change: f64,
    pub margin_ratio: f64,
    pub implied_volatility: f64,
    pub historical_volatility_20d: f64,
    #[serde(default)]
    pub resistance: Option<f64>,
}

impl DailySnapshot {
    pub fn to_inputs(&self, borrow_range: BorrowRange) -> SqueezeInputs {
        SqueezeInputs {
            ticker: self.ticker.clone(),
            borrow_change: self.borrowing_balance_change,
            margin_ratio: self.margin_ratio,
            iv: self.implied_volatility,
            hv: self.historical_volatility_20d,
            price: self.close_price,
            prev_price: self.prev_close,
            volume: self.volume,
            avg_volume: self.avg_volume_20d,
            borrow_range,
            resistance: self.resistance,
        }
    }
}

/// Build scoring rows for the latest trade date in `bars`.
///
/// Only tickers with a bar on that date produce a row. Rows come back
/// ordered by ticker. Per ticker, from its own date-sorted history:
/// - `prev_close`: the previous bar's close, or the same close when there is none
/// - `avg_volume_20d`: mean volume of the last 20 bars, latest included
/// - `historical_volatility_20d`: HV20, or 0 (gamma neutral) when history is short
pub fn snapshots_from_history(bars: &[DailyBar]) -> Vec<DailySnapshot> {
    let Some(latest) = bars.iter().map(|b| b.trade_date).max() else {
        warn!("no daily bars to build snapshots from");
        return Vec::new();
    };

    let mut by_ticker: BTreeMap<&str, Vec<&DailyBar>> = BTreeMap::new();
    for bar in bars {
        by_ticker.entry(bar.ticker.as_str()).or_default().push(bar);
    }

    let snapshots: Vec<DailySnapshot> = by_ticker
        .into_values()
        .filter_map(|mut history| {
            history.sort_by_key(|b| b.trade_date);
            let last = history.last()?;
            if last.trade_date != latest {
                debug!(ticker = %last.ticker, last_date = %last.trade_date, "no bar on analysis date");
                return None;
            }
            Some(enrich(&history))
        })
        .collect();

    info!(analysis_date = %latest, tickers = snapshots.len(), "built squeeze snapshots");
    snapshots
}

fn enrich(history: &[&DailyBar]) -> DailySnapshot {
    let n = history.len();
    let last = history[n - 1];

    let prev_close = n
        .checked_sub(2)
        .map(|i| history[i].close_price)
        .filter(|&p| p > 0.0)
        .unwrap_or(last.close_price);

    let window = &history[n.saturating_sub(AVG_VOLUME_WINDOW)..];
    let avg_volume_20d =
        window.iter().map(|b| b.volume as f64).sum::<f64>() / window.len() as f64;

    let closes: Vec<f64> = history.iter().map(|b| b.close_price).collect();
    let historical_volatility_20d = historical_volatility(&closes, HV_WINDOW).unwrap_or(0.0);

    DailySnapshot {
        ticker: last.ticker.clone(),
        trade_date: last.trade_date,
        close_price: last.close_price,
        prev_close,
        volume: last.volume,
        avg_volume_20d,
        borrowing_balance_change: last.borrowing_balance_change,
        margin_ratio: last.margin_ratio,
        implied_volatility: last.implied_volatility,
        historical_volatility_20d,
        resistance: None,
    }
}

/// Score every snapshot with one engine snapshot.
pub fn batch_squeeze_scores(
    engine: &SqueezeEngine,
    snapshots: &[DailySnapshot],
    options: &BatchOptions,
) -> Vec<SqueezeSignal> {
    info!(
        rows = snapshots.len(),
        parallel = options.parallel,
        "scoring squeeze batch"
    );

    let borrow_range = options.borrow_range;
    let score = |s: &DailySnapshot| engine.calculate_squeeze_score(&s.to_inputs(borrow_range));

    let signals: Vec<SqueezeSignal> = if options.parallel {
        snapshots.par_iter().map(score).collect()
    } else {
        snapshots.iter().map(score).collect()
    };

    if signals.is_empty() {
        warn!("squeeze batch produced no signals");
    } else {
        let bullish = signals.iter().filter(|s| s.trend == Trend::Bullish).count();
        let bearish = signals.iter().filter(|s| s.trend == Trend::Bearish).count();
        info!(rows = signals.len(), bullish, bearish, "squeeze batch complete");
    }
    signals
}

// ── CB rows ──────────────────────────────────────────────────────────

/// Issue-level facts for one outstanding CB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CbIssue {
    pub cb_id: String,
    pub underlying_id: String,
    /// Current (post-reset) conversion price.
    pub conversion_price: f64,
    /// Outstanding amount, 100M TWD.
    pub outstanding_balance: f64,
}

/// Close of an underlying stock on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnderlyingClose {
    pub ticker: String,
    pub trade_date: NaiveDate,
    pub close_price: f64,
}

/// Carried state from the previous run, persisted by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRow {
    pub cb_id: String,
    pub consecutive_days_above: u32,
    pub outstanding_balance: f64,
}

impl From<&CbWarningResult> for TrackingRow {
    fn from(result: &CbWarningResult) -> Self {
        Self {
            cb_id: result.cb_id.clone(),
            consecutive_days_above: result.consecutive_days,
            outstanding_balance: result.outstanding_balance,
        }
    }
}

/// Advance every CB by one trading day.
///
/// Each issue is joined to its underlying's close on `trade_date` and to its
/// previous tracking row. Issues with a missing or non-positive close or
/// conversion price are skipped with a warning. A CB without a tracking row
/// starts from counter 0 and no previous balance. Duplicate tracking rows
/// resolve to the last one.
pub fn batch_cb_warnings(
    issues: &[CbIssue],
    prices: &[UnderlyingClose],
    previous_tracking: &[TrackingRow],
    trade_date: NaiveDate,
    config: &CbConfig,
    options: &BatchOptions,
) -> Vec<CbWarningResult> {
    let closes: HashMap<&str, f64> = prices
        .iter()
        .filter(|p| p.trade_date == trade_date)
        .map(|p| (p.ticker.as_str(), p.close_price))
        .collect();
    let tracking: HashMap<&str, &TrackingRow> = previous_tracking
        .iter()
        .map(|t| (t.cb_id.as_str(), t))
        .collect();

    let mut skipped = 0usize;
    let mut pending: Vec<(CbObservation, u32)> = Vec::with_capacity(issues.len());
    for issue in issues {
        let price = closes
            .get(issue.underlying_id.as_str())
            .copied()
            .unwrap_or(0.0);
        if !is_usable_price(price) || !is_usable_price(issue.conversion_price) {
            warn!(
                cb_id = %issue.cb_id,
                underlying = %issue.underlying_id,
                %trade_date,
                "skipping CB: missing price data"
            );
            skipped += 1;
            continue;
        }

        let previous = tracking.get(issue.cb_id.as_str());
        pending.push((
            CbObservation {
                cb_id: issue.cb_id.clone(),
                underlying_id: issue.underlying_id.clone(),
                trade_date,
                price,
                conversion_price: issue.conversion_price,
                outstanding_balance: issue.outstanding_balance,
                previous_balance: previous.map(|t| t.outstanding_balance),
            },
            previous.map_or(0, |t| t.consecutive_days_above),
        ));
    }

    let step = |(observation, days): &(CbObservation, u32)| {
        calculate_warning(observation, *days, config)
    };
    let results: Vec<CbWarningResult> = if options.parallel {
        pending.par_iter().map(step).collect()
    } else {
        pending.iter().map(step).collect()
    };

    if results.is_empty() {
        warn!(%trade_date, skipped, "no CB warnings calculated, empty result set");
    } else {
        let critical = results
            .iter()
            .filter(|r| r.warning_level == WarningLevel::Critical)
            .count();
        info!(%trade_date, rows = results.len(), skipped, critical, "CB warning batch complete");
    }
    results
}

fn is_usable_price(x: f64) -> bool {
    x.is_finite() && x > 0.0
}
