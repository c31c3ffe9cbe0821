//! Polars adapters between tabular data and batch rows.
//!
//! Input column names follow the daily-metrics and CB-issuance tables:
//!
//! | frame            | required columns                                                   |
//! |------------------|--------------------------------------------------------------------|
//! | daily metrics    | ticker, trade_date, close_price, volume, borrowing_balance_change, margin_ratio |
//! | CB issuance      | cb_ticker, underlying_ticker, current_conversion_price, outstanding_amount |
//! | stock prices     | ticker, trade_date, close_price                                    |
//! | CB tracking      | cb_ticker, consecutive_days_above, outstanding_balance             |
//!
//! `implied_volatility` on the daily-metrics frame is optional. Null numeric
//! cells read as 0; null keys and dates are errors. Count columns (`volume`,
//! `consecutive_days_above`) must hold non-negative whole numbers in range. `trade_date` may be a
//! `Date` column or `YYYY-MM-DD` strings.

use chrono::NaiveDate;
use polars::prelude::*;
use thiserror::Error;
use tracing::warn;

use squeeze_core::{CbWarningResult, SqueezeSignal};

use crate::batch::{CbIssue, DailyBar, TrackingRow, UnderlyingClose};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("null value in column '{column}' at row {row}")]
    NullValue { column: String, row: usize },

    #[error("invalid date '{value}' in column '{column}'")]
    InvalidDate { column: String, value: String },

    #[error("invalid value {value} in column '{column}' at row {row}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
}

const DATE_FORMAT: &str = "%Y-%m-%d";

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN)
}

// ── Column readers ───────────────────────────────────────────────────

fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, FrameError> {
    df.column(name)
        .map_err(|_| FrameError::MissingColumn(name.to_string()))
}

fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<f64>, FrameError> {
    let cast = column(df, name)?.cast(&DataType::Float64)?;
    Ok(cast.f64()?.into_iter().map(|v| v.unwrap_or(0.0)).collect())
}

/// Counts at most `max`. Read through `Float64` so a negative cell is seen
/// instead of turning null in an unsigned cast.
fn count_values(df: &DataFrame, name: &str, max: u64) -> Result<Vec<u64>, FrameError> {
    let cast = column(df, name)?.cast(&DataType::Float64)?;
    cast.f64()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| match v {
            None => Ok(0),
            Some(x) if x >= 0.0 && x <= max as f64 => Ok(x as u64),
            Some(x) => {
                warn!(column = name, row, value = x, "count out of range");
                Err(FrameError::InvalidValue {
                    column: name.to_string(),
                    row,
                    value: x.to_string(),
                })
            }
        })
        .collect()
}

fn u64_values(df: &DataFrame, name: &str) -> Result<Vec<u64>, FrameError> {
    count_values(df, name, u64::MAX)
}

fn u32_values(df: &DataFrame, name: &str) -> Result<Vec<u32>, FrameError> {
    let counts = count_values(df, name, u64::from(u32::MAX))?;
    Ok(counts.into_iter().map(|v| v as u32).collect())
}

fn string_values(df: &DataFrame, name: &str) -> Result<Vec<String>, FrameError> {
    let cast = column(df, name)?.cast(&DataType::String)?;
    cast.str()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.map(str::to_string).ok_or_else(|| FrameError::NullValue {
                column: name.to_string(),
                row,
            })
        })
        .collect()
}

fn date_values(df: &DataFrame, name: &str) -> Result<Vec<NaiveDate>, FrameError> {
    let col = column(df, name)?;
    if matches!(col.dtype(), DataType::String) {
        return col
            .str()?
            .into_iter()
            .enumerate()
            .map(|(row, v)| {
                let text = v.ok_or_else(|| FrameError::NullValue {
                    column: name.to_string(),
                    row,
                })?;
                NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).map_err(|_| {
                    FrameError::InvalidDate {
                        column: name.to_string(),
                        value: text.to_string(),
                    }
                })
            })
            .collect();
    }

    let days = col.cast(&DataType::Date)?.cast(&DataType::Int32)?;
    days.i32()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.map(|d| epoch() + chrono::Duration::days(i64::from(d)))
                .ok_or_else(|| FrameError::NullValue {
                    column: name.to_string(),
                    row,
                })
        })
        .collect()
}

fn date_column(name: &str, dates: impl Iterator<Item = NaiveDate>) -> Result<Column, FrameError> {
    let days: Vec<i32> = dates
        .map(|d| (d - epoch()).num_days() as i32)
        .collect();
    Ok(Column::new(name.into(), days).cast(&DataType::Date)?)
}

// ── Frames in ────────────────────────────────────────────────────────

/// Read daily-metrics rows.
pub fn bars_from_frame(df: &DataFrame) -> Result<Vec<DailyBar>, FrameError> {
    let tickers = string_values(df, "ticker")?;
    let dates = date_values(df, "trade_date")?;
    let closes = f64_values(df, "close_price")?;
    let volumes = u64_values(df, "volume")?;
    let borrow = f64_values(df, "borrowing_balance_change")?;
    let margin = f64_values(df, "margin_ratio")?;
    let iv = if df.column("implied_volatility").is_ok() {
        f64_values(df, "implied_volatility")?
    } else {
        vec![0.0; df.height()]
    };

    Ok((0..df.height())
        .map(|i| DailyBar {
            ticker: tickers[i].clone(),
            trade_date: dates[i],
            close_price: closes[i],
            volume: volumes[i],
            borrowing_balance_change: borrow[i],
            margin_ratio: margin[i],
            implied_volatility: iv[i],
        })
        .collect())
}

/// Read CB issuance rows.
pub fn issues_from_frame(df: &DataFrame) -> Result<Vec<CbIssue>, FrameError> {
    let ids = string_values(df, "cb_ticker")?;
    let underlying = string_values(df, "underlying_ticker")?;
    let conversion = f64_values(df, "current_conversion_price")?;
    let outstanding = f64_values(df, "outstanding_amount")?;

    Ok(ids
        .into_iter()
        .zip(underlying)
        .zip(conversion.into_iter().zip(outstanding))
        .map(|((cb_id, underlying_id), (conversion_price, outstanding_balance))| CbIssue {
            cb_id,
            underlying_id,
            conversion_price,
            outstanding_balance,
        })
        .collect())
}

/// Read underlying closes.
pub fn closes_from_frame(df: &DataFrame) -> Result<Vec<UnderlyingClose>, FrameError> {
    let tickers = string_values(df, "ticker")?;
    let dates = date_values(df, "trade_date")?;
    let closes = f64_values(df, "close_price")?;

    Ok(tickers
        .into_iter()
        .zip(dates)
        .zip(closes)
        .map(|((ticker, trade_date), close_price)| UnderlyingClose {
            ticker,
            trade_date,
            close_price,
        })
        .collect())
}

/// Read the previous run's tracking rows.
pub fn tracking_from_frame(df: &DataFrame) -> Result<Vec<TrackingRow>, FrameError> {
    let ids = string_values(df, "cb_ticker")?;
    let days = u32_values(df, "consecutive_days_above")?;
    let balances = f64_values(df, "outstanding_balance")?;

    Ok(ids
        .into_iter()
        .zip(days)
        .zip(balances)
        .map(|((cb_id, consecutive_days_above), outstanding_balance)| TrackingRow {
            cb_id,
            consecutive_days_above,
            outstanding_balance,
        })
        .collect())
}

// ── Frames out ───────────────────────────────────────────────────────

/// Squeeze signals in `squeeze_signals` table layout.
pub fn signals_to_frame(
    signals: &[SqueezeSignal],
    signal_date: NaiveDate,
) -> Result<DataFrame, FrameError> {
    let n = signals.len();
    let tickers: Vec<&str> = signals.iter().map(|s| s.ticker.as_str()).collect();
    let scores: Vec<u32> = signals.iter().map(|s| u32::from(s.score)).collect();
    let trends: Vec<&str> = signals.iter().map(|s| s.trend.as_str()).collect();
    let comments: Vec<&str> = signals.iter().map(|s| s.comment.as_str()).collect();
    let borrow: Vec<f64> = signals.iter().map(|s| s.factors.borrow).collect();
    let gamma: Vec<f64> = signals.iter().map(|s| s.factors.gamma).collect();
    let margin: Vec<f64> = signals.iter().map(|s| s.factors.margin).collect();
    let momentum: Vec<f64> = signals.iter().map(|s| s.factors.momentum).collect();

    Ok(DataFrame::new(vec![
        Column::new("ticker".into(), tickers),
        date_column("signal_date", std::iter::repeat(signal_date).take(n))?,
        Column::new("squeeze_score".into(), scores),
        Column::new("trend".into(), trends),
        Column::new("comment".into(), comments),
        Column::new("borrow_score".into(), borrow),
        Column::new("gamma_score".into(), gamma),
        Column::new("margin_score".into(), margin),
        Column::new("momentum_score".into(), momentum),
    ])?)
}

/// CB warning results, one row per CB.
pub fn warnings_to_frame(results: &[CbWarningResult]) -> Result<DataFrame, FrameError> {
    let ids: Vec<&str> = results.iter().map(|r| r.cb_id.as_str()).collect();
    let underlying: Vec<&str> = results.iter().map(|r| r.underlying_id.as_str()).collect();
    let prices: Vec<f64> = results.iter().map(|r| r.price).collect();
    let conversion: Vec<f64> = results.iter().map(|r| r.conversion_price).collect();
    let ratio: Vec<f64> = results.iter().map(|r| r.price_ratio).collect();
    let above: Vec<bool> = results.iter().map(|r| r.is_above_trigger).collect();
    let days: Vec<u32> = results.iter().map(|r| r.consecutive_days).collect();
    let remaining: Vec<u32> = results.iter().map(|r| r.days_remaining).collect();
    let progress: Vec<f64> = results.iter().map(|r| r.trigger_progress).collect();
    let balance: Vec<f64> = results.iter().map(|r| r.outstanding_balance).collect();
    let change: Vec<f64> = results.iter().map(|r| r.balance_change_pct).collect();
    let levels: Vec<&str> = results.iter().map(|r| r.warning_level.as_str()).collect();
    let comments: Vec<&str> = results.iter().map(|r| r.comment.as_str()).collect();

    Ok(DataFrame::new(vec![
        Column::new("cb_ticker".into(), ids),
        Column::new("underlying_ticker".into(), underlying),
        date_column("trade_date", results.iter().map(|r| r.trade_date))?,
        Column::new("underlying_price".into(), prices),
        Column::new("conversion_price".into(), conversion),
        Column::new("price_ratio".into(), ratio),
        Column::new("is_above_trigger".into(), above),
        Column::new("consecutive_days".into(), days),
        Column::new("days_remaining".into(), remaining),
        Column::new("trigger_progress".into(), progress),
        Column::new("outstanding_balance".into(), balance),
        Column::new("balance_change_pct".into(), change),
        Column::new("warning_level".into(), levels),
        Column::new("comment".into(), comments),
    ])?)
}
