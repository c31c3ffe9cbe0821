//! CSV export and run backups.
//!
//! Every daily run can be saved as a dated backup set under one directory:
//! - `squeeze_signals_{YYYYMMDD}.csv`: ranked squeeze signals
//! - `cb_warnings_{YYYYMMDD}.csv`: CB warning rows
//! - `run_{YYYYMMDD}.json`: manifest tying the files to the config snapshot

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use squeeze_core::{CbWarningResult, EngineConfig, SqueezeSignal};

use crate::ranking::{warnings_summary, WarningsSummary};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to flush CSV writer: {0}")]
    Flush(String),

    #[error("CSV output is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

// ─── CSV export ─────────────────────────────────────────────────────

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String, ExportError> {
    let data = wtr
        .into_inner()
        .map_err(|e| ExportError::Flush(e.error().to_string()))?;
    Ok(String::from_utf8(data)?)
}

/// Export squeeze signals as CSV.
///
/// Columns: ticker, signal_date, squeeze_score, trend, comment,
/// borrow_score, gamma_score, margin_score, momentum_score
pub fn export_signals_csv(
    signals: &[SqueezeSignal],
    signal_date: NaiveDate,
) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "ticker",
        "signal_date",
        "squeeze_score",
        "trend",
        "comment",
        "borrow_score",
        "gamma_score",
        "margin_score",
        "momentum_score",
    ])?;

    let date = signal_date.to_string();
    for s in signals {
        let row: [&str; 9] = [
            s.ticker.as_str(),
            &date,
            &s.score.to_string(),
            s.trend.as_str(),
            &s.comment,
            &format!("{:.2}", s.factors.borrow),
            &format!("{:.2}", s.factors.gamma),
            &format!("{:.2}", s.factors.margin),
            &format!("{:.2}", s.factors.momentum),
        ];
        wtr.write_record(row)?;
    }
    finish(wtr)
}

/// Export CB warning rows as CSV.
///
/// Columns: cb_ticker, underlying_ticker, trade_date, underlying_price,
/// conversion_price, price_ratio, is_above_trigger, consecutive_days,
/// days_remaining, trigger_progress, outstanding_balance,
/// balance_change_pct, warning_level, comment
pub fn export_warnings_csv(results: &[CbWarningResult]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "cb_ticker",
        "underlying_ticker",
        "trade_date",
        "underlying_price",
        "conversion_price",
        "price_ratio",
        "is_above_trigger",
        "consecutive_days",
        "days_remaining",
        "trigger_progress",
        "outstanding_balance",
        "balance_change_pct",
        "warning_level",
        "comment",
    ])?;

    for r in results {
        let row: [&str; 14] = [
            r.cb_id.as_str(),
            &r.underlying_id,
            &r.trade_date.to_string(),
            &format!("{:.2}", r.price),
            &format!("{:.2}", r.conversion_price),
            &format!("{:.2}", r.price_ratio),
            if r.is_above_trigger { "true" } else { "false" },
            &r.consecutive_days.to_string(),
            &r.days_remaining.to_string(),
            &format!("{:.2}", r.trigger_progress),
            &format!("{:.2}", r.outstanding_balance),
            &format!("{:.2}", r.balance_change_pct),
            r.warning_level.as_str(),
            &r.comment,
        ];
        wtr.write_record(row)?;
    }
    finish(wtr)
}

// ─── Run backup ─────────────────────────────────────────────────────

/// Manifest written next to the CSV files of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub analysis_date: NaiveDate,
    /// blake3 fingerprint of the config snapshot that produced the run.
    pub config_hash: String,
    pub config: EngineConfig,
    pub signal_count: usize,
    pub warnings: WarningsSummary,
}

/// Paths of a saved backup set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPaths {
    pub signals: PathBuf,
    pub warnings: PathBuf,
    pub manifest: PathBuf,
}

fn write_file(path: &Path, contents: &str) -> Result<(), ExportError> {
    std::fs::write(path, contents).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Save one run's signals, warnings and manifest under `output_dir`.
///
/// The directory is created if needed. Files for the same date are
/// overwritten.
pub fn save_run_backup(
    output_dir: &Path,
    analysis_date: NaiveDate,
    config: &EngineConfig,
    signals: &[SqueezeSignal],
    warnings: &[CbWarningResult],
) -> Result<BackupPaths, ExportError> {
    std::fs::create_dir_all(output_dir).map_err(|source| ExportError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let stamp = analysis_date.format("%Y%m%d");
    let paths = BackupPaths {
        signals: output_dir.join(format!("squeeze_signals_{stamp}.csv")),
        warnings: output_dir.join(format!("cb_warnings_{stamp}.csv")),
        manifest: output_dir.join(format!("run_{stamp}.json")),
    };

    write_file(&paths.signals, &export_signals_csv(signals, analysis_date)?)?;
    write_file(&paths.warnings, &export_warnings_csv(warnings)?)?;

    let manifest = RunManifest {
        analysis_date,
        config_hash: config.fingerprint().to_string(),
        config: *config,
        signal_count: signals.len(),
        warnings: warnings_summary(warnings),
    };
    write_file(&paths.manifest, &serde_json::to_string_pretty(&manifest)?)?;

    info!(
        dir = %output_dir.display(),
        %analysis_date,
        signals = signals.len(),
        warnings = warnings.len(),
        "saved run backup"
    );
    Ok(paths)
}

/// Load a run manifest written by `save_run_backup`.
pub fn load_manifest(path: &Path) -> Result<RunManifest, ExportError> {
    let json = std::fs::read_to_string(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&json)?)
}
