//! Squeeze Runner: batch scoring, ranking, tabular I/O and run backups.
//!
//! This crate builds on `squeeze-core` to provide:
//! - Snapshot enrichment from daily history (previous close, 20-day volume, HV20)
//! - Row-parallel squeeze scoring and CB warning batches with issue/price/tracking joins
//! - Top-candidate ranking, critical-CB filtering and warning summaries
//! - A tiered whole-market discovery screen
//! - Polars DataFrame adapters for the daily-metrics and CB tables
//! - CSV export and dated run backups tied to a config fingerprint

pub mod batch;
pub mod discovery;
pub mod export;
pub mod frame;
pub mod ranking;

pub use batch::{
    batch_cb_warnings, batch_squeeze_scores, mean_call_iv, snapshots_from_history, BatchOptions,
    CbIssue, DailyBar, DailySnapshot, TrackingRow, UnderlyingClose, WarrantKind, WarrantQuote,
};
pub use discovery::{
    discovery_scan, screening_score, DiscoveryCandidate, DiscoveryHit, DiscoveryThresholds,
};
pub use export::{
    export_signals_csv, export_warnings_csv, load_manifest, save_run_backup, BackupPaths,
    ExportError, RunManifest,
};
pub use frame::{
    bars_from_frame, closes_from_frame, issues_from_frame, signals_to_frame, tracking_from_frame,
    warnings_to_frame, FrameError,
};
pub use ranking::{get_critical_cbs, top_candidates, warnings_summary, WarningsSummary};
