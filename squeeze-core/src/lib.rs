//! Squeeze Core: configuration, factor scores, squeeze engine, CB warnings.
//!
//! This crate contains the scoring engine:
//! - Typed, validated configuration snapshots with atomic hot-swap
//! - Four factor score functions (borrow, gamma, margin, momentum)
//! - Weighted squeeze score, trend classification and tactical comment
//! - CB forced-redemption day counter and warning classifier
//! - CB squeeze factor score
//!
//! Everything here is pure computation over explicit inputs plus a
//! read-only config. No I/O, no stored per-instrument state.

pub mod cb;
pub mod config;
pub mod config_handle;
pub mod factors;
pub mod squeeze;

pub use cb::{
    calculate_cb_score, calculate_warning, track_warnings, CbObservation, CbScoreInputs,
    CbWarningCalculator, CbWarningResult, WarningLevel,
};
pub use config::{
    CbConfig, ConfigError, ConfigHash, EngineConfig, FactorWeights, MarginTiers,
    NormalizeOutcome, ScoringConfig,
};
pub use config_handle::ConfigHandle;
pub use factors::{
    borrow_score, gamma_score, historical_volatility, margin_score, momentum_score, BorrowRange,
};
pub use squeeze::{FactorScores, SqueezeEngine, SqueezeInputs, SqueezeSignal, Trend};
