//! Convertible-bond forced-redemption tracking and CB squeeze factor.

pub mod score;
pub mod warning;

pub use score::{calculate_cb_score, CbScoreInputs, REDEMPTION_CALLED_SCORE};
pub use warning::{
    calculate_warning, track_warnings, CbObservation, CbWarningCalculator, CbWarningResult,
    WarningLevel,
};
