//! CB squeeze factor: converts CB signals into a 0–100 score that can sit
//! alongside the four equity factors.

use serde::{Deserialize, Serialize};

use super::warning::CbWarningResult;

/// Score of a CB whose forced redemption has been announced.
pub const REDEMPTION_CALLED_SCORE: f64 = 100.0;

/// Inputs to `calculate_cb_score`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CbScoreInputs {
    /// Conversion premium, in percent. Negative means the bond trades at a discount.
    pub premium_rate: f64,
    /// Outstanding balance as a fraction of the total issue, 0–1.
    pub remaining_ratio: f64,
    pub days_above_trigger: u32,
    pub redemption_called: bool,
}

impl CbScoreInputs {
    /// Derive the balance ratio and day count from a warning row.
    pub fn from_warning(
        result: &CbWarningResult,
        premium_rate: f64,
        total_issue: f64,
        redemption_called: bool,
    ) -> Self {
        let remaining_ratio = if total_issue > 0.0 {
            result.outstanding_balance / total_issue
        } else {
            0.0
        };
        Self {
            premium_rate,
            remaining_ratio,
            days_above_trigger: result.consecutive_days,
            redemption_called,
        }
    }

    pub fn score(&self) -> f64 {
        calculate_cb_score(
            self.premium_rate,
            self.remaining_ratio,
            self.days_above_trigger,
            self.redemption_called,
        )
    }
}

/// CB squeeze score.
///
/// An announced redemption is terminal and scores 100 regardless of the
/// other inputs. Otherwise three capped components are summed:
/// premium (0–40), remaining balance (5–30) and days above trigger (0–30).
pub fn calculate_cb_score(
    premium_rate: f64,
    remaining_ratio: f64,
    days_above_trigger: u32,
    redemption_called: bool,
) -> f64 {
    if redemption_called {
        return REDEMPTION_CALLED_SCORE;
    }

    let total = premium_component(premium_rate)
        + remaining_component(remaining_ratio)
        + days_component(days_above_trigger);
    total.min(100.0)
}

fn premium_component(premium_rate: f64) -> f64 {
    if premium_rate < 0.0 {
        // Discount: converting is immediately profitable.
        (premium_rate.abs() * 2.0).min(40.0)
    } else if premium_rate < 10.0 {
        30.0 - premium_rate * 2.0
    } else {
        (20.0 - premium_rate).max(0.0)
    }
}

fn remaining_component(remaining_ratio: f64) -> f64 {
    if remaining_ratio > 0.7 {
        30.0
    } else if remaining_ratio > 0.5 {
        25.0
    } else if remaining_ratio > 0.3 {
        15.0
    } else {
        5.0
    }
}

fn days_component(days: u32) -> f64 {
    match days {
        25.. => 30.0,
        15..=24 => 25.0,
        10..=14 => 15.0,
        5..=9 => 8.0,
        _ => 0.0,
    }
}
