//! Ranking and summaries over complete batch results.
//!
//! These run once per batch, after every row has been scored. Sorts are
//! stable, so ties keep batch order.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use squeeze_core::{CbWarningResult, SqueezeSignal, WarningLevel};

/// Squeeze signals scoring at least `min_score`, best first, at most `limit`.
pub fn top_candidates(
    signals: &[SqueezeSignal],
    min_score: u8,
    limit: usize,
) -> Vec<SqueezeSignal> {
    let mut ranked: Vec<SqueezeSignal> = signals
        .iter()
        .filter(|s| s.score >= min_score)
        .cloned()
        .collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked.truncate(limit);
    ranked
}

/// CBs at or above `min_level`, longest run above trigger first, at most `limit`.
pub fn get_critical_cbs(
    results: &[CbWarningResult],
    min_level: WarningLevel,
    limit: usize,
) -> Vec<CbWarningResult> {
    let mut ranked: Vec<CbWarningResult> = results
        .iter()
        .filter(|r| r.warning_level >= min_level)
        .cloned()
        .collect();
    ranked.sort_by(|a, b| b.consecutive_days.cmp(&a.consecutive_days));
    ranked.truncate(limit);
    ranked
}

/// Per-level counts for one batch of CB warnings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningsSummary {
    /// Trade date of the batch; `None` for an empty batch.
    pub analysis_date: Option<NaiveDate>,
    pub total: usize,
    pub critical: usize,
    pub warning: usize,
    pub caution: usize,
    pub safe: usize,
}

impl WarningsSummary {
    pub fn count(&self, level: WarningLevel) -> usize {
        match level {
            WarningLevel::Critical => self.critical,
            WarningLevel::Warning => self.warning,
            WarningLevel::Caution => self.caution,
            WarningLevel::Safe => self.safe,
        }
    }
}

pub fn warnings_summary(results: &[CbWarningResult]) -> WarningsSummary {
    results.iter().fold(
        WarningsSummary {
            analysis_date: results.iter().map(|r| r.trade_date).max(),
            ..WarningsSummary::default()
        },
        |mut acc, r| {
            acc.total += 1;
            match r.warning_level {
                WarningLevel::Critical => acc.critical += 1,
                WarningLevel::Warning => acc.warning += 1,
                WarningLevel::Caution => acc.caution += 1,
                WarningLevel::Safe => acc.safe += 1,
            }
            acc
        },
    )
}
