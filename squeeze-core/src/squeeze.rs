//! Squeeze score engine.
//!
//! `S = w_B·F_B + w_G·F_G + w_M·F_M + w_V·F_V`, rounded to an integer in
//! [0,100], then classified against the bullish/bearish thresholds and
//! annotated with a short tactical comment.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{NormalizeOutcome, ScoringConfig};
use crate::factors::{borrow_score, gamma_score, margin_score, momentum_score, BorrowRange};

/// Directional classification of a squeeze score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trend {
    Bullish,
    Neutral,
    Bearish,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bullish => "BULLISH",
            Self::Neutral => "NEUTRAL",
            Self::Bearish => "BEARISH",
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four factor sub-scores, each in [0,100], rounded to 2 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorScores {
    pub borrow: f64,
    pub gamma: f64,
    pub margin: f64,
    pub momentum: f64,
}

impl FactorScores {
    /// Factors labelled for the comment, in declaration order.
    fn labelled(&self) -> [(&'static str, f64); 4] {
        [
            ("institutional short covering", self.borrow),
            ("gamma compression", self.gamma),
            ("crowded shorts", self.margin),
            ("price-volume momentum", self.momentum),
        ]
    }
}

/// Complete squeeze analysis for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqueezeSignal {
    pub ticker: String,
    pub score: u8,
    pub trend: Trend,
    pub comment: String,
    pub factors: FactorScores,
}

/// One ticker's daily inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqueezeInputs {
    pub ticker: String,
    /// Day-over-day change in securities-borrowing balance (shares).
    pub borrow_change: f64,
    /// Short-to-margin ratio, in percent.
    pub margin_ratio: f64,
    /// Implied volatility of the ticker's warrants.
    pub iv: f64,
    /// Historical (realized) volatility.
    pub hv: f64,
    pub price: f64,
    pub prev_price: f64,
    pub volume: u64,
    pub avg_volume: f64,
    #[serde(default)]
    pub borrow_range: BorrowRange,
    #[serde(default)]
    pub resistance: Option<f64>,
}

/// Weighted four-factor squeeze scorer over an immutable config.
#[derive(Debug, Clone, Copy)]
pub struct SqueezeEngine {
    config: ScoringConfig,
}

impl Default for SqueezeEngine {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

impl SqueezeEngine {
    /// Bind to a config. Weights that do not sum to 1.0 are normalized here.
    pub fn new(mut config: ScoringConfig) -> Self {
        match config.normalize() {
            NormalizeOutcome::AlreadyNormalized => {}
            NormalizeOutcome::Rescaled { previous_sum } => {
                warn!(previous_sum, "squeeze engine normalized factor weights");
            }
            NormalizeOutcome::DegenerateSum { sum } => {
                warn!(sum, "squeeze engine weights sum to a non-positive value");
            }
        }
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Compute the four factor scores (unrounded).
    pub fn factor_scores(&self, inputs: &SqueezeInputs) -> FactorScores {
        FactorScores {
            borrow: borrow_score(inputs.borrow_change, inputs.borrow_range),
            gamma: gamma_score(inputs.iv, inputs.hv),
            margin: margin_score(inputs.margin_ratio, &self.config.margin_tiers),
            momentum: momentum_score(
                inputs.price,
                inputs.prev_price,
                inputs.volume,
                inputs.avg_volume,
                inputs.resistance,
            ),
        }
    }

    /// Score, classify and comment one ticker.
    pub fn calculate_squeeze_score(&self, inputs: &SqueezeInputs) -> SqueezeSignal {
        let raw = self.factor_scores(inputs);
        let w = &self.config.weights;

        let total = w.borrow * raw.borrow
            + w.gamma * raw.gamma
            + w.margin * raw.margin
            + w.momentum * raw.momentum;
        let score = round_score(total);
        let trend = self.classify(score);

        let factors = FactorScores {
            borrow: round2(raw.borrow),
            gamma: round2(raw.gamma),
            margin: round2(raw.margin),
            momentum: round2(raw.momentum),
        };
        let comment = tactical_comment(&factors, trend);

        SqueezeSignal {
            ticker: inputs.ticker.clone(),
            score,
            trend,
            comment,
            factors,
        }
    }

    /// Map a score to a trend using the configured thresholds.
    pub fn classify(&self, score: u8) -> Trend {
        if score >= self.config.bullish_threshold {
            Trend::Bullish
        } else if score <= self.config.bearish_threshold {
            Trend::Bearish
        } else {
            Trend::Neutral
        }
    }
}

/// Round half to even, clamp to [0,100].
fn round_score(total: f64) -> u8 {
    // NaN saturates to 0 in the cast.
    total.round_ties_even().clamp(0.0, 100.0) as u8
}

/// Two decimals, half to even on the scaled value.
pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round_ties_even() / 100.0
}

fn tactical_comment(factors: &FactorScores, trend: Trend) -> String {
    let mut ranked = factors.labelled();
    // Stable: ties keep declaration order.
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut remarks = Vec::with_capacity(2);
    match trend {
        Trend::Bullish => {
            remarks.push(format!(
                "High squeeze potential, {} signal strong",
                ranked[0].0
            ));
            if factors.gamma > 70.0 {
                remarks.push("warrants look underpriced, watch for a gamma squeeze".to_string());
            }
        }
        Trend::Bearish => remarks.push("Low squeeze probability, stay on the sidelines".to_string()),
        Trend::Neutral => {
            remarks.push("Neutral signal, wait for a clearer direction".to_string())
        }
    }
    remarks.join("; ")
}
