//! Typed, validated scoring configuration.
//!
//! - `ScoringConfig`: factor weights, trend thresholds, margin tiers.
//! - `CbConfig`: forced-redemption trigger rules and warning fractions.
//! - `EngineConfig`: both of the above, loadable from the flat key/value
//!   store or from TOML, and fingerprinted for provenance.
//!
//! Every constructor funnels through `EngineConfig::finalize()`, so a value
//! handed to an engine has already been structurally checked and has
//! normalized weights. Parse failures are errors here; they are never
//! defaulted deep inside a scoring function.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

/// Allowed distance between the weight sum and 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.001;

// ── Store keys ───────────────────────────────────────────────────────

pub const KEY_WEIGHT_BORROW: &str = "SQUEEZE_WEIGHT_BORROW";
pub const KEY_WEIGHT_GAMMA: &str = "SQUEEZE_WEIGHT_GAMMA";
pub const KEY_WEIGHT_MARGIN: &str = "SQUEEZE_WEIGHT_MARGIN";
pub const KEY_WEIGHT_MOMENTUM: &str = "SQUEEZE_WEIGHT_MOMENTUM";
pub const KEY_THRESHOLD_BULLISH: &str = "SQUEEZE_THRESHOLD_BULLISH";
pub const KEY_THRESHOLD_BEARISH: &str = "SQUEEZE_THRESHOLD_BEARISH";
pub const KEY_MARGIN_TIER1: &str = "MARGIN_SCORE_TIER1_MAX";
pub const KEY_MARGIN_TIER2: &str = "MARGIN_SCORE_TIER2_MAX";
pub const KEY_MARGIN_TIER3: &str = "MARGIN_SCORE_TIER3_MAX";
pub const KEY_CB_TRIGGER_PCT: &str = "CB_TRIGGER_THRESHOLD_PCT";
pub const KEY_CB_TRIGGER_DAYS: &str = "CB_TRIGGER_DAYS_REQUIRED";
pub const KEY_CB_RESET_ON_BELOW: &str = "CB_RESET_ON_BELOW";
pub const KEY_CB_CAUTION_FRACTION: &str = "CB_CAUTION_THRESHOLD_PCT";
pub const KEY_CB_WARNING_FRACTION: &str = "CB_WARNING_THRESHOLD_PCT";

/// Configuration construction errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("{field} must be finite, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("weight {field} must be >= 0, got {value}")]
    NegativeWeight { field: &'static str, value: f64 },

    #[error("factor weights sum to {sum}; cannot normalize a non-positive sum")]
    DegenerateWeights { sum: f64 },

    #[error("thresholds must satisfy 0 <= bearish ({bearish}) < bullish ({bullish}) <= 100")]
    ThresholdOrder { bullish: u8, bearish: u8 },

    #[error("margin tiers must be strictly ascending and positive: {tier1} < {tier2} < {tier3}")]
    TierOrder { tier1: f64, tier2: f64, tier3: f64 },

    #[error("trigger_days_required must be >= 1")]
    ZeroTriggerDays,

    #[error("trigger_threshold_pct must be > 0, got {0}")]
    TriggerThreshold(f64),

    #[error("warning fractions must satisfy 0 < caution ({caution}) <= warning ({warning}) <= 1")]
    FractionOrder { caution: f64, warning: f64 },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

// ── Scoring ──────────────────────────────────────────────────────────

/// Weights applied to the four factor scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FactorWeights {
    pub borrow: f64,
    pub gamma: f64,
    pub margin: f64,
    pub momentum: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            borrow: 0.35,
            gamma: 0.25,
            margin: 0.20,
            momentum: 0.20,
        }
    }
}

impl FactorWeights {
    pub fn sum(&self) -> f64 {
        self.borrow + self.gamma + self.margin + self.momentum
    }

    fn fields(&self) -> [(&'static str, f64); 4] {
        [
            ("borrow", self.borrow),
            ("gamma", self.gamma),
            ("margin", self.margin),
            ("momentum", self.momentum),
        ]
    }
}

/// Ratio boundaries for the piecewise margin score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarginTiers {
    pub tier1: f64,
    pub tier2: f64,
    pub tier3: f64,
}

impl Default for MarginTiers {
    fn default() -> Self {
        Self {
            tier1: 5.0,
            tier2: 10.0,
            tier3: 20.0,
        }
    }
}

/// What `ScoringConfig::normalize` did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormalizeOutcome {
    /// Weights already summed to 1.0 within tolerance.
    AlreadyNormalized,
    /// Weights were divided by their previous sum.
    Rescaled { previous_sum: f64 },
    /// Sum was <= 0; weights left untouched.
    DegenerateSum { sum: f64 },
}

/// Squeeze score configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringConfig {
    pub weights: FactorWeights,
    pub bullish_threshold: u8,
    pub bearish_threshold: u8,
    pub margin_tiers: MarginTiers,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: FactorWeights::default(),
            bullish_threshold: 70,
            bearish_threshold: 40,
            margin_tiers: MarginTiers::default(),
        }
    }
}

impl ScoringConfig {
    /// True iff the weights sum to 1.0 within `WEIGHT_SUM_TOLERANCE`.
    pub fn validate(&self) -> bool {
        (self.weights.sum() - 1.0).abs() <= WEIGHT_SUM_TOLERANCE
    }

    /// Rescale the weights so they sum to 1.0.
    ///
    /// Only meant for a config that has not been published yet; published
    /// snapshots are immutable.
    pub fn normalize(&mut self) -> NormalizeOutcome {
        let sum = self.weights.sum();
        if self.validate() {
            return NormalizeOutcome::AlreadyNormalized;
        }
        if sum <= 0.0 {
            return NormalizeOutcome::DegenerateSum { sum };
        }
        self.weights.borrow /= sum;
        self.weights.gamma /= sum;
        self.weights.margin /= sum;
        self.weights.momentum /= sum;
        NormalizeOutcome::Rescaled { previous_sum: sum }
    }

    /// Structural checks that normalization cannot repair.
    pub fn check(&self) -> Result<(), ConfigError> {
        for (field, value) in self.weights.fields() {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { field, value });
            }
            if value < 0.0 {
                return Err(ConfigError::NegativeWeight { field, value });
            }
        }

        if self.bearish_threshold >= self.bullish_threshold || self.bullish_threshold > 100 {
            return Err(ConfigError::ThresholdOrder {
                bullish: self.bullish_threshold,
                bearish: self.bearish_threshold,
            });
        }

        let MarginTiers {
            tier1,
            tier2,
            tier3,
        } = self.margin_tiers;
        let finite = tier1.is_finite() && tier2.is_finite() && tier3.is_finite();
        if !finite || tier1 <= 0.0 || tier1 >= tier2 || tier2 >= tier3 {
            return Err(ConfigError::TierOrder {
                tier1,
                tier2,
                tier3,
            });
        }
        Ok(())
    }

    /// Build from the flat key/value store. Missing keys take defaults.
    pub fn from_key_values(values: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            weights: FactorWeights {
                borrow: lookup(values, KEY_WEIGHT_BORROW, d.weights.borrow)?,
                gamma: lookup(values, KEY_WEIGHT_GAMMA, d.weights.gamma)?,
                margin: lookup(values, KEY_WEIGHT_MARGIN, d.weights.margin)?,
                momentum: lookup(values, KEY_WEIGHT_MOMENTUM, d.weights.momentum)?,
            },
            bullish_threshold: lookup(values, KEY_THRESHOLD_BULLISH, d.bullish_threshold)?,
            bearish_threshold: lookup(values, KEY_THRESHOLD_BEARISH, d.bearish_threshold)?,
            margin_tiers: MarginTiers {
                tier1: lookup(values, KEY_MARGIN_TIER1, d.margin_tiers.tier1)?,
                tier2: lookup(values, KEY_MARGIN_TIER2, d.margin_tiers.tier2)?,
                tier3: lookup(values, KEY_MARGIN_TIER3, d.margin_tiers.tier3)?,
            },
        })
    }
}

// ── Convertible bonds ────────────────────────────────────────────────

/// Forced-redemption tracking rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CbConfig {
    /// Trigger line as a percentage of the conversion price.
    pub trigger_threshold_pct: f64,
    /// Consecutive trading days above the trigger that allow redemption.
    pub trigger_days_required: u32,
    /// Whether a day below the trigger resets the counter (else it holds).
    pub reset_on_below: bool,
    pub caution_threshold_fraction: f64,
    pub warning_threshold_fraction: f64,
}

impl Default for CbConfig {
    fn default() -> Self {
        Self {
            trigger_threshold_pct: 130.0,
            trigger_days_required: 30,
            reset_on_below: true,
            caution_threshold_fraction: 0.33,
            warning_threshold_fraction: 0.66,
        }
    }
}

impl CbConfig {
    /// Day count at which CAUTION starts. Not rounded: 30 × 0.33 = 9.9.
    pub fn caution_days(&self) -> f64 {
        f64::from(self.trigger_days_required) * self.caution_threshold_fraction
    }

    /// Day count at which WARNING starts. Not rounded: 30 × 0.66 = 19.8.
    pub fn warning_days(&self) -> f64 {
        f64::from(self.trigger_days_required) * self.warning_threshold_fraction
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        if !self.trigger_threshold_pct.is_finite() || self.trigger_threshold_pct <= 0.0 {
            return Err(ConfigError::TriggerThreshold(self.trigger_threshold_pct));
        }
        if self.trigger_days_required == 0 {
            return Err(ConfigError::ZeroTriggerDays);
        }
        let (caution, warning) = (
            self.caution_threshold_fraction,
            self.warning_threshold_fraction,
        );
        if !(caution > 0.0 && caution <= warning && warning <= 1.0) {
            return Err(ConfigError::FractionOrder { caution, warning });
        }
        Ok(())
    }

    /// Build from the flat key/value store. Missing keys take defaults.
    pub fn from_key_values(values: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let d = Self::default();
        let reset_on_below = match values.get(KEY_CB_RESET_ON_BELOW) {
            Some(raw) => parse_bool(KEY_CB_RESET_ON_BELOW, raw)?,
            None => d.reset_on_below,
        };
        Ok(Self {
            trigger_threshold_pct: lookup(values, KEY_CB_TRIGGER_PCT, d.trigger_threshold_pct)?,
            trigger_days_required: lookup(values, KEY_CB_TRIGGER_DAYS, d.trigger_days_required)?,
            reset_on_below,
            caution_threshold_fraction: lookup(
                values,
                KEY_CB_CAUTION_FRACTION,
                d.caution_threshold_fraction,
            )?,
            warning_threshold_fraction: lookup(
                values,
                KEY_CB_WARNING_FRACTION,
                d.warning_threshold_fraction,
            )?,
        })
    }
}

// ── Combined snapshot ────────────────────────────────────────────────

/// Content hash of a finalized `EngineConfig`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigHash(pub String);

impl std::fmt::Display for ConfigHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Complete configuration snapshot consumed by both engines.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub scoring: ScoringConfig,
    pub cb: CbConfig,
}

impl EngineConfig {
    /// Defaults, already finalized.
    pub fn defaults() -> Self {
        Self::default()
    }

    /// Build from the flat key/value store.
    pub fn from_key_values(values: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let config = Self {
            scoring: ScoringConfig::from_key_values(values)?,
            cb: CbConfig::from_key_values(values)?,
        };
        info!(keys = values.len(), "building engine config from key/value store");
        config.finalize()
    }

    /// Build from TOML with optional `[scoring]` and `[cb]` tables.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.finalize()
    }

    /// Check structure and normalize weights.
    pub fn finalize(mut self) -> Result<Self, ConfigError> {
        self.scoring.check()?;
        self.cb.check()?;
        match self.scoring.normalize() {
            NormalizeOutcome::AlreadyNormalized => {}
            NormalizeOutcome::Rescaled { previous_sum } => {
                warn!(
                    previous_sum,
                    "factor weights did not sum to 1.0; normalized"
                );
            }
            NormalizeOutcome::DegenerateSum { sum } => {
                warn!(sum, "factor weights sum to a non-positive value");
                return Err(ConfigError::DegenerateWeights { sum });
            }
        }
        Ok(self)
    }

    /// Deterministic content hash of this snapshot.
    pub fn fingerprint(&self) -> ConfigHash {
        // Struct field order is fixed, so the JSON form is canonical.
        let json = serde_json::to_string(self).unwrap_or_default();
        ConfigHash(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

// ── Parsing helpers ──────────────────────────────────────────────────

fn lookup<T>(values: &BTreeMap<String, String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match values.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            reason: "expected a boolean".into(),
        }),
    }
}
