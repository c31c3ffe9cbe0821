//! Whole-market discovery screen.
//!
//! A coarse first pass over every listed ticker, ahead of full squeeze
//! scoring. Candidates are filtered by `DiscoveryThresholds`, given a tiered
//! 0–100 `screening_score`, sorted best first and capped at `max_results`.
//!
//! | component       | weight | tiers (value ≥ → points)                     |
//! |-----------------|--------|----------------------------------------------|
//! | short ratio %   | 35     | 10 → 35, 7 → 28, 5 → 21, 3 → 14, else 7      |
//! | margin ratio %  | 25     | 30 → 25, 20 → 20, 10 → 15, 5 → 10, else 5    |
//! | volume multiple | 20     | 3 → 20, 2 → 16, 1.5 → 12, else 8             |
//! | CB price ratio  | 20     | 1.25 → 20, 1.15 → 15, 1.0 → 10, else 5; no CB 0 |

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::batch::DailySnapshot;

/// Shares in one board lot.
pub const SHARES_PER_LOT: u64 = 1_000;

const SHORT_RATIO_TIERS: [(f64, u8); 4] = [(10.0, 35), (7.0, 28), (5.0, 21), (3.0, 14)];
const MARGIN_RATIO_TIERS: [(f64, u8); 4] = [(30.0, 25), (20.0, 20), (10.0, 15), (5.0, 10)];
const VOL_MULTIPLIER_TIERS: [(f64, u8); 3] = [(3.0, 20), (2.0, 16), (1.5, 12)];
const CB_RATIO_TIERS: [(f64, u8); 3] = [(1.25, 20), (1.15, 15), (1.0, 10)];

/// Screen filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryThresholds {
    /// Minimum volume, in lots.
    pub min_volume: u64,
    pub min_price: f64,
    /// Minimum borrow balance as a percent of shares outstanding.
    pub min_short_ratio: f64,
    /// Minimum volume over its trailing average.
    pub min_vol_multiplier: f64,
    pub require_cb: bool,
    pub max_results: usize,
}

impl Default for DiscoveryThresholds {
    fn default() -> Self {
        Self {
            min_volume: 1_000,
            min_price: 10.0,
            min_short_ratio: 3.0,
            min_vol_multiplier: 1.5,
            require_cb: false,
            max_results: 100,
        }
    }
}

impl DiscoveryThresholds {
    pub fn passes(&self, candidate: &DiscoveryCandidate) -> bool {
        candidate.close_price >= self.min_price
            && candidate.volume >= self.min_volume.saturating_mul(SHARES_PER_LOT)
            && candidate.short_ratio >= self.min_short_ratio
            && candidate.vol_multiplier >= self.min_vol_multiplier
            && (!self.require_cb || candidate.has_cb)
    }
}

/// One ticker's screen inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryCandidate {
    pub ticker: String,
    pub close_price: f64,
    /// Shares traded.
    pub volume: u64,
    pub short_ratio: f64,
    pub vol_multiplier: f64,
    pub margin_ratio: f64,
    pub has_cb: bool,
    /// Close over the CB conversion price; `None` without a usable CB.
    pub cb_price_ratio: Option<f64>,
}

impl DiscoveryCandidate {
    /// Build from a scoring row. A non-positive average volume gives a
    /// multiple of 1; a non-positive conversion price keeps `has_cb` but
    /// leaves the ratio unset.
    pub fn from_snapshot(
        snapshot: &DailySnapshot,
        short_ratio: f64,
        conversion_price: Option<f64>,
    ) -> Self {
        let vol_multiplier = if snapshot.avg_volume_20d > 0.0 {
            snapshot.volume as f64 / snapshot.avg_volume_20d
        } else {
            1.0
        };
        let cb_price_ratio = conversion_price
            .filter(|&cp| cp > 0.0 && snapshot.close_price > 0.0)
            .map(|cp| snapshot.close_price / cp);
        Self {
            ticker: snapshot.ticker.clone(),
            close_price: snapshot.close_price,
            volume: snapshot.volume,
            short_ratio,
            vol_multiplier,
            margin_ratio: snapshot.margin_ratio,
            has_cb: conversion_price.is_some(),
            cb_price_ratio,
        }
    }
}

/// A candidate that passed the screen, with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryHit {
    pub candidate: DiscoveryCandidate,
    pub screening_score: u8,
}

fn tier(value: f64, tiers: &[(f64, u8)], floor: u8) -> u8 {
    tiers
        .iter()
        .find(|&&(min, _)| value >= min)
        .map_or(floor, |&(_, points)| points)
}

/// Tiered 0–100 screen score. NaN inputs land in the lowest tier.
pub fn screening_score(candidate: &DiscoveryCandidate) -> u8 {
    let cb = if candidate.has_cb {
        candidate
            .cb_price_ratio
            .map_or(5, |ratio| tier(ratio, &CB_RATIO_TIERS, 5))
    } else {
        0
    };
    let total = tier(candidate.short_ratio, &SHORT_RATIO_TIERS, 7)
        + tier(candidate.margin_ratio, &MARGIN_RATIO_TIERS, 5)
        + tier(candidate.vol_multiplier, &VOL_MULTIPLIER_TIERS, 8)
        + cb;
    total.min(100)
}

/// Filter, score and rank. Ties keep input order.
pub fn discovery_scan(
    candidates: &[DiscoveryCandidate],
    thresholds: &DiscoveryThresholds,
) -> Vec<DiscoveryHit> {
    let mut hits: Vec<DiscoveryHit> = candidates
        .iter()
        .filter(|c| thresholds.passes(c))
        .map(|c| DiscoveryHit {
            screening_score: screening_score(c),
            candidate: c.clone(),
        })
        .collect();
    debug!(passed = hits.len(), "discovery filter applied");

    hits.sort_by(|a, b| b.screening_score.cmp(&a.screening_score));
    hits.truncate(thresholds.max_results);
    info!(
        scanned = candidates.len(),
        kept = hits.len(),
        "discovery scan complete"
    );
    hits
}
