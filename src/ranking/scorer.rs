//! Rank scorer - folds a metrics snapshot and listing status into one number.

use crate::ranking::types::{LiveMetrics, ScoreWeights};
use crate::types::PresaleStatus;

/// Weighted-sum scorer used to order presales.
#[derive(Debug, Clone, Default)]
pub struct RankScorer {
    weights: ScoreWeights,
}

impl RankScorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    /// Score a snapshot. The result is never negative.
    pub fn score(&self, metrics: &LiveMetrics, status: PresaleStatus) -> f64 {
        let w = &self.weights;
        let mut raw = 0.0;

        raw += (metrics.volume_24h / w.volume_scale) * w.volume;
        raw += (metrics.market_cap / w.market_cap_scale) * w.market_cap;
        // Only gains count
        raw += metrics.price_change_24h.max(0.0) * w.price_change;
        raw += (metrics.momentum / 100.0) * w.momentum;
        raw += (metrics.social_score / 100.0) * w.social;
        if metrics.progress > 0.0 {
            raw += (metrics.progress / 100.0) * w.progress;
        }

        let score = raw * self.status_multiplier(status);
        // f64::max drops NaN in favour of the other operand
        score.max(0.0)
    }

    pub fn status_multiplier(&self, status: PresaleStatus) -> f64 {
        match status {
            PresaleStatus::Live => self.weights.live_multiplier,
            PresaleStatus::Upcoming => self.weights.upcoming_multiplier,
            PresaleStatus::Ended => self.weights.ended_multiplier,
            PresaleStatus::Paused | PresaleStatus::Unknown => self.weights.default_multiplier,
        }
    }
}
