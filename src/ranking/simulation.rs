//! Simulated market metrics.
//!
//! Each tick nudges every field of the previous snapshot by a bounded random
//! factor. Scores that live on a 0-100 scale are clamped after every step so
//! the walk can never leave that range.

use crate::ranking::source::MetricsSource;
use crate::ranking::types::{LiveMetrics, SimulationConfig};
use crate::types::PresaleRecord;
use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tracing::debug;

/// Bounded random-walk metrics generator.
pub struct SimulatedSource {
    config: SimulationConfig,
    rng: Mutex<StdRng>,
}

impl SimulatedSource {
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    /// Next snapshot: a perturbation of `previous`, or a seeded snapshot that
    /// is perturbed once when there is no history.
    pub async fn next_metrics(
        &self,
        presale: &PresaleRecord,
        previous: Option<&LiveMetrics>,
    ) -> LiveMetrics {
        let mut rng = self.rng.lock().await;
        match previous {
            Some(prev) => self.perturb_with(prev, &mut *rng),
            None => {
                let seeded = self.seed_with(presale, &mut *rng);
                debug!("Seeded simulated metrics for {}", presale.symbol);
                self.perturb_with(&seeded, &mut *rng)
            }
        }
    }

    /// Initial snapshot for an item with no metrics history.
    pub fn seed_with<R: Rng + ?Sized>(&self, presale: &PresaleRecord, rng: &mut R) -> LiveMetrics {
        LiveMetrics {
            volume_24h: rng.gen_range(0.0..5_000_000.0),
            market_cap: rng.gen_range(0.0..100_000_000.0),
            price_change_24h: rng.gen_range(-20.0..20.0),
            momentum: rng.gen_range(0.0..100.0),
            social_score: rng.gen_range(0.0..100.0),
            participants: presale
                .participants
                .unwrap_or_else(|| rng.gen_range(0..50_000)),
            progress: clamp_score(presale.progress.unwrap_or_else(|| rng.gen_range(0.0..100.0))),
            raise: presale.raise.to_usd().unwrap_or(0.0),
        }
    }

    /// One step of the random walk.
    pub fn perturb_with<R: Rng + ?Sized>(&self, previous: &LiveMetrics, rng: &mut R) -> LiveMetrics {
        let max = self.config.max_variation.abs();
        let mut draw = || rng.gen_range(-max..=max);

        let volume_24h = previous.volume_24h * (1.0 + draw());
        let market_cap = previous.market_cap * (1.0 + draw());
        let price_change_24h = previous.price_change_24h + draw() * self.config.price_change_scale;
        let momentum = clamp_score(previous.momentum * (1.0 + draw()));
        let social_score = clamp_score(previous.social_score * (1.0 + draw()));
        let participants = (previous.participants as f64 * (1.0 + draw())).max(0.0).floor() as u64;
        let progress = clamp_score(previous.progress * (1.0 + draw()));
        let raise = previous.raise * (1.0 + draw());

        LiveMetrics {
            volume_24h,
            market_cap,
            price_change_24h,
            momentum,
            social_score,
            participants,
            progress,
            raise,
        }
    }
}

#[async_trait]
impl MetricsSource for SimulatedSource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn fetch_metrics(
        &self,
        presale: &PresaleRecord,
        previous: Option<&LiveMetrics>,
    ) -> Result<Option<LiveMetrics>> {
        Ok(Some(self.next_metrics(presale, previous).await))
    }
}

fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}
