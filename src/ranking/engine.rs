//! Ranking engine - refreshes metrics, rescores and reorders the list.

use crate::ranking::refresh_loop::RefreshStrategy;
use crate::ranking::scorer::RankScorer;
use crate::ranking::simulation::SimulatedSource;
use crate::ranking::source::{build_metrics_source, MetricsSource};
use crate::ranking::types::{RankChange, RankedPresale, RankingConfig, TickReport};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Recomputes the ranked order on every tick.
pub struct RankingEngine {
    source: Arc<dyn MetricsSource>,
    fallback: Arc<SimulatedSource>,
    scorer: RankScorer,
}

impl RankingEngine {
    pub fn new(source: Arc<dyn MetricsSource>, fallback: SimulatedSource, scorer: RankScorer) -> Self {
        Self {
            source,
            fallback: Arc::new(fallback),
            scorer,
        }
    }

    pub fn from_config(config: &RankingConfig) -> Result<Self> {
        Ok(Self::new(
            build_metrics_source(config)?,
            SimulatedSource::new(config.simulation.clone()),
            RankScorer::new(config.weights.clone()),
        ))
    }

    /// One ranking pass.
    ///
    /// Ranks are dense (1..=N) afterwards and equal scores keep their previous
    /// relative order.
    #[instrument(skip_all, fields(items = presales.len(), source = self.source.name()))]
    pub async fn rank(&self, mut presales: Vec<RankedPresale>) -> Result<TickReport> {
        for (index, presale) in presales.iter_mut().enumerate() {
            presale.previous_rank = Some(presale.current_rank.unwrap_or(index + 1));
        }

        let fetched = self.source.fetch_many(&presales).await;
        if fetched.len() != presales.len() {
            return Err(anyhow!(
                "{} source returned {} results for {} presales",
                self.source.name(),
                fetched.len(),
                presales.len()
            ));
        }

        let mut degraded = Vec::new();
        for (presale, result) in presales.iter_mut().zip(fetched) {
            let metrics = match result {
                Ok(Some(metrics)) => metrics,
                Ok(None) => {
                    self.fallback
                        .next_metrics(&presale.presale, presale.live_metrics.as_ref())
                        .await
                }
                Err(e) => {
                    debug!("Falling back to simulated metrics for {}: {:#}", presale.symbol(), e);
                    degraded.push(presale.presale.symbol.clone());
                    self.fallback
                        .next_metrics(&presale.presale, presale.live_metrics.as_ref())
                        .await
                }
            };

            presale.rank_score = self.scorer.score(&metrics, presale.presale.status);
            presale.live_metrics = Some(metrics);
        }

        // Vec::sort_by is stable, so ties keep the previous order
        presales.sort_by(|a, b| b.rank_score.total_cmp(&a.rank_score));

        let mut moved = 0;
        for (index, presale) in presales.iter_mut().enumerate() {
            let rank = index + 1;
            let previous = presale.previous_rank.unwrap_or(rank);
            let change = RankChange::between(previous, rank);
            if change != RankChange::Same {
                moved += 1;
            }
            presale.current_rank = Some(rank);
            presale.rank_change = Some(change);
        }

        if !degraded.is_empty() {
            warn!("Live data unavailable for {}", degraded.join(", "));
        }
        info!("Ranked {} presales, {} changed position", presales.len(), moved);

        Ok(TickReport { presales, degraded })
    }
}

#[async_trait]
impl RefreshStrategy for RankingEngine {
    fn name(&self) -> &'static str {
        "live-ranking"
    }

    async fn refresh(&self, current: &[RankedPresale]) -> Result<TickReport> {
        self.rank(current.to_vec()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::types::{LiveMetrics, SimulationConfig};
    use crate::types::PresaleRecord;
    use std::collections::HashMap;

    /// Returns a fixed volume per symbol; "FAIL" errors, anything else has no data.
    struct FixedSource {
        volumes: HashMap<String, f64>,
    }

    #[async_trait]
    impl MetricsSource for FixedSource {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn fetch_metrics(
            &self,
            presale: &PresaleRecord,
            _previous: Option<&LiveMetrics>,
        ) -> Result<Option<LiveMetrics>> {
            if presale.symbol == "FAIL" {
                return Err(anyhow!("boom"));
            }
            Ok(self.volumes.get(&presale.symbol).map(|v| LiveMetrics {
                volume_24h: *v,
                ..Default::default()
            }))
        }
    }

    fn presale(symbol: &str, status: &str) -> RankedPresale {
        RankedPresale::new(
            serde_json::from_value(serde_json::json!({
                "slug": symbol.to_lowercase(),
                "title": symbol,
                "symbol": symbol,
                "status": status,
            }))
            .unwrap(),
        )
    }

    fn engine(volumes: &[(&str, f64)]) -> RankingEngine {
        let source = FixedSource {
            volumes: volumes.iter().map(|(s, v)| (s.to_string(), *v)).collect(),
        };
        RankingEngine::new(
            Arc::new(source),
            SimulatedSource::new(SimulationConfig {
                seed: Some(11),
                ..Default::default()
            }),
            RankScorer::default(),
        )
    }

    fn symbols(presales: &[RankedPresale]) -> Vec<&str> {
        presales.iter().map(|p| p.symbol()).collect()
    }

    #[tokio::test]
    async fn test_orders_by_score_and_tracks_changes() {
        let engine = engine(&[("A", 1_000_000.0), ("B", 5_000_000.0), ("C", 3_000_000.0)]);
        let list = vec![
            presale("A", "Upcoming"),
            presale("B", "Upcoming"),
            presale("C", "Upcoming"),
        ];

        let report = engine.rank(list).await.unwrap();
        let ranked = report.presales;

        assert_eq!(symbols(&ranked), vec!["B", "C", "A"]);
        assert_eq!(ranked[0].previous_rank, Some(2));
        assert_eq!(ranked[0].current_rank, Some(1));
        assert_eq!(ranked[0].rank_change, Some(RankChange::Up));
        assert_eq!(ranked[1].rank_change, Some(RankChange::Up));
        assert_eq!(ranked[2].rank_change, Some(RankChange::Down));
        assert!(report.degraded.is_empty());

        // Same inputs again: nothing moves
        let again = engine.rank(ranked).await.unwrap().presales;
        assert_eq!(symbols(&again), vec!["B", "C", "A"]);
        assert!(again.iter().all(|p| p.rank_change == Some(RankChange::Same)));
        assert_eq!(again[2].previous_rank, Some(3));
    }

    #[tokio::test]
    async fn test_ties_keep_previous_order() {
        let engine = engine(&[("A", 2_000_000.0), ("B", 2_000_000.0), ("C", 2_000_000.0), ("D", 9_000_000.0)]);
        let list = vec![
            presale("C", "Live"),
            presale("A", "Live"),
            presale("D", "Live"),
            presale("B", "Live"),
        ];

        let ranked = engine.rank(list).await.unwrap().presales;
        assert_eq!(symbols(&ranked), vec!["D", "C", "A", "B"]);
    }

    #[tokio::test]
    async fn test_status_multiplier_affects_order() {
        let engine = engine(&[("LIVE", 1_000_000.0), ("ENDED", 1_100_000.0)]);
        let list = vec![presale("ENDED", "Ended"), presale("LIVE", "Live")];

        let ranked = engine.rank(list).await.unwrap().presales;
        assert_eq!(symbols(&ranked), vec!["LIVE", "ENDED"]);
    }

    #[tokio::test]
    async fn test_failed_fetch_without_history_is_seeded() {
        let engine = engine(&[("A", 1_000_000.0)]);
        let list = vec![presale("A", "Live"), presale("FAIL", "Live"), presale("NODATA", "Upcoming")];

        let report = engine.rank(list).await.unwrap();

        assert_eq!(report.degraded, vec!["FAIL".to_string()]);
        for presale in &report.presales {
            let metrics = presale.live_metrics.expect("every item gets metrics");
            assert!(presale.rank_score >= 0.0);
            assert!((0.0..=100.0).contains(&metrics.momentum));
        }
    }

    #[tokio::test]
    async fn test_failed_fetch_with_history_perturbs_previous() {
        let engine = engine(&[]);
        let mut item = presale("FAIL", "Live");
        item.live_metrics = Some(LiveMetrics {
            volume_24h: 1_000_000.0,
            momentum: 50.0,
            ..Default::default()
        });

        let ranked = engine.rank(vec![item]).await.unwrap().presales;
        let metrics = ranked[0].live_metrics.unwrap();
        assert!((900_000.0..=1_100_000.0).contains(&metrics.volume_24h));
        assert!((45.0..=55.0).contains(&metrics.momentum));
    }

    #[tokio::test]
    async fn test_existing_ranks_are_used_as_previous() {
        let engine = engine(&[("A", 1.0), ("B", 2.0)]);
        let mut a = presale("A", "Live");
        a.current_rank = Some(1);
        let mut b = presale("B", "Live");
        b.current_rank = Some(2);

        let ranked = engine.rank(vec![a, b]).await.unwrap().presales;
        assert_eq!(symbols(&ranked), vec!["B", "A"]);
        assert_eq!(ranked[0].previous_rank, Some(2));
        assert_eq!(ranked[0].rank_change, Some(RankChange::Up));
        assert_eq!(ranked[1].rank_change, Some(RankChange::Down));
    }

    #[tokio::test]
    async fn test_empty_list() {
        let engine = engine(&[]);
        let report = engine.rank(Vec::new()).await.unwrap();
        assert!(report.presales.is_empty());
    }
}
