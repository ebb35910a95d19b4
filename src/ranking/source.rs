//! Metrics source abstraction.
//!
//! A source turns a presale (plus its previous snapshot, if any) into a fresh
//! [`LiveMetrics`] snapshot. Two implementations exist: the bounded random
//! walk in [`SimulatedSource`] and the market-data backed [`ExternalSource`].

use crate::ranking::market_data::{CoinGeckoClient, ExternalSource};
use crate::ranking::simulation::SimulatedSource;
use crate::ranking::types::{LiveMetrics, MetricsMode, RankedPresale, RankingConfig};
use crate::types::PresaleRecord;
use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::info;

/// Contract for anything that can produce live metrics.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce a new snapshot for one presale.
    ///
    /// `Ok(None)` means the source has no data for this item; `Err` means the
    /// lookup failed. Callers fall back to simulation in both cases.
    async fn fetch_metrics(
        &self,
        presale: &PresaleRecord,
        previous: Option<&LiveMetrics>,
    ) -> Result<Option<LiveMetrics>>;

    /// Fetch metrics for every item of a tick, in input order.
    async fn fetch_many(&self, presales: &[RankedPresale]) -> Vec<Result<Option<LiveMetrics>>> {
        join_all(
            presales
                .iter()
                .map(|p| self.fetch_metrics(&p.presale, p.live_metrics.as_ref())),
        )
        .await
    }
}

/// Build the source selected by `config.mode`.
pub fn build_metrics_source(config: &RankingConfig) -> Result<Arc<dyn MetricsSource>> {
    let source: Arc<dyn MetricsSource> = match config.mode {
        MetricsMode::Simulated => Arc::new(SimulatedSource::new(config.simulation.clone())),
        MetricsMode::External => {
            let client = CoinGeckoClient::new(&config.market_data)?;
            Arc::new(ExternalSource::new(client, &config.market_data))
        }
    };
    info!("Using {} metrics source", source.name());
    Ok(source)
}
