//! Live ranking module - periodic metrics refresh, scoring and rank tracking.
//!
//! The pieces, leaf to root:
//! - [`MetricsSource`] produces a metrics snapshot per presale (simulated or
//!   from a market-data API with caching and request spacing)
//! - [`RankScorer`] folds a snapshot and status into one score
//! - [`RankingEngine`] rescores, stable-sorts and derives rank changes
//! - [`RefreshLoop`] drives the engine on a timer with pause/resume

pub mod types;
pub mod scorer;
pub mod simulation;
pub mod rate_limit;
pub mod market_data;
pub mod source;
pub mod engine;
pub mod refresh_loop;

// Re-export main public types
pub use types::{
    LiveMetrics, RankChange, RankedPresale, TickReport, ScoreWeights, MetricsMode,
    SimulationConfig, MarketDataConfig, RankingConfig, LoopPhase, LoopStats, RankingSnapshot,
};

// Re-export key components
pub use scorer::RankScorer;
pub use simulation::SimulatedSource;
pub use rate_limit::RequestSpacer;
pub use market_data::{CoinGeckoClient, CoinMarket, ExternalSource, MarketDataClient};
pub use source::{build_metrics_source, MetricsSource};
pub use engine::RankingEngine;
pub use refresh_loop::{CatalogRefresh, LoopSettings, RefreshHandle, RefreshLoop, RefreshStrategy};

use crate::catalog::PresaleCatalog;
use anyhow::Result;
use std::sync::Arc;

/// Builder for convenient construction with sensible defaults.
pub struct RankingBuilder {
    config: RankingConfig,
}

impl RankingBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: RankingConfig::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: RankingConfig) -> Self {
        Self { config }
    }

    /// Choose simulated or external metrics.
    pub fn with_mode(mut self, mode: MetricsMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set the catalog directory.
    pub fn with_data_dir(mut self, data_dir: impl Into<String>) -> Self {
        self.config.data_dir = data_dir.into();
        self
    }

    /// Set the live ranking cadence in seconds.
    pub fn with_refresh_interval(mut self, seconds: u64) -> Self {
        self.config.refresh_interval_seconds = seconds;
        self
    }

    /// Set the catalog polling cadence in seconds.
    pub fn with_catalog_poll_interval(mut self, seconds: u64) -> Self {
        self.config.catalog_poll_interval_seconds = seconds;
        self
    }

    /// Set score weights.
    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.config.weights = weights;
        self
    }

    /// Set market data cache TTL in seconds.
    pub fn with_cache_ttl(mut self, ttl_seconds: u64) -> Self {
        self.config.market_data.cache_ttl_seconds = ttl_seconds;
        self
    }

    /// Set minimum spacing between market data requests.
    pub fn with_min_request_interval(mut self, millis: u64) -> Self {
        self.config.market_data.min_request_interval_ms = millis;
        self
    }

    /// Set batch chunking for market data lookups.
    pub fn with_batch_chunking(mut self, chunk_size: usize, pause_millis: u64) -> Self {
        self.config.market_data.batch_chunk_size = chunk_size;
        self.config.market_data.batch_chunk_pause_ms = pause_millis;
        self
    }

    /// Fix the simulation RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.simulation.seed = Some(seed);
        self
    }

    /// Build the validated configuration.
    pub fn build_config(self) -> Result<RankingConfig> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Build the live ranking loop over `presales`.
    pub fn build_live_loop(self, presales: Vec<RankedPresale>) -> Result<(RefreshLoop, RefreshHandle)> {
        let config = self.build_config()?;
        let engine = Arc::new(RankingEngine::from_config(&config)?);
        Ok(RefreshLoop::new(engine, presales, LoopSettings::live_ranking(&config)))
    }

    /// Build the catalog polling loop over `presales`.
    pub fn build_polling_loop(self, presales: Vec<RankedPresale>) -> Result<(RefreshLoop, RefreshHandle)> {
        let config = self.build_config()?;
        let strategy = Arc::new(CatalogRefresh::new(PresaleCatalog::new(&config.data_dir)));
        Ok(RefreshLoop::new(strategy, presales, LoopSettings::catalog_polling(&config)))
    }
}

impl Default for RankingBuilder {
    fn default() -> Self {
        Self::new()
    }
}
