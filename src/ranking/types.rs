//! Core types and configuration for the live ranking system.

use crate::types::PresaleRecord;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Market metrics attached to a presale on every refresh tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveMetrics {
    /// 24h traded volume in USD
    #[serde(rename = "volume24h")]
    pub volume_24h: f64,
    /// Market capitalisation in USD
    pub market_cap: f64,
    /// 24h price change in percent
    #[serde(rename = "priceChange24h")]
    pub price_change_24h: f64,
    /// Momentum score (0-100)
    pub momentum: f64,
    /// Social activity score (0-100)
    pub social_score: f64,
    /// Number of participants
    pub participants: u64,
    /// Sale progress (0-100)
    pub progress: f64,
    /// Amount raised in USD
    pub raise: f64,
}

/// Movement of an item between two consecutive orderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankChange {
    Up,
    Down,
    Same,
}

impl RankChange {
    /// Lower rank numbers are better, so moving from 3 to 1 is `Up`.
    pub fn between(previous_rank: usize, current_rank: usize) -> Self {
        match current_rank.cmp(&previous_rank) {
            std::cmp::Ordering::Less => RankChange::Up,
            std::cmp::Ordering::Greater => RankChange::Down,
            std::cmp::Ordering::Equal => RankChange::Same,
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            RankChange::Up => "↑",
            RankChange::Down => "↓",
            RankChange::Same => "—",
        }
    }
}

/// A presale together with its live metrics and ranking state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedPresale {
    #[serde(flatten)]
    pub presale: PresaleRecord,
    pub live_metrics: Option<LiveMetrics>,
    /// Score computed from `live_metrics` on the last tick
    pub rank_score: f64,
    pub previous_rank: Option<usize>,
    pub current_rank: Option<usize>,
    pub rank_change: Option<RankChange>,
}

impl RankedPresale {
    pub fn new(presale: PresaleRecord) -> Self {
        Self {
            presale,
            live_metrics: None,
            rank_score: 0.0,
            previous_rank: None,
            current_rank: None,
            rank_change: None,
        }
    }

    pub fn from_records(records: Vec<PresaleRecord>) -> Vec<Self> {
        records.into_iter().map(Self::new).collect()
    }

    pub fn symbol(&self) -> &str {
        &self.presale.symbol
    }
}

/// Result of one refresh tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// New canonical ordering
    pub presales: Vec<RankedPresale>,
    /// Symbols whose live data failed and were filled in by simulation
    pub degraded: Vec<String>,
}

/// Weights and multipliers used by the rank scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub volume: f64,
    /// Volume that earns the full volume weight
    pub volume_scale: f64,
    pub market_cap: f64,
    /// Market cap that earns the full market cap weight
    pub market_cap_scale: f64,
    /// Points per positive percent of 24h price change
    pub price_change: f64,
    pub momentum: f64,
    pub social: f64,
    pub progress: f64,
    pub live_multiplier: f64,
    pub upcoming_multiplier: f64,
    pub ended_multiplier: f64,
    /// Applied to paused and unknown statuses
    pub default_multiplier: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            volume: 30.0,
            volume_scale: 10_000_000.0,
            market_cap: 25.0,
            market_cap_scale: 100_000_000.0,
            price_change: 0.5,
            momentum: 15.0,
            social: 10.0,
            progress: 5.0,
            live_multiplier: 1.2,
            upcoming_multiplier: 1.0,
            ended_multiplier: 0.8,
            default_multiplier: 1.0,
        }
    }
}

/// Where live metrics come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricsMode {
    /// Bounded random walk
    Simulated,
    /// Market-data API, falling back to simulation per item
    External,
}

/// Random-walk simulation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Maximum relative change per tick (0.1 = ±10%)
    pub max_variation: f64,
    /// Percentage points of price change per unit of variation
    pub price_change_scale: f64,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_variation: 0.1,
            price_change_scale: 20.0,
            seed: None,
        }
    }
}

/// Market-data API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    pub base_url: String,
    pub request_timeout_seconds: u64,
    pub cache_ttl_seconds: u64,
    pub max_cache_entries: u64,
    /// Minimum spacing between outbound requests
    pub min_request_interval_ms: u64,
    pub batch_chunk_size: usize,
    pub batch_chunk_pause_ms: u64,
    /// Token symbol -> provider coin id
    pub token_ids: HashMap<String, String>,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            request_timeout_seconds: 10,
            cache_ttl_seconds: 60,
            max_cache_entries: 1_000,
            min_request_interval_ms: 2_000,
            batch_chunk_size: 5,
            batch_chunk_pause_ms: 3_000,
            token_ids: default_token_ids(),
        }
    }
}

fn default_token_ids() -> HashMap<String, String> {
    [
        ("BEST", "best-wallet-token"),
        ("BDAG", "blockdag"),
        ("USDD", "usdd"),
        ("PENGU", "pudgy-penguins"),
        ("SPY", "spacepay"),
        ("SNORT", "snorter-token"),
        ("STARS", "crypto-all-stars"),
        ("MCASH", "metacash"),
        ("WSM", "wall-street-memes"),
        ("TAMA", "tamadoge"),
        ("LBLOCK", "lucky-block"),
        ("IBAT", "battle-infinity"),
        ("DEFC", "defi-coin"),
    ]
    .into_iter()
    .map(|(symbol, id)| (symbol.to_string(), id.to_string()))
    .collect()
}

/// Upper bound for every configured duration (one year).
pub const MAX_DURATION_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Complete ranking configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub mode: MetricsMode,
    /// Directory holding the presale JSON files
    pub data_dir: String,
    /// Cadence of the live ranking loop
    pub refresh_interval_seconds: u64,
    /// Cadence of the catalog polling loop
    pub catalog_poll_interval_seconds: u64,
    /// A tick running longer than this counts as failed
    pub tick_timeout_seconds: u64,
    /// Fire the first tick as soon as the loop starts
    pub refresh_on_start: bool,
    pub weights: ScoreWeights,
    pub simulation: SimulationConfig,
    pub market_data: MarketDataConfig,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            mode: MetricsMode::Simulated,
            data_dir: "data/presales".to_string(),
            refresh_interval_seconds: 8,
            catalog_poll_interval_seconds: 30,
            tick_timeout_seconds: 60,
            refresh_on_start: true,
            weights: ScoreWeights::default(),
            simulation: SimulationConfig::default(),
            market_data: MarketDataConfig::default(),
        }
    }
}

impl RankingConfig {
    /// Load a JSON config file; absent fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval_seconds == 0 || self.catalog_poll_interval_seconds == 0 {
            return Err(anyhow!("refresh intervals must be at least one second"));
        }
        if self.tick_timeout_seconds == 0 {
            return Err(anyhow!("tick_timeout_seconds must be positive"));
        }
        if !(0.0..1.0).contains(&self.simulation.max_variation) {
            return Err(anyhow!(
                "simulation.max_variation must be in [0, 1), got {}",
                self.simulation.max_variation
            ));
        }
        if self.market_data.batch_chunk_size == 0 {
            return Err(anyhow!("market_data.batch_chunk_size must be positive"));
        }

        let seconds = [
            ("refresh_interval_seconds", self.refresh_interval_seconds),
            ("catalog_poll_interval_seconds", self.catalog_poll_interval_seconds),
            ("tick_timeout_seconds", self.tick_timeout_seconds),
            ("market_data.cache_ttl_seconds", self.market_data.cache_ttl_seconds),
            ("market_data.request_timeout_seconds", self.market_data.request_timeout_seconds),
        ];
        for (name, value) in seconds {
            if value > MAX_DURATION_SECONDS {
                return Err(anyhow!(
                    "{} must be at most {} seconds, got {}",
                    name,
                    MAX_DURATION_SECONDS,
                    value
                ));
            }
        }

        let millis = [
            ("market_data.min_request_interval_ms", self.market_data.min_request_interval_ms),
            ("market_data.batch_chunk_pause_ms", self.market_data.batch_chunk_pause_ms),
        ];
        for (name, value) in millis {
            if value > MAX_DURATION_SECONDS * 1_000 {
                return Err(anyhow!(
                    "{} must be at most {} ms, got {}",
                    name,
                    MAX_DURATION_SECONDS * 1_000,
                    value
                ));
            }
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }

    pub fn catalog_poll_interval(&self) -> Duration {
        Duration::from_secs(self.catalog_poll_interval_seconds)
    }

    pub fn tick_timeout(&self) -> Duration {
        Duration::from_secs(self.tick_timeout_seconds)
    }
}

/// Phase of the refresh loop state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopPhase {
    /// Paused with no tick in flight
    Idle,
    /// Waiting for the next tick
    Scheduled,
    /// A tick is gathering metrics
    Fetching,
    /// A finished tick is being published
    Applying,
}

/// Counters kept by the refresh loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStats {
    /// Ticks that produced a new ordering
    pub ticks: u64,
    /// Ticks that failed or timed out
    pub failures: u64,
}

/// What subscribers see after every state change of the refresh loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingSnapshot {
    pub presales: Vec<RankedPresale>,
    /// Time of the last successful refresh
    pub last_updated: Option<DateTime<Utc>>,
    pub phase: LoopPhase,
    pub paused: bool,
    /// Transient, non-blocking warning from the last tick
    pub warning: Option<String>,
    pub stats: LoopStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_change_between() {
        assert_eq!(RankChange::between(3, 1), RankChange::Up);
        assert_eq!(RankChange::between(1, 3), RankChange::Down);
        assert_eq!(RankChange::between(2, 2), RankChange::Same);
    }

    #[test]
    fn test_live_metrics_wire_names() {
        let metrics = LiveMetrics {
            volume_24h: 1.0,
            price_change_24h: -2.5,
            ..Default::default()
        };
        let value = serde_json::to_value(metrics).unwrap();
        assert_eq!(value["volume24h"], 1.0);
        assert_eq!(value["priceChange24h"], -2.5);
        assert!(value.get("marketCap").is_some());
        assert!(value.get("socialScore").is_some());
    }

    #[test]
    fn test_config_defaults_and_partial_json() {
        let config: RankingConfig =
            serde_json::from_str(r#"{"mode": "external", "market_data": {"cache_ttl_seconds": 5}}"#)
                .unwrap();

        assert_eq!(config.mode, MetricsMode::External);
        assert_eq!(config.refresh_interval_seconds, 8);
        assert_eq!(config.catalog_poll_interval_seconds, 30);
        assert_eq!(config.market_data.cache_ttl_seconds, 5);
        assert_eq!(config.market_data.min_request_interval_ms, 2_000);
        assert_eq!(config.market_data.batch_chunk_size, 5);
        assert_eq!(config.market_data.token_ids.len(), 13);
        assert_eq!(config.weights, ScoreWeights::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = RankingConfig::default();
        config.refresh_interval_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = RankingConfig::default();
        config.simulation.max_variation = 1.5;
        assert!(config.validate().is_err());

        let mut config = RankingConfig::default();
        config.market_data.batch_chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_unbounded_durations() {
        let config: RankingConfig =
            serde_json::from_str(r#"{"refresh_interval_seconds": 18446744073709551615}"#).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("refresh_interval_seconds"));

        let config: RankingConfig = serde_json::from_str(
            r#"{"mode": "external", "market_data": {"cache_ttl_seconds": 18446744073709551615}}"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cache_ttl_seconds"));

        let mut config = RankingConfig::default();
        config.catalog_poll_interval_seconds = MAX_DURATION_SECONDS + 1;
        assert!(config.validate().is_err());

        let mut config = RankingConfig::default();
        config.market_data.min_request_interval_ms = u64::MAX;
        assert!(config.validate().is_err());

        // The bound itself is accepted
        let mut config = RankingConfig::default();
        config.refresh_interval_seconds = MAX_DURATION_SECONDS;
        config.market_data.cache_ttl_seconds = MAX_DURATION_SECONDS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ranked_presale_serializes_flat() {
        let record: PresaleRecord = serde_json::from_value(serde_json::json!({
            "slug": "best-wallet",
            "title": "Best Wallet",
            "symbol": "BEST",
            "status": "Live",
        }))
        .unwrap();
        let mut ranked = RankedPresale::new(record);
        ranked.current_rank = Some(1);
        ranked.rank_change = Some(RankChange::Up);

        let value = serde_json::to_value(&ranked).unwrap();
        assert_eq!(value["symbol"], "BEST");
        assert_eq!(value["currentRank"], 1);
        assert_eq!(value["rankChange"], "up");
    }
}
