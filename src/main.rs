//! Presale ranker - loads the presale catalog and keeps a live ranking of it.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use presale_ranker::catalog::PresaleCatalog;
use presale_ranker::ranking::{
    LoopStats, MetricsMode, RankedPresale, RankingBuilder, RankingConfig, RankingSnapshot,
};
use presale_ranker::summary::{
    filter_ranked, format_percentage, format_usd_compact, MarketSummary, StatusFilter,
};
use std::path::PathBuf;
use tracing::{error, info, warn, Level};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Simulated,
    External,
}

impl From<ModeArg> for MetricsMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Simulated => MetricsMode::Simulated,
            ModeArg::External => MetricsMode::External,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON config file; missing fields keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the presale JSON files
    #[arg(long)]
    data_dir: Option<String>,

    /// Where live metrics come from
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Re-read the catalog on a timer instead of live ranking
    #[arg(long, default_value_t = false)]
    poll: bool,

    /// Stop after this many published updates
    #[arg(long)]
    ticks: Option<u64>,

    /// Fixed RNG seed for the simulation
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .init();

    let config = match &cli.config {
        Some(path) => RankingConfig::from_file(path)?,
        None => RankingConfig::default(),
    };

    let mut builder = RankingBuilder::from_config(config);
    if let Some(dir) = &cli.data_dir {
        builder = builder.with_data_dir(dir.clone());
    }
    if let Some(mode) = cli.mode {
        builder = builder.with_mode(mode.into());
    }
    if let Some(seed) = cli.seed {
        builder = builder.with_seed(seed);
    }
    let config = builder.build_config()?;

    let catalog = PresaleCatalog::new(&config.data_dir);
    let records = catalog
        .load()
        .await
        .with_context(|| format!("Failed to load presales from {}", config.data_dir))?;
    info!("Loaded {} presales from {}", records.len(), catalog.dir().display());

    let summary = MarketSummary::from_records(&records);
    info!(
        "{} presales, {} live, {} raised, average APY {:.1}%",
        summary.total_presales,
        summary.live_presales,
        format_usd_compact(summary.total_raised),
        summary.average_apy
    );

    let presales = RankedPresale::from_records(records);
    let tabs: Vec<String> = StatusFilter::ALL
        .iter()
        .map(|filter| format!("{:?} {}", filter, filter_ranked(&presales, *filter).len()))
        .collect();
    info!("By status: {}", tabs.join(", "));

    let builder = RankingBuilder::from_config(config);
    let (refresh_loop, handle) = if cli.poll {
        builder.build_polling_loop(presales)?
    } else {
        builder.build_live_loop(presales)?
    };
    let loop_task = refresh_loop.spawn();

    let mut updates = handle.subscribe();
    let mut seen = LoopStats::default();
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    warn!("Refresh loop stopped unexpectedly");
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if snapshot.stats == seen {
                    continue;
                }
                seen = snapshot.stats;
                log_snapshot(&snapshot);

                if cli.ticks.is_some_and(|limit| seen.ticks + seen.failures >= limit) {
                    info!("Reached {} updates", seen.ticks + seen.failures);
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    if let Err(e) = handle.shutdown().await {
        warn!("Shutdown request not delivered: {}", e);
    }
    if let Err(e) = loop_task.await {
        error!("Refresh loop task failed: {}", e);
    }

    Ok(())
}

fn log_snapshot(snapshot: &RankingSnapshot) {
    info!(
        "Update #{} ({} failed) at {}",
        snapshot.stats.ticks,
        snapshot.stats.failures,
        snapshot
            .last_updated
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    if let Some(warning) = &snapshot.warning {
        warn!("{}", warning);
    }

    for presale in &snapshot.presales {
        let change = presale.rank_change.map(|c| c.arrow()).unwrap_or(" ");
        let price = presale
            .live_metrics
            .map(|m| format_percentage(m.price_change_24h))
            .unwrap_or_default();
        info!(
            "  #{:<3} {} {:<8} {:>8.1} {:>7}  {}",
            presale.current_rank.unwrap_or(0),
            change,
            presale.symbol(),
            presale.rank_score,
            price,
            presale.presale.status
        );
    }
}
