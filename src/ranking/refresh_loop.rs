//! Refresh loop - owns the canonical ranked list and refreshes it on a timer.
//!
//! The loop is a single task moving through explicit phases:
//!
//! ```text
//! Idle --resume--> Scheduled --timer--> Fetching --> Applying --> Scheduled
//!                                                          \--(paused)--> Idle
//! ```
//!
//! Only one tick is ever in flight. Pausing cancels the timer, not a running
//! tick: a tick that finishes after a pause is still applied, it just does not
//! schedule another one. A failed tick keeps the previous list and the next
//! scheduled tick acts as the retry.

use crate::catalog::PresaleCatalog;
use crate::ranking::types::{
    LoopPhase, LoopStats, RankChange, RankedPresale, RankingConfig, RankingSnapshot, TickReport,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Work performed on every tick.
#[async_trait]
pub trait RefreshStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce the next ordering from the current one.
    async fn refresh(&self, current: &[RankedPresale]) -> Result<TickReport>;
}

/// Polling variant: re-reads the static catalog instead of rescoring.
pub struct CatalogRefresh {
    catalog: PresaleCatalog,
}

impl CatalogRefresh {
    pub fn new(catalog: PresaleCatalog) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl RefreshStrategy for CatalogRefresh {
    fn name(&self) -> &'static str {
        "catalog-poll"
    }

    async fn refresh(&self, current: &[RankedPresale]) -> Result<TickReport> {
        let records = self.catalog.load().await?;
        let by_slug: HashMap<&str, &RankedPresale> = current
            .iter()
            .map(|p| (p.presale.slug.as_str(), p))
            .collect();

        let presales = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                let rank = index + 1;
                let prior = by_slug.get(record.slug.as_str()).copied();
                let previous_rank = prior.and_then(|p| p.current_rank).unwrap_or(rank);

                RankedPresale {
                    live_metrics: prior.and_then(|p| p.live_metrics),
                    rank_score: prior.map(|p| p.rank_score).unwrap_or(0.0),
                    previous_rank: Some(previous_rank),
                    current_rank: Some(rank),
                    rank_change: Some(RankChange::between(previous_rank, rank)),
                    presale: record,
                }
            })
            .collect();

        Ok(TickReport {
            presales,
            degraded: Vec::new(),
        })
    }
}

/// Timing knobs for a [`RefreshLoop`].
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub period: Duration,
    pub tick_timeout: Duration,
    pub refresh_on_start: bool,
}

impl LoopSettings {
    /// Settings for the live ranking loop.
    pub fn live_ranking(config: &RankingConfig) -> Self {
        Self {
            period: config.refresh_interval(),
            tick_timeout: config.tick_timeout(),
            refresh_on_start: config.refresh_on_start,
        }
    }

    /// Settings for the catalog polling loop.
    pub fn catalog_polling(config: &RankingConfig) -> Self {
        Self {
            period: config.catalog_poll_interval(),
            tick_timeout: config.tick_timeout(),
            refresh_on_start: config.refresh_on_start,
        }
    }
}

type RefreshResponder = oneshot::Sender<std::result::Result<Vec<RankedPresale>, String>>;

enum LoopCommand {
    Pause,
    Resume,
    RefreshNow(RefreshResponder),
    Shutdown,
}

/// Owner of the ranked list.
pub struct RefreshLoop {
    strategy: Arc<dyn RefreshStrategy>,
    settings: LoopSettings,
    commands: mpsc::Receiver<LoopCommand>,
    snapshot_tx: watch::Sender<RankingSnapshot>,

    presales: Vec<RankedPresale>,
    last_updated: Option<DateTime<Utc>>,
    phase: LoopPhase,
    paused: bool,
    warning: Option<String>,
    stats: LoopStats,
}

impl RefreshLoop {
    /// Create a loop and the handle used to drive and observe it.
    pub fn new(
        strategy: Arc<dyn RefreshStrategy>,
        initial: Vec<RankedPresale>,
        settings: LoopSettings,
    ) -> (Self, RefreshHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let initial_snapshot = RankingSnapshot {
            presales: initial.clone(),
            last_updated: None,
            phase: LoopPhase::Idle,
            paused: false,
            warning: None,
            stats: LoopStats::default(),
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(initial_snapshot);

        let refresh_loop = Self {
            strategy,
            settings,
            commands: command_rx,
            snapshot_tx,
            presales: initial,
            last_updated: None,
            phase: LoopPhase::Idle,
            paused: false,
            warning: None,
            stats: LoopStats::default(),
        };
        let handle = RefreshHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        };

        (refresh_loop, handle)
    }

    /// Run the loop on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Main execution loop. Returns after `shutdown` or when every handle is dropped.
    pub async fn run(mut self) {
        info!(
            "Refresh loop '{}' running every {:?}",
            self.strategy.name(),
            self.settings.period
        );

        let mut next_tick = if self.settings.refresh_on_start {
            Some(Instant::now())
        } else {
            self.after_period()
        };

        loop {
            self.phase = if next_tick.is_some() {
                LoopPhase::Scheduled
            } else {
                LoopPhase::Idle
            };
            self.publish();

            let timer = async move {
                match next_tick {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            let mut waiters = Vec::new();
            tokio::select! {
                _ = timer => {}
                command = self.commands.recv() => match command {
                    Some(LoopCommand::Pause) => {
                        if !self.paused {
                            info!("Live updates paused");
                            self.paused = true;
                            next_tick = None;
                        }
                        continue;
                    }
                    Some(LoopCommand::Resume) => {
                        if self.paused {
                            info!("Live updates resumed");
                            self.paused = false;
                            next_tick = Some(Instant::now());
                        }
                        continue;
                    }
                    Some(LoopCommand::RefreshNow(responder)) => waiters.push(responder),
                    Some(LoopCommand::Shutdown) | None => break,
                }
            }

            if !self.run_tick(waiters).await {
                break;
            }

            next_tick = if self.paused { None } else { self.after_period() };
        }

        self.phase = LoopPhase::Idle;
        self.publish();
        info!("Refresh loop '{}' stopped", self.strategy.name());
    }

    /// Deadline one period from now. `None` if the period overflows the clock,
    /// leaving only on-demand refreshes.
    fn after_period(&self) -> Option<Instant> {
        let next = Instant::now().checked_add(self.settings.period);
        if next.is_none() {
            warn!(
                "Refresh period {:?} is out of range, timer disabled",
                self.settings.period
            );
        }
        next
    }

    /// Run one tick to completion. Returns `false` if a shutdown arrived meanwhile.
    async fn run_tick(&mut self, mut waiters: Vec<RefreshResponder>) -> bool {
        self.phase = LoopPhase::Fetching;
        self.publish();

        let strategy = self.strategy.clone();
        let current = self.presales.clone();
        let timeout = self.settings.tick_timeout;
        let tick = async move { tokio::time::timeout(timeout, strategy.refresh(&current)).await };
        tokio::pin!(tick);

        let mut keep_running = true;
        let outcome = loop {
            tokio::select! {
                outcome = &mut tick => break outcome,
                command = self.commands.recv(), if keep_running => match command {
                    Some(LoopCommand::Pause) => {
                        info!("Live updates paused, waiting for in-flight refresh");
                        self.paused = true;
                        self.publish();
                    }
                    Some(LoopCommand::Resume) => {
                        self.paused = false;
                        self.publish();
                    }
                    // Join the tick that is already running
                    Some(LoopCommand::RefreshNow(responder)) => waiters.push(responder),
                    Some(LoopCommand::Shutdown) | None => keep_running = false,
                },
            }
        };

        self.phase = LoopPhase::Applying;
        match outcome {
            Ok(Ok(report)) => self.apply(report, waiters),
            Ok(Err(e)) => self.fail(format!("Refresh failed: {:#}", e), waiters),
            Err(_) => self.fail(format!("Refresh timed out after {:?}", timeout), waiters),
        }

        keep_running
    }

    fn apply(&mut self, report: TickReport, waiters: Vec<RefreshResponder>) {
        self.presales = report.presales;
        self.last_updated = Some(Utc::now());
        self.stats.ticks += 1;
        self.warning = if report.degraded.is_empty() {
            None
        } else {
            Some(format!(
                "Live data unavailable for {}, showing simulated metrics",
                report.degraded.join(", ")
            ))
        };
        debug!("Applied tick #{} with {} presales", self.stats.ticks, self.presales.len());

        for waiter in waiters {
            let _ = waiter.send(Ok(self.presales.clone()));
        }
        self.publish();
    }

    fn fail(&mut self, message: String, waiters: Vec<RefreshResponder>) {
        warn!("{}; keeping previous ranking", message);
        self.stats.failures += 1;

        for waiter in waiters {
            let _ = waiter.send(Err(message.clone()));
        }
        self.warning = Some(message);
        self.publish();
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(RankingSnapshot {
            presales: self.presales.clone(),
            last_updated: self.last_updated,
            phase: self.phase,
            paused: self.paused,
            warning: self.warning.clone(),
            stats: self.stats,
        });
    }
}

/// Cloneable handle to a running [`RefreshLoop`].
#[derive(Clone)]
pub struct RefreshHandle {
    commands: mpsc::Sender<LoopCommand>,
    snapshots: watch::Receiver<RankingSnapshot>,
}

impl RefreshHandle {
    /// Latest published ordering.
    pub fn list(&self) -> Vec<RankedPresale> {
        self.snapshots.borrow().presales.clone()
    }

    pub fn snapshot(&self) -> RankingSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified after every published change.
    pub fn subscribe(&self) -> watch::Receiver<RankingSnapshot> {
        self.snapshots.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.snapshots.borrow().paused
    }

    /// Refresh now and return the new ordering. Joins the in-flight tick if
    /// there is one.
    pub async fn refresh(&self) -> Result<Vec<RankedPresale>> {
        let (responder, response) = oneshot::channel();
        self.send(LoopCommand::RefreshNow(responder)).await?;
        response
            .await
            .context("Refresh loop stopped before the refresh completed")?
            .map_err(|message| anyhow!(message))
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(LoopCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.send(LoopCommand::Resume).await
    }

    /// Stop the loop once any in-flight tick has been applied.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(LoopCommand::Shutdown).await
    }

    async fn send(&self, command: LoopCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow!("Refresh loop is not running"))
    }
}
