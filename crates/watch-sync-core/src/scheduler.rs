use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use watch_sync_config::SchedulerConfig;
use crate::engine::{AccountSyncEngine, HistorySyncEngine, SyncSummary};

/// Outcome of one scheduler tick
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    pub account: Option<SyncSummary>,
    pub history: Option<SyncSummary>,
    pub duration_ms: u64,
}

impl PassReport {
    pub fn failed(&self) -> usize {
        self.account.as_ref().map_or(0, |s| s.failed) + self.history.as_ref().map_or(0, |s| s.failed)
    }
}

/// Runs the enabled engines over all links on a fixed interval
pub struct Scheduler {
    account: Option<Arc<AccountSyncEngine>>,
    history: Option<Arc<HistorySyncEngine>>,
    interval: Duration,
    run_on_startup: bool,
}

impl Scheduler {
    pub fn new(
        account: Option<Arc<AccountSyncEngine>>,
        history: Option<Arc<HistorySyncEngine>>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            account,
            history,
            interval: config.interval(),
            run_on_startup: config.run_on_startup,
        }
    }

    /// One pass of every enabled engine. An engine that cannot even list its
    /// links is logged and leaves its summary empty.
    pub async fn run_once(&self) -> PassReport {
        let start = Instant::now();
        let mut report = PassReport::default();

        if let Some(engine) = &self.account {
            match engine.run_all().await {
                Ok(summary) => report.account = Some(summary),
                Err(e) => error!(operation = "account_sync", error = %e, "Account sync pass failed"),
            }
        }
        if let Some(engine) = &self.history {
            match engine.run_all().await {
                Ok(summary) => report.history = Some(summary),
                Err(e) => error!(operation = "history_sync", error = %e, "History sync pass failed"),
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }

    /// Tick until `shutdown` resolves, returning the number of passes run
    pub async fn run_until<F>(&self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut passes = 0;

        if self.run_on_startup {
            info!(operation = "scheduler_startup", "Running initial sync on startup");
            self.log_pass(self.run_once().await);
            passes += 1;
        }

        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        info!(
            operation = "scheduler_started",
            interval_secs = self.interval.as_secs(),
            "Scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(operation = "scheduler_stopped", passes = passes, "Scheduler stopped");
                    return passes;
                }
                _ = ticker.tick() => {
                    info!(operation = "scheduled_sync_start", "Starting scheduled sync");
                    self.log_pass(self.run_once().await);
                    passes += 1;
                }
            }
        }
    }

    fn log_pass(&self, report: PassReport) {
        let processed = report.account.as_ref().map_or(0, |s| s.processed)
            + report.history.as_ref().map_or(0, |s| s.processed);
        info!(
            operation = "scheduled_sync_complete",
            processed = processed,
            failed = report.failed(),
            duration_ms = report.duration_ms,
            "Scheduled sync completed"
        );
    }
}
