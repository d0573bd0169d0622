use super::{load_config, EngineSelection, Engines};
use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use tracing::{error, info};
use watch_sync_config::{default_scheduler_config, PathManager, SchedulerConfig};
use watch_sync_core::Scheduler;

/// Command line overrides for the configured schedule
pub struct DaemonArgs {
    pub no_startup_sync: bool,
    pub interval_minutes: Option<u64>,
}

fn effective_schedule(configured: Option<SchedulerConfig>, args: &DaemonArgs) -> Result<SchedulerConfig> {
    let mut schedule = configured.unwrap_or_else(default_scheduler_config);
    if let Some(minutes) = args.interval_minutes {
        if minutes == 0 {
            return Err(eyre!("--interval-minutes must be greater than zero"));
        }
        schedule.interval_minutes = minutes;
    }
    if args.no_startup_sync {
        schedule.run_on_startup = false;
    }
    Ok(schedule)
}

pub async fn run_daemon(args: DaemonArgs, output: &Output) -> Result<()> {
    let paths = PathManager::default();
    let config = load_config(&paths)?;
    let schedule = effective_schedule(config.scheduler.clone(), &args)?;
    let selection = EngineSelection::resolve(false, false, &config);

    let engines = Engines::build(&paths, &config, selection)?;
    if engines.is_empty() {
        return Err(eyre!("Both account and history sync are disabled in {}", paths.config_file().display()));
    }

    info!(
        operation = "daemon_start",
        interval_minutes = schedule.interval_minutes,
        run_on_startup = schedule.run_on_startup,
        account_sync = selection.account,
        history_sync = selection.history,
        "Starting daemon"
    );
    output.info(format!(
        "Daemon running, syncing every {} minute(s). Press Ctrl+C to stop.",
        schedule.interval_minutes
    ));

    let scheduler = Scheduler::new(engines.account, engines.history, &schedule);
    let passes = scheduler
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(operation = "daemon_signal", error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!(operation = "daemon_stop", passes = passes, "Daemon stopped");
    output.success(format!("Daemon stopped after {} sync pass(es)", passes));
    Ok(())
}
