use super::{load_config, EngineSelection, Engines};
use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde_json::json;
use watch_sync_config::PathManager;
use watch_sync_core::{PassReport, Scheduler, SyncMode, SyncSummary};

pub async fn run_sync(account: bool, history: bool, output: &Output) -> Result<()> {
    tracing::debug!("Sync command started");
    let paths = PathManager::default();
    let config = load_config(&paths)?;
    let selection = EngineSelection::resolve(account, history, &config);

    let engines = Engines::build(&paths, &config, selection)?;
    if engines.is_empty() {
        output.warn("Nothing to sync: account and history sync are both disabled");
        return Ok(());
    }

    let scheduler = Scheduler::new(
        engines.account,
        engines.history,
        &config.scheduler.clone().unwrap_or_else(watch_sync_config::default_scheduler_config),
    );
    let report = scheduler.run_once().await;
    print_report(&report, output);

    match report.failed() {
        0 => Ok(()),
        failed => Err(eyre!("{} link(s) failed to sync", failed)),
    }
}

fn print_report(report: &PassReport, output: &Output) {
    output.json(&json!({
        "type": "sync_result",
        "account": report.account,
        "history": report.history,
        "duration_ms": report.duration_ms,
    }));
    if !output.is_human() {
        return;
    }

    let sections = [("Account", &report.account), ("History", &report.history)];
    for (title, summary) in sections {
        let Some(summary) = summary else { continue };
        output.info(format!(
            "{} sync: {} processed, {} failed, {} skipped",
            title, summary.processed, summary.failed, summary.skipped
        ));
        if !summary.reports.is_empty() {
            output.table(&["Link", "Mode", "Staged", "Committed", "Errors"], summary_rows(summary));
        }
        for error in &summary.errors {
            output.error(error);
        }
    }

    if report.failed() == 0 {
        output.success(format!("Sync completed in {} ms", report.duration_ms));
    }
}

fn summary_rows(summary: &SyncSummary) -> Vec<Vec<String>> {
    summary
        .reports
        .iter()
        .map(|r| {
            let errors: Vec<String> = r
                .directions
                .iter()
                .filter_map(|d| d.error.as_ref().map(|e| format!("{}: {}", d.name, e)))
                .collect();
            vec![
                r.link.clone(),
                match r.mode {
                    SyncMode::Full => "full".to_string(),
                    SyncMode::Incremental => "incremental".to_string(),
                },
                r.staged().to_string(),
                if r.committed { "yes" } else { "no" }.to_string(),
                errors.join("; "),
            ]
        })
        .collect()
}
