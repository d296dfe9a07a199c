use std::time::Duration;

use anyhow::{Context, Result};
use clap::ArgMatches;
use tandem_core::Coordinator;

use super::{emit, resolve_agent, resolve_project, string, strings};

pub async fn handle(coordinator: &Coordinator, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("acquire", sub_m)) => {
            let agent = resolve_agent(coordinator, sub_m)?;
            let project = resolve_project(coordinator, sub_m)?;
            let reason = sub_m
                .get_one::<String>("reason")
                .context("Reason is required")?;
            let acquired = coordinator.acquire_locks(
                &agent,
                &project,
                &strings(sub_m, "files"),
                reason,
                sub_m.get_one::<i64>("minutes").copied(),
            )?;
            emit(&acquired)
        }
        Some(("release", sub_m)) => {
            let agent = resolve_agent(coordinator, sub_m)?;
            let project = resolve_project(coordinator, sub_m)?;
            let files = strings(sub_m, "files");
            let released = if sub_m.get_flag("force") {
                let reason = string(sub_m, "reason").unwrap_or_default();
                coordinator.force_release_locks(&project, &files, &agent, &reason)?
            } else {
                coordinator.release_locks(&agent, &project, &files)?
            };
            emit(&released)
        }
        Some(("list", sub_m)) => {
            let project = resolve_project(coordinator, sub_m)?;
            match sub_m.get_one::<String>("file") {
                Some(file) => emit(&coordinator.lock_status(&project, file)?),
                None => emit(&coordinator.query_locks(&project)?),
            }
        }
        Some(("sweep", sub_m)) => {
            if sub_m.get_flag("watch") {
                watch(coordinator).await
            } else {
                emit(&coordinator.sweep_all()?)
            }
        }
        _ => anyhow::bail!("Unknown lock subcommand. Run 'tandem lock --help' for usage."),
    }
}

/// Sweep every project on the configured interval until Ctrl-C, printing one
/// JSON line per project that had locks reclaimed.
async fn watch(coordinator: &Coordinator) -> Result<()> {
    let period = Duration::from_secs(coordinator.config().locks.sweep_interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tracing::info!(interval_secs = period.as_secs(), "Watching for stale locks");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match coordinator.sweep_all() {
                    Ok(reports) => {
                        for report in reports {
                            let line = serde_json::to_string(&report)
                                .context("Failed to serialize sweep report")?;
                            println!("{line}");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Sweep failed, retrying next tick"),
                }
            }
            signal = &mut shutdown => {
                signal.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Stopped watching");
                return Ok(());
            }
        }
    }
}
