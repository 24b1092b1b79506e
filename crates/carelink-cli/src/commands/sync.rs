use carelink_core::sync::{
    Subscription, SyncEvent, SyncEventBus, SyncEventKind, SyncScheduler, SyncSummary,
};

use crate::commands::common::CliEnv;
use crate::error::CliError;

pub async fn run_sync(watch: bool, as_json: bool, env: &CliEnv) -> Result<(), CliError> {
    let config = env.load_config()?;
    let context = env.open_sync_context(&config).await?;
    let subscriptions = subscribe_reporter(context.events(), as_json);

    if watch {
        let scheduler = SyncScheduler::new(context.clone(), config.sync_interval());
        scheduler.start().await;
        tracing::info!("Watching for changes; press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
        scheduler.stop().await;
    } else {
        let summary = context.spawn_sync().wait().await?;
        if !as_json {
            println!("{}", format_summary(summary));
        }
    }

    for subscription in &subscriptions {
        subscription.unsubscribe();
    }
    Ok(())
}

fn subscribe_reporter(events: &SyncEventBus, as_json: bool) -> Vec<Subscription> {
    SyncEventKind::ALL
        .into_iter()
        .map(|kind| {
            events.on(kind, move |event| {
                if as_json {
                    match serde_json::to_string(event) {
                        Ok(line) => println!("{line}"),
                        Err(error) => tracing::warn!("Could not encode {} event: {}", kind, error),
                    }
                } else if let Some(line) = format_event(event) {
                    eprintln!("{line}");
                }
            })
        })
        .collect()
}

pub fn format_event(event: &SyncEvent) -> Option<String> {
    match event {
        SyncEvent::SyncStarted { total } => Some(format!("Syncing {total} pending change(s)")),
        SyncEvent::SyncProgress {
            current,
            total,
            success,
            failed,
        } => Some(format!(
            "[{current}/{total}] {success} synced, {failed} failed"
        )),
        SyncEvent::SyncFailed { failed, .. } => Some(format!(
            "{failed} change(s) could not be synced; see `carelink queue list`"
        )),
        SyncEvent::SyncCompleted { .. } | SyncEvent::QueueUpdated { .. } => None,
    }
}

pub fn format_summary(summary: SyncSummary) -> String {
    if summary.success + summary.failed == 0 {
        "Nothing to sync".to_string()
    } else {
        format!(
            "Sync completed: {} synced, {} failed",
            summary.success, summary.failed
        )
    }
}
