use carelink_core::util::unix_millis_now;
use carelink_core::SyncQueueItem;

use crate::cli::QueueCommands;
use crate::commands::common::{format_relative_time, print_json, require_text, truncate, CliEnv};
use crate::error::CliError;

pub async fn run_queue(command: QueueCommands, env: &CliEnv) -> Result<(), CliError> {
    let config = env.load_config()?;
    let max_retries = config.sync.max_retries;
    let store = env.open_store().await?;

    match command {
        QueueCommands::List { json } => {
            let items = store.get_all_pending_sync_items().await?;
            if json {
                print_json(&items)?;
            } else if items.is_empty() {
                println!("Sync queue is empty.");
            } else {
                for line in format_queue_lines(&items, max_retries, unix_millis_now()) {
                    println!("{line}");
                }
            }
        }
        QueueCommands::Count => {
            println!("{}", store.get_sync_queue_count().await?);
        }
        QueueCommands::Retry { id, all } => {
            if all {
                let stalled = store.list_stalled_sync_items(max_retries).await?;
                for item in &stalled {
                    store.reset_sync_queue_item(&item.id).await?;
                }
                println!("Reset {} stalled change(s)", stalled.len());
            } else {
                let id = require_text(id.as_deref().unwrap_or_default(), "Queue entry ID")?;
                match store.reset_sync_queue_item(&id).await {
                    Ok(()) => println!("{id}"),
                    Err(carelink_core::Error::NotFound(_)) => {
                        return Err(CliError::QueueItemNotFound(id));
                    }
                    Err(error) => return Err(error.into()),
                }
            }
        }
        QueueCommands::Drop { id } => {
            let id = require_text(&id, "Queue entry ID")?;
            if !store.remove_sync_queue_item(&id).await? {
                return Err(CliError::QueueItemNotFound(id));
            }
            tracing::warn!("Dropped queued change {} without syncing it", id);
            println!("{id}");
        }
    }
    Ok(())
}

pub fn format_queue_lines(items: &[SyncQueueItem], max_retries: u32, now_ms: i64) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let status = if item.is_retry_eligible(max_retries) {
                format!("retries {}/{max_retries}", item.retry_count)
            } else {
                "stalled".to_string()
            };
            let mut line = format!(
                "{}  {:<19}  {:<42}  {:<12}  {}",
                item.id,
                item.operation.name(),
                item.local_id.as_deref().unwrap_or("-"),
                status,
                format_relative_time(item.created_at, now_ms)
            );
            if let Some(error) = &item.last_error {
                line.push_str("  ");
                line.push_str(&truncate(error, 60));
            }
            line
        })
        .collect()
}
