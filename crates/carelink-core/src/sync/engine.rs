//! Queue draining against the remote database.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::events::{SyncEvent, SyncEventBus, SyncSummary};
use super::id_map::IdMapper;
use super::remote::{RemoteDatabase, RetryClass};
use crate::models::{CachedEntity, QueuedOperation, SyncOperation, SyncQueueItem};
use crate::services::LocalStore;
use crate::util::unix_millis_now;
use crate::Result;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Attempts before an item stops being retried automatically
    pub max_retries: u32,
    /// Pause after each failed attempt within a pass
    pub retry_delay: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Synced,
    /// Already at the retry ceiling; not sent.
    Skipped,
    /// Could not be turned into a remote call.
    Rejected,
    Failed,
}

/// Drains the pending queue one item at a time.
#[derive(Clone)]
pub struct SyncEngine {
    store: LocalStore,
    remote: Arc<dyn RemoteDatabase>,
    ids: Arc<IdMapper>,
    events: SyncEventBus,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(
        store: LocalStore,
        remote: Arc<dyn RemoteDatabase>,
        ids: Arc<IdMapper>,
        events: SyncEventBus,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            remote,
            ids,
            events,
            settings,
        }
    }

    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Run one pass over everything pending at the time of the call.
    ///
    /// Remote failures are recorded on the item and counted; only storage
    /// failures end the pass early with an error.
    pub async fn process_sync(&self) -> Result<SyncSummary> {
        let items = self.store.get_all_pending_sync_items().await?;
        if items.is_empty() {
            tracing::debug!("Sync queue empty; nothing to do");
            return Ok(SyncSummary::default());
        }

        let total = items.len();
        tracing::info!("Sync pass started with {} pending item(s)", total);
        self.events.emit(&SyncEvent::SyncStarted { total });

        let mut summary = SyncSummary::default();
        for (index, mut item) in items.into_iter().enumerate() {
            match self.process_item(&mut item).await? {
                ItemOutcome::Synced => summary.success += 1,
                ItemOutcome::Skipped | ItemOutcome::Rejected => summary.failed += 1,
                ItemOutcome::Failed => {
                    summary.failed += 1;
                    if !self.settings.retry_delay.is_zero() {
                        tokio::time::sleep(self.settings.retry_delay).await;
                    }
                }
            }

            self.events.emit(&SyncEvent::SyncProgress {
                current: index + 1,
                total,
                success: summary.success,
                failed: summary.failed,
            });
        }

        self.store.set_last_sync_time(unix_millis_now()).await?;
        let count = self.store.get_sync_queue_count().await?;
        self.events.emit(&SyncEvent::QueueUpdated { count });
        self.events.emit(&SyncEvent::finished(summary));

        tracing::info!(
            "Sync pass finished: {} synced, {} failed, {} still queued",
            summary.success,
            summary.failed,
            count
        );
        Ok(summary)
    }

    async fn process_item(&self, item: &mut SyncQueueItem) -> Result<ItemOutcome> {
        if !item.is_retry_eligible(self.settings.max_retries) {
            tracing::debug!(
                "Skipping {} after {} failed attempts",
                item.id,
                item.retry_count
            );
            return Ok(ItemOutcome::Skipped);
        }

        let operation = match &item.operation {
            QueuedOperation::Known(operation) => operation.clone(),
            QueuedOperation::Unsupported { operation, .. } => {
                tracing::warn!("Dropping {} with unsupported operation {}", item.id, operation);
                self.store.remove_sync_queue_item(&item.id).await?;
                return Ok(ItemOutcome::Synced);
            }
            QueuedOperation::Malformed {
                operation, error, ..
            } => {
                let message = format!("Malformed {operation} payload: {error}");
                return self.reject(item, message).await;
            }
        };

        let resolved = operation.with_resolved_references(|id| self.ids.resolve(id));
        let mutation = match resolved.to_remote_mutation() {
            Ok(mutation) => mutation,
            Err(error) => return self.reject(item, error.to_string()).await,
        };

        match self.remote.apply(&mutation).await {
            Ok(row) => {
                self.record_success(&operation, &resolved, row).await?;
                self.store.remove_sync_queue_item(&item.id).await?;
                tracing::debug!("Synced {} ({})", item.id, operation.kind());
                Ok(ItemOutcome::Synced)
            }
            Err(error) => {
                let message = error.to_string();
                match error.retry_class() {
                    RetryClass::Permanent => {
                        tracing::warn!("{} rejected by server: {}", item.id, message);
                        item.record_permanent_failure(message, self.settings.max_retries);
                    }
                    RetryClass::ReauthRequired => {
                        tracing::warn!("{} needs a fresh session: {}", item.id, message);
                        item.record_failure(message);
                    }
                    RetryClass::Retryable => {
                        tracing::warn!("{} failed, will retry: {}", item.id, message);
                        item.record_failure(message);
                    }
                }
                self.store.update_sync_queue_item(item).await?;
                Ok(ItemOutcome::Failed)
            }
        }
    }

    async fn reject(&self, item: &mut SyncQueueItem, message: String) -> Result<ItemOutcome> {
        tracing::error!("{} cannot be synced: {}", item.id, message);
        item.record_permanent_failure(message, self.settings.max_retries);
        self.store.update_sync_queue_item(item).await?;
        Ok(ItemOutcome::Rejected)
    }

    /// Bring the id map and the entity cache in line with the server.
    async fn record_success(
        &self,
        original: &SyncOperation,
        resolved: &SyncOperation,
        row: Option<Value>,
    ) -> Result<()> {
        let table = resolved.table();
        let target_id = resolved.local_id();

        if let SyncOperation::DeletePatient(_) = resolved {
            self.store.evict_cached_entity(table, target_id).await?;
            return Ok(());
        }
        let Some(row) = row else {
            return Ok(());
        };

        if original.is_create() {
            let local_id = original.local_id();
            let Some(server_id) = row_id(&row) else {
                tracing::warn!("Server row for {} has no id; mapping skipped", local_id);
                return Ok(());
            };
            self.ids.map_local_id(local_id, server_id.clone());
            let entity = CachedEntity {
                table: table.to_string(),
                id: server_id,
                local_id: Some(local_id.to_string()),
                data: row,
                updated_at: unix_millis_now(),
            };
            self.store.remap_cached_entity(local_id, &entity).await?;
            return Ok(());
        }

        let local_id = self
            .store
            .get_cached_entity(table, target_id)
            .await?
            .and_then(|cached| cached.local_id);
        let entity = CachedEntity {
            table: table.to_string(),
            id: target_id.to_string(),
            local_id,
            data: row,
            updated_at: unix_millis_now(),
        };
        self.store.cache_entity(&entity).await
    }
}

fn row_id(row: &Value) -> Option<String> {
    match row.get("id")? {
        Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
