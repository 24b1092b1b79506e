//! Shared sync state: the queue, the id map, and the event bus.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use super::engine::{SyncEngine, SyncSettings};
use super::events::{SyncEvent, SyncEventBus, SyncSummary};
use super::id_map::IdMapper;
use super::remote::RemoteDatabase;
use crate::models::{CachedEntity, RemoteMutation, SyncOperation, SyncQueueItem};
use crate::services::LocalStore;
use crate::tasks::BackgroundTask;
use crate::util::unix_millis_now;
use crate::Result;

/// Entry point for offline writes and sync passes.
///
/// Cloning is cheap; clones share the store, id map, event bus, and the
/// pass lock, so at most one pass runs at a time across all of them.
#[derive(Clone)]
pub struct SyncContext {
    store: LocalStore,
    ids: Arc<IdMapper>,
    events: SyncEventBus,
    engine: SyncEngine,
    pass_lock: Arc<Mutex<()>>,
}

impl SyncContext {
    pub fn new(store: LocalStore, remote: Arc<dyn RemoteDatabase>, settings: SyncSettings) -> Self {
        let ids = Arc::new(IdMapper::new());
        let events = SyncEventBus::new();
        let engine = SyncEngine::new(
            store.clone(),
            remote,
            Arc::clone(&ids),
            events.clone(),
            settings,
        );
        Self {
            store,
            ids,
            events,
            engine,
            pass_lock: Arc::new(Mutex::new(())),
        }
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub const fn events(&self) -> &SyncEventBus {
        &self.events
    }

    pub fn id_mapper(&self) -> &IdMapper {
        &self.ids
    }

    pub const fn settings(&self) -> &SyncSettings {
        self.engine.settings()
    }

    /// Restore local-to-server mappings from cached snapshots of synced creates.
    pub async fn hydrate_id_mappings(&self) -> Result<usize> {
        let mappings = self.store.list_id_mappings().await?;
        let count = mappings.len();
        self.ids.extend(mappings);
        tracing::debug!("Restored {} id mapping(s) from cache", count);
        Ok(count)
    }

    /// Record an offline write: queue it durably, then reflect it in the cache.
    ///
    /// Returns `Ok` once the queue row is written; a later cache refresh
    /// failure is logged so callers never re-enqueue a stored write.
    pub async fn enqueue(
        &self,
        operation: SyncOperation,
        user_id: Option<String>,
    ) -> Result<SyncQueueItem> {
        let mutation = operation.to_remote_mutation()?;
        let item = SyncQueueItem::new(operation.clone(), user_id);
        self.store.add_to_sync_queue(&item).await?;

        if let Err(error) = self.apply_locally(&operation, mutation).await {
            tracing::warn!("Queued {} but cache refresh failed: {}", item.id, error);
        }
        match self.store.get_sync_queue_count().await {
            Ok(count) => self.events.emit(&SyncEvent::QueueUpdated { count }),
            Err(error) => tracing::warn!("Could not count sync queue: {}", error),
        }
        Ok(item)
    }

    /// Run one pass, waiting for any pass already in flight to finish first.
    pub async fn process_sync(&self) -> Result<SyncSummary> {
        let _pass = self.pass_lock.lock().await;
        self.engine.process_sync().await
    }

    /// Run a pass on the runtime and hand back a handle to observe it.
    pub fn spawn_sync(&self) -> BackgroundTask<SyncSummary> {
        let context = self.clone();
        BackgroundTask::spawn("sync pass", async move { context.process_sync().await })
    }

    async fn apply_locally(
        &self,
        operation: &SyncOperation,
        mutation: RemoteMutation,
    ) -> Result<()> {
        match mutation {
            RemoteMutation::Insert { table, mut row } => {
                let local_id = operation.local_id().to_string();
                if let Value::Object(fields) = &mut row {
                    fields.insert("id".to_string(), Value::String(local_id.clone()));
                }
                self.store
                    .cache_entity(&CachedEntity {
                        table: table.to_string(),
                        id: local_id.clone(),
                        local_id: Some(local_id),
                        data: row,
                        updated_at: unix_millis_now(),
                    })
                    .await
            }
            RemoteMutation::Update { table, id, changes } => {
                let id = self.ids.resolve(&id);
                let Some(mut cached) = self.store.get_cached_entity(table, &id).await? else {
                    return Ok(());
                };
                if let (Value::Object(fields), Value::Object(changes)) = (&mut cached.data, changes)
                {
                    fields.extend(changes);
                }
                cached.updated_at = unix_millis_now();
                self.store.cache_entity(&cached).await
            }
            RemoteMutation::Delete { table, id } => {
                let id = self.ids.resolve(&id);
                self.store.evict_cached_entity(table, &id).await?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AppointmentCancellation, EntityRef, NewAppointment, NewPatient, APPOINTMENTS_TABLE,
        PATIENTS_TABLE,
    };
    use crate::sync::engine::tests::FakeRemote;
    use crate::sync::events::SyncEventKind;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    async fn context(remote: Arc<FakeRemote>) -> SyncContext {
        let store = LocalStore::open_in_memory().await.unwrap();
        SyncContext::new(
            store,
            remote,
            SyncSettings {
                max_retries: 3,
                retry_delay: Duration::ZERO,
            },
        )
    }

    fn patient(local_id: &str) -> SyncOperation {
        SyncOperation::CreatePatient(NewPatient {
            local_id: local_id.to_string(),
            full_name: "Farah Khan".to_string(),
            email: None,
            phone: Some("555-0101".to_string()),
            date_of_birth: None,
            gender: None,
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enqueue_updates_cache_and_notifies() {
        let context = context(Arc::new(FakeRemote::default())).await;
        let counts = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = Arc::clone(&counts);
        context
            .events()
            .on(SyncEventKind::QueueUpdated, move |event| {
                if let SyncEvent::QueueUpdated { count } = event {
                    seen.lock().unwrap().push(*count);
                }
            });

        let local_id = LocalStore::generate_local_id();
        context.enqueue(patient(&local_id), None).await.unwrap();
        let cached = context
            .store()
            .get_cached_patient(&local_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.full_name, "Farah Khan");

        context
            .enqueue(
                SyncOperation::DeletePatient(EntityRef {
                    id: local_id.clone(),
                }),
                None,
            )
            .await
            .unwrap();
        assert!(context
            .store()
            .get_cached_patient(&local_id)
            .await
            .unwrap()
            .is_none());
        assert_eq!(*counts.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancellation_marks_cached_appointment() {
        let context = context(Arc::new(FakeRemote::default())).await;
        context
            .enqueue(
                SyncOperation::CreateAppointment(NewAppointment {
                    local_id: "local-appt".to_string(),
                    patient_id: "srv-p".to_string(),
                    doctor_id: "doc-2".to_string(),
                    scheduled_at: chrono::Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap(),
                    duration_minutes: None,
                    reason: None,
                    consultation_type: None,
                }),
                None,
            )
            .await
            .unwrap();
        context
            .enqueue(
                SyncOperation::CancelAppointment(AppointmentCancellation {
                    id: "local-appt".to_string(),
                    reason: None,
                }),
                None,
            )
            .await
            .unwrap();

        let cached = context
            .store()
            .get_cached_entity(APPOINTMENTS_TABLE, "local-appt")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.data["status"], "cancelled");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cache_failure_after_queue_write_still_returns_item() {
        let context = context(Arc::new(FakeRemote::default())).await;
        context
            .store()
            .execute_raw("DROP TABLE entity_cache")
            .await
            .unwrap();

        let item = context.enqueue(patient("local-q"), None).await.unwrap();
        let pending = context.store().get_all_pending_sync_items().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, item.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_passes_never_send_an_item_twice() {
        let remote = Arc::new(FakeRemote::default());
        let context = context(Arc::clone(&remote)).await;
        for index in 0..5 {
            context
                .enqueue(patient(&format!("local-{index}")), None)
                .await
                .unwrap();
        }

        let (first, second) = tokio::join!(context.process_sync(), context.process_sync());
        let first = first.unwrap();
        let second = second.unwrap();

        assert_eq!(first.success + second.success, 5);
        assert_eq!(remote.calls().len(), 5);
        assert_eq!(context.store().get_sync_queue_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mappings_survive_restart_through_cache() {
        let remote = Arc::new(FakeRemote::default());
        let first = context(Arc::clone(&remote)).await;
        first.enqueue(patient("local-p"), None).await.unwrap();
        first.process_sync().await.unwrap();

        let restarted = SyncContext::new(
            first.store().clone(),
            remote,
            SyncSettings::default(),
        );
        assert_eq!(restarted.id_mapper().server_id_for("local-p"), None);
        assert_eq!(restarted.hydrate_id_mappings().await.unwrap(), 1);
        assert_eq!(
            restarted.id_mapper().server_id_for("local-p").as_deref(),
            Some("srv-1")
        );
        assert!(first
            .store()
            .get_cached_entity(PATIENTS_TABLE, "srv-1")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn spawned_pass_reports_summary() {
        let context = context(Arc::new(FakeRemote::default())).await;
        context.enqueue(patient("local-x"), None).await.unwrap();

        let summary = context.spawn_sync().wait().await.unwrap();
        assert_eq!(
            summary,
            SyncSummary {
                success: 1,
                failed: 0
            }
        );
    }
}
