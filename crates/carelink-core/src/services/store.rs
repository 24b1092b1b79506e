//! Local persistent store shared by the sync engine and clients.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::{
    Database, EntityCacheRepository, LibSqlEntityCacheRepository, LibSqlSyncMetaRepository,
    LibSqlSyncQueueRepository, SyncMetaRepository, SyncQueueRepository,
};
use crate::models::{CachedEntity, Patient, SyncQueueItem, LOCAL_ID_PREFIX, PATIENTS_TABLE};
use crate::Result;

/// Thread-safe handle to the local queue and entity cache.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open the store at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::debug!("Opening local store at {}", db_path.display());
        let db = Database::open(&db_path).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem location, when backed by a file.
    pub fn path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    /// Generate a client-side entity id.
    ///
    /// The `local-` prefix keeps it disjoint from server UUIDs; UUID v7 keeps
    /// it unique and time-ordered within the store.
    pub fn generate_local_id() -> String {
        format!("{LOCAL_ID_PREFIX}{}", Uuid::now_v7())
    }

    /// Append a pending mutation. Durable once this returns.
    pub async fn add_to_sync_queue(&self, item: &SyncQueueItem) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.enqueue(item).await?;
        tracing::debug!(
            "Queued {} {} (local id {:?})",
            item.operation.name(),
            item.id,
            item.local_id
        );
        Ok(())
    }

    /// All pending mutations in enqueue order.
    pub async fn get_all_pending_sync_items(&self) -> Result<Vec<SyncQueueItem>> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.list_pending().await
    }

    /// Fetch one pending mutation.
    pub async fn get_sync_queue_item(&self, id: &str) -> Result<Option<SyncQueueItem>> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.get(id).await
    }

    /// Persist retry bookkeeping for a pending mutation.
    pub async fn update_sync_queue_item(&self, item: &SyncQueueItem) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.update(item).await
    }

    /// Delete a pending mutation; returns whether it existed.
    pub async fn remove_sync_queue_item(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.remove(id).await
    }

    /// Make a stalled mutation eligible for automatic retry again.
    pub async fn reset_sync_queue_item(&self, id: &str) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.reset(id).await?;
        tracing::info!("Reset retry count for queue item {}", id);
        Ok(())
    }

    /// Mutations that reached the retry ceiling.
    pub async fn list_stalled_sync_items(&self, max_retries: u32) -> Result<Vec<SyncQueueItem>> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.list_stalled(max_retries).await
    }

    /// Number of pending mutations.
    pub async fn get_sync_queue_count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());
        repo.count().await
    }

    /// Store a patient snapshot under its current id.
    pub async fn cache_patient(&self, patient: &Patient) -> Result<()> {
        let local_id = crate::models::is_local_id(&patient.id).then(|| patient.id.clone());
        let entity = CachedEntity {
            table: PATIENTS_TABLE.to_string(),
            id: patient.id.clone(),
            local_id,
            data: serde_json::to_value(patient)?,
            updated_at: chrono::Utc::now().timestamp_millis(),
        };
        self.cache_entity(&entity).await
    }

    /// Read a patient snapshot by its current id.
    pub async fn get_cached_patient(&self, id: &str) -> Result<Option<Patient>> {
        self.get_cached_entity(PATIENTS_TABLE, id)
            .await?
            .map(|entity| serde_json::from_value(entity.data).map_err(Into::into))
            .transpose()
    }

    /// All cached patient snapshots.
    pub async fn list_cached_patients(&self) -> Result<Vec<Patient>> {
        let db = self.db.lock().await;
        let repo = LibSqlEntityCacheRepository::new(db.connection());
        repo.list(PATIENTS_TABLE)
            .await?
            .into_iter()
            .map(|entity| serde_json::from_value(entity.data).map_err(Into::into))
            .collect()
    }

    /// Insert or replace any entity snapshot.
    pub async fn cache_entity(&self, entity: &CachedEntity) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlEntityCacheRepository::new(db.connection());
        repo.upsert(entity).await
    }

    /// Read any entity snapshot.
    pub async fn get_cached_entity(&self, table: &str, id: &str) -> Result<Option<CachedEntity>> {
        let db = self.db.lock().await;
        let repo = LibSqlEntityCacheRepository::new(db.connection());
        repo.get(table, id).await
    }

    /// Move a snapshot from its local id to its server id.
    pub async fn remap_cached_entity(&self, old_id: &str, entity: &CachedEntity) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlEntityCacheRepository::new(db.connection());
        repo.replace(old_id, entity).await
    }

    /// Drop a snapshot; returns whether it existed.
    pub async fn evict_cached_entity(&self, table: &str, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlEntityCacheRepository::new(db.connection());
        repo.remove(table, id).await
    }

    /// `(local_id, server_id)` pairs recoverable from cached snapshots.
    pub async fn list_id_mappings(&self) -> Result<Vec<(String, String)>> {
        let db = self.db.lock().await;
        let repo = LibSqlEntityCacheRepository::new(db.connection());
        repo.id_mappings().await
    }

    /// Record the most recent sync pass.
    pub async fn set_last_sync_time(&self, timestamp: i64) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncMetaRepository::new(db.connection());
        repo.set_last_sync_time(timestamp).await
    }

    /// Most recent sync pass, if any.
    pub async fn get_last_sync_time(&self) -> Result<Option<i64>> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncMetaRepository::new(db.connection());
        repo.last_sync_time().await
    }
}

#[cfg(test)]
impl LocalStore {
    pub(crate) async fn execute_raw(&self, sql: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.connection().execute(sql, ()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityRef, NewPatient, SyncOperation};
    use tempfile::tempdir;

    fn delete(id: &str) -> SyncQueueItem {
        SyncQueueItem::new(
            SyncOperation::DeletePatient(EntityRef { id: id.to_string() }),
            None,
        )
    }

    #[test]
    fn generated_local_ids_are_prefixed_and_unique() {
        let first = LocalStore::generate_local_id();
        let second = LocalStore::generate_local_id();
        assert!(first.starts_with(LOCAL_ID_PREFIX));
        assert_ne!(first, second);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fifo_order_survives_interleaved_removals() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let items = ["a", "b", "c", "d"].map(delete);
        for item in &items {
            store.add_to_sync_queue(item).await.unwrap();
        }

        // "b" succeeds, "c" fails and stays queued.
        store.remove_sync_queue_item(&items[1].id).await.unwrap();
        let mut failed = items[2].clone();
        failed.record_failure("timeout");
        store.update_sync_queue_item(&failed).await.unwrap();
        let late = delete("e");
        store.add_to_sync_queue(&late).await.unwrap();

        let ids = store
            .get_all_pending_sync_items()
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec![
                items[0].id.clone(),
                items[2].id.clone(),
                items[3].id.clone(),
                late.id
            ]
        );
        assert_eq!(store.get_sync_queue_count().await.unwrap(), 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queued_items_survive_reopen() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("carelink.db");

        let item = delete("srv-1");
        {
            let store = LocalStore::open_path(&db_path).await.unwrap();
            store.add_to_sync_queue(&item).await.unwrap();
        }

        let reopened = LocalStore::open_path(&db_path).await.unwrap();
        let pending = reopened.get_all_pending_sync_items().await.unwrap();
        assert_eq!(pending, vec![item]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn patient_cache_round_trip() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let patient = Patient::from_new(&NewPatient {
            local_id: LocalStore::generate_local_id(),
            full_name: "Kavya Iyer".to_string(),
            email: Some("kavya@example.com".to_string()),
            phone: None,
            date_of_birth: None,
            gender: None,
        });

        store.cache_patient(&patient).await.unwrap();
        let cached = store.get_cached_patient(&patient.id).await.unwrap();
        assert_eq!(cached, Some(patient.clone()));

        let entity = store
            .get_cached_entity(PATIENTS_TABLE, &patient.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entity.local_id.as_deref(), Some(patient.id.as_str()));
        assert_eq!(store.list_cached_patients().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn last_sync_time_is_recorded() {
        let store = LocalStore::open_in_memory().await.unwrap();
        assert_eq!(store.get_last_sync_time().await.unwrap(), None);
        store.set_last_sync_time(42).await.unwrap();
        assert_eq!(store.get_last_sync_time().await.unwrap(), Some(42));
    }
}
