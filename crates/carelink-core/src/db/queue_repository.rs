//! Sync queue repository implementation

use crate::error::{Error, Result};
use crate::models::{QueuedOperation, SyncQueueItem};
use libsql::params::IntoParams;
use libsql::{params, Connection, Row};

const QUEUE_COLUMNS: &str =
    "id, operation, table_name, data, local_id, created_at, retry_count, last_error, user_id";

/// Trait for pending-mutation storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SyncQueueRepository {
    /// Append an item to the end of the queue
    async fn enqueue(&self, item: &SyncQueueItem) -> Result<()>;

    /// All queued items, oldest first
    async fn list_pending(&self) -> Result<Vec<SyncQueueItem>>;

    /// Items that automatic processing no longer attempts
    async fn list_stalled(&self, max_retries: u32) -> Result<Vec<SyncQueueItem>>;

    /// Get a queued item by id
    async fn get(&self, id: &str) -> Result<Option<SyncQueueItem>>;

    /// Persist retry bookkeeping for an existing item
    async fn update(&self, item: &SyncQueueItem) -> Result<()>;

    /// Delete an item; returns whether it existed
    async fn remove(&self, id: &str) -> Result<bool>;

    /// Clear retry bookkeeping so automatic processing picks the item up again
    async fn reset(&self, id: &str) -> Result<()>;

    /// Number of queued items
    async fn count(&self) -> Result<usize>;
}

/// libSQL implementation of `SyncQueueRepository`
pub struct LibSqlSyncQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a queue item from a database row
    fn parse_item(row: &Row) -> Result<SyncQueueItem> {
        let operation: String = row.get(1)?;
        let data: String = row.get(3)?;
        let retry_count: i64 = row.get(6)?;

        Ok(SyncQueueItem {
            id: row.get(0)?,
            operation: QueuedOperation::decode(&operation, serde_json::from_str(&data)?),
            table: row.get(2)?,
            local_id: row.get::<Option<String>>(4)?,
            created_at: row.get(5)?,
            retry_count: u32::try_from(retry_count).unwrap_or(0),
            last_error: row.get::<Option<String>>(7)?,
            user_id: row.get::<Option<String>>(8)?,
        })
    }

    async fn collect(&self, sql: &str, args: impl IntoParams) -> Result<Vec<SyncQueueItem>> {
        let mut rows = self.conn.query(sql, args).await?;
        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(Self::parse_item(&row)?);
        }
        Ok(items)
    }
}

impl SyncQueueRepository for LibSqlSyncQueueRepository<'_> {
    async fn enqueue(&self, item: &SyncQueueItem) -> Result<()> {
        let data = serde_json::to_string(&item.operation.data()?)?;

        self.conn
            .execute(
                "INSERT INTO sync_queue (id, operation, table_name, data, local_id, created_at, retry_count, last_error, user_id)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    item.id.clone(),
                    item.operation.name().to_string(),
                    item.table.clone(),
                    data,
                    item.local_id.clone(),
                    item.created_at,
                    i64::from(item.retry_count),
                    item.last_error.clone(),
                    item.user_id.clone()
                ],
            )
            .await?;

        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<SyncQueueItem>> {
        self.collect(
            &format!("SELECT {QUEUE_COLUMNS} FROM sync_queue ORDER BY created_at ASC, seq ASC"),
            (),
        )
        .await
    }

    async fn list_stalled(&self, max_retries: u32) -> Result<Vec<SyncQueueItem>> {
        self.collect(
            &format!(
                "SELECT {QUEUE_COLUMNS} FROM sync_queue
                 WHERE retry_count >= ?
                 ORDER BY created_at ASC, seq ASC"
            ),
            params![i64::from(max_retries)],
        )
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<SyncQueueItem>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE id = ?"),
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_item(&row)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, item: &SyncQueueItem) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE sync_queue SET retry_count = ?, last_error = ? WHERE id = ?",
                params![
                    i64::from(item.retry_count),
                    item.last_error.clone(),
                    item.id.clone()
                ],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(item.id.clone()));
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM sync_queue WHERE id = ?", [id])
            .await?;
        Ok(rows > 0)
    }

    async fn reset(&self, id: &str) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE sync_queue SET retry_count = 0, last_error = NULL WHERE id = ?",
                [id],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM sync_queue", ())
            .await?;

        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{EntityPatch, EntityRef, SyncOperation};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Map};

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn delete(id: &str) -> SyncQueueItem {
        SyncQueueItem::new(
            SyncOperation::DeletePatient(EntityRef { id: id.to_string() }),
            None,
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_and_get() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let mut changes = Map::new();
        changes.insert("phone".to_string(), json!("555-0100"));
        let item = SyncQueueItem::new(
            SyncOperation::UpdatePatient(EntityPatch {
                id: "local-1".to_string(),
                changes,
            }),
            Some("user-9".to_string()),
        );
        repo.enqueue(&item).await.unwrap();

        let fetched = repo.get(&item.id).await.unwrap().unwrap();
        assert_eq!(fetched, item);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_pending_preserves_enqueue_order() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        // Same timestamp on purpose: insertion order must still win.
        let mut items = vec![delete("a"), delete("b"), delete("c")];
        for item in &mut items {
            item.created_at = 1_000;
            repo.enqueue(item).await.unwrap();
        }

        let ids = repo
            .list_pending()
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect::<Vec<_>>();
        assert_eq!(
            ids,
            items.iter().map(|item| item.id.clone()).collect::<Vec<_>>()
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_is_idempotent() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let mut item = delete("srv-1");
        repo.enqueue(&item).await.unwrap();
        item.record_failure("503 Service Unavailable");

        repo.update(&item).await.unwrap();
        repo.update(&item).await.unwrap();

        let fetched = repo.get(&item.id).await.unwrap().unwrap();
        assert_eq!(fetched.retry_count, 1);
        assert_eq!(
            fetched.last_error.as_deref(),
            Some("503 Service Unavailable")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_missing_item_is_not_found() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let err = repo.update(&delete("srv-1")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remove_and_count() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let first = delete("a");
        let second = delete("b");
        repo.enqueue(&first).await.unwrap();
        repo.enqueue(&second).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);

        assert!(repo.remove(&first.id).await.unwrap());
        assert!(!repo.remove(&first.id).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stalled_items_and_reset() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let mut stalled = delete("a");
        stalled.retry_count = 3;
        stalled.last_error = Some("timeout".to_string());
        let healthy = delete("b");
        repo.enqueue(&stalled).await.unwrap();
        repo.enqueue(&healthy).await.unwrap();

        let listed = repo.list_stalled(3).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, stalled.id);

        repo.reset(&stalled.id).await.unwrap();
        let fetched = repo.get(&stalled.id).await.unwrap().unwrap();
        assert_eq!(fetched.retry_count, 0);
        assert_eq!(fetched.last_error, None);
        assert!(repo.list_stalled(3).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_operation_rows_load() {
        let db = setup().await;
        db.connection()
            .execute(
                "INSERT INTO sync_queue (id, operation, table_name, data, created_at)
                 VALUES ('sq-x', 'ARCHIVE_PATIENT', 'patients', '{\"id\":\"srv-1\"}', 5)",
                (),
            )
            .await
            .unwrap();
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let pending = repo.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(matches!(
            pending[0].operation,
            QueuedOperation::Unsupported { .. }
        ));
    }
}
