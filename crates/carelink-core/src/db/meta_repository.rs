//! Sync metadata repository implementation

use crate::error::Result;
use libsql::Connection;

const LAST_SYNC_TIME_KEY: &str = "last_sync_time";

/// Trait for sync metadata operations (async)
#[allow(async_fn_in_trait)]
pub trait SyncMetaRepository {
    /// Record the most recent completed sync pass (Unix ms)
    async fn set_last_sync_time(&self, timestamp: i64) -> Result<()>;

    /// Most recent completed sync pass, if any
    async fn last_sync_time(&self) -> Result<Option<i64>>;
}

/// libSQL implementation of `SyncMetaRepository`
pub struct LibSqlSyncMetaRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncMetaRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SyncMetaRepository for LibSqlSyncMetaRepository<'_> {
    async fn set_last_sync_time(&self, timestamp: i64) -> Result<()> {
        self.set_value(LAST_SYNC_TIME_KEY, &timestamp.to_string())
            .await
    }

    async fn last_sync_time(&self) -> Result<Option<i64>> {
        Ok(self
            .get_value(LAST_SYNC_TIME_KEY)
            .await?
            .and_then(|value| value.parse().ok()))
    }
}

impl LibSqlSyncMetaRepository<'_> {
    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM sync_meta WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_meta (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_last_sync_time_round_trip() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlSyncMetaRepository::new(db.connection());

        assert_eq!(repo.last_sync_time().await.unwrap(), None);
        repo.set_last_sync_time(1_700_000_000_000).await.unwrap();
        repo.set_last_sync_time(1_700_000_000_500).await.unwrap();
        assert_eq!(
            repo.last_sync_time().await.unwrap(),
            Some(1_700_000_000_500)
        );
    }
}
