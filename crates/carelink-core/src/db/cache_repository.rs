//! Entity snapshot cache repository implementation

use crate::error::Result;
use crate::models::CachedEntity;
use libsql::{params, Connection, Row};

/// Trait for cached entity snapshot operations (async)
#[allow(async_fn_in_trait)]
pub trait EntityCacheRepository {
    /// Insert or replace a snapshot
    async fn upsert(&self, entity: &CachedEntity) -> Result<()>;

    /// Get a snapshot by table and current id
    async fn get(&self, table: &str, id: &str) -> Result<Option<CachedEntity>>;

    /// List snapshots of one table, most recently refreshed first
    async fn list(&self, table: &str) -> Result<Vec<CachedEntity>>;

    /// Drop a snapshot; returns whether it existed
    async fn remove(&self, table: &str, id: &str) -> Result<bool>;

    /// Move a snapshot from `old_id` to the entity's (server) id atomically
    async fn replace(&self, old_id: &str, entity: &CachedEntity) -> Result<()>;

    /// `(local_id, server_id)` pairs recorded by synced creates
    async fn id_mappings(&self) -> Result<Vec<(String, String)>>;
}

/// libSQL implementation of `EntityCacheRepository`
pub struct LibSqlEntityCacheRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlEntityCacheRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entity(row: &Row) -> Result<CachedEntity> {
        let data: String = row.get(3)?;
        Ok(CachedEntity {
            table: row.get(0)?,
            id: row.get(1)?,
            local_id: row.get::<Option<String>>(2)?,
            data: serde_json::from_str(&data)?,
            updated_at: row.get(4)?,
        })
    }

    async fn upsert_row(&self, entity: &CachedEntity) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO entity_cache (table_name, id, local_id, data, updated_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    entity.table.clone(),
                    entity.id.clone(),
                    entity.local_id.clone(),
                    serde_json::to_string(&entity.data)?,
                    entity.updated_at
                ],
            )
            .await?;
        Ok(())
    }
}

impl EntityCacheRepository for LibSqlEntityCacheRepository<'_> {
    async fn upsert(&self, entity: &CachedEntity) -> Result<()> {
        self.upsert_row(entity).await
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<CachedEntity>> {
        let mut rows = self
            .conn
            .query(
                "SELECT table_name, id, local_id, data, updated_at
                 FROM entity_cache WHERE table_name = ? AND id = ?",
                [table, id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_entity(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, table: &str) -> Result<Vec<CachedEntity>> {
        let mut rows = self
            .conn
            .query(
                "SELECT table_name, id, local_id, data, updated_at
                 FROM entity_cache WHERE table_name = ?
                 ORDER BY updated_at DESC",
                [table],
            )
            .await?;

        let mut entities = Vec::new();
        while let Some(row) = rows.next().await? {
            entities.push(Self::parse_entity(&row)?);
        }
        Ok(entities)
    }

    async fn remove(&self, table: &str, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM entity_cache WHERE table_name = ? AND id = ?",
                [table, id],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn replace(&self, old_id: &str, entity: &CachedEntity) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        let result = async {
            self.conn
                .execute(
                    "DELETE FROM entity_cache WHERE table_name = ? AND id = ?",
                    [entity.table.as_str(), old_id],
                )
                .await?;
            self.upsert_row(entity).await
        }
        .await;

        if let Err(e) = result {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e);
        }

        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
        Ok(())
    }

    async fn id_mappings(&self) -> Result<Vec<(String, String)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT local_id, id FROM entity_cache
                 WHERE local_id IS NOT NULL AND local_id != id",
                (),
            )
            .await?;

        let mut mappings = Vec::new();
        while let Some(row) = rows.next().await? {
            mappings.push((row.get::<String>(0)?, row.get::<String>(1)?));
        }
        Ok(mappings)
    }
}
