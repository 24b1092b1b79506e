//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Apply a list of statements in one transaction
async fn apply(conn: &Connection, statements: &[&str]) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    Ok(())
}

/// Migration to version 1: sync queue and sync metadata
async fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            // `seq` breaks ties between items enqueued in the same millisecond
            "CREATE TABLE IF NOT EXISTS sync_queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                operation TEXT NOT NULL,
                table_name TEXT NOT NULL,
                data TEXT NOT NULL,
                local_id TEXT,
                created_at INTEGER NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                user_id TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_queue_order ON sync_queue(created_at, seq)",
            "CREATE TABLE IF NOT EXISTS sync_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            "INSERT INTO schema_version (version) VALUES (1)",
        ],
    )
    .await?;

    tracing::info!("Migrated local store to version 1");
    Ok(())
}

/// Migration to version 2: entity snapshot cache
async fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "CREATE TABLE IF NOT EXISTS entity_cache (
                table_name TEXT NOT NULL,
                id TEXT NOT NULL,
                local_id TEXT,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (table_name, id)
            )",
            "CREATE INDEX IF NOT EXISTS idx_entity_cache_local_id ON entity_cache(local_id)",
            "INSERT INTO schema_version (version) VALUES (2)",
        ],
    )
    .await?;

    tracing::info!("Migrated local store to version {CURRENT_VERSION}");
    Ok(())
}
