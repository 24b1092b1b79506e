//! Local persistent store for CareLink

mod cache_repository;
mod connection;
mod meta_repository;
mod migrations;
mod queue_repository;

pub use cache_repository::{EntityCacheRepository, LibSqlEntityCacheRepository};
pub use connection::Database;
pub use meta_repository::{LibSqlSyncMetaRepository, SyncMetaRepository};
pub use queue_repository::{LibSqlSyncQueueRepository, SyncQueueRepository};
