//! Pending mutation awaiting transmission to the remote database.

use serde::Serialize;
use uuid::Uuid;

use super::operation::{QueuedOperation, SyncOperation};

/// Prefix of queue entry ids, which are distinct from entity ids.
pub const QUEUE_ID_PREFIX: &str = "sq-";

/// A queued mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncQueueItem {
    /// Queue entry identifier
    pub id: String,
    /// Operation and its payload
    pub operation: QueuedOperation,
    /// Target remote collection
    pub table: String,
    /// Client-side identifier referenced by the operation
    pub local_id: Option<String>,
    /// Enqueue timestamp (Unix ms)
    pub created_at: i64,
    /// Failed sync attempts so far
    pub retry_count: u32,
    /// Most recent failure message
    pub last_error: Option<String>,
    /// Actor who initiated the operation
    pub user_id: Option<String>,
}

impl SyncQueueItem {
    /// Build a fresh queue entry for `operation`, stamped with the current time.
    #[must_use]
    pub fn new(operation: SyncOperation, user_id: Option<String>) -> Self {
        let table = operation.table().to_string();
        let local_id = Some(operation.local_id().to_string());
        Self {
            id: format!("{QUEUE_ID_PREFIX}{}", Uuid::now_v7()),
            operation: QueuedOperation::Known(operation),
            table,
            local_id,
            created_at: chrono::Utc::now().timestamp_millis(),
            retry_count: 0,
            last_error: None,
            user_id,
        }
    }

    /// Whether automatic processing should still attempt this item.
    pub const fn is_retry_eligible(&self, max_retries: u32) -> bool {
        self.retry_count < max_retries
    }

    /// Record a failed attempt.
    pub fn record_failure(&mut self, message: impl Into<String>) {
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(message.into());
    }

    /// Record a failure that retrying cannot fix; the item goes inert.
    pub fn record_permanent_failure(&mut self, message: impl Into<String>, max_retries: u32) {
        self.retry_count = self.retry_count.max(max_retries);
        self.last_error = Some(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityRef, PATIENTS_TABLE};

    fn delete_item() -> SyncQueueItem {
        SyncQueueItem::new(
            SyncOperation::DeletePatient(EntityRef {
                id: "srv-1".to_string(),
            }),
            Some("user-1".to_string()),
        )
    }

    #[test]
    fn new_item_starts_clean() {
        let item = delete_item();
        assert!(item.id.starts_with(QUEUE_ID_PREFIX));
        assert_eq!(item.table, PATIENTS_TABLE);
        assert_eq!(item.local_id.as_deref(), Some("srv-1"));
        assert_eq!(item.retry_count, 0);
        assert_eq!(item.last_error, None);
    }

    #[test]
    fn failures_count_towards_ceiling() {
        let mut item = delete_item();
        for _ in 0..3 {
            assert!(item.is_retry_eligible(3));
            item.record_failure("timeout");
        }
        assert_eq!(item.retry_count, 3);
        assert!(!item.is_retry_eligible(3));
        assert_eq!(item.last_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn permanent_failure_goes_inert_immediately() {
        let mut item = delete_item();
        item.record_permanent_failure("violates check constraint", 3);
        assert_eq!(item.retry_count, 3);
        assert!(!item.is_retry_eligible(3));
    }
}
