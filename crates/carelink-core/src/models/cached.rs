//! Cached entity snapshot model

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Local copy of a remote row, keyed by its current known id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEntity {
    /// Remote collection the row belongs to
    pub table: String,
    /// Current known id (local until the create syncs, then the server id)
    pub id: String,
    /// Local id the entity was created under, if it was created on this client
    pub local_id: Option<String>,
    /// Row contents
    pub data: Value,
    /// Last refresh timestamp (Unix ms)
    pub updated_at: i64,
}
