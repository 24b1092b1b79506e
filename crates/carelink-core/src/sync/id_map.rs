//! Local id to server id mapping.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// In-memory map from client-generated ids to server-assigned ids.
#[derive(Debug, Default)]
pub struct IdMapper {
    entries: RwLock<HashMap<String, String>>,
}

impl IdMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Server id recorded for `local_id`, if its create has synced.
    pub fn server_id_for(&self, local_id: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(local_id)
            .cloned()
    }

    /// Record that `local_id` now lives at `server_id` on the server.
    pub fn map_local_id(&self, local_id: impl Into<String>, server_id: impl Into<String>) {
        let local_id = local_id.into();
        let server_id = server_id.into();
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = entries.get(&local_id) {
            if previous != &server_id {
                tracing::warn!(
                    "Remapping {} from {} to {}",
                    local_id,
                    previous,
                    server_id
                );
            }
        }
        entries.insert(local_id, server_id);
    }

    /// Mapped server id, or `id` unchanged when it has no mapping.
    pub fn resolve(&self, id: &str) -> String {
        self.server_id_for(id).unwrap_or_else(|| id.to_string())
    }

    /// Seed mappings recovered from persisted state.
    pub fn extend(&self, mappings: impl IntoIterator<Item = (String, String)>) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.extend(mappings);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmapped_ids_resolve_to_themselves() {
        let mapper = IdMapper::new();
        assert_eq!(mapper.server_id_for("local-1"), None);
        assert_eq!(mapper.resolve("local-1"), "local-1");
        assert_eq!(mapper.resolve("srv-2"), "srv-2");
    }

    #[test]
    fn remapping_overwrites_previous_value() {
        let mapper = IdMapper::new();
        mapper.map_local_id("local-1", "srv-1");
        mapper.map_local_id("local-1", "srv-1");
        assert_eq!(mapper.len(), 1);

        mapper.map_local_id("local-1", "srv-9");
        assert_eq!(mapper.resolve("local-1"), "srv-9");
    }

    #[test]
    fn extend_seeds_mappings() {
        let mapper = IdMapper::new();
        assert!(mapper.is_empty());
        mapper.extend([("local-a".to_string(), "srv-a".to_string())]);
        assert_eq!(mapper.server_id_for("local-a").as_deref(), Some("srv-a"));
    }
}
