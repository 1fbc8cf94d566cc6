//! The Session Store: one cached handle per `(agent id, conversation id)`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use agora_core::AgentError;
use agora_config::{MemoryKind, MemorySettings};

use crate::backend::DurableStore;
use crate::handle::{SessionBacking, SessionHandle};

/// Special memory location selecting the non-persistent in-process store.
pub const IN_MEMORY_LOCATION: &str = ":memory:";

/// Caches session handles for process lifetime.
///
/// The cache key is the `(agent id, conversation id)` pair, never the
/// conversation id alone, so memory can never leak across agents. Handles are
/// kept until `clear` or process shutdown; there is no automatic eviction.
pub struct SessionStore {
    handles: RwLock<HashMap<(String, String), Arc<SessionHandle>>>,
    /// Durable stores shared by handles pointing at the same location.
    stores: Mutex<HashMap<String, Arc<DurableStore>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached handle for the pair, creating it on first use.
    pub async fn get_or_create(
        &self,
        agent_id: &str,
        conversation_id: &str,
        settings: &MemorySettings,
    ) -> Result<Arc<SessionHandle>, AgentError> {
        let key = (agent_id.to_string(), conversation_id.to_string());

        if let Some(handle) = self.handles.read().await.get(&key) {
            return Ok(Arc::clone(handle));
        }

        let mut handles = self.handles.write().await;
        // Lost the race: someone else created the handle between locks.
        if let Some(handle) = handles.get(&key) {
            return Ok(Arc::clone(handle));
        }

        let backing = self.backing_for(agent_id, settings).await?;
        let handle = Arc::new(SessionHandle::new(agent_id, conversation_id, backing));
        handles.insert(key, Arc::clone(&handle));
        debug!(agent_id, conversation_id, "Created session handle");
        Ok(handle)
    }

    async fn backing_for(
        &self,
        agent_id: &str,
        settings: &MemorySettings,
    ) -> Result<SessionBacking, AgentError> {
        if !settings.enabled || settings.kind == MemoryKind::None {
            return Ok(SessionBacking::Noop);
        }

        let location = settings
            .location
            .clone()
            .unwrap_or_else(|| IN_MEMORY_LOCATION.to_string());

        let mut stores = self.stores.lock().await;
        let store = match stores.get(&location) {
            Some(store) => Arc::clone(store),
            None => {
                let store = if location == IN_MEMORY_LOCATION {
                    DurableStore::in_memory()
                } else {
                    DurableStore::open(&location)
                }
                .map_err(|e| AgentError::session(agent_id, e.to_string()))?;
                let store = Arc::new(store);
                stores.insert(location, Arc::clone(&store));
                store
            }
        };

        Ok(SessionBacking::Durable(store))
    }

    /// Drop the cached handle and erase its stored history. The next
    /// `get_or_create` for the pair yields a fresh, empty handle.
    pub async fn clear(&self, agent_id: &str, conversation_id: &str) -> Result<(), AgentError> {
        let key = (agent_id.to_string(), conversation_id.to_string());
        let removed = self.handles.write().await.remove(&key);
        if let Some(handle) = removed {
            handle
                .clear_backing()
                .map_err(|e| AgentError::session(agent_id, e.to_string()))?;
            info!(agent_id, conversation_id, "Cleared session");
        }
        Ok(())
    }

    /// Number of live handles (diagnostics).
    pub async fn len(&self) -> usize {
        self.handles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handles.read().await.is_empty()
    }

    /// Drop every cached handle. Called once at process shutdown.
    pub async fn reset(&self) {
        self.handles.write().await.clear();
        self.stores.lock().await.clear();
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::{ConversationMemory, Turn};

    fn durable_settings() -> MemorySettings {
        MemorySettings {
            enabled: true,
            kind: MemoryKind::Durable,
            location: Some(IN_MEMORY_LOCATION.to_string()),
        }
    }

    #[tokio::test]
    async fn test_handles_are_reference_identical() {
        let store = SessionStore::new();
        let settings = durable_settings();
        let a = store.get_or_create("echo", "c-1", &settings).await.unwrap();
        let b = store.get_or_create("echo", "c-1", &settings).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_key_is_the_pair_not_conversation_id() {
        let store = SessionStore::new();
        let settings = durable_settings();
        let a = store.get_or_create("echo", "c-1", &settings).await.unwrap();
        let b = store
            .get_or_create("other", "c-1", &settings)
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));

        a.append(Turn::user("private")).await.unwrap();
        assert!(b.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_yields_fresh_empty_handle() {
        let store = SessionStore::new();
        let settings = durable_settings();
        let a = store.get_or_create("echo", "c-1", &settings).await.unwrap();
        a.append(Turn::user("hi")).await.unwrap();
        assert_eq!(a.history().await.unwrap().len(), 1);

        store.clear("echo", "c-1").await.unwrap();
        let b = store.get_or_create("echo", "c-1", &settings).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(b.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_memory_gets_noop_handle() {
        let store = SessionStore::new();
        let settings = MemorySettings::default();
        let handle = store.get_or_create("echo", "c-1", &settings).await.unwrap();
        assert!(!handle.is_persistent());
    }

    #[tokio::test]
    async fn test_durable_file_survives_handle_recreation() {
        let dir = tempfile::tempdir().unwrap();
        let location = dir.path().join("sessions.db");
        let settings = MemorySettings {
            enabled: true,
            kind: MemoryKind::Durable,
            location: Some(location.to_string_lossy().into_owned()),
        };

        let store = SessionStore::new();
        let handle = store.get_or_create("echo", "c-1", &settings).await.unwrap();
        handle.append(Turn::user("persisted")).await.unwrap();
        store.reset().await;

        let handle = store.get_or_create("echo", "c-1", &settings).await.unwrap();
        let history = handle.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "persisted");
    }
}
