//! The per-conversation memory handle.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use agora_core::{ConversationMemory, Turn};

use crate::backend::DurableStore;

/// Backing storage behind one handle.
pub enum SessionBacking {
    /// Stateless agent: history is neither kept nor returned.
    Noop,
    /// Durable SQLite storage (possibly the in-process `:memory:` store).
    Durable(Arc<DurableStore>),
}

/// Conversation memory for one `(agent id, conversation id)` pair.
///
/// Handles are cached by the [`SessionStore`](crate::store::SessionStore) and
/// shared by every in-flight request on the same conversation; the write lock
/// serializes mutations so concurrent appends never lose entries.
pub struct SessionHandle {
    agent_id: String,
    conversation_id: String,
    backing: SessionBacking,
    write_lock: Mutex<()>,
}

impl SessionHandle {
    pub(crate) fn new(
        agent_id: impl Into<String>,
        conversation_id: impl Into<String>,
        backing: SessionBacking,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            conversation_id: conversation_id.into(),
            backing,
            write_lock: Mutex::new(()),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Whether appends are actually persisted.
    pub fn is_persistent(&self) -> bool {
        matches!(self.backing, SessionBacking::Durable(_))
    }

    pub(crate) fn clear_backing(&self) -> Result<()> {
        match &self.backing {
            SessionBacking::Noop => Ok(()),
            SessionBacking::Durable(store) => store.clear(&self.agent_id, &self.conversation_id),
        }
    }
}

#[async_trait]
impl ConversationMemory for SessionHandle {
    async fn append(&self, turn: Turn) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match &self.backing {
            SessionBacking::Noop => Ok(()),
            SessionBacking::Durable(store) => {
                store.append(&self.agent_id, &self.conversation_id, &turn)
            }
        }
    }

    async fn history(&self) -> Result<Vec<Turn>> {
        match &self.backing {
            SessionBacking::Noop => Ok(Vec::new()),
            SessionBacking::Durable(store) => store.history(&self.agent_id, &self.conversation_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_backing_keeps_nothing() {
        let handle = SessionHandle::new("echo", "c-1", SessionBacking::Noop);
        handle.append(Turn::user("hi")).await.unwrap();
        assert!(handle.history().await.unwrap().is_empty());
        assert!(!handle.is_persistent());
    }

    #[tokio::test]
    async fn test_concurrent_appends_all_land() {
        let store = Arc::new(DurableStore::in_memory().unwrap());
        let handle = Arc::new(SessionHandle::new(
            "echo",
            "c-1",
            SessionBacking::Durable(store),
        ));

        let mut tasks = Vec::new();
        for i in 0..10 {
            let handle = Arc::clone(&handle);
            tasks.push(tokio::spawn(async move {
                handle.append(Turn::user(format!("msg-{i}"))).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(handle.history().await.unwrap().len(), 10);
    }
}
