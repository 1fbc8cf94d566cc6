//! The Agent Factory: resolves ids into cached, ready-to-invoke handles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use agora_config::{AgentDescriptor, RuntimeConfig};
use agora_core::AgentError;
use agora_sessions::{SessionHandle, SessionStore};
use agora_supervisor::SubprocessSupervisor;
use agora_tools::CapabilityRegistry;

use crate::handle::AgentHandle;

/// Immutable descriptor set, swapped wholesale on reload.
struct Snapshot {
    descriptors: Vec<Arc<AgentDescriptor>>,
}

impl Snapshot {
    fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            descriptors: config.agents.iter().cloned().map(Arc::new).collect(),
        }
    }

    fn get(&self, agent_id: &str) -> Option<&Arc<AgentDescriptor>> {
        self.descriptors.iter().find(|d| d.id == agent_id)
    }
}

/// One cache slot per agent id. The `OnceCell` gives at-most-one in-flight
/// construction: concurrent resolvers await the winner, and a failed build
/// leaves the cell empty so the next resolve retries from scratch.
type CacheSlot = Arc<OnceCell<Arc<AgentHandle>>>;

pub struct AgentFactory {
    snapshot: RwLock<Arc<Snapshot>>,
    cache: RwLock<HashMap<String, CacheSlot>>,
    registry: CapabilityRegistry,
    sessions: Arc<SessionStore>,
    supervisor: Arc<SubprocessSupervisor>,
    constructions: AtomicU64,
}

impl AgentFactory {
    pub fn new(
        config: &RuntimeConfig,
        sessions: Arc<SessionStore>,
        supervisor: Arc<SubprocessSupervisor>,
    ) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::from_config(config))),
            cache: RwLock::new(HashMap::new()),
            registry: CapabilityRegistry::new(Arc::clone(&supervisor)),
            sessions,
            supervisor,
            constructions: AtomicU64::new(0),
        }
    }

    /// Every descriptor in the current snapshot, in config order.
    pub async fn descriptors(&self) -> Vec<Arc<AgentDescriptor>> {
        self.snapshot.read().await.descriptors.clone()
    }

    /// Resolve an agent id into its cached handle, constructing on first use.
    pub async fn resolve(&self, agent_id: &str) -> Result<Arc<AgentHandle>, AgentError> {
        let slot = {
            let cache = self.cache.read().await;
            cache.get(agent_id).cloned()
        };
        let slot = match slot {
            Some(slot) => slot,
            None => {
                let mut cache = self.cache.write().await;
                cache
                    .entry(agent_id.to_string())
                    .or_insert_with(|| Arc::new(OnceCell::new()))
                    .clone()
            }
        };

        let handle = slot
            .get_or_try_init(|| self.build(agent_id))
            .await?
            .clone();
        Ok(handle)
    }

    async fn build(&self, agent_id: &str) -> Result<Arc<AgentHandle>, AgentError> {
        let snapshot = Arc::clone(&*self.snapshot.read().await);
        let descriptor = snapshot
            .get(agent_id)
            .filter(|d| d.enabled)
            .cloned()
            .ok_or_else(|| AgentError::NotFound(agent_id.to_string()))?;

        debug!(agent_id, "Constructing agent handle");
        let built = self.registry.build_capabilities(&descriptor).await?;
        self.constructions.fetch_add(1, Ordering::Relaxed);

        info!(
            agent_id,
            capabilities = built.capabilities.len(),
            memory = descriptor.memory.enabled,
            "Agent handle ready"
        );
        Ok(Arc::new(AgentHandle::new(descriptor, built)))
    }

    /// Resolve the agent and, when memory is enabled, the session handle for
    /// the conversation. A missing conversation id gets a generated one; the
    /// id actually used is returned alongside.
    pub async fn resolve_with_session(
        &self,
        agent_id: &str,
        conversation_id: Option<&str>,
    ) -> Result<(Arc<AgentHandle>, Option<Arc<SessionHandle>>, Option<String>), AgentError> {
        let handle = self.resolve(agent_id).await?;

        if !handle.memory_enabled() {
            return Ok((handle, None, conversation_id.map(str::to_string)));
        }

        let conversation_id = conversation_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let session = self
            .sessions
            .get_or_create(agent_id, &conversation_id, &handle.descriptor().memory)
            .await?;
        Ok((handle, Some(session), Some(conversation_id)))
    }

    /// Swap in a new descriptor set and drop the whole handle cache.
    ///
    /// In-flight requests keep their old `Arc` handles and complete against
    /// the old descriptors; tool servers owned by dropped handles are torn
    /// down asynchronously.
    pub async fn reload(&self, config: &RuntimeConfig) {
        let new_snapshot = Arc::new(Snapshot::from_config(config));
        *self.snapshot.write().await = new_snapshot;

        let old_cache = std::mem::take(&mut *self.cache.write().await);
        let mut orphaned = 0;
        for (agent_id, slot) in old_cache {
            if let Some(handle) = slot.get() {
                if let Some(subprocess) = handle.subprocess() {
                    orphaned += 1;
                    let supervisor = Arc::clone(&self.supervisor);
                    let subprocess_id = subprocess.id;
                    tokio::spawn(async move {
                        supervisor.stop(subprocess_id).await;
                    });
                    warn!(agent_id, "Tool server orphaned by reload; stopping");
                }
            }
        }
        info!(orphaned, "Config reloaded; handle cache replaced");
    }

    /// Drop every cached handle. Called once at shutdown, after the
    /// supervisor has terminated the tool servers.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    /// How many handle constructions have run (test observability).
    pub fn constructions(&self) -> u64 {
        self.constructions.load(Ordering::Relaxed)
    }
}
