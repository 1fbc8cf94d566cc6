//! The live, invocable agent object.

use std::sync::Arc;

use agora_config::AgentDescriptor;
use agora_core::Capability;
use agora_supervisor::SubprocessHandle;
use agora_tools::{BuiltCapabilities, ResolvedCapability};

/// A resolved agent: descriptor plus attached capabilities plus (if any) the
/// tool server backing them.
///
/// Handles are owned by the factory cache and shared by every concurrent
/// request for the same agent id. Session handles are attached per request,
/// not stored here.
pub struct AgentHandle {
    descriptor: Arc<AgentDescriptor>,
    capabilities: Vec<ResolvedCapability>,
    subprocess: Option<SubprocessHandle>,
}

impl AgentHandle {
    pub(crate) fn new(descriptor: Arc<AgentDescriptor>, built: BuiltCapabilities) -> Self {
        Self {
            descriptor,
            capabilities: built.capabilities,
            subprocess: built.subprocess,
        }
    }

    pub fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    pub fn memory_enabled(&self) -> bool {
        self.descriptor.memory.enabled
    }

    /// The flat capability list handed to the model runner.
    pub fn capabilities(&self) -> Vec<Arc<dyn Capability>> {
        self.capabilities
            .iter()
            .map(|c| Arc::clone(&c.capability))
            .collect()
    }

    pub fn capability_names(&self) -> Vec<String> {
        self.capabilities
            .iter()
            .map(|c| c.capability.name().to_string())
            .collect()
    }

    pub fn subprocess(&self) -> Option<&SubprocessHandle> {
        self.subprocess.as_ref()
    }
}
