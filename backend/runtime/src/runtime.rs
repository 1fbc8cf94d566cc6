//! The runtime facade: wiring, lifecycle hooks, and the caller-facing surface
//! the service layer maps onto its transport.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{info, warn};

use agora_config::{AgentDescriptor, MemoryKind, RuntimeConfig};
use agora_core::AgentError;
use agora_core::ModelRunner;
use agora_sessions::SessionStore;
use agora_supervisor::SubprocessSupervisor;
use agora_tools::builtin;

use crate::dispatcher::ExecutionDispatcher;
use crate::factory::AgentFactory;

/// Caller-facing view of one configured agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub model: String,
    pub memory: MemoryKind,
    pub has_provider: bool,
    pub capabilities: Vec<String>,
}

impl AgentSummary {
    fn from_descriptor(descriptor: &AgentDescriptor) -> Self {
        Self {
            id: descriptor.id.clone(),
            name: descriptor.display_name().to_string(),
            enabled: descriptor.enabled,
            model: descriptor.model.name.clone(),
            memory: descriptor.memory.kind,
            has_provider: descriptor.provider.is_some(),
            capabilities: descriptor.capabilities.clone(),
        }
    }
}

/// Owns every runtime component for one process.
pub struct AgentRuntime {
    factory: Arc<AgentFactory>,
    dispatcher: ExecutionDispatcher,
    sessions: Arc<SessionStore>,
    supervisor: Arc<SubprocessSupervisor>,
}

impl AgentRuntime {
    pub fn new(config: RuntimeConfig, runner: Arc<dyn ModelRunner>) -> Self {
        let supervisor = Arc::new(SubprocessSupervisor::new(Duration::from_secs(
            config.runtime.shutdown_grace_secs,
        )));
        let sessions = Arc::new(SessionStore::new());
        let factory = Arc::new(AgentFactory::new(
            &config,
            Arc::clone(&sessions),
            Arc::clone(&supervisor),
        ));
        let request_timeout = config
            .runtime
            .request_timeout_secs
            .map(Duration::from_secs);
        let dispatcher = ExecutionDispatcher::new(Arc::clone(&factory), runner, request_timeout);

        Self {
            factory,
            dispatcher,
            sessions,
            supervisor,
        }
    }

    /// Validate every enabled descriptor against the environment without
    /// starting any subprocess. Fails with one aggregated diagnostic per
    /// offending agent.
    pub async fn startup(&self) -> Result<()> {
        let mut problems = Vec::new();

        for descriptor in self.factory.descriptors().await {
            if !descriptor.enabled {
                continue;
            }
            if let Some(problem) = preflight(&descriptor) {
                problems.push(problem);
            }
        }

        if !problems.is_empty() {
            bail!("startup validation failed:\n  {}", problems.join("\n  "));
        }
        info!("Startup validation passed");
        Ok(())
    }

    /// Every configured agent, in config order.
    pub async fn list_agents(&self) -> Vec<AgentSummary> {
        self.factory
            .descriptors()
            .await
            .iter()
            .map(|d| AgentSummary::from_descriptor(d))
            .collect()
    }

    /// One agent by id, disabled agents included.
    pub async fn get_agent(&self, agent_id: &str) -> Result<AgentSummary, AgentError> {
        self.factory
            .descriptors()
            .await
            .iter()
            .find(|d| d.id == agent_id)
            .map(|d| AgentSummary::from_descriptor(d))
            .ok_or_else(|| AgentError::NotFound(agent_id.to_string()))
    }

    pub fn dispatcher(&self) -> &ExecutionDispatcher {
        &self.dispatcher
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Swap in a new configuration; see [`AgentFactory::reload`].
    pub async fn reload(&self, config: RuntimeConfig) {
        self.factory.reload(&config).await;
    }

    /// Terminate tool servers and release caches. Safe to call twice.
    pub async fn shutdown(&self) {
        info!("Runtime shutting down");
        self.supervisor.shutdown_all().await;
        self.factory.clear().await;
        self.sessions.reset().await;
    }
}

fn preflight(descriptor: &AgentDescriptor) -> Option<String> {
    let mut faults = Vec::new();

    for name in &descriptor.capabilities {
        if !builtin::exists(name) {
            faults.push(format!("unknown builtin capability '{name}'"));
        }
    }

    if let Some(provider) = &descriptor.provider {
        if let Some(dir) = &provider.working_dir {
            if !dir.is_dir() {
                faults.push(format!(
                    "provider working directory missing: {}",
                    dir.display()
                ));
            }
        }
    }

    if descriptor.memory.kind == MemoryKind::Durable {
        if let Some(location) = descriptor.memory.location.as_deref() {
            if location != agora_sessions::IN_MEMORY_LOCATION {
                let path = std::path::Path::new(location);
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() && !parent.is_dir() {
                        faults.push(format!(
                            "memory location parent missing: {}",
                            parent.display()
                        ));
                    }
                }
            }
        }
    }

    if faults.is_empty() {
        None
    } else {
        warn!(agent_id = %descriptor.id, faults = faults.len(), "Preflight failed");
        Some(format!("agent '{}': {}", descriptor.id, faults.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_config::parse_config;

    use crate::runner::EchoRunner;

    fn runtime_for(yaml: &str) -> AgentRuntime {
        AgentRuntime::new(parse_config(yaml).unwrap(), Arc::new(EchoRunner))
    }

    #[tokio::test]
    async fn test_startup_passes_for_clean_config() {
        let runtime = runtime_for("agents:\n  - id: echo\n    capabilities: [echo]\n");
        runtime.startup().await.unwrap();
    }

    #[tokio::test]
    async fn test_startup_aggregates_one_diagnostic_per_agent() {
        let yaml = r#"
agents:
  - id: a
    capabilities: [teleport]
  - id: b
    provider:
      command: srv
      working_dir: /no/such/dir
  - id: c
"#;
        let runtime = runtime_for(yaml);
        let err = runtime.startup().await.unwrap_err().to_string();
        assert!(err.contains("agent 'a'"));
        assert!(err.contains("teleport"));
        assert!(err.contains("agent 'b'"));
        assert!(err.contains("/no/such/dir"));
        assert!(!err.contains("agent 'c'"));
    }

    #[tokio::test]
    async fn test_startup_skips_disabled_agents() {
        let yaml = r#"
agents:
  - id: broken
    enabled: false
    capabilities: [teleport]
"#;
        runtime_for(yaml).startup().await.unwrap();
    }

    #[tokio::test]
    async fn test_list_and_get() {
        let yaml = r#"
agents:
  - id: echo
    name: Echo
  - id: hidden
    enabled: false
"#;
        let runtime = runtime_for(yaml);
        let agents = runtime.list_agents().await;
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].id, "echo");
        assert!(!agents[1].enabled);

        // get_agent returns disabled agents too; resolve would not.
        assert!(runtime.get_agent("hidden").await.is_ok());
        assert!(matches!(
            runtime.get_agent("ghost").await,
            Err(AgentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let runtime = runtime_for("agents:\n  - id: echo\n");
        runtime.shutdown().await;
        runtime.shutdown().await;
    }
}
