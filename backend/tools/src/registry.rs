//! The Capability Registry: turns a descriptor into an invocable list.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use agora_config::AgentDescriptor;
use agora_core::{AgentError, Capability};
use agora_supervisor::{SubprocessHandle, SubprocessSpec, SubprocessSupervisor};

use crate::{builtin, proxy};

/// Where a capability came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilitySource {
    Builtin,
    SubprocessProxy,
}

/// A capability tagged with its source. Hybrid agents mix both sources in one
/// flat list; there is no inheritance hierarchy.
pub struct ResolvedCapability {
    pub source: CapabilitySource,
    pub capability: Arc<dyn Capability>,
}

/// Everything the registry produced for one agent.
pub struct BuiltCapabilities {
    pub capabilities: Vec<ResolvedCapability>,
    /// Present when the descriptor declared a subprocess provider; the agent
    /// handle keeps it so the factory can tear the server down on reload.
    pub subprocess: Option<SubprocessHandle>,
}

impl BuiltCapabilities {
    /// The flat invocable list, source tags dropped.
    pub fn invocable(&self) -> Vec<Arc<dyn Capability>> {
        self.capabilities
            .iter()
            .map(|c| Arc::clone(&c.capability))
            .collect()
    }
}

/// Builds capability lists for agent descriptors.
pub struct CapabilityRegistry {
    supervisor: Arc<SubprocessSupervisor>,
}

impl CapabilityRegistry {
    pub fn new(supervisor: Arc<SubprocessSupervisor>) -> Self {
        Self { supervisor }
    }

    /// Resolve a descriptor's declared builtins, launch its provider if it
    /// has one, and merge both into one list with unique names.
    pub async fn build_capabilities(
        &self,
        descriptor: &AgentDescriptor,
    ) -> Result<BuiltCapabilities, AgentError> {
        let agent_id = &descriptor.id;
        let mut capabilities = Vec::new();
        let mut names: HashSet<String> = HashSet::new();

        for name in &descriptor.capabilities {
            let capability = builtin::create(name).ok_or_else(|| {
                AgentError::configuration(
                    agent_id,
                    format!(
                        "unknown builtin capability '{name}' (available: {})",
                        builtin::names().join(", ")
                    ),
                )
            })?;
            if !names.insert(name.clone()) {
                return Err(AgentError::configuration(
                    agent_id,
                    format!("capability '{name}' declared more than once"),
                ));
            }
            capabilities.push(ResolvedCapability {
                source: CapabilitySource::Builtin,
                capability,
            });
        }

        let mut subprocess = None;
        if let Some(provider) = &descriptor.provider {
            let mut spec = SubprocessSpec::new(agent_id, &provider.command)
                .args(provider.args.iter().cloned());
            if let Some(dir) = &provider.working_dir {
                spec = spec.working_dir(dir);
            }

            let handle = self.supervisor.start(spec).await?;
            let proxies = proxy::discover(handle.channel())
                .await
                .map_err(|e| AgentError::launch(agent_id, e.to_string()))?;

            for capability in proxies {
                if !names.insert(capability.name().to_string()) {
                    return Err(AgentError::configuration(
                        agent_id,
                        format!(
                            "tool server capability '{}' collides with a builtin",
                            capability.name()
                        ),
                    ));
                }
                capabilities.push(ResolvedCapability {
                    source: CapabilitySource::SubprocessProxy,
                    capability,
                });
            }
            subprocess = Some(handle);
        }

        info!(
            agent_id = %agent_id,
            count = capabilities.len(),
            hybrid = subprocess.is_some(),
            "Built capability list"
        );

        Ok(BuiltCapabilities {
            capabilities,
            subprocess,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use agora_config::{parse_config, RuntimeConfig};

    /// POSIX-sh tool server: answers `list` with one `ping` capability and
    /// everything else with a pong result.
    const LISTING_SERVER: &str = r#"while IFS= read -r line; do id=$(printf %s "$line" | sed 's/.*"id":\([0-9]*\).*/\1/'); case "$line" in *'"method":"list"'*) printf '{"id":%s,"result":{"capabilities":[{"name":"ping","description":"ping the server","parameters":{}}]}}\n' "$id";; *) printf '{"id":%s,"result":{"pong":true}}\n' "$id";; esac; done"#;

    fn registry() -> CapabilityRegistry {
        CapabilityRegistry::new(Arc::new(SubprocessSupervisor::new(Duration::from_secs(1))))
    }

    fn config_with(yaml: &str) -> RuntimeConfig {
        parse_config(yaml).unwrap()
    }

    #[tokio::test]
    async fn test_builtin_only_descriptor() {
        let config = config_with("agents:\n  - id: echo\n    capabilities: [echo, clock]\n");
        let built = registry()
            .build_capabilities(config.descriptor("echo").unwrap())
            .await
            .unwrap();
        assert_eq!(built.capabilities.len(), 2);
        assert!(built.subprocess.is_none());
        assert!(built
            .capabilities
            .iter()
            .all(|c| c.source == CapabilitySource::Builtin));
    }

    #[tokio::test]
    async fn test_unknown_builtin_is_configuration_error() {
        let config = config_with("agents:\n  - id: echo\n    capabilities: [teleport]\n");
        let err = registry()
            .build_capabilities(config.descriptor("echo").unwrap())
            .await
            .err()
            .expect("unknown builtin must fail the build");
        match err {
            AgentError::Configuration { agent_id, message } => {
                assert_eq!(agent_id, "echo");
                assert!(message.contains("teleport"));
            }
            other => panic!("expected Configuration error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_declaration_rejected() {
        let config = config_with("agents:\n  - id: echo\n    capabilities: [echo, echo]\n");
        let err = registry()
            .build_capabilities(config.descriptor("echo").unwrap())
            .await
            .err()
            .expect("duplicate declaration must fail the build");
        assert!(err.to_string().contains("more than once"));
    }

    #[tokio::test]
    async fn test_hybrid_merges_builtins_and_proxies() {
        let yaml = format!(
            "agents:\n  - id: hybrid\n    capabilities: [clock]\n    provider:\n      command: sh\n      args: [\"-c\", {:?}]\n",
            LISTING_SERVER
        );
        let config = config_with(&yaml);

        let supervisor = Arc::new(SubprocessSupervisor::new(Duration::from_secs(1)));
        let registry = CapabilityRegistry::new(Arc::clone(&supervisor));
        let built = registry
            .build_capabilities(config.descriptor("hybrid").unwrap())
            .await
            .unwrap();

        assert_eq!(built.capabilities.len(), 2);
        let sources: Vec<_> = built.capabilities.iter().map(|c| c.source).collect();
        assert!(sources.contains(&CapabilitySource::Builtin));
        assert!(sources.contains(&CapabilitySource::SubprocessProxy));

        let ping = built
            .capabilities
            .iter()
            .find(|c| c.capability.name() == "ping")
            .unwrap();
        let out = ping
            .capability
            .invoke(serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(out["pong"], true);

        supervisor.shutdown_all().await;
    }
}
