//! Agora runtime configuration schema.
//!
//! Descriptors are immutable once loaded; a reload produces a whole new
//! descriptor set which the factory swaps atomically.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the Agora runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Runtime-wide settings.
    #[serde(default)]
    pub runtime: RuntimeSettings,

    /// Agent descriptors, in file order.
    #[serde(default)]
    pub agents: Vec<AgentDescriptor>,
}

impl RuntimeConfig {
    /// Find a descriptor by id, regardless of its enabled flag.
    pub fn descriptor(&self, agent_id: &str) -> Option<&AgentDescriptor> {
        self.agents.iter().find(|a| a.id == agent_id)
    }
}

/// Global runtime knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Overall per-request timeout in seconds; `None` disables the timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    /// Grace period granted to tool servers during shutdown.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: None,
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

fn default_shutdown_grace() -> u64 {
    5
}

/// One configured agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Stable identifier used by callers.
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// System instructions for the model.
    #[serde(default)]
    pub instructions: String,

    /// Model settings.
    #[serde(default)]
    pub model: ModelSettings,

    /// Conversation memory settings.
    #[serde(default)]
    pub memory: MemorySettings,

    /// Optional subprocess capability provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderSettings>,

    /// Builtin capability names to attach.
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Disabled agents are invisible to `resolve`.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl AgentDescriptor {
    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_model_name() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

/// Conversation memory backing for an agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemorySettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub kind: MemoryKind,

    /// Storage location for durable memory. The special value `:memory:`
    /// selects a non-persistent in-process store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    #[default]
    None,
    Durable,
}

/// Launch settings for an agent's subprocess tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Executable to launch.
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    #[serde(default)]
    pub transport: TransportKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Stdio,
}
