use thiserror::Error;

/// Top-level error taxonomy for the Agora runtime.
///
/// Every variant that relates to a specific agent carries the agent identifier
/// so callers always see which agent failed and why.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("configuration error for agent '{agent_id}': {message}")]
    Configuration { agent_id: String, message: String },

    #[error("tool server launch failed for agent '{agent_id}': {message}")]
    Launch { agent_id: String, message: String },

    #[error("unknown or disabled agent: '{0}'")]
    NotFound(String),

    #[error("model error for agent '{agent_id}': {message}")]
    Model { agent_id: String, message: String },

    #[error("session storage error for agent '{agent_id}': {message}")]
    Session { agent_id: String, message: String },

    #[error("request for agent '{agent_id}' timed out after {elapsed_ms}ms")]
    Timeout { agent_id: String, elapsed_ms: u64 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AgentError {
    pub fn configuration(agent_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            agent_id: agent_id.into(),
            message: message.into(),
        }
    }

    pub fn launch(agent_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Launch {
            agent_id: agent_id.into(),
            message: message.into(),
        }
    }

    pub fn model(agent_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Model {
            agent_id: agent_id.into(),
            message: message.into(),
        }
    }

    pub fn session(agent_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Session {
            agent_id: agent_id.into(),
            message: message.into(),
        }
    }

    /// The identifier of the agent this error belongs to, if any.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::Configuration { agent_id, .. }
            | Self::Launch { agent_id, .. }
            | Self::Model { agent_id, .. }
            | Self::Session { agent_id, .. }
            | Self::Timeout { agent_id, .. } => Some(agent_id),
            Self::NotFound(agent_id) => Some(agent_id),
            Self::Other(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_carries_agent_id() {
        let err = AgentError::configuration("mapper", "unknown capability 'teleport'");
        assert_eq!(err.agent_id(), Some("mapper"));
        assert!(err.to_string().contains("mapper"));
        assert!(err.to_string().contains("teleport"));
    }

    #[test]
    fn test_not_found_display() {
        let err = AgentError::NotFound("ghost".into());
        assert_eq!(err.to_string(), "unknown or disabled agent: 'ghost'");
    }
}
