//! Config validation: structural checks with field-path error messages.

use std::collections::HashSet;

use thiserror::Error;

use crate::schema::{MemoryKind, RuntimeConfig};

/// A validation finding with field path and message.
#[derive(Debug, Error)]
#[error("config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// All findings from one validation pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return every error and warning found.
pub fn validate(config: &RuntimeConfig) -> ValidationReport {
    let mut report = ValidationReport::default();

    let mut seen: HashSet<&str> = HashSet::new();
    for (i, agent) in config.agents.iter().enumerate() {
        let path = format!("agents[{i}]");

        if agent.id.trim().is_empty() {
            report.error(format!("{path}.id"), "Agent id cannot be empty");
        } else if !seen.insert(agent.id.as_str()) {
            report.error(
                format!("{path}.id"),
                format!("Duplicate agent id '{}'", agent.id),
            );
        }

        if !(0.0..=2.0).contains(&agent.model.temperature) {
            report.error(
                format!("{path}.model.temperature"),
                format!("Temperature {} outside [0.0, 2.0]", agent.model.temperature),
            );
        }
        if agent.model.max_tokens == 0 {
            report.error(format!("{path}.model.max_tokens"), "max_tokens cannot be 0");
        }

        if agent.memory.enabled && agent.memory.kind == MemoryKind::None {
            report.warn(
                format!("{path}.memory"),
                "Memory enabled with kind 'none'; history will not be kept",
            );
        }
        if agent.memory.kind == MemoryKind::Durable && agent.memory.location.is_none() {
            report.error(
                format!("{path}.memory.location"),
                "Durable memory requires a storage location",
            );
        }

        if let Some(provider) = &agent.provider {
            if provider.command.trim().is_empty() {
                report.error(
                    format!("{path}.provider.command"),
                    "Provider command cannot be empty",
                );
            }
        }
    }

    if config.runtime.shutdown_grace_secs == 0 {
        report.warn(
            "runtime.shutdown_grace_secs",
            "Zero grace period; tool servers will be force-killed immediately",
        );
    }

    report
}
