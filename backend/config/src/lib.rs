//! `agora-config`: runtime configuration for Agora.
//!
//! Provides:
//! - Typed config schema (runtime settings + agent descriptors)
//! - YAML loading with `${ENV_VAR}` substitution
//! - Deep validation with field-path diagnostics

pub mod env;
pub mod io;
pub mod schema;
pub mod validation;

pub use env::{resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use io::{config_dir, config_file_path, load_config, parse_config};
pub use schema::{
    AgentDescriptor, MemoryKind, MemorySettings, ModelSettings, ProviderSettings, RuntimeConfig,
    RuntimeSettings, TransportKind,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use std::path::Path;

use anyhow::{bail, Result};

/// Load, env-substitute, and validate a config file.
///
/// This is the main entry point for loading a config at runtime. Warnings are
/// logged; errors abort the load.
pub async fn load_and_prepare(path: &Path) -> Result<RuntimeConfig> {
    let config = load_config(path).await?;

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }
    if !report.is_valid() {
        bail!(
            "config at {} has {} validation error(s); first: {}",
            path.display(),
            report.errors.len(),
            report.errors[0]
        );
    }

    Ok(config)
}
