//! Config file resolution and loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, info};

use crate::env::resolve_env_vars;
use crate::schema::RuntimeConfig;

/// Default config file name within the config directory.
const CONFIG_FILE_NAME: &str = "agora.yaml";

/// Resolve the Agora config directory.
/// Priority: `AGORA_CONFIG_DIR` env > `~/.agora/`.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("AGORA_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".agora");
    }
    PathBuf::from(".agora")
}

/// Full path to the main config file.
pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}

/// Load, env-substitute, and parse the config from disk.
///
/// Returns `Ok(Default::default())` if the file doesn't exist (first run).
pub async fn load_config(path: &Path) -> Result<RuntimeConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(RuntimeConfig::default());
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&raw)
        .with_context(|| format!("Failed to parse config at: {}", path.display()))?;

    info!(path = %path.display(), agents = config.agents.len(), "Loaded config");
    Ok(config)
}

/// Parse a raw YAML document into a config, substituting `${VAR}` references.
pub fn parse_config(raw: &str) -> Result<RuntimeConfig> {
    let value: Value = serde_yaml::from_str(raw).context("Invalid YAML")?;
    if value.is_null() {
        // Empty file parses as null.
        return Ok(RuntimeConfig::default());
    }
    let value = resolve_env_vars(&value).context("Failed to resolve env vars in config")?;
    let config: RuntimeConfig =
        serde_json::from_value(value).context("Config does not match the expected schema")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("nope.yaml")).await.unwrap();
        assert!(config.agents.is_empty());
    }

    #[tokio::test]
    async fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agora.yaml");
        tokio::fs::write(&path, "agents:\n  - id: echo\n")
            .await
            .unwrap();
        let config = load_config(&path).await.unwrap();
        assert!(config.descriptor("echo").is_some());
    }

    #[test]
    fn test_parse_rejects_bad_shape() {
        assert!(parse_config("agents: 42\n").is_err());
    }
}
