//! Environment-driven settings for the CLI itself.

use std::path::PathBuf;

/// Process-level settings, overridable per command.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub port: u16,
    pub log_level: String,
    pub config_path: PathBuf,
}

impl CliConfig {
    pub fn from_env() -> Self {
        let port = std::env::var("AGORA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8720);
        let log_level = std::env::var("AGORA_LOG").unwrap_or_else(|_| "info".to_string());
        let config_path = std::env::var("AGORA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| agora_config::config_file_path(&agora_config::config_dir()));
        Self {
            port,
            log_level,
            config_path,
        }
    }
}
