//! `${VAR}` substitution in config values.
//!
//! Only uppercase `[A-Z_][A-Z0-9_]*` names are matched, and only string
//! leaves of the value tree are processed.

use std::collections::HashMap;

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

/// Error returned for a referenced but unset env var.
#[derive(Debug, thiserror::Error)]
#[error("missing env var \"{var_name}\" referenced at config path: {config_path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub config_path: String,
}

/// Substitute `${VAR}` references throughout a config value tree.
pub fn resolve_env_vars(value: &Value) -> Result<Value> {
    substitute_value(value, &std::env::vars().collect(), "")
}

/// Substitute using a provided map (for tests).
pub fn resolve_env_vars_with(value: &Value, env: &HashMap<String, String>) -> Result<Value> {
    substitute_value(value, env, "")
}

fn substitute_value(value: &Value, env: &HashMap<String, String>, path: &str) -> Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(substitute_string(s, env, path)?)),
        Value::Array(arr) => {
            let result: Result<Vec<_>> = arr
                .iter()
                .enumerate()
                .map(|(i, v)| substitute_value(v, env, &format!("{path}[{i}]")))
                .collect();
            Ok(Value::Array(result?))
        }
        Value::Object(map) => {
            let mut result = serde_json::Map::new();
            for (k, v) in map {
                let child_path = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}.{k}")
                };
                result.insert(k.clone(), substitute_value(v, env, &child_path)?);
            }
            Ok(Value::Object(result))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_string(s: &str, env: &HashMap<String, String>, path: &str) -> Result<String> {
    if !s.contains("${") {
        return Ok(s.to_string());
    }

    let mut missing: Option<MissingEnvVarError> = None;
    let substituted = ENV_VAR_PATTERN.replace_all(s, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env.get(var_name) {
            Some(val) if !val.is_empty() => val.clone(),
            _ => {
                missing.get_or_insert(MissingEnvVarError {
                    var_name: var_name.to_string(),
                    config_path: path.to_string(),
                });
                String::new()
            }
        }
    });

    match missing {
        Some(err) => Err(err.into()),
        None => Ok(substituted.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_substitutes_nested_strings() {
        let value = json!({
            "agents": [{"provider": {"command": "${TOOL_BIN}/server"}}]
        });
        let resolved =
            resolve_env_vars_with(&value, &env(&[("TOOL_BIN", "/opt/tools")])).unwrap();
        assert_eq!(
            resolved["agents"][0]["provider"]["command"],
            "/opt/tools/server"
        );
    }

    #[test]
    fn test_missing_var_errors_with_path() {
        let value = json!({"agents": [{"id": "${AGORA_MISSING_VAR}"}]});
        let err = resolve_env_vars_with(&value, &HashMap::new()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("AGORA_MISSING_VAR"));
        assert!(msg.contains("agents[0].id"));
    }

    #[test]
    fn test_lowercase_names_untouched() {
        let value = json!({"text": "${not_a_var}"});
        let resolved = resolve_env_vars_with(&value, &HashMap::new()).unwrap();
        assert_eq!(resolved["text"], "${not_a_var}");
    }
}
