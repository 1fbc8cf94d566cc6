//! Builtin capabilities and their declarative registration table.
//!
//! Builtins are registered once in a fixed table; a descriptor naming a
//! capability absent from this table is a configuration error.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{json, Value};

use agora_core::Capability;

type Factory = fn() -> Arc<dyn Capability>;

/// The fixed builtin table. Names are unique by construction of the map; the
/// test below guards against silent shadowing when entries are added.
static BUILTINS: Lazy<HashMap<&'static str, Factory>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, Factory> = HashMap::new();
    table.insert("echo", || Arc::new(EchoCapability));
    table.insert("clock", || Arc::new(ClockCapability));
    table.insert("calc", || Arc::new(CalcCapability));
    table
});

/// Instantiate a builtin capability by name.
pub fn create(name: &str) -> Option<Arc<dyn Capability>> {
    BUILTINS.get(name).map(|factory| factory())
}

/// All registered builtin names.
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<_> = BUILTINS.keys().copied().collect();
    names.sort_unstable();
    names
}

/// Whether a builtin with this name exists.
pub fn exists(name: &str) -> bool {
    BUILTINS.contains_key(name)
}

/// Returns its input unchanged.
pub struct EchoCapability;

#[async_trait]
impl Capability for EchoCapability {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the given text unchanged"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<Value> {
        let text = args
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(json!({ "text": text }))
    }
}

/// Current UTC time.
pub struct ClockCapability;

#[async_trait]
impl Capability for ClockCapability {
    fn name(&self) -> &str {
        "clock"
    }

    fn description(&self) -> &str {
        "Current UTC time in RFC 3339 format"
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn invoke(&self, _args: Value) -> Result<Value> {
        Ok(json!({ "now": chrono::Utc::now().to_rfc3339() }))
    }
}

/// Basic arithmetic over two operands.
pub struct CalcCapability;

#[async_trait]
impl Capability for CalcCapability {
    fn name(&self) -> &str {
        "calc"
    }

    fn description(&self) -> &str {
        "Apply an arithmetic operation (add, sub, mul, div) to two numbers"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "op": { "type": "string", "enum": ["add", "sub", "mul", "div"] },
                "a": { "type": "number" },
                "b": { "type": "number" }
            },
            "required": ["op", "a", "b"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<Value> {
        let op = args.get("op").and_then(Value::as_str).unwrap_or_default();
        let a = args.get("a").and_then(Value::as_f64);
        let b = args.get("b").and_then(Value::as_f64);
        let (Some(a), Some(b)) = (a, b) else {
            bail!("calc requires numeric 'a' and 'b' arguments");
        };
        let result = match op {
            "add" => a + b,
            "sub" => a - b,
            "mul" => a * b,
            "div" => {
                if b == 0.0 {
                    bail!("division by zero");
                }
                a / b
            }
            other => bail!("unknown calc op: '{other}'"),
        };
        Ok(json!({ "result": result }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names_match_capability_names() {
        for name in names() {
            let cap = create(name).unwrap();
            assert_eq!(cap.name(), name, "table key must equal capability name");
        }
    }

    #[test]
    fn test_unknown_name_absent() {
        assert!(create("teleport").is_none());
        assert!(!exists("teleport"));
    }

    #[tokio::test]
    async fn test_echo_roundtrip() {
        let cap = create("echo").unwrap();
        let out = cap.invoke(json!({ "text": "hi" })).await.unwrap();
        assert_eq!(out["text"], "hi");
    }

    #[tokio::test]
    async fn test_calc_operations() {
        let cap = create("calc").unwrap();
        let out = cap
            .invoke(json!({ "op": "mul", "a": 6, "b": 7 }))
            .await
            .unwrap();
        assert_eq!(out["result"], 42.0);

        let err = cap
            .invoke(json!({ "op": "div", "a": 1, "b": 0 }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("division by zero"));
    }
}
