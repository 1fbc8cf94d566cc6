//! Capabilities proxied to a subprocess tool server.
//!
//! The server advertises its operations once via the `list` method; each
//! advertisement becomes a [`ProxyCapability`] whose `invoke` round-trips
//! over the stdio channel.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use agora_core::Capability;
use agora_supervisor::ServerChannel;

/// One capability advertised by a tool server.
#[derive(Debug, Deserialize)]
struct Advertisement {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    parameters: Value,
}

/// A named operation backed by a subprocess channel.
pub struct ProxyCapability {
    name: String,
    description: String,
    parameters: Value,
    channel: Arc<ServerChannel>,
}

#[async_trait]
impl Capability for ProxyCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn invoke(&self, args: Value) -> Result<Value> {
        self.channel
            .request("invoke", json!({ "name": self.name, "args": args }))
            .await
            .with_context(|| format!("proxy capability '{}' failed", self.name))
    }
}

/// Ask a tool server what it exposes and wrap each operation in a proxy.
///
/// The first successful `list` response doubles as the readiness probe after
/// launch.
pub async fn discover(channel: &Arc<ServerChannel>) -> Result<Vec<Arc<dyn Capability>>> {
    let response = channel
        .request("list", json!({}))
        .await
        .context("tool server capability discovery failed")?;

    let ads: Vec<Advertisement> = serde_json::from_value(
        response.get("capabilities").cloned().unwrap_or(Value::Null),
    )
    .context("tool server returned a malformed capability list")?;

    debug!(count = ads.len(), "Discovered tool server capabilities");
    Ok(ads
        .into_iter()
        .map(|ad| {
            Arc::new(ProxyCapability {
                name: ad.name,
                description: ad.description,
                parameters: ad.parameters,
                channel: Arc::clone(channel),
            }) as Arc<dyn Capability>
        })
        .collect())
}
