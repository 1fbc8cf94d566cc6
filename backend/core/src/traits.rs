//! Trait seams between the runtime and its collaborators.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::types::{IncrementalUnit, TraceEntry, Turn, Usage};

/// A named operation an agent may invoke beyond text generation.
///
/// Implementations are registered declaratively; there is no runtime
/// reflection over provider methods.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Unique capability name (e.g. "clock").
    fn name(&self) -> &str;

    /// Description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema for the capability's arguments.
    fn parameters(&self) -> Value;

    /// Invoke the capability with the given arguments.
    async fn invoke(&self, args: Value) -> Result<Value>;
}

/// Conversation memory attached to one `(agent id, conversation id)` pair.
///
/// Mutations are serialized by the implementation; concurrent appends from
/// requests sharing a conversation id never lose entries.
#[async_trait]
pub trait ConversationMemory: Send + Sync {
    async fn append(&self, turn: Turn) -> Result<()>;

    async fn history(&self) -> Result<Vec<Turn>>;
}

/// Everything the model runner needs for one invocation, assembled by the
/// dispatcher from the agent handle and the request.
#[derive(Clone)]
pub struct ModelCall {
    pub agent_id: String,
    pub agent_name: String,
    pub instructions: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub input: String,
    pub context: Option<Value>,
    pub step_budget: u32,
    pub capabilities: Vec<Arc<dyn Capability>>,
    pub memory: Option<Arc<dyn ConversationMemory>>,
}

/// Final output of a synchronous model run.
#[derive(Debug, Clone)]
pub struct RunnerOutput {
    pub text: String,
    pub trace: Vec<TraceEntry>,
    pub usage: Usage,
}

/// Ordered incremental units from a streamed model run. An `Err` item means
/// the runner failed mid-stream; no further items follow it.
pub type UnitStream = BoxStream<'static, Result<IncrementalUnit>>;

/// External component performing the actual language-model inference.
///
/// The runtime never retries runner failures; retry policy belongs to the
/// runner or the caller.
#[async_trait]
pub trait ModelRunner: Send + Sync {
    async fn run(&self, call: ModelCall) -> Result<RunnerOutput>;

    async fn run_streamed(&self, call: ModelCall) -> Result<UnitStream>;
}
