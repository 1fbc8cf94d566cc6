//! Request, response, and streaming types shared across the runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single execution request against an agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// User input text.
    pub input: String,
    /// Optional structured context passed through to the model runner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    /// Conversation id scoping memory; generated when absent and memory is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Maximum internal reasoning iterations for the model runner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_budget: Option<u32>,
}

impl ExecutionRequest {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }
}

/// Which execution strategy produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Mock,
    Real,
}

/// One intermediate step recorded while the model runner worked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step: u32,
    pub action: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub detail: Value,
    pub timestamp: DateTime<Utc>,
}

impl TraceEntry {
    pub fn new(step: u32, action: impl Into<String>, detail: Value) -> Self {
        Self {
            step,
            action: action.into(),
            detail,
            timestamp: Utc::now(),
        }
    }
}

/// Aggregate usage metadata for one execution.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_ms: u64,
}

/// The final result of a non-streaming execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResponse {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub text: String,
    pub trace: Vec<TraceEntry>,
    pub usage: Usage,
    pub mode: ExecutionMode,
}

/// One unit of a streamed response.
///
/// Exactly one `Done` or `Error` terminates a stream; no chunk follows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Emitted first: identifies the execution about to stream.
    Metadata {
        agent_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
        mode: ExecutionMode,
        started_at: DateTime<Utc>,
    },
    /// An incremental text fragment.
    Token { text: String },
    /// An intermediate trace entry.
    Step { entry: TraceEntry },
    /// Successful end of stream with aggregate metadata.
    Done { usage: Usage },
    /// Failed end of stream.
    Error { agent_id: String, message: String },
}

impl StreamChunk {
    /// Whether this chunk terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Wire-level event name for this chunk.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Metadata { .. } => "metadata",
            Self::Token { .. } => "token",
            Self::Step { .. } => "step",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

/// One incremental unit produced by the model runner while streaming.
#[derive(Debug, Clone)]
pub enum IncrementalUnit {
    Token(String),
    Step(TraceEntry),
    /// Final usage report; the runner sends this at most once, last.
    Usage(Usage),
}

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One entry in a conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_chunk_tagging() {
        let chunk = StreamChunk::Token {
            text: "hel".into(),
        };
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["kind"], "token");
        assert_eq!(json["text"], "hel");
        assert!(!chunk.is_terminal());
    }

    #[test]
    fn test_terminal_chunks() {
        assert!(StreamChunk::Done {
            usage: Usage::default()
        }
        .is_terminal());
        assert!(StreamChunk::Error {
            agent_id: "echo".into(),
            message: "boom".into()
        }
        .is_terminal());
    }

    #[test]
    fn test_request_roundtrip() {
        let req = ExecutionRequest {
            input: "hi".into(),
            conversation_id: Some("c-1".into()),
            step_budget: Some(4),
            context: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: ExecutionRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.input, "hi");
        assert_eq!(back.step_budget, Some(4));
    }
}
