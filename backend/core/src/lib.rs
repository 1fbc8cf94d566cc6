//! `agora-core`: shared types, traits, and errors for the Agora agent runtime.

pub mod error;
pub mod traits;
pub mod types;

pub use error::AgentError;
pub use traits::{Capability, ConversationMemory, ModelCall, ModelRunner, RunnerOutput, UnitStream};
pub use types::{
    ExecutionMode, ExecutionRequest, ExecutionResponse, IncrementalUnit, StreamChunk, TraceEntry,
    Turn, TurnRole, Usage,
};
