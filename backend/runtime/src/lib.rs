//! `agora-runtime`: the Agora agent runtime core.
//!
//! Resolves configured agents into cached handles (Agent Factory), executes
//! requests via mock, synchronous, or streaming strategies (Execution
//! Dispatcher), and ties lifecycle hooks together (runtime facade).

pub mod dispatcher;
pub mod factory;
pub mod handle;
pub mod runner;
pub mod runtime;

pub use dispatcher::ExecutionDispatcher;
pub use factory::AgentFactory;
pub use handle::AgentHandle;
pub use runner::EchoRunner;
pub use runtime::{AgentRuntime, AgentSummary};
