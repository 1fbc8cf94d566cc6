//! `agora-supervisor`: lifecycle management for subprocess tool servers.

pub mod channel;
pub mod health;
pub mod supervisor;

pub use channel::ServerChannel;
pub use health::{HealthCell, HealthStatus};
pub use supervisor::{SubprocessHandle, SubprocessSpec, SubprocessSupervisor};
