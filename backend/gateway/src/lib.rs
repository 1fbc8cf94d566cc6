//! `agora-gateway`: HTTP/SSE wire surface for the Agora runtime.

pub mod error;
pub mod server;

pub use error::ApiError;
pub use server::{router, start_server, GatewayState};
