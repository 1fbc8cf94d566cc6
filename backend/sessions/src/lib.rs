//! `agora-sessions`: conversation memory for Agora agents.
//!
//! The [`SessionStore`] hands out one cached [`SessionHandle`] per
//! `(agent id, conversation id)` pair, backed either by nothing (stateless
//! agents) or by durable SQLite storage.

pub mod backend;
pub mod handle;
pub mod store;

pub use backend::DurableStore;
pub use handle::{SessionBacking, SessionHandle};
pub use store::{SessionStore, IN_MEMORY_LOCATION};
