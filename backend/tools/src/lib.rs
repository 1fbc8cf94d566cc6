//! `agora-tools`: the capability registry for Agora agents.
//!
//! Capabilities come from two sources: a declarative builtin table, and
//! subprocess tool servers whose operations are proxied over a stdio channel.
//! Hybrid agents merge both into one flat, uniquely-named list.

pub mod builtin;
pub mod proxy;
pub mod registry;

pub use proxy::ProxyCapability;
pub use registry::{
    BuiltCapabilities, CapabilityRegistry, CapabilitySource, ResolvedCapability,
};
