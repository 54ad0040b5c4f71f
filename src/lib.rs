//! Caching config proxy.
//!
//! Sits between local config clients and a set of upstream config sources.
//! Answers `getConfig` from cache when it has something newer than the
//! client holds, otherwise parks the request as a long-poll until the key
//! changes or the connection closes.

// Core
pub mod cache;
pub mod delayed;
pub mod model;
pub mod proxy;
pub mod source;

// Transport
pub mod net;
pub mod rpc;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ProxyConfig;
pub use lifecycle::Shutdown;
pub use proxy::{Mode, ProxyServer};
pub use rpc::RpcServer;
