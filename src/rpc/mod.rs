//! RPC gateway.
//!
//! # Data Flow
//! ```text
//! POST /rpc/{method}
//!     → server.rs (connection Target attached as an extension)
//!     → Responder::channel, dispatch.rs dispatch
//!     → worker pool → handlers.rs
//!         Value    → responder.send
//!         Deferred → delayed registry (responder parked)
//!         Err      → error response with the error's code
//!         panic    → InternalError response
//!     → server.rs awaits the receiver; a dropped responder means REQUEST_ABANDONED
//! ```
//!
//! # Design Decisions
//! - The accept path never runs handlers; it only awaits a oneshot
//! - Methods live in a fixed table built once
//! - Only the dispatch boundary owns the responder while a handler runs

pub mod dispatch;
pub mod handlers;
pub mod protocol;
pub mod responder;
pub mod server;

pub use dispatch::{Dispatcher, Invocation, Reply, RpcError, WorkerPool};
pub use protocol::{error_code, ConfigResponse, GetConfigParams, RpcResponse};
pub use responder::Responder;
pub use server::RpcServer;
