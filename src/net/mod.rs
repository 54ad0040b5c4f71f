//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (connection id, open-connection accounting)
//!     → target.rs (handle attached to every request on the connection)
//!     → Hand off to the RPC gateway
//!
//! Connection closes:
//!     → target.rs invalidates the handle
//!     → watchers (delayed response registry) purge pending requests
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - A connection's Target outlives the socket only as an identity

pub mod connection;
pub mod listener;
pub mod target;

pub use connection::{ConnectionId, ConnectionTracker};
pub use listener::{Listener, ListenerError};
pub use target::{Target, TargetWatcher};
