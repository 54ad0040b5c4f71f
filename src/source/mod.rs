//! Upstream config sources.
//!
//! # Data Flow
//! ```text
//! cache miss (DEFAULT mode)            refresher tick (DEFAULT mode)
//!     → connections.rs fetch ←──────────── refresher.rs (keys with waiters)
//!     → active source via client.rs (bounded by fetch timeout)
//!     → ok: failure count reset, config returned
//!     → err: failure count++, failover at threshold, error returned
//! ```
//!
//! # Design Decisions
//! - The source list is swapped whole through `ArcSwap`; fetches in flight keep the list they started with
//! - Fetch failures never reach clients; the waiting request is retried by the refresher

pub mod client;
pub mod connections;
pub mod refresher;

use std::time::Duration;

pub use client::{HttpSourceClient, SourceClient};
pub use connections::{parse_source_url, split_source_list, Source, SourceConnections};
pub use refresher::UpstreamRefresher;

/// Why an upstream fetch or source update failed.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("invalid source address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("no config sources configured")]
    NoSources,
    #[error("fetch from {address} timed out after {after:?}")]
    Timeout { address: String, after: Duration },
    #[error("fetch from {address} failed: {message}")]
    Transport { address: String, message: String },
    #[error("{address} answered with HTTP status {status}")]
    Status { address: String, status: u16 },
    #[error("{address} rejected the request with code {code}: {message}")]
    Rejected {
        address: String,
        code: i32,
        message: String,
    },
    #[error("invalid response from {address}: {reason}")]
    InvalidResponse { address: String, reason: String },
}
