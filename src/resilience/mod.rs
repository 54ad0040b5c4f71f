//! Resilience helpers.
//!
//! # Data Flow
//! ```text
//! Upstream fetch:
//!     → tokio::time::timeout around every call (source connections)
//!     → repeated failures: failover (source connections)
//!     → keys still unresolved: refresher retries with backoff.rs
//! ```

pub mod backoff;
