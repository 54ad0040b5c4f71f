//! Config cache subsystem.
//!
//! # Data Flow
//! ```text
//! fetch / loadCache
//!     → store.rs put (monotonic per key)
//!     → waiters notified by the orchestrator
//!
//! dumpCache
//!     → store.rs snapshot (short read lock)
//!     → dump.rs (one line per entry) → disk
//!
//! loadCache / startup preload
//!     → dump.rs parse + hash check → orchestrator update
//! ```
//!
//! # Design Decisions
//! - One `parking_lot::RwLock` around a HashMap; working sets are small
//! - Snapshots are consistent, serialization happens outside the lock

pub mod dump;
pub mod store;

pub use dump::DumpError;
pub use store::CacheStore;
