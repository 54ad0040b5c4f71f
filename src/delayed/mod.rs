//! Long-poll bookkeeping.
//!
//! # Data Flow
//! ```text
//! getConfig with nothing new to return
//!     → registry.rs register (re-checks cache under the registry lock)
//!     → parked with its Responder; no worker is held
//!
//! cache updated
//!     → registry.rs notify_updated → Responder::send → entry removed
//!
//! connection closed
//!     → Target::invalidate → registry.rs purge → entries dropped unanswered
//! ```
//!
//! # Design Decisions
//! - Removal always precedes sending, both under the lock: answered at most once
//! - The registry is the target watcher; it unsubscribes when a target has nothing left parked

pub mod registry;

pub use registry::{DelayedResponse, DelayedResponses, PendingInfo, Registration};
