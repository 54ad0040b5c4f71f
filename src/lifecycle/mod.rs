//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → sources + orchestrator → cache preload → bind → RPC server + refresher
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain workers → Abort connections → Dump cache
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Shutdown has a deadline: workers that outlive it are abandoned

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{start, RunningProxy, StartupError};
