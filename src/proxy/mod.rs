//! Request resolution.
//!
//! # Data Flow
//! ```text
//! getConfig
//!     → server.rs resolve
//!         cached and different      → Respond
//!         cached and identical      → Wait
//!         missing, mode Default     → fetch → update_config → re-check
//!         missing, mode MemoryCache → Wait
//!     → Wait: server.rs defer → delayed registry
//!
//! fetch / refresher / loadCache
//!     → server.rs update_config → cache put → registry notify
//! ```
//!
//! # Design Decisions
//! - Mode and sources are fields of `ProxyServer`, shared by `Arc`, never globals
//! - `resolve` is infallible; upstream trouble only ever turns into waiting

pub mod mode;
pub mod server;

pub use mode::{Mode, ModeController, ModeError};
pub use server::{ProxyServer, Resolution, UpdateSourcesError};
