//! Configuration data model shared by every subsystem.
//!
//! # Data Flow
//! ```text
//! upstream fetch / cache load
//!     → raw_config.rs (RawConfig, immutable, hashed on construction)
//!     → cache store (one RawConfig per CacheKey)
//!
//! client getConfig
//!     → request.rs (ConfigRequest: key + what the client already holds)
//!     → orchestrator compares request against cached RawConfig
//! ```
//!
//! # Design Decisions
//! - RawConfig is shared as `Arc<RawConfig>`; nothing mutates it after construction
//! - The content hash is computed from payload and schema hash only, never the generation
//! - "Has anything changed?" is answered by a single predicate on RawConfig

pub mod raw_config;
pub mod request;

pub use raw_config::{content_hash, CacheKey, RawConfig};
pub use request::{ConfigRequest, ValidationError, SUPPORTED_PROTOCOL_VERSIONS};
