//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, every problem reported)
//!     → command line overrides (main.rs), validated again
//!     → ProxyConfig handed to startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; runtime changes go through RPC (setMode, updateSources)
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{CacheConfig, ListenerConfig, ObservabilityConfig, ProxyConfig, RpcConfig, SourcesConfig};
pub use validation::{validate_config, ValidationError};
