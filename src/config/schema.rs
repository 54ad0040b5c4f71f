//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML and every
//! section has defaults, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::proxy::Mode;

/// Root configuration for the config proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Serving mode at startup.
    pub mode: Mode,

    /// RPC listener (bind address, connection cap).
    pub listener: ListenerConfig,

    /// Worker pool and request handling.
    pub rpc: RpcConfig,

    /// Upstream config sources.
    pub sources: SourcesConfig,

    /// Cache persistence.
    pub cache: CacheConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:19090").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:19090".to_string(),
            max_connections: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Handlers allowed to run at once.
    pub worker_threads: usize,

    /// How long shutdown waits for running handlers.
    pub shutdown_timeout_secs: u64,

    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            worker_threads: 8,
            shutdown_timeout_secs: 10,
            max_body_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Ordered `host:port` or URL addresses; the first starts active.
    pub addresses: Vec<String>,

    /// Consecutive failures on the active source before failing over.
    pub failover_threshold: usize,

    /// Deadline for a single upstream fetch.
    pub fetch_timeout_ms: u64,

    /// How often keys with waiting requests are re-fetched.
    pub refresh_interval_ms: u64,

    /// Cap on the refresher's backoff while sources keep failing.
    pub max_backoff_ms: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            failover_threshold: 2,
            fetch_timeout_ms: 5_000,
            refresh_interval_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Dump loaded at startup. A missing file is skipped.
    pub preload_path: Option<PathBuf>,

    /// Dump written during shutdown.
    pub dump_on_shutdown: Option<PathBuf>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:19092".to_string(),
        }
    }
}
