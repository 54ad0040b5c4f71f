//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;
use crate::source::parse_source_url;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be positive"));
    }

    if config.rpc.worker_threads == 0 {
        errors.push(ValidationError::new("rpc.worker_threads", "must be positive"));
    }
    if config.rpc.max_body_bytes == 0 {
        errors.push(ValidationError::new("rpc.max_body_bytes", "must be positive"));
    }

    for address in &config.sources.addresses {
        if let Err(e) = parse_source_url(address.trim()) {
            errors.push(ValidationError::new("sources.addresses", e.to_string()));
        }
    }
    if config.mode.requires_config_source() && config.sources.addresses.is_empty() {
        errors.push(ValidationError::new(
            "sources.addresses",
            "at least one source is required in default mode",
        ));
    }
    if config.sources.failover_threshold == 0 {
        errors.push(ValidationError::new("sources.failover_threshold", "must be positive"));
    }
    if config.sources.fetch_timeout_ms == 0 {
        errors.push(ValidationError::new("sources.fetch_timeout_ms", "must be positive"));
    }
    if config.sources.refresh_interval_ms == 0 {
        errors.push(ValidationError::new("sources.refresh_interval_ms", "must be positive"));
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("'{}' is not one of {LOG_LEVELS:?}", config.observability.log_level),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::Mode;

    fn valid() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.sources.addresses = vec!["cfg1:19070".into(), "http://cfg2:19070".into()];
        config
    }

    #[test]
    fn accepts_valid_config() {
        assert_eq!(validate_config(&valid()), Ok(()));
    }

    #[test]
    fn memorycache_needs_no_sources() {
        let mut config = ProxyConfig::default();
        config.mode = Mode::MemoryCache;
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn reports_every_problem() {
        let mut config = valid();
        config.listener.bind_address = "nowhere".into();
        config.rpc.worker_threads = 0;
        config.sources.addresses.push("ftp://cfg3".into());
        config.observability.log_level = "chatty".into();

        let fields: Vec<_> = validate_config(&config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "rpc.worker_threads",
                "sources.addresses",
                "observability.log_level"
            ]
        );
    }
}
