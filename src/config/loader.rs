//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse a TOML document without validating it.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    toml::from_str(content).map_err(ConfigError::Parse)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config = parse_config(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::Mode;
    use std::io::Write;

    #[test]
    fn empty_document_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.mode, Mode::Default);
        assert_eq!(config.rpc.worker_threads, 8);
        assert_eq!(config.rpc.shutdown_timeout_secs, 10);
        assert_eq!(config.sources.failover_threshold, 2);
    }

    #[test]
    fn loads_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
mode = "memorycache"

[listener]
bind_address = "127.0.0.1:19090"

[sources]
addresses = ["cfg1:19070", "cfg2:19070"]
failover_threshold = 3

[cache]
preload_path = "/var/cache/config-proxy/dump"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.mode, Mode::MemoryCache);
        assert_eq!(config.sources.addresses.len(), 2);
        assert_eq!(config.sources.failover_threshold, 3);
        assert!(config.cache.preload_path.is_some());
        assert!(config.cache.dump_on_shutdown.is_none());
    }

    #[test]
    fn rejects_unknown_mode_and_invalid_values() {
        assert!(matches!(parse_config("mode = \"turbo\""), Err(ConfigError::Parse(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[rpc]\nworker_threads = 0\n").unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().starts_with("Validation failed: "));
    }
}
