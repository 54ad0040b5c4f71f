//! A single client ask for a config.

use std::fmt;

use crate::model::{CacheKey, RawConfig};
use crate::net::target::Target;

/// Protocol versions this proxy answers `getConfig` for.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[u32] = &[3];

/// Why a request failed parameter validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("illegal config key: {0}")]
    IllegalKey(String),
    #[error("illegal generation {0}, must be non-negative")]
    IllegalGeneration(i64),
    #[error("illegal content hash '{0}', must be empty or hex")]
    IllegalContentHash(String),
}

/// One `getConfig` request, read-only once built.
#[derive(Debug, Clone)]
pub struct ConfigRequest {
    pub key: CacheKey,
    pub known_generation: i64,
    pub known_content_hash: String,
    pub protocol_version: u32,
    /// Opaque trace context supplied by the client, echoed in the response.
    pub trace: Option<String>,
    pub target: Target,
}

impl ConfigRequest {
    pub fn new(
        key: CacheKey,
        known_generation: i64,
        known_content_hash: impl Into<String>,
        protocol_version: u32,
        target: Target,
    ) -> Self {
        Self {
            key,
            known_generation,
            known_content_hash: known_content_hash.into(),
            protocol_version,
            trace: None,
            target,
        }
    }

    pub fn with_trace(mut self, trace: Option<String>) -> Self {
        self.trace = trace;
        self
    }

    pub fn is_protocol_version_supported(&self) -> bool {
        SUPPORTED_PROTOCOL_VERSIONS.contains(&self.protocol_version)
    }

    /// Check that the request is well formed.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let key = &self.key;
        if key.namespace.is_empty() || !key.namespace.chars().all(is_namespace_char) {
            return Err(ValidationError::IllegalKey(format!(
                "namespace '{}'",
                key.namespace
            )));
        }
        if key.name.is_empty() || !key.name.chars().all(is_name_char) {
            return Err(ValidationError::IllegalKey(format!("name '{}'", key.name)));
        }
        if key.config_id.chars().any(char::is_control) {
            return Err(ValidationError::IllegalKey(format!(
                "config id '{}'",
                key.config_id.escape_debug()
            )));
        }
        if !is_hex_or_empty(&key.schema_hash) {
            return Err(ValidationError::IllegalKey(format!(
                "schema hash '{}'",
                key.schema_hash
            )));
        }
        if self.known_generation < 0 {
            return Err(ValidationError::IllegalGeneration(self.known_generation));
        }
        if !is_hex_or_empty(&self.known_content_hash) {
            return Err(ValidationError::IllegalContentHash(
                self.known_content_hash.clone(),
            ));
        }
        Ok(())
    }

    /// True when `config` is something this client does not already hold.
    pub fn is_outdated_by(&self, config: &RawConfig) -> bool {
        config.differs_from(self.known_generation, &self.known_content_hash)
    }

    pub fn short_description(&self) -> String {
        format!(
            "name={},configId={},generation={},contentHash={}",
            self.key.qualified_name(),
            self.key.config_id,
            self.known_generation,
            self.known_content_hash
        )
    }
}

impl fmt::Display for ConfigRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.short_description(), self.target)
    }
}

fn is_namespace_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-')
}

fn is_hex_or_empty(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(key: CacheKey, generation: i64, hash: &str) -> ConfigRequest {
        ConfigRequest::new(key, generation, hash, 3, Target::detached())
    }

    fn key() -> CacheKey {
        CacheKey::new("cloud.config", "sentinel", "hosts/node1", "")
    }

    #[test]
    fn accepts_well_formed_request() {
        assert_eq!(request(key(), 0, "").validate(), Ok(()));
        assert_eq!(request(key(), 4, "0a1b").validate(), Ok(()));
    }

    #[test]
    fn rejects_bad_names() {
        let mut bad = key();
        bad.name = "with.dot".into();
        assert!(matches!(
            request(bad, 0, "").validate(),
            Err(ValidationError::IllegalKey(_))
        ));

        let mut empty = key();
        empty.namespace = String::new();
        assert!(request(empty, 0, "").validate().is_err());
    }

    #[test]
    fn rejects_negative_generation_and_bad_hash() {
        assert_eq!(
            request(key(), -1, "").validate(),
            Err(ValidationError::IllegalGeneration(-1))
        );
        assert!(matches!(
            request(key(), 1, "not-hex").validate(),
            Err(ValidationError::IllegalContentHash(_))
        ));
    }

    #[test]
    fn protocol_version_support() {
        let mut req = request(key(), 0, "");
        assert!(req.is_protocol_version_supported());
        req.protocol_version = 2;
        assert!(!req.is_protocol_version_supported());
    }
}
