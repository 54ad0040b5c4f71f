//! Cache keys and immutable config values.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identity of one cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub namespace: String,
    pub name: String,
    pub config_id: String,
    #[serde(default)]
    pub schema_hash: String,
}

impl CacheKey {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        config_id: impl Into<String>,
        schema_hash: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            config_id: config_id.into(),
            schema_hash: schema_hash.into(),
        }
    }

    /// `namespace.name`, the form used in listings and dumps.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{},{}", self.namespace, self.name, self.config_id)
    }
}

/// Hash of a payload under a given schema.
///
/// Lowercase hex SHA-256 over the schema hash, a zero separator byte and the payload.
pub fn content_hash(payload: &[u8], schema_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(schema_hash.as_bytes());
    hasher.update([0u8]);
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// A config value as received from a source or loaded from a dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConfig {
    key: CacheKey,
    payload: Bytes,
    content_hash: String,
    generation: i64,
    internal_redeploy: bool,
}

impl RawConfig {
    /// Build a config value, deriving its content hash.
    pub fn new(
        key: CacheKey,
        payload: impl Into<Bytes>,
        generation: i64,
        internal_redeploy: bool,
    ) -> Self {
        let payload = payload.into();
        let content_hash = content_hash(&payload, &key.schema_hash);
        Self {
            key,
            payload,
            content_hash,
            generation,
            internal_redeploy,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn generation(&self) -> i64 {
        self.generation
    }

    pub fn is_internal_redeploy(&self) -> bool {
        self.internal_redeploy
    }

    /// True when a client holding `(generation, content_hash)` should be sent this value.
    ///
    /// This is the only predicate that gates a config response.
    pub fn differs_from(&self, generation: i64, content_hash: &str) -> bool {
        self.generation != generation || self.content_hash != content_hash
    }

    /// Payload rendered for humans; invalid UTF-8 is replaced.
    pub fn payload_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// One line of `listCachedConfig` output.
    pub fn listing_line(&self, full: bool) -> String {
        let mut line = format!(
            "{},{},{},{}",
            self.key.qualified_name(),
            self.key.config_id,
            self.generation,
            self.content_hash
        );
        if full {
            line.push(',');
            line.push_str(&self.payload_lossy());
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CacheKey {
        CacheKey::new("cloud.config", "sentinel", "hosts/node1", "abc123")
    }

    #[test]
    fn hash_ignores_generation() {
        let a = RawConfig::new(key(), "port 19097", 1, false);
        let b = RawConfig::new(key(), "port 19097", 7, false);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash().len(), 64);
    }

    #[test]
    fn hash_depends_on_schema() {
        let mut other = key();
        other.schema_hash = "def456".into();
        let a = RawConfig::new(key(), "port 19097", 1, false);
        let b = RawConfig::new(other, "port 19097", 1, false);
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn differs_from_checks_both_fields() {
        let config = RawConfig::new(key(), "x", 3, false);
        let hash = config.content_hash().to_string();
        assert!(!config.differs_from(3, &hash));
        assert!(config.differs_from(2, &hash));
        assert!(config.differs_from(3, ""));
    }

    #[test]
    fn listing_line_format() {
        let config = RawConfig::new(key(), "port 19097", 2, false);
        let line = config.listing_line(false);
        assert_eq!(
            line,
            format!("cloud.config.sentinel,hosts/node1,2,{}", config.content_hash())
        );
        assert!(config.listing_line(true).ends_with(",port 19097"));
    }
}
