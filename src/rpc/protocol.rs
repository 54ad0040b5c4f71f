//! Wire types for the RPC surface.
//!
//! Requests are `POST /rpc/{method}` with JSON parameters. Every answer is
//! either `{"result": ...}` or `{"error": {"code": .., "message": ..}}`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{CacheKey, ConfigRequest, RawConfig};
use crate::net::Target;

/// Numeric error codes carried in error responses.
pub mod error_code {
    pub const UNKNOWN_METHOD: i32 = 100;
    pub const ILLEGAL_PARAMETERS: i32 = 101;
    pub const ILLEGAL_CONFIG_KEY: i32 = 102;
    pub const ILLEGAL_GENERATION: i32 = 103;
    pub const ILLEGAL_CONTENT_HASH: i32 = 104;
    pub const ILLEGAL_PROTOCOL_VERSION: i32 = 110;
    pub const REQUEST_ABANDONED: i32 = 120;
    pub const INTERNAL_ERROR: i32 = 200;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
}

/// Terminal answer to one RPC call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcResponse {
    Result(Value),
    Error(ErrorBody),
}

impl RpcResponse {
    pub fn ok(value: impl Into<Value>) -> Self {
        RpcResponse::Result(value.into())
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        RpcResponse::Error(ErrorBody {
            code,
            message: message.into(),
        })
    }

    /// Answer for a config lookup.
    pub fn config(config: &RawConfig, trace: Option<String>) -> Self {
        match serde_json::to_value(ConfigResponse::new(config, trace)) {
            Ok(value) => RpcResponse::Result(value),
            Err(e) => RpcResponse::error(error_code::INTERNAL_ERROR, e.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RpcResponse::Error(_))
    }

    pub fn into_result(self) -> Result<Value, ErrorBody> {
        match self {
            RpcResponse::Result(value) => Ok(value),
            RpcResponse::Error(body) => Err(body),
        }
    }
}

/// Parameters of `getConfig`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetConfigParams {
    pub key: CacheKey,
    #[serde(default)]
    pub generation: i64,
    #[serde(default)]
    pub content_hash: String,
    pub protocol_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl GetConfigParams {
    pub fn into_request(self, target: Target) -> ConfigRequest {
        ConfigRequest::new(
            self.key,
            self.generation,
            self.content_hash,
            self.protocol_version,
            target,
        )
        .with_trace(self.trace)
    }
}

/// Successful `getConfig` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigResponse {
    /// Base64 of the raw payload bytes.
    pub payload: String,
    pub generation: i64,
    pub content_hash: String,
    #[serde(default)]
    pub internal_redeploy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

/// A config response that does not describe a valid config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigResponseError {
    #[error("payload is not valid base64: {0}")]
    Payload(#[from] base64::DecodeError),
    #[error("content hash mismatch: response says {claimed}, payload hashes to {computed}")]
    HashMismatch { claimed: String, computed: String },
}

impl ConfigResponse {
    pub fn new(config: &RawConfig, trace: Option<String>) -> Self {
        Self {
            payload: STANDARD.encode(config.payload()),
            generation: config.generation(),
            content_hash: config.content_hash().to_string(),
            internal_redeploy: config.is_internal_redeploy(),
            trace,
        }
    }

    /// Rebuild the config for `key`, checking the claimed content hash.
    pub fn into_raw_config(self, key: CacheKey) -> Result<RawConfig, ConfigResponseError> {
        let payload = STANDARD.decode(self.payload.as_bytes())?;
        let config = RawConfig::new(key, payload, self.generation, self.internal_redeploy);
        if config.content_hash() != self.content_hash {
            return Err(ConfigResponseError::HashMismatch {
                claimed: self.content_hash,
                computed: config.content_hash().to_string(),
            });
        }
        Ok(config)
    }

    pub fn decoded_payload(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.payload.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_envelope_shape() {
        let ok = serde_json::to_value(RpcResponse::ok(0)).unwrap();
        assert_eq!(ok, json!({"result": 0}));

        let err = serde_json::to_value(RpcResponse::error(error_code::INTERNAL_ERROR, "boom")).unwrap();
        assert_eq!(err, json!({"error": {"code": 200, "message": "boom"}}));
    }

    #[test]
    fn get_config_params_defaults() {
        let params: GetConfigParams = serde_json::from_value(json!({
            "key": {"namespace": "ns", "name": "cfg", "config_id": "id"},
            "protocol_version": 3
        }))
        .unwrap();
        assert_eq!(params.generation, 0);
        assert_eq!(params.content_hash, "");
        assert_eq!(params.key.schema_hash, "");
    }

    #[test]
    fn config_response_rebuilds_config() {
        let key = CacheKey::new("ns", "cfg", "id", "");
        let config = RawConfig::new(key.clone(), "payload", 7, true);
        let response = ConfigResponse::new(&config, Some("trace-1".into()));
        assert_eq!(response.decoded_payload().unwrap(), b"payload");
        assert_eq!(response.into_raw_config(key).unwrap(), config);
    }

    #[test]
    fn config_response_rejects_wrong_hash() {
        let key = CacheKey::new("ns", "cfg", "id", "");
        let mut response = ConfigResponse::new(&RawConfig::new(key.clone(), "a", 1, false), None);
        response.content_hash = "00".into();
        assert!(matches!(
            response.into_raw_config(key),
            Err(ConfigResponseError::HashMismatch { .. })
        ));
    }
}
