//! Upstream fetch client.

use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use crate::model::{CacheKey, RawConfig, SUPPORTED_PROTOCOL_VERSIONS};
use crate::rpc::protocol::{ConfigResponse, GetConfigParams, RpcResponse};
use crate::source::SourceError;

/// Fetches one config from one upstream source.
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn fetch(
        &self,
        source: &Url,
        key: &CacheKey,
        last_known_generation: i64,
    ) -> Result<RawConfig, SourceError>;
}

/// Speaks this proxy's own `getConfig` RPC, so proxies can be chained.
#[derive(Debug, Clone)]
pub struct HttpSourceClient {
    http: reqwest::Client,
}

impl HttpSourceClient {
    pub fn new(connect_timeout: Duration) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("config-proxy/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Transport {
                address: "<client>".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { http })
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn fetch(
        &self,
        source: &Url,
        key: &CacheKey,
        last_known_generation: i64,
    ) -> Result<RawConfig, SourceError> {
        let address = source.to_string();
        let endpoint = source
            .join("rpc/getConfig")
            .map_err(|e| SourceError::InvalidAddress {
                address: address.clone(),
                reason: e.to_string(),
            })?;

        // An empty known hash always differs, so the source answers at once.
        let params = GetConfigParams {
            key: key.clone(),
            generation: last_known_generation,
            content_hash: String::new(),
            protocol_version: SUPPORTED_PROTOCOL_VERSIONS[0],
            trace: None,
        };

        let transport = |e: reqwest::Error| SourceError::Transport {
            address: address.clone(),
            message: e.to_string(),
        };
        let response = self
            .http
            .post(endpoint)
            .json(&params)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                address,
                status: status.as_u16(),
            });
        }
        let body: RpcResponse = response.json().await.map_err(transport)?;

        match body.into_result() {
            Ok(value) => {
                let config: ConfigResponse =
                    serde_json::from_value(value).map_err(|e| SourceError::InvalidResponse {
                        address: address.clone(),
                        reason: e.to_string(),
                    })?;
                config
                    .into_raw_config(key.clone())
                    .map_err(|e| SourceError::InvalidResponse {
                        address,
                        reason: e.to_string(),
                    })
            }
            Err(error) => Err(SourceError::Rejected {
                address,
                code: error.code,
                message: error.message,
            }),
        }
    }
}
