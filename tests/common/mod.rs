//! Shared utilities for integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

use config_proxy::config::ProxyConfig;
use config_proxy::lifecycle::{start, RunningProxy};
use config_proxy::model::{CacheKey, RawConfig};
use config_proxy::proxy::Mode;
use config_proxy::rpc::RpcResponse;

pub fn key() -> CacheKey {
    CacheKey::new("cloud.config", "sentinel", "hosts/node1", "")
}

pub fn config(generation: i64, payload: &'static str) -> RawConfig {
    RawConfig::new(key(), payload, generation, false)
}

/// Loopback config on an ephemeral port with a fast refresher.
pub fn proxy_config(mode: Mode, sources: Vec<String>) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.mode = mode;
    config.listener.bind_address = "127.0.0.1:0".into();
    config.rpc.shutdown_timeout_secs = 1;
    config.sources.addresses = sources;
    config.sources.fetch_timeout_ms = 500;
    config.sources.refresh_interval_ms = 50;
    config.sources.max_backoff_ms = 200;
    config
}

pub async fn start_proxy(config: ProxyConfig) -> RunningProxy {
    start(config).await.expect("proxy failed to start")
}

/// An address nothing listens on.
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}

pub async fn rpc_with(client: &reqwest::Client, addr: SocketAddr, method: &str, params: Value) -> RpcResponse {
    let mut request = client.post(format!("http://{addr}/rpc/{method}"));
    if !params.is_null() {
        request = request.json(&params);
    }
    request
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("response was not an RPC envelope")
}

pub async fn rpc(addr: SocketAddr, method: &str, params: Value) -> RpcResponse {
    rpc_with(&client(), addr, method, params).await
}

pub async fn result(addr: SocketAddr, method: &str, params: Value) -> Value {
    rpc(addr, method, params)
        .await
        .into_result()
        .expect("expected a result")
}

pub fn get_config_params(generation: i64, content_hash: &str) -> Value {
    json!({
        "key": {
            "namespace": "cloud.config",
            "name": "sentinel",
            "config_id": "hosts/node1"
        },
        "generation": generation,
        "content_hash": content_hash,
        "protocol_version": 3
    })
}

/// Poll `printStatistics` until the queue has `size` entries.
pub async fn wait_for_pending(addr: SocketAddr, size: usize) {
    let needle = format!("Delayed responses queue size: {size}\n");
    for _ in 0..100 {
        let stats = result(addr, "printStatistics", Value::Null).await;
        if stats.as_str().is_some_and(|s| s.contains(&needle)) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("delayed response queue never reached size {size}");
}
