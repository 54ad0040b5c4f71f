//! One function per RPC method.

use futures_util::future::ready;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::model::SUPPORTED_PROTOCOL_VERSIONS;
use crate::proxy::{ProxyServer, Resolution};
use crate::rpc::dispatch::{HandlerFn, HandlerFuture, Invocation, Reply, RpcError};
use crate::rpc::protocol::{ConfigResponse, GetConfigParams};

/// Every method the gateway answers.
pub fn method_table() -> HashMap<&'static str, HandlerFn> {
    let mut table: HashMap<&'static str, HandlerFn> = HashMap::new();
    table.insert("getConfig", get_config);
    table.insert("ping", ping);
    table.insert("printStatistics", print_statistics);
    table.insert("listCachedConfig", list_cached_config);
    table.insert("listCachedConfigFull", list_cached_config_full);
    table.insert("listSourceConnections", list_source_connections);
    table.insert("invalidateCache", invalidate_cache);
    table.insert("updateSources", update_sources);
    table.insert("setMode", set_mode);
    table.insert("getMode", get_mode);
    table.insert("dumpCache", dump_cache);
    table.insert("loadCache", load_cache);
    table
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError::IllegalParameters(e.to_string()))
}

fn immediate(result: Result<Value, RpcError>) -> HandlerFuture {
    ready(result.map(Reply::Value)).boxed()
}

fn status_pair(code: &str, message: impl Into<String>) -> Value {
    json!([code, message.into()])
}

fn get_config(server: Arc<ProxyServer>, invocation: Invocation) -> HandlerFuture {
    async move {
        let Invocation { params, target } = invocation;
        let params: GetConfigParams = parse_params(params)?;
        let request = params.into_request(target);

        if !request.is_protocol_version_supported() {
            return Err(RpcError::ProtocolVersion {
                version: request.protocol_version,
                request: request.short_description(),
                supported: SUPPORTED_PROTOCOL_VERSIONS,
            });
        }
        request.validate().map_err(|source| RpcError::Validation {
            request: request.short_description(),
            source,
        })?;

        if let Some(trace) = &request.trace {
            tracing::debug!(trace = %trace, request = %request.short_description(), "getConfig");
        }

        match server.resolve(&request).await {
            Resolution::Respond(config) => {
                let response = ConfigResponse::new(&config, request.trace.clone());
                serde_json::to_value(response)
                    .map(Reply::Value)
                    .map_err(|e| RpcError::Internal(e.to_string()))
            }
            Resolution::Wait => Ok(Reply::Deferred(request)),
        }
    }
    .boxed()
}

fn ping(_server: Arc<ProxyServer>, _invocation: Invocation) -> HandlerFuture {
    immediate(Ok(json!(0)))
}

fn print_statistics(server: Arc<ProxyServer>, _invocation: Invocation) -> HandlerFuture {
    immediate(Ok(Value::String(server.statistics())))
}

fn list_cached_config(server: Arc<ProxyServer>, _invocation: Invocation) -> HandlerFuture {
    immediate(Ok(json!(server.cache().listing(false))))
}

fn list_cached_config_full(server: Arc<ProxyServer>, _invocation: Invocation) -> HandlerFuture {
    immediate(Ok(json!(server.cache().listing(true))))
}

fn list_source_connections(server: Arc<ProxyServer>, _invocation: Invocation) -> HandlerFuture {
    immediate(Ok(json!(server.sources().listing())))
}

fn invalidate_cache(server: Arc<ProxyServer>, _invocation: Invocation) -> HandlerFuture {
    server.invalidate_cache();
    immediate(Ok(status_pair("0", "success")))
}

fn update_sources(server: Arc<ProxyServer>, invocation: Invocation) -> HandlerFuture {
    let result = parse_params::<String>(invocation.params).map(|csv| {
        match server.update_sources(&csv) {
            Ok(specs) => Value::String(format!("Updated config sources to: {}", specs.join(","))),
            Err(e) => Value::String(e.to_string()),
        }
    });
    immediate(result)
}

fn set_mode(server: Arc<ProxyServer>, invocation: Invocation) -> HandlerFuture {
    let result = parse_params::<String>(invocation.params).map(|name| {
        match server.mode().set_by_name(&name) {
            Ok(_) => status_pair("0", "success"),
            Err(e) => status_pair("1", e.to_string()),
        }
    });
    immediate(result)
}

fn get_mode(server: Arc<ProxyServer>, _invocation: Invocation) -> HandlerFuture {
    immediate(Ok(Value::String(server.mode().get().name().to_string())))
}

fn dump_cache(server: Arc<ProxyServer>, invocation: Invocation) -> HandlerFuture {
    let result = parse_params::<PathBuf>(invocation.params).map(|path| {
        match server.dump_cache(&path) {
            Ok(_) => Value::String(String::new()),
            Err(e) => Value::String(format!("Failed dumping cache to {}: {e}", path.display())),
        }
    });
    immediate(result)
}

fn load_cache(server: Arc<ProxyServer>, invocation: Invocation) -> HandlerFuture {
    let result = parse_params::<PathBuf>(invocation.params).map(|path| {
        match server.load_cache(&path) {
            Ok(stored) => status_pair("0", format!("loaded {stored} entries")),
            Err(e) => status_pair("1", format!("Failed loading cache from {}: {e}", path.display())),
        }
    });
    immediate(result)
}
