//! Method table, worker pool and the exactly-once response boundary.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::model::{ConfigRequest, ValidationError};
use crate::net::Target;
use crate::observability::metrics;
use crate::proxy::ProxyServer;
use crate::rpc::handlers;
use crate::rpc::protocol::{error_code, RpcResponse};
use crate::rpc::responder::Responder;

/// Input to a handler.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub params: Value,
    pub target: Target,
}

/// What a handler produced.
#[derive(Debug)]
pub enum Reply {
    /// Answer now.
    Value(Value),
    /// Park in the long-poll registry; answered later or never.
    Deferred(ConfigRequest),
}

/// A failure that becomes an error response.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Unknown method '{0}'")]
    UnknownMethod(String),
    #[error("Illegal parameters: {0}")]
    IllegalParameters(String),
    #[error("Illegal protocol version {version} in request {request}, only protocol versions {supported:?} are supported")]
    ProtocolVersion {
        version: u32,
        request: String,
        supported: &'static [u32],
    },
    #[error("Parameters for request {request} did not validate: {source}")]
    Validation {
        request: String,
        source: ValidationError,
    },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RpcError {
    pub fn code(&self) -> i32 {
        match self {
            RpcError::UnknownMethod(_) => error_code::UNKNOWN_METHOD,
            RpcError::IllegalParameters(_) => error_code::ILLEGAL_PARAMETERS,
            RpcError::ProtocolVersion { .. } => error_code::ILLEGAL_PROTOCOL_VERSION,
            RpcError::Validation { source, .. } => match source {
                ValidationError::IllegalKey(_) => error_code::ILLEGAL_CONFIG_KEY,
                ValidationError::IllegalGeneration(_) => error_code::ILLEGAL_GENERATION,
                ValidationError::IllegalContentHash(_) => error_code::ILLEGAL_CONTENT_HASH,
            },
            RpcError::Internal(_) => error_code::INTERNAL_ERROR,
        }
    }

    pub fn into_response(self) -> RpcResponse {
        RpcResponse::error(self.code(), self.to_string())
    }
}

pub type HandlerFuture = BoxFuture<'static, Result<Reply, RpcError>>;
pub type HandlerFn = fn(Arc<ProxyServer>, Invocation) -> HandlerFuture;

/// Fixed-size pool every dispatched call runs on.
///
/// Tasks are spawned immediately but only run while holding a permit, so at
/// most `size` handlers execute at once.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        tokio::spawn(async move {
            match permits.acquire_owned().await {
                Ok(_permit) => task.await,
                Err(_) => tracing::debug!("Worker pool closed, dropping task"),
            }
        });
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn busy(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    /// Wait up to `timeout` for running tasks, then refuse new ones.
    ///
    /// Returns true if every worker finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let drained = tokio::time::timeout(timeout, self.permits.acquire_many(self.size as u32))
            .await
            .map(|permits| permits.is_ok())
            .unwrap_or(false);
        self.permits.close();
        if !drained {
            tracing::warn!(busy = self.busy(), "Worker pool did not drain before the shutdown deadline");
        }
        drained
    }
}

/// Routes a method name to its handler on the worker pool.
pub struct Dispatcher {
    server: Arc<ProxyServer>,
    table: HashMap<&'static str, HandlerFn>,
    pool: WorkerPool,
}

impl Dispatcher {
    pub fn new(server: Arc<ProxyServer>, pool: WorkerPool) -> Self {
        Self {
            server,
            table: handlers::method_table(),
            pool,
        }
    }

    pub fn server(&self) -> &Arc<ProxyServer> {
        &self.server
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn methods(&self) -> Vec<&'static str> {
        let mut methods: Vec<_> = self.table.keys().copied().collect();
        methods.sort_unstable();
        methods
    }

    /// Run `method` on the pool; `responder` is answered exactly once or
    /// handed to the long-poll registry.
    pub fn dispatch(&self, method: &str, invocation: Invocation, responder: Responder) {
        let Some((&name, &handler)) = self.table.get_key_value(method) else {
            let error = RpcError::UnknownMethod(method.to_string());
            metrics::record_rpc_error(error.code());
            tracing::debug!(request = %responder.log_id(), "Unknown method");
            responder.send(error.into_response());
            return;
        };

        let server = self.server.clone();
        self.pool.spawn(async move {
            let start = Instant::now();
            let run = {
                let server = server.clone();
                async move { handler(server, invocation).await }
            };
            let outcome = AssertUnwindSafe(run).catch_unwind().await;

            let label = match outcome {
                Ok(Ok(Reply::Value(value))) => {
                    responder.send(RpcResponse::Result(value));
                    "ok"
                }
                Ok(Ok(Reply::Deferred(request))) => {
                    server.defer(request, responder);
                    "deferred"
                }
                Ok(Err(error)) => {
                    let code = error.code();
                    tracing::debug!(request = %responder.log_id(), code, error = %error, "Request failed");
                    metrics::record_rpc_error(code);
                    responder.send(error.into_response());
                    "error"
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::warn!(request = %responder.log_id(), panic = %message, "Handler panicked");
                    metrics::record_rpc_error(error_code::INTERNAL_ERROR);
                    responder.send(RpcError::Internal(message).into_response());
                    "panic"
                }
            };
            metrics::record_rpc_request(name, label, start);
        });
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("methods", &self.methods())
            .field("pool", &self.pool)
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
