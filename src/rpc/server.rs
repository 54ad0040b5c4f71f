//! HTTP front end for the RPC gateway.
//!
//! # Responsibilities
//! - Accept connections through the bounded listener
//! - Serve HTTP/1.1 and HTTP/2 on each connection with an axum router
//! - Attach the connection's `Target` to every request on it
//! - Invalidate the target when the connection ends
//! - Stop accepting, drain workers, then abort connections on shutdown

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::Request,
    routing::post,
    Extension, Json, Router,
};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tower::ServiceExt;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::config::RpcConfig;
use crate::net::{ConnectionId, ConnectionTracker, Listener, ListenerError, Target};
use crate::rpc::dispatch::{Dispatcher, Invocation};
use crate::rpc::protocol::{error_code, RpcResponse};
use crate::rpc::responder::Responder;

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
}

/// Invalidates the target when the connection task ends, aborted or not.
struct InvalidateOnDrop(Target);

impl Drop for InvalidateOnDrop {
    fn drop(&mut self) {
        self.0.invalidate();
    }
}

pub struct RpcServer {
    dispatcher: Arc<Dispatcher>,
    tracker: ConnectionTracker,
    max_body_bytes: usize,
    shutdown_timeout: Duration,
}

impl RpcServer {
    pub fn new(dispatcher: Arc<Dispatcher>, config: &RpcConfig) -> Self {
        Self {
            dispatcher,
            tracker: ConnectionTracker::new(),
            max_body_bytes: config.max_body_bytes,
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
        }
    }

    /// The router served on every connection.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/rpc/{method}", post(rpc_handler))
            .with_state(AppState {
                dispatcher: self.dispatcher.clone(),
            })
            .layer(RequestBodyLimitLayer::new(self.max_body_bytes))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` fires.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let app = self.router();
        let mut connections = JoinSet::new();

        tracing::info!(
            methods = ?self.dispatcher.methods(),
            workers = self.dispatcher.pool().size(),
            "RPC server starting"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(connection) => connection,
                        Err(ListenerError::Accept(e)) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                        Err(e) => return Err(e),
                    };

                    let id = ConnectionId::new();
                    let target = Target::new(id, Some(peer));
                    let guard = self.tracker.track(id);
                    let request_target = target.clone();
                    let service = app.clone().map_request(move |mut req: Request<Incoming>| {
                        req.extensions_mut().insert(request_target.clone());
                        req
                    });

                    connections.spawn(async move {
                        let _permit = permit;
                        let _guard = guard;
                        let _invalidate = InvalidateOnDrop(target);

                        let served = auto::Builder::new(TokioExecutor::new())
                            .serve_connection(TokioIo::new(stream), TowerToHyperService::new(service))
                            .await;
                        if let Err(e) = served {
                            tracing::debug!(connection = %id, peer = %peer, error = %e, "Connection ended with error");
                        }
                    });
                }
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            tracing::warn!(error = %e, "Connection task panicked");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("RPC server received shutdown signal, no longer accepting");
                    break;
                }
            }
        }
        drop(listener);

        let drained = self.dispatcher.pool().shutdown(self.shutdown_timeout).await;
        tracing::info!(
            drained,
            open_connections = self.tracker.open_connections(),
            "Closing remaining connections"
        );
        connections.abort_all();
        while connections.join_next().await.is_some() {}

        tracing::info!("RPC server stopped");
        Ok(())
    }
}

async fn rpc_handler(
    State(state): State<AppState>,
    Path(method): Path<String>,
    Extension(target): Extension<Target>,
    body: Bytes,
) -> Json<RpcResponse> {
    let params = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(params) => params,
            Err(e) => {
                return Json(RpcResponse::error(
                    error_code::ILLEGAL_PARAMETERS,
                    format!("Request body is not valid JSON: {e}"),
                ))
            }
        }
    };

    let (responder, rx) = Responder::channel(&method);
    state
        .dispatcher
        .dispatch(&method, Invocation { params, target }, responder);

    match rx.await {
        Ok(response) => Json(response),
        Err(_) => Json(RpcResponse::error(
            error_code::REQUEST_ABANDONED,
            "Request was abandoned before a response was produced",
        )),
    }
}
