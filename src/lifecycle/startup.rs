//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the orchestrator and its source connections from configuration
//! - Preload the cache from a dump when configured
//! - Bind the listener and start the RPC server and the refresher
//! - Stop both on shutdown and optionally dump the cache
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener binds last (traffic only when ready)

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::cache::DumpError;
use crate::config::{CacheConfig, ProxyConfig};
use crate::lifecycle::Shutdown;
use crate::net::{Listener, ListenerError};
use crate::proxy::ProxyServer;
use crate::rpc::{Dispatcher, RpcServer, WorkerPool};
use crate::source::{HttpSourceClient, SourceConnections, SourceError, UpstreamRefresher};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid config sources: {0}")]
    Sources(#[from] SourceError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("failed to preload cache from {path}: {source}")]
    Preload { path: PathBuf, source: DumpError },
}

/// Build the orchestrator, preloading the cache if configured.
pub fn build_server(config: &ProxyConfig) -> Result<Arc<ProxyServer>, StartupError> {
    let fetch_timeout = Duration::from_millis(config.sources.fetch_timeout_ms);
    let client = HttpSourceClient::new(fetch_timeout)?;
    let sources = SourceConnections::new(
        &config.sources.addresses,
        Arc::new(client),
        config.sources.failover_threshold,
        fetch_timeout,
    )?;
    let server = Arc::new(ProxyServer::new(sources, config.mode));

    tracing::info!(
        mode = %config.mode,
        sources = ?config.sources.addresses,
        "Proxy server initialized"
    );

    preload_cache(&server, &config.cache)?;
    Ok(server)
}

/// Load `cache.preload_path` if it exists. Returns the number of entries stored.
pub fn preload_cache(server: &ProxyServer, cache: &CacheConfig) -> Result<usize, StartupError> {
    let Some(path) = &cache.preload_path else {
        return Ok(0);
    };
    if !path.exists() {
        tracing::info!(path = %path.display(), "No cache dump to preload");
        return Ok(0);
    }
    server.load_cache(path).map_err(|source| StartupError::Preload {
        path: path.clone(),
        source,
    })
}

/// A started proxy.
pub struct RunningProxy {
    server: Arc<ProxyServer>,
    local_addr: SocketAddr,
    shutdown: Shutdown,
    rpc_task: JoinHandle<Result<(), ListenerError>>,
    refresher_task: JoinHandle<()>,
    dump_on_shutdown: Option<PathBuf>,
}

/// Build everything, bind, and start serving.
pub async fn start(config: ProxyConfig) -> Result<RunningProxy, StartupError> {
    let server = build_server(&config)?;

    let pool = WorkerPool::new(config.rpc.worker_threads);
    let dispatcher = Arc::new(Dispatcher::new(server.clone(), pool));
    let rpc = RpcServer::new(dispatcher, &config.rpc);
    let refresher = UpstreamRefresher::new(server.clone(), &config.sources);

    let listener = Listener::bind(&config.listener).await?;
    let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

    let shutdown = Shutdown::new();
    let refresher_task = tokio::spawn(refresher.run(shutdown.subscribe()));
    let rpc_task = tokio::spawn(rpc.run(listener, shutdown.subscribe()));

    tracing::info!(address = %local_addr, "Config proxy ready");

    Ok(RunningProxy {
        server,
        local_addr,
        shutdown,
        rpc_task,
        refresher_task,
        dump_on_shutdown: config.cache.dump_on_shutdown,
    })
}

impl RunningProxy {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn server(&self) -> &Arc<ProxyServer> {
        &self.server
    }

    /// Stop accepting, drain, stop the refresher, then dump if configured.
    pub async fn stop(self) {
        let listening = self.shutdown.trigger();
        tracing::info!(tasks = listening, "Shutting down");

        match self.rpc_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "RPC server failed"),
            Err(e) => tracing::error!(error = %e, "RPC server task did not finish cleanly"),
        }
        if let Err(e) = self.refresher_task.await {
            tracing::error!(error = %e, "Refresher task did not finish cleanly");
        }

        if let Some(path) = &self.dump_on_shutdown {
            dump_on_shutdown(&self.server, path);
        }
        tracing::info!("Shutdown complete");
    }
}

fn dump_on_shutdown(server: &ProxyServer, path: &Path) {
    if let Err(e) = server.dump_cache(path) {
        tracing::error!(path = %path.display(), error = %e, "Failed to dump cache on shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CacheKey, RawConfig};
    use crate::proxy::Mode;

    fn memorycache_config() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.mode = Mode::MemoryCache;
        config.listener.bind_address = "127.0.0.1:0".into();
        config
    }

    #[test]
    fn missing_preload_file_is_skipped() {
        let mut config = memorycache_config();
        config.cache.preload_path = Some(PathBuf::from("/nonexistent/config-proxy.dump"));
        let server = build_server(&config).unwrap();
        assert!(server.cache().is_empty());
    }

    #[test]
    fn corrupt_preload_file_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump");
        std::fs::write(&path, "not,a,valid\n").unwrap();

        let mut config = memorycache_config();
        config.cache.preload_path = Some(path);
        assert!(matches!(build_server(&config), Err(StartupError::Preload { .. })));
    }

    #[tokio::test]
    async fn dumps_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump");
        let mut config = memorycache_config();
        config.cache.dump_on_shutdown = Some(path.clone());

        let running = start(config).await.unwrap();
        assert_ne!(running.local_addr().port(), 0);
        running
            .server()
            .update_config(RawConfig::new(CacheKey::new("ns", "cfg", "id", ""), "x", 1, false));
        running.stop().await;

        let dumped = std::fs::read_to_string(path).unwrap();
        assert!(dumped.starts_with("ns.cfg,id,1,"));
    }
}
