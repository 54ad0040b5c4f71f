//! config-proxy: caching long-poll proxy for config clients.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                     CONFIG PROXY                      │
//!   getConfig         │  ┌─────────┐   ┌──────────┐   ┌────────────────────┐ │
//!   ──────────────────┼─▶│   net   │──▶│   rpc    │──▶│  proxy::resolve    │ │
//!                     │  │listener │   │ dispatch │   │                    │ │
//!                     │  └─────────┘   └────┬─────┘   └──┬──────────┬──────┘ │
//!                     │                     │ Wait       │ hit      │ miss   │
//!                     │                     ▼            ▼          ▼        │
//!                     │              ┌───────────┐  ┌───────┐  ┌─────────┐   │   config
//!   response          │              │  delayed  │◀─│ cache │◀─│ source  │◀──┼── sources
//!   ◀─────────────────┼──────────────│ registry  │  └───────┘  │failover │   │
//!                     │              └───────────┘             └────▲────┘   │
//!                     │                                   refresher ┘        │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use config_proxy::config::{self, ConfigError, ProxyConfig};
use config_proxy::lifecycle::{signals, startup};
use config_proxy::observability::{logging, metrics};
use config_proxy::proxy::Mode;

#[derive(Parser, Debug)]
#[command(name = "config-proxy", version, about = "Caching long-poll proxy for config clients")]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(long)]
    bind: Option<String>,

    /// Override sources.addresses (comma separated).
    #[arg(long)]
    sources: Option<String>,

    /// Override the startup mode (default or memorycache).
    #[arg(long)]
    mode: Option<String>,
}

fn load(args: &Args) -> Result<ProxyConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => ProxyConfig::default(),
    };

    if let Some(bind) = &args.bind {
        config.listener.bind_address = bind.clone();
    }
    if let Some(sources) = &args.sources {
        config.sources.addresses = config_proxy::source::split_source_list(sources);
    }
    if let Some(mode) = &args.mode {
        config.mode = Mode::parse(mode)?;
    }

    config::validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load(&args)?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "config-proxy starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        workers = config.rpc.worker_threads,
        mode = %config.mode,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let running = startup::start(config).await?;
    signals::wait_for_shutdown().await;
    running.stop().await;
    Ok(())
}
