use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Admin CLI for the config proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:19090")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the proxy answers
    Ping,
    /// Show pending long-poll requests
    Statistics,
    /// List cached configs
    Cache {
        /// Include payloads
        #[arg(long)]
        full: bool,
    },
    /// Show the active and configured sources
    Sources,
    /// Replace the source list (comma separated)
    UpdateSources { sources: String },
    /// Drop every cached config
    InvalidateCache,
    /// Show the serving mode
    GetMode,
    /// Switch serving mode (default or memorycache)
    SetMode { mode: String },
    /// Write the cache to a file on the proxy host
    DumpCache { path: String },
    /// Load a cache dump from a file on the proxy host
    LoadCache { path: String },
    /// Fetch one config
    GetConfig {
        namespace: String,
        name: String,
        #[arg(default_value = "")]
        config_id: String,
        #[arg(long, default_value_t = 0)]
        generation: i64,
        #[arg(long, default_value = "")]
        content_hash: String,
    },
}

impl Commands {
    fn into_call(self) -> (&'static str, Value) {
        match self {
            Commands::Ping => ("ping", Value::Null),
            Commands::Statistics => ("printStatistics", Value::Null),
            Commands::Cache { full: false } => ("listCachedConfig", Value::Null),
            Commands::Cache { full: true } => ("listCachedConfigFull", Value::Null),
            Commands::Sources => ("listSourceConnections", Value::Null),
            Commands::UpdateSources { sources } => ("updateSources", json!(sources)),
            Commands::InvalidateCache => ("invalidateCache", Value::Null),
            Commands::GetMode => ("getMode", Value::Null),
            Commands::SetMode { mode } => ("setMode", json!(mode)),
            Commands::DumpCache { path } => ("dumpCache", json!(path)),
            Commands::LoadCache { path } => ("loadCache", json!(path)),
            Commands::GetConfig {
                namespace,
                name,
                config_id,
                generation,
                content_hash,
            } => (
                "getConfig",
                json!({
                    "key": {"namespace": namespace, "name": name, "config_id": config_id},
                    "generation": generation,
                    "content_hash": content_hash,
                    "protocol_version": 3
                }),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let (method, params) = cli.command.into_call();

    let mut request = client.post(format!("{}/rpc/{}", cli.url.trim_end_matches('/'), method));
    if !params.is_null() {
        request = request.json(&params);
    }
    let res = request.send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: proxy returned HTTP status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("{}", text);
        }
        std::process::exit(1);
    }

    let body: Value = res.json().await?;
    if let Some(error) = body.get("error") {
        eprintln!("Error: {}", serde_json::to_string_pretty(error)?);
        std::process::exit(1);
    }
    let result = body.get("result").cloned().unwrap_or(Value::Null);
    match result {
        Value::String(text) => println!("{}", text),
        other => println!("{}", serde_json::to_string_pretty(&other)?),
    }
    Ok(())
}
