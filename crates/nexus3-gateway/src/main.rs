//! nexus3-server — starts the agent pool's HTTP + SSE gateway, or sends a
//! single JSON-RPC call to an already-running one.
//!
//! Exit codes (§6): 0 success, 2 usage error, 3 connection failure, 4 RPC
//! error.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use nexus3_agent::{AgentPool, PoolComponents};
use nexus3_gateway::config;
use nexus3_gateway::event_hub::EventHubRegistry;
use nexus3_gateway::server::{start_server, ServerConfig};
use nexus3_llm::MockProvider;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "nexus3-server", about = "NEXUS3 multi-agent runtime gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the loopback HTTP + SSE server.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },
    /// Send a single JSON-RPC request to a running server and print the result.
    Call {
        /// Base URL of the running server, e.g. http://127.0.0.1:8787
        #[arg(long, default_value = "http://127.0.0.1:8787")]
        url: String,
        /// Bearer token from the server's ~/.nexus3/server.{port}.key file.
        #[arg(long)]
        token: String,
        /// JSON-RPC method name.
        method: String,
        /// Named params as a JSON object (default: {}).
        #[arg(default_value = "{}")]
        params: String,
    },
    /// Show version.
    Version,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "nexus3=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port, workspace } => {
            init_tracing();
            let workspace_root = workspace.unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
            let loaded = config::load(&workspace_root);

            let server_config = ServerConfig {
                host: host.unwrap_or_else(|| config::server_host(&loaded)),
                port: port.unwrap_or_else(|| config::server_port(&loaded)),
                workspace_root: workspace_root.clone(),
            };

            let event_hubs = EventHubRegistry::new();
            let log_dir = workspace_root.join(".nexus3").join("logs");
            let provider = Arc::new(MockProvider::echo());
            let mut components = PoolComponents::new(provider, log_dir);
            components.event_hub_factory = event_hubs.factory();
            let pool = Arc::new(AgentPool::new(components));

            match start_server(server_config, pool, event_hubs).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("server error: {e}");
                    ExitCode::from(4)
                }
            }
        }

        Commands::Call { url, token, method, params } => {
            let params: serde_json::Value = match serde_json::from_str(&params) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("invalid params JSON: {e}");
                    return ExitCode::from(2);
                }
            };
            call_rpc(&url, &token, &method, params).await
        }

        Commands::Version => {
            println!("nexus3 v{}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
    }
}

async fn call_rpc(url: &str, token: &str, method: &str, params: serde_json::Value) -> ExitCode {
    let client = reqwest::Client::new();
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });

    let response = client.post(url).bearer_auth(token).json(&body).send().await;

    let response = match response {
        Ok(r) => r,
        Err(e) => {
            eprintln!("connection failed: {e}");
            return ExitCode::from(3);
        }
    };

    let status = response.status();
    let body: serde_json::Value = match response.json().await {
        Ok(v) => v,
        Err(e) => {
            eprintln!("connection failed: malformed response body: {e}");
            return ExitCode::from(3);
        }
    };

    if !status.is_success() {
        eprintln!("rpc error: HTTP {status}: {body}");
        return ExitCode::from(4);
    }

    if let Some(error) = body.get("error") {
        eprintln!("rpc error: {error}");
        return ExitCode::from(4);
    }

    println!("{}", serde_json::to_string_pretty(&body.get("result").unwrap_or(&serde_json::Value::Null)).unwrap_or_default());
    ExitCode::SUCCESS
}
