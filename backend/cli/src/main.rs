mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use agora_gateway::{router, GatewayState};
use agora_runtime::{AgentRuntime, EchoRunner};

use config::CliConfig;

#[derive(Parser)]
#[command(name = "agora")]
#[command(about = "Agora, a declarative agent runtime")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Agora runtime server
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
        /// Path to the agent configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Validate the configuration and pre-flight all enabled agents
    Check {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List configured agents
    Agents {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Probe a running server's health endpoint
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_config = CliConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli_config.log_level)),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, config } => {
            let cli_config = CliConfig {
                port: port.unwrap_or(cli_config.port),
                config_path: config.unwrap_or(cli_config.config_path),
                log_level: cli_config.log_level,
            };
            run_server(cli_config).await?;
        }
        Commands::Check { config } => {
            let path = config.unwrap_or(cli_config.config_path);
            let runtime_config = agora_config::load_and_prepare(&path).await?;
            let runtime = AgentRuntime::new(runtime_config, Arc::new(EchoRunner));
            runtime.startup().await?;
            println!("ok: {} validated", path.display());
        }
        Commands::Agents { config } => {
            let path = config.unwrap_or(cli_config.config_path);
            let runtime_config = agora_config::load_and_prepare(&path).await?;
            let runtime = AgentRuntime::new(runtime_config, Arc::new(EchoRunner));
            for agent in runtime.list_agents().await {
                let marker = if agent.enabled { "" } else { " (disabled)" };
                println!("{}  [{}]{}", agent.id, agent.model, marker);
            }
        }
        Commands::Status => {
            let client = reqwest::Client::new();
            let url = format!("http://localhost:{}/api/health", cli_config.port);
            match client.get(&url).send().await {
                Ok(resp) => {
                    let body: serde_json::Value = resp.json().await?;
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                Err(_) => {
                    println!("Server not reachable at {url}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

async fn run_server(cli_config: CliConfig) -> Result<()> {
    let runtime_config = agora_config::load_and_prepare(&cli_config.config_path).await?;
    let runtime = Arc::new(AgentRuntime::new(runtime_config, Arc::new(EchoRunner)));
    runtime.startup().await?;

    let state = GatewayState {
        runtime: Arc::clone(&runtime),
    };
    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([127, 0, 0, 1], cli_config.port));
    info!("Agora listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received");
        }
    }

    runtime.shutdown().await;
    Ok(())
}
