use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::OblakaConfig;
use oblaka_core::{ChatRequest, ClientPool, Dispatcher, StatusReporter};
use oblaka_gateway::server::{GatewayServer, GatewayState};

#[derive(Parser)]
#[command(name = "oblaka")]
#[command(version)]
#[command(about = "Oblaka: chat gateway for OpenAI and Gemini")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve,

    /// Send a one-shot message through the dispatcher
    Ask {
        /// The message to send
        message: String,

        /// Provider id: "openai" or "gemini"
        #[arg(short, long, default_value = "gemini")]
        model: String,

        #[arg(long)]
        max_tokens: Option<i64>,

        #[arg(long)]
        temperature: Option<f64>,
    },

    /// Probe providers and print availability
    Check,

    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    load_dotenv();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Serve => cmd_serve(&cli.config).await,
        Commands::Check => cmd_check(&cli.config).await,
        Commands::Ask {
            message,
            model,
            max_tokens,
            temperature,
        } => {
            let request = ChatRequest {
                message,
                model,
                max_tokens,
                temperature,
            };
            cmd_ask(&cli.config, request).await
        }
    }
}

fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Failed to load .env file: {}", e),
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        info!("Created default config at {}", config_path.display());
    }

    println!("Oblaka initialized at {}", config_dir.display());
    println!("Edit {} or export OPENAI_API_KEY / GEMINI_API_KEY.", config_path.display());
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = OblakaConfig::load(config_path)?;
    println!("{:#?}", cfg);
    Ok(())
}

async fn connect(cfg: &OblakaConfig) -> Result<ClientPool> {
    ClientPool::connect(&cfg.to_pool_config())
        .await
        .context("Failed to build provider clients")
}

async fn cmd_serve(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = OblakaConfig::load(config_path)?;
    info!("Starting Oblaka gateway...");

    let pool = connect(&cfg).await?;
    let state = GatewayState {
        dispatcher: Arc::new(Dispatcher::from_pool(&pool, cfg.request_timeout())),
        status: Arc::new(StatusReporter::from_pool(&pool)),
        debug_token: cfg.server.debug_token.clone(),
    };
    if state.debug_token.is_empty() {
        warn!("No debug_token configured; /debug is open to any caller");
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
        }
        shutdown.cancel();
    });

    let server = GatewayServer::new(cfg.server.socket_addr()?, state);
    server.run(cancel).await?;

    println!("Oblaka stopped.");
    Ok(())
}

async fn cmd_check(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = OblakaConfig::load(config_path)?;
    let pool = connect(&cfg).await?;
    let status = StatusReporter::from_pool(&pool);

    println!("{}", serde_json::to_string_pretty(&status.health())?);
    println!("{}", serde_json::to_string_pretty(&status.debug_info())?);
    for model in status.list_models() {
        println!("  {:<8} {}", model.id, model.name);
    }
    Ok(())
}

async fn cmd_ask(config_path: &Option<PathBuf>, request: ChatRequest) -> Result<()> {
    let cfg = OblakaConfig::load(config_path)?;
    let pool = connect(&cfg).await?;
    let dispatcher = Dispatcher::from_pool(&pool, cfg.request_timeout());

    let response = dispatcher.chat(&request).await?;
    println!("{}", response.response);
    match response.tokens_used {
        Some(tokens) => info!("Answered by {} ({} tokens)", response.model_used, tokens),
        None => info!("Answered by {}", response.model_used),
    }
    Ok(())
}
