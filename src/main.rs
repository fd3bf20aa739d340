//! Codex Bot - Entry Point
//!
//! Modes:
//! - Default: Discord bot, human-readable logs
//! - --json: same bot, JSON logs on stderr

use anyhow::Context;
use codex_bot::{
    AgentRuntime, Config, DiscordConfig, DiscordTransport, MemoryStore, OllamaConfig,
    OllamaOracle, SharedMemory, SqliteBackend,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let json_mode = args.iter().any(|a| a == "--json");
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");

    if help_mode {
        println!("Codex Bot v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: codex-bot [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --json       Log as JSON to stderr");
        println!("  --help, -h   Show this help");
        println!();
        println!("Environment variables:");
        println!("  DISCORD_BOT_TOKEN     Discord bot token (required)");
        println!("  DISCORD_CHANNEL_IDS   Comma-separated channels to listen on");
        println!("  CODEX_DB_PATH         Memory database path");
        println!("  OLLAMA_URL            Ollama endpoint (default: http://localhost:11434)");
        println!("  CODEX_MODEL           Chat model (default: llama3.1)");
        println!("  AGENT_NAME            Agent identity (default: Codex)");
        println!("  DEBOUNCE_WINDOW_MS    Quiet window per channel (default: 10000)");
        println!("  RUST_LOG              Log filter, e.g. info,codex_bot=debug (default: debug)");
        return Ok(());
    }

    // RUST_LOG wins; everything at debug otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    if json_mode {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("Codex Bot v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().context("invalid configuration")?;

    let backend = SqliteBackend::open(&config.db_path).context("failed to open memory database")?;
    let store = MemoryStore::new(Arc::new(backend), config.agent_name.clone());

    let oracle = OllamaOracle::new(OllamaConfig {
        ollama_url: config.ollama_url.clone(),
        model: config.model.clone(),
        embedding_model: config.embedding_model.clone(),
        timeout: config.oracle_timeout,
    })
    .context("failed to build oracle client")?;
    if !oracle.is_available().await {
        warn!("🔮 Ollama not reachable at {}, oracle calls will fail until it is", config.ollama_url);
    }

    let transport = Arc::new(
        DiscordTransport::connect(DiscordConfig::new(
            config.discord_token.clone(),
            config.discord_channel_ids.clone(),
            config.poll_interval,
        ))
        .await
        .context("Discord login failed")?,
    );

    let memory = Arc::new(SharedMemory::load(store, config.limits).await);
    let runtime = AgentRuntime::new(&config, transport.clone(), Arc::new(oracle), memory);

    runtime.startup().await;

    let (tx, rx) = mpsc::channel(256);
    let poller = transport.spawn_poller(tx, runtime.shutdown_signal());
    let inbound = tokio::spawn(Arc::clone(&runtime).run(rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    runtime.shutdown().await;
    let _ = poller.await;
    let _ = inbound.await;

    Ok(())
}
