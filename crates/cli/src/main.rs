use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "herald")]
#[command(about = "Herald CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config. Fill in bot.appId, bot.appSecret and bot.baseUri before running the gateway.
    Init {
        /// Config file path (default: HERALD_CONFIG_PATH or ~/.herald/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the gateway: receive conversation updates on /api/messages and send welcome messages.
    Gateway {
        /// Config file path (default: HERALD_CONFIG_PATH or ~/.herald/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 3978)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Dispatch one activity JSON file through the configured connector and store, then print the report.
    Replay {
        /// Activity JSON file
        #[arg(value_name = "EVENT")]
        event: PathBuf,

        /// Config file path (default: HERALD_CONFIG_PATH or ~/.herald/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("herald {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Replay { event, config }) => {
            if let Err(e) = run_replay(event, config).await {
                log::error!("replay failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(herald_core::config::default_config_path);
    let dir = herald_core::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = herald_core::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    herald_core::gateway::run_gateway(config, path).await
}

async fn run_replay(event_path: PathBuf, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = herald_core::config::load_config(config_path)?;
    let raw = std::fs::read_to_string(&event_path)
        .with_context(|| format!("reading event from {}", event_path.display()))?;
    let event: herald_core::activity::ConversationEvent = serde_json::from_str(&raw)
        .with_context(|| format!("parsing event from {}", event_path.display()))?;
    if !event.is_conversation_update() {
        anyhow::bail!("{} is a {} activity, not a conversation update", event_path.display(), event.typ);
    }
    let dispatcher = herald_core::gateway::build_dispatcher(&config, &path).await?;
    let report = dispatcher.handle_conversation_update(&event).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
