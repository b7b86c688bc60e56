use anyhow::Result;
use assistant::AssistantCore;
use clap::{Parser, Subcommand};
use config::CoreConfig;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(
    name = "assistant-core",
    author,
    version,
    about = "Inspect and maintain conversation state and the classification cache"
)]
struct Cli {
    /// TOML or YAML config file. Environment variables are used when absent.
    #[arg(long, global = true, env = "ASSISTANT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Show state, history and counters for one conversation")]
    Stats {
        #[arg(long, help = "Conversation key")]
        key: String,
    },

    #[command(about = "Show classification cache and retry efficiency")]
    CacheStats,

    #[command(about = "Remove every conversation record and cached classification")]
    ClearAll,
}

fn load_config(path: Option<&PathBuf>) -> Result<CoreConfig> {
    let config = match path {
        Some(path) => config::load_from_file(path)?,
        None => config::load_from_env()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.logging_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let core = AssistantCore::connect(config).await?;

    let output = match cli.command {
        Commands::Stats { key } => match core.stats(&key).await {
            Some(stats) => serde_json::to_value(stats)?,
            None => anyhow::bail!("conversation key must not be empty"),
        },
        Commands::CacheStats => serde_json::to_value(core.efficiency_stats())?,
        Commands::ClearAll => serde_json::to_value(core.clear_all().await)?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    core.shutdown();
    Ok(())
}
