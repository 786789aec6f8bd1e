//! Signal relay - connects relay channels to their sharded protocol daemons.

mod adapters;
mod app;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use relay_config_and_utils::{init_logging, Config, Paths};

/// Signal relay command-line interface.
#[derive(Parser)]
#[command(name = "signal-relay")]
#[command(about = "Relay core for channels served by sharded protocol daemons")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (pid, logs, config, channels). Defaults to ~/.signal-relay
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Config file to read instead of <base-dir>/config.json
    #[arg(long, global = true, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay in the foreground
    Start,
    /// Stop a running relay
    Stop,
    /// Show relay and shard socket status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(&paths)?,
    };

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.log_level.clone());
    init_logging(&level, Some(paths.log_file()));

    match cli.command {
        Some(Commands::Start) | None => {
            app::run_relay(config, paths).await?;
        }
        Some(Commands::Stop) => {
            app::stop_relay(&paths).await?;
        }
        Some(Commands::Status) => {
            app::check_status(&config, &paths);
        }
    }

    Ok(())
}
