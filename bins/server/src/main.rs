mod cmd;
mod config;
mod error;

use clap::Parser;
use config::{Cli, Commands};
use tracing_subscriber::EnvFilter;

/// Фильтр логов, если `RUST_LOG` не задан: свои крейты на `info`, чужие на `warn`.
const DEFAULT_LOG_FILTER: &str =
    "warn,radar_server=info,radar_ingest=info,radar_api_server=info,storage_file=info,storage_memory=info";

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(log_filter()).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Serve(args) => cmd::serve::run(args).await,
    };
    if let Err(e) = result {
        tracing::error!(error = %e, "server stopped");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
