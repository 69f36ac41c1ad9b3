mod cmd;

use clap::{Parser, Subcommand};
use cmd::config::{GenerateArgs, ReplayArgs};

#[derive(Parser)]
#[command(name = "radar-replay", about = "Проигрывание и генерация треков для UDP ingest")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Проиграть JSON файл с треками в UDP
    Send(ReplayArgs),
    /// Сгенерировать синтетические треки излучателей
    Generate(GenerateArgs),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,radar_replay=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let work = async {
        match &cli.command {
            Commands::Send(args) => cmd::replay::run(args).await,
            Commands::Generate(args) => cmd::generate::run(args).await,
        }
    };
    let result = tokio::select! {
        res = work => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("stream stopped");
            Ok(())
        }
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
