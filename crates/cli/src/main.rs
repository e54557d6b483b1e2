use clap::{Parser, Subcommand};

mod commands;

use commands::{PriceArgs, RunArgs, SimulateArgs};

#[derive(Parser)]
#[command(name = "delta-hedger")]
#[command(about = "Delta hedging of option positions with the underlying", long_about = None)]
struct Cli {
    /// Optional log file path (logs to file instead of stderr)
    #[arg(long, global = true)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Value a single option contract
    Price(PriceArgs),
    /// Run a fixed number of ticks back-to-back on simulated feeds and print the report
    Simulate(SimulateArgs),
    /// Run the hedge loop at the configured interval until Ctrl-C
    Run(RunArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            // stdout carries the JSON output
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    match cli.command {
        Commands::Price(args) => commands::run_price(args)?,
        Commands::Simulate(args) => commands::run_simulate(args).await?,
        Commands::Run(args) => commands::run_service(args).await?,
    }

    Ok(())
}
