//! Long-running hedge loop.

use anyhow::Result;
use clap::Args;
use hedger::{service, HedgeSession};
use tracing::{info, warn};

use super::load_config;

/// Arguments for the run command.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml")]
    pub config: String,

    /// Config profile layered over the base file (config/Config.{profile}.toml)
    #[arg(long)]
    pub profile: Option<String>,

    /// Stop after this many ticks
    #[arg(long)]
    pub max_ticks: Option<u64>,

    /// Print the final report as JSON on exit
    #[arg(long)]
    pub report: bool,
}

/// Runs the hedge loop until Ctrl-C or the tick limit.
///
/// # Errors
/// Returns an error if the config is invalid or a seed position is rejected.
pub async fn run_service(args: RunArgs) -> Result<()> {
    let config = load_config(&args.config, args.profile.as_deref())?;
    if config.broker.api_key.is_some() {
        warn!("Broker credentials configured but hedges are simulated");
    }

    let mut session = HedgeSession::from_config(&config)?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let ticks = service::run(&mut session, args.max_ticks, shutdown).await?;
    let status = session.status();
    info!(
        ticks,
        open_positions = status.open_positions,
        hedge_records = status.hedge_records,
        failures = status.engine.failures,
        "Delta hedger stopped"
    );

    if args.report {
        println!("{}", serde_json::to_string_pretty(&session.report())?);
    }
    Ok(())
}
