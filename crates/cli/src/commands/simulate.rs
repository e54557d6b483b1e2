//! Replayable simulation: seeded feeds, ticks run back-to-back.

use anyhow::Result;
use clap::Args;
use hedger::HedgeSession;
use tracing::{error, info};

use super::load_config;

/// Arguments for the simulate command.
#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml")]
    pub config: String,

    /// Config profile layered over the base file (config/Config.{profile}.toml)
    #[arg(long)]
    pub profile: Option<String>,

    /// Number of ticks to run
    #[arg(long, default_value_t = 100)]
    pub ticks: u64,

    /// Seed for every feed, overriding the config
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Runs the simulate command and prints the final report as JSON.
///
/// # Errors
/// Returns an error if the config is invalid or a seed position is rejected.
pub async fn run_simulate(args: SimulateArgs) -> Result<()> {
    let mut config = load_config(&args.config, args.profile.as_deref())?;
    if let Some(seed) = args.seed {
        config.feed.seed = Some(seed);
        for inst in &mut config.instruments {
            inst.seed = Some(seed);
        }
    }

    let mut session = HedgeSession::from_config(&config)?;
    info!(ticks = args.ticks, positions = config.positions.len(), "Starting simulation");

    let mut failures = 0u64;
    for tick in 1..=args.ticks {
        if let Err(e) = session.run_hedge_tick().await {
            failures += 1;
            error!(tick, error = %e, "Hedge tick failed");
        }
    }

    let report = session.report();
    info!(
        ticks = args.ticks,
        failures,
        hedge_trades = report.hedge_trades,
        total_pnl = report.total_pnl,
        "Simulation complete"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
