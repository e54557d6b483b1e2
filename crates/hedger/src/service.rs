//! Periodic tick driver for a hedge session.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info};

use crate::session::HedgeSession;

/// Runs hedge ticks every `tick_interval_secs` until `shutdown` resolves or
/// `max_ticks` ticks have run. Returns the number of ticks run.
///
/// A failed tick is logged and the loop carries on; the affected instrument
/// stays breached until a later tick succeeds.
pub async fn run<F>(session: &mut HedgeSession, max_ticks: Option<u64>, shutdown: F) -> Result<u64>
where
    F: Future<Output = ()>,
{
    let config = session.engine().config().clone();
    info!(
        interval_secs = config.tick_interval_secs,
        band_fraction = config.band_fraction,
        min_band = config.min_band,
        lot_size = %config.lot_size,
        max_trade_units = %config.max_trade_units,
        max_ticks = ?max_ticks,
        "Delta hedger started"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(config.tick_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    session.set_active(true);
    let mut ticks = 0u64;

    loop {
        if max_ticks.is_some_and(|max| ticks >= max) {
            info!(ticks, "Tick limit reached");
            break;
        }

        tokio::select! {
            biased;
            () = &mut shutdown => {
                info!(ticks, "Shutdown requested");
                break;
            }
            _ = interval.tick() => {}
        }

        ticks += 1;
        match session.run_hedge_tick().await {
            Ok(outcome) if outcome.action_taken => {
                info!(tick = ticks, trades = outcome.records.len(), "Hedge tick complete");
            }
            Ok(_) => {}
            Err(e) => error!(tick = ticks, error = %e, "Hedge tick failed"),
        }
    }

    session.set_active(false);
    Ok(ticks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::SimulatedFeed;
    use hedger_core::{ContractSpec, FeedConfig, HedgeConfig, OptionKind};
    use rust_decimal_macros::dec;

    fn session() -> HedgeSession {
        let mut session = HedgeSession::new(HedgeConfig::default()).unwrap();
        let feed = FeedConfig {
            seed: Some(3),
            ..FeedConfig::default()
        };
        session.add_source(
            Box::new(SimulatedFeed::new("EURUSD", feed, 0.05, Duration::from_secs(60))),
            None,
        )
        .unwrap();
        session
            .open_position(&ContractSpec {
                instrument: "EURUSD".to_string(),
                kind: OptionKind::Put,
                strike: dec!(1.2),
                time_to_expiry: 0.5,
                premium: dec!(0),
                multiplier: dec!(1000),
                quantity: -2,
            })
            .unwrap();
        session
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_tick_limit() {
        let mut session = session();
        let ticks = run(&mut session, Some(3), std::future::pending()).await.unwrap();
        assert_eq!(ticks, 3);
        let status = session.status();
        assert_eq!(status.ticks, 3);
        assert!(!status.active);
        assert!(status.hedge_records > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_shutdown() {
        let mut session = session();
        let ticks = run(&mut session, None, async {}).await.unwrap();
        assert_eq!(ticks, 0);
        assert_eq!(session.status().ticks, 0);
    }
}
