//! Hedge policy: decides and commits underlying trades that bring each
//! instrument's net delta back inside its band.
//!
//! A tick reads an exposure snapshot, plans orders from it and commits them
//! against the snapshot's revision. If the book moved in between, the tick is
//! re-planned once from a fresh snapshot. A second conflict, or any other
//! commit rejection, fails the tick and leaves the instrument `Breached`;
//! nothing is partially applied. An exposure that no whole-lot trade can bring
//! inside its band is also left `Breached` and reported as an error.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hedger_core::{HedgeConfig, InstrumentId, MarketState};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::book::{BookHandle, ExposureSnapshot};
use crate::error::{BookError, HedgeError};
use crate::pricing::PricingModel;
use crate::types::{HedgeOrder, HedgeRecord};

/// Commit attempts per instrument per tick.
const MAX_ATTEMPTS: u32 = 2;

/// Whether an instrument's net exposure sits inside its band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExposureState {
    #[default]
    Balanced,
    Breached,
}

/// Result of one hedge tick for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentOutcome {
    pub instrument: InstrumentId,
    pub action_taken: bool,
    pub exposure_before: f64,
    pub exposure_after: f64,
    pub band: f64,
    /// Ledger records appended by this tick.
    pub records: Vec<HedgeRecord>,
}

/// Last known hedge state of one instrument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentStatus {
    pub state: ExposureState,
    pub net_exposure: f64,
    pub band: f64,
    pub last_tick: Option<DateTime<Utc>>,
    pub last_hedge: Option<DateTime<Utc>>,
}

/// Engine counters and per-instrument state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub config: HedgeConfig,
    pub ticks: u64,
    pub hedges: u64,
    pub failures: u64,
    pub instruments: BTreeMap<InstrumentId, InstrumentStatus>,
}

#[derive(Debug)]
pub struct HedgeEngine {
    config: HedgeConfig,
    instruments: BTreeMap<InstrumentId, InstrumentStatus>,
    ticks: u64,
    hedges: u64,
    failures: u64,
}

impl HedgeEngine {
    pub fn new(config: HedgeConfig) -> Self {
        Self {
            config,
            instruments: BTreeMap::new(),
            ticks: 0,
            hedges: 0,
            failures: 0,
        }
    }

    pub fn config(&self) -> &HedgeConfig {
        &self.config
    }

    /// Replaces the hedge policy. Applies from the next tick.
    ///
    /// # Errors
    ///
    /// Rejects an inconsistent config and keeps the current one.
    pub fn update_config(&mut self, config: HedgeConfig) -> anyhow::Result<()> {
        config.validate()?;
        info!(
            band_fraction = config.band_fraction,
            min_band = config.min_band,
            max_trade_units = %config.max_trade_units,
            "Hedge config updated"
        );
        self.config = config;
        Ok(())
    }

    pub fn state(&self, instrument: &str) -> ExposureState {
        self.instruments
            .get(instrument)
            .map_or(ExposureState::Balanced, |s| s.state)
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            config: self.config.clone(),
            ticks: self.ticks,
            hedges: self.hedges,
            failures: self.failures,
            instruments: self.instruments.clone(),
        }
    }

    /// Runs one hedge tick for `state.instrument`.
    ///
    /// # Errors
    ///
    /// `Pricing` if a live position cannot be valued (the book is untouched),
    /// `Unhedgeable` if the exposure is outside its band and no whole-lot
    /// trade brings it back inside, `Failed` if the commit was rejected.
    /// Only a stale revision is retried.
    pub fn run_tick<B: BookHandle + ?Sized>(
        &mut self,
        book: &B,
        pricing: &dyn PricingModel,
        state: &MarketState,
        lot_size: Decimal,
    ) -> Result<InstrumentOutcome, HedgeError> {
        self.ticks += 1;
        let instrument = state.instrument.clone();
        let mut attempt = 0;

        let source = loop {
            attempt += 1;
            let snapshot = book.snapshot(pricing, state)?;
            let band = self.config.effective_band(snapshot.gross_units);
            let orders = plan_hedge(&snapshot, &self.config, lot_size);
            let traded: Decimal = orders.iter().map(|o| o.units).sum();
            let exposure_after = snapshot.net_exposure + traded.to_f64().unwrap_or_default();

            debug!(
                instrument = %instrument,
                attempt,
                net_exposure = snapshot.net_exposure,
                band,
                orders = orders.len(),
                "Hedge check"
            );

            if exposure_after.abs() > band {
                self.failures += 1;
                self.record(&instrument, ExposureState::Breached, snapshot.net_exposure, band, state.as_of);
                error!(
                    instrument = %instrument,
                    net_exposure = snapshot.net_exposure,
                    band,
                    lot_size = %lot_size,
                    "Exposure cannot be hedged inside band"
                );
                return Err(HedgeError::Unhedgeable {
                    instrument,
                    net_exposure: snapshot.net_exposure,
                    band,
                    lot_size,
                });
            }

            if orders.is_empty() {
                self.record(&instrument, ExposureState::Balanced, snapshot.net_exposure, band, state.as_of);
                return Ok(InstrumentOutcome {
                    instrument,
                    action_taken: false,
                    exposure_before: snapshot.net_exposure,
                    exposure_after: snapshot.net_exposure,
                    band,
                    records: Vec::new(),
                });
            }

            self.record(&instrument, ExposureState::Breached, snapshot.net_exposure, band, state.as_of);

            match book.commit(snapshot.revision, orders) {
                Ok(records) => {
                    info!(
                        instrument = %instrument,
                        exposure_before = snapshot.net_exposure,
                        exposure_after,
                        units = %traded,
                        trades = records.len(),
                        price = %state.spot,
                        "Hedge executed"
                    );
                    self.hedges += records.len() as u64;
                    if let Some(status) = self.instruments.get_mut(&instrument) {
                        status.state = ExposureState::Balanced;
                        status.net_exposure = exposure_after;
                        status.last_hedge = Some(state.as_of);
                    }
                    return Ok(InstrumentOutcome {
                        instrument,
                        action_taken: true,
                        exposure_before: snapshot.net_exposure,
                        exposure_after,
                        band,
                        records,
                    });
                }
                Err(e @ BookError::StaleRevision { .. }) if attempt < MAX_ATTEMPTS => {
                    warn!(instrument = %instrument, attempt, error = %e, "Book changed during hedge, re-planning");
                }
                Err(e) => break e,
            }
        };

        self.failures += 1;
        error!(instrument = %instrument, attempts = attempt, error = %source, "Hedge failed, exposure left breached");
        Err(HedgeError::Failed {
            instrument,
            attempts: attempt,
            source,
        })
    }

    fn record(
        &mut self,
        instrument: &str,
        state: ExposureState,
        net_exposure: f64,
        band: f64,
        at: DateTime<Utc>,
    ) {
        let status = self.instruments.entry(instrument.to_string()).or_default();
        status.state = state;
        status.net_exposure = net_exposure;
        status.band = band;
        status.last_tick = Some(at);
    }
}

/// Orders that bring `snapshot` back inside its band, empty if it already is.
///
/// The required trade is rounded to the nearest `lot_size` and split into
/// chunks of at most `max_trade_units`, rounded down to whole lots.
pub fn plan_hedge(snapshot: &ExposureSnapshot, config: &HedgeConfig, lot_size: Decimal) -> Vec<HedgeOrder> {
    let band = config.effective_band(snapshot.gross_units);
    if snapshot.net_exposure.abs() <= band || lot_size <= Decimal::ZERO {
        return Vec::new();
    }

    let Some(required) = Decimal::from_f64(-snapshot.net_exposure) else {
        return Vec::new();
    };
    let total = round_to_lot(required, lot_size, RoundingStrategy::MidpointAwayFromZero);
    if total.is_zero() {
        return Vec::new();
    }

    let max_chunk = round_to_lot(config.max_trade_units, lot_size, RoundingStrategy::ToZero).max(lot_size);
    let sign = if total.is_sign_negative() { -Decimal::ONE } else { Decimal::ONE };

    let mut orders = Vec::new();
    let mut remaining = total.abs();
    while remaining > Decimal::ZERO {
        let chunk = remaining.min(max_chunk);
        orders.push(HedgeOrder {
            instrument: snapshot.instrument.clone(),
            units: chunk * sign,
            price: snapshot.spot,
            exposure_before: snapshot.net_exposure,
            contributors: snapshot.contributors.clone(),
            timestamp: snapshot.as_of,
        });
        remaining -= chunk;
    }
    orders
}

fn round_to_lot(units: Decimal, lot_size: Decimal, strategy: RoundingStrategy) -> Decimal {
    (units / lot_size).round_dp_with_strategy(0, strategy) * lot_size
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::PositionBook;
    use crate::error::PricingError;
    use crate::pricing::BlackScholes;
    use crate::types::{OptionContract, PositionId};
    use hedger_core::OptionKind;
    use parking_lot::RwLock;
    use rust_decimal_macros::dec;

    fn snapshot(net: f64, gross: f64) -> ExposureSnapshot {
        ExposureSnapshot {
            instrument: "EURUSD".to_string(),
            revision: 1,
            option_delta: net,
            hedge_units: Decimal::ZERO,
            net_exposure: net,
            gross_units: gross,
            contributors: vec![PositionId(1)],
            spot: dec!(1.2),
            as_of: Utc::now(),
        }
    }

    fn config(max_trade_units: Decimal) -> HedgeConfig {
        HedgeConfig {
            max_trade_units,
            ..HedgeConfig::default()
        }
    }

    #[test]
    fn inside_band_plans_nothing() {
        // Band is 5% of 10 units = 0.5
        assert!(plan_hedge(&snapshot(0.4, 10.0), &config(dec!(100)), dec!(0.01)).is_empty());
        assert!(plan_hedge(&snapshot(-0.5, 10.0), &config(dec!(100)), dec!(0.01)).is_empty());
    }

    #[test]
    fn plans_opposite_trade_rounded_to_lot() {
        let orders = plan_hedge(&snapshot(0.5234, 1.0), &config(dec!(100)), dec!(0.01));
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].units, dec!(-0.52));
        assert_eq!(orders[0].price, dec!(1.2));
        assert_eq!(orders[0].contributors, vec![PositionId(1)]);
    }

    #[test]
    fn splits_at_max_trade_units() {
        let orders = plan_hedge(&snapshot(-250.0, 1000.0), &config(dec!(100)), dec!(1));
        let units: Vec<_> = orders.iter().map(|o| o.units).collect();
        assert_eq!(units, vec![dec!(100), dec!(100), dec!(50)]);
    }

    #[test]
    fn chunk_size_is_whole_lots() {
        let orders = plan_hedge(&snapshot(-10.0, 10.0), &config(dec!(2.5)), dec!(1));
        assert!(orders.iter().all(|o| o.units <= dec!(2)));
        let total: Decimal = orders.iter().map(|o| o.units).sum();
        assert_eq!(total, dec!(10));
    }

    #[test]
    fn residual_is_within_half_lot() {
        let lot = dec!(0.01);
        for net in [0.0149, 0.333, -7.777, 123.4567] {
            let orders = plan_hedge(&snapshot(net, 0.0), &config(dec!(100)), lot);
            let traded: f64 = orders.iter().map(|o| o.units.to_f64().unwrap()).sum();
            assert!((net + traded).abs() <= 0.005 + 1e-9, "net {net} traded {traded}");
        }
    }

    fn book_with_call(quantity: i64) -> (RwLock<PositionBook>, MarketState) {
        let now = Utc::now();
        let mut book = PositionBook::new();
        book.open(
            OptionContract::new("EURUSD", OptionKind::Call, dec!(1.2), 0.25)
                .with_multiplier(dec!(100))
                .listed(now),
            quantity,
        )
        .unwrap();
        let state = MarketState::new("EURUSD", dec!(1.2), 0.10, 0.01).at(now);
        (RwLock::new(book), state)
    }

    #[test]
    fn tick_hedges_and_balances() {
        let (book, state) = book_with_call(1);
        let mut engine = HedgeEngine::new(HedgeConfig::default());

        let outcome = engine.run_tick(&book, &BlackScholes, &state, dec!(0.01)).unwrap();
        assert!(outcome.action_taken);
        assert!(outcome.exposure_before > 50.0);
        assert!(outcome.exposure_after.abs() <= outcome.band);
        assert_eq!(engine.state("EURUSD"), ExposureState::Balanced);

        let net = book.read().net_exposure(&BlackScholes, &state).unwrap();
        assert!(net.abs() <= outcome.band);
        assert_eq!(engine.status().hedges, 1);
    }

    #[test]
    fn second_tick_at_same_state_is_idle() {
        let (book, state) = book_with_call(-3);
        let mut engine = HedgeEngine::new(HedgeConfig::default());
        engine.run_tick(&book, &BlackScholes, &state, dec!(0.01)).unwrap();

        let outcome = engine.run_tick(&book, &BlackScholes, &state, dec!(0.01)).unwrap();
        assert!(!outcome.action_taken);
        assert!(outcome.records.is_empty());
        assert_eq!(engine.status().ticks, 2);
    }

    #[test]
    fn pricing_failure_leaves_book_untouched() {
        let (book, state) = book_with_call(1);
        let bad = MarketState { volatility: 0.0, ..state };
        let mut engine = HedgeEngine::new(HedgeConfig::default());

        let err = engine.run_tick(&book, &BlackScholes, &bad, dec!(0.01)).unwrap_err();
        assert!(matches!(err, HedgeError::Pricing(_)));
        assert!(book.read().ledger().is_empty());
    }

    #[test]
    fn coarse_lot_leaves_exposure_breached() {
        // One call with multiplier 100 needs about -52 units; a 100-unit lot
        // rounds to -100 and lands outside the 5-unit band
        let (book, state) = book_with_call(1);
        let mut engine = HedgeEngine::new(HedgeConfig::default());

        let err = engine.run_tick(&book, &BlackScholes, &state, dec!(100)).unwrap_err();
        let HedgeError::Unhedgeable { net_exposure, band, lot_size, .. } = err else {
            panic!("expected Unhedgeable, got {err:?}");
        };
        assert!(net_exposure.abs() > band);
        assert_eq!(lot_size, dec!(100));
        assert_eq!(engine.state("EURUSD"), ExposureState::Breached);
        assert_eq!(engine.status().failures, 1);
        assert!(book.read().ledger().is_empty());
    }

    #[test]
    fn lot_too_large_to_trade_is_not_balanced() {
        let (book, state) = book_with_call(1);
        let mut engine = HedgeEngine::new(HedgeConfig::default());

        let err = engine.run_tick(&book, &BlackScholes, &state, dec!(1000)).unwrap_err();
        assert!(matches!(err, HedgeError::Unhedgeable { .. }));
        assert_eq!(engine.state("EURUSD"), ExposureState::Breached);
    }

    /// Rejects every commit with a fixed error.
    struct RejectingBook {
        inner: RwLock<PositionBook>,
        error: BookError,
        commits: std::sync::atomic::AtomicU32,
    }

    impl BookHandle for RejectingBook {
        fn snapshot(&self, pricing: &dyn PricingModel, state: &MarketState) -> Result<ExposureSnapshot, PricingError> {
            self.inner.snapshot(pricing, state)
        }

        fn commit(&self, _expected_revision: u64, _orders: Vec<HedgeOrder>) -> Result<Vec<HedgeRecord>, BookError> {
            self.commits.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(self.error.clone())
        }
    }

    fn rejecting(error: BookError) -> (RejectingBook, MarketState) {
        let (inner, state) = book_with_call(1);
        let book = RejectingBook {
            inner,
            error,
            commits: std::sync::atomic::AtomicU32::new(0),
        };
        (book, state)
    }

    #[test]
    fn non_conflict_rejection_is_not_retried() {
        let (book, state) = rejecting(BookError::NotFound(PositionId(1)));
        let mut engine = HedgeEngine::new(HedgeConfig::default());

        let err = engine.run_tick(&book, &BlackScholes, &state, dec!(0.01)).unwrap_err();
        assert_eq!(
            err,
            HedgeError::Failed {
                instrument: "EURUSD".to_string(),
                attempts: 1,
                source: BookError::NotFound(PositionId(1)),
            }
        );
        assert_eq!(book.commits.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(engine.state("EURUSD"), ExposureState::Breached);
    }

    #[test]
    fn conflict_reports_both_attempts_and_last_error() {
        let stale = BookError::StaleRevision { expected: 1, actual: 2 };
        let (book, state) = rejecting(stale.clone());
        let mut engine = HedgeEngine::new(HedgeConfig::default());

        let err = engine.run_tick(&book, &BlackScholes, &state, dec!(0.01)).unwrap_err();
        let HedgeError::Failed { attempts, source, .. } = err else {
            panic!("expected Failed, got {err:?}");
        };
        assert_eq!(attempts, MAX_ATTEMPTS);
        assert_eq!(source, stale);
        assert_eq!(book.commits.load(std::sync::atomic::Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[test]
    fn update_config_rejects_invalid_settings() {
        let mut engine = HedgeEngine::new(HedgeConfig::default());
        let bad = HedgeConfig {
            lot_size: dec!(0),
            ..HedgeConfig::default()
        };
        assert!(engine.update_config(bad).is_err());
        assert_eq!(engine.config(), &HedgeConfig::default());

        let wider = HedgeConfig {
            band_fraction: 0.2,
            ..HedgeConfig::default()
        };
        engine.update_config(wider.clone()).unwrap();
        assert_eq!(engine.config(), &wider);
    }
}
