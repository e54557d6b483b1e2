//! Hedge session: one shared book, one engine and a market data source per
//! instrument. This is the surface callers drive.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use hedger_core::{AppConfig, ContractSpec, HedgeConfig, InstrumentId, MarketDataSource, MarketState};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::book::{ExposureSnapshot, PositionBook, SharedBook};
use crate::engine::{EngineStatus, HedgeEngine, InstrumentOutcome};
use crate::error::{BookError, HedgeError, PricingError};
use crate::feed::SimulatedFeed;
use crate::pricing::{BlackScholes, PricingModel};
use crate::reporter::{build_report, BookReport};
use crate::types::{HedgeRecord, OptionContract, Position, PositionId};

/// Point-in-time view of the book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub positions: Vec<Position>,
    /// Sum of per-instrument net exposures.
    pub net_exposure: f64,
    /// Instruments with a known market state.
    pub exposures: Vec<ExposureSnapshot>,
    pub hedge_ledger: Vec<HedgeRecord>,
}

/// Result of one session tick across all instruments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickOutcome {
    pub action_taken: bool,
    pub records: Vec<HedgeRecord>,
    pub instruments: Vec<InstrumentOutcome>,
    /// Positions closed as expired at the start of the tick.
    pub expired: Vec<PositionId>,
    /// Instruments whose source timed out or failed; their last state was reused.
    pub stale: Vec<InstrumentId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub active: bool,
    pub ticks: u64,
    pub last_tick: Option<DateTime<Utc>>,
    pub open_positions: usize,
    pub hedge_records: usize,
    pub instruments: Vec<InstrumentId>,
    pub engine: EngineStatus,
}

struct FeedSlot {
    source: Box<dyn MarketDataSource>,
    /// Overrides the engine's default lot size.
    lot_size: Option<Decimal>,
    last: Option<MarketState>,
}

pub struct HedgeSession {
    book: SharedBook,
    engine: HedgeEngine,
    pricing: Box<dyn PricingModel>,
    feeds: BTreeMap<InstrumentId, FeedSlot>,
    active: bool,
    ticks: u64,
    last_tick: Option<DateTime<Utc>>,
}

impl HedgeSession {
    /// Creates an empty session with Black-Scholes pricing.
    ///
    /// # Errors
    ///
    /// Rejects an inconsistent hedge config.
    pub fn new(config: HedgeConfig) -> Result<Self> {
        config.validate().context("Invalid hedge config")?;
        Ok(Self {
            book: PositionBook::shared(),
            engine: HedgeEngine::new(config),
            pricing: Box::new(BlackScholes),
            feeds: BTreeMap::new(),
            active: false,
            ticks: 0,
            last_tick: None,
        })
    }

    /// Builds a session with a simulated feed per configured instrument and
    /// opens the configured seed positions.
    ///
    /// Instruments referenced only by seed positions get the default feed.
    ///
    /// # Errors
    ///
    /// Fails on invalid config or a seed position the book rejects.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let mut session = Self::new(config.hedge.clone())?;
        let tick = Duration::from_secs(config.hedge.tick_interval_secs);

        for inst in &config.instruments {
            let feed = SimulatedFeed::new(&inst.id, inst.feed(&config.feed), config.hedge.risk_free_rate, tick);
            info!(instrument = %inst.id, seed = feed.seed(), "Simulated feed registered");
            session.add_source(Box::new(feed), inst.lot_size)?;
        }
        for spec in &config.positions {
            if !session.feeds.contains_key(&spec.instrument) {
                let feed = SimulatedFeed::new(&spec.instrument, config.feed.clone(), config.hedge.risk_free_rate, tick);
                info!(instrument = %spec.instrument, seed = feed.seed(), "Simulated feed registered");
                session.add_source(Box::new(feed), None)?;
            }
            session
                .open_position(spec)
                .with_context(|| format!("Failed to open seed position on {}", spec.instrument))?;
        }
        Ok(session)
    }

    /// Replaces the pricing model.
    #[must_use]
    pub fn with_pricing(mut self, pricing: Box<dyn PricingModel>) -> Self {
        self.pricing = pricing;
        self
    }

    /// Registers a market data source. A later source for the same
    /// instrument replaces the earlier one.
    ///
    /// # Errors
    ///
    /// Rejects a lot size override that the current hedge config cannot
    /// trade inside its band.
    pub fn add_source(&mut self, source: Box<dyn MarketDataSource>, lot_size: Option<Decimal>) -> Result<()> {
        let instrument = source.instrument().clone();
        if let Some(lot) = lot_size {
            self.engine
                .config()
                .check_lot_size(lot)
                .with_context(|| format!("Invalid lot size for {instrument}"))?;
        }
        self.feeds.insert(
            instrument,
            FeedSlot {
                source,
                lot_size,
                last: None,
            },
        );
        Ok(())
    }

    /// Handle to the shared book.
    pub fn book(&self) -> SharedBook {
        self.book.clone()
    }

    pub fn engine(&self) -> &HedgeEngine {
        &self.engine
    }

    /// Latest market state seen for `instrument`.
    pub fn market_state(&self, instrument: &str) -> Option<&MarketState> {
        self.feeds.get(instrument).and_then(|slot| slot.last.as_ref())
    }

    /// Opens a position on an instrument with a registered source.
    ///
    /// The contract is listed at the instrument's latest market time, so
    /// simulated clocks and expiry stay consistent.
    ///
    /// # Errors
    ///
    /// `InvalidContract` for unknown instruments or bad terms,
    /// `InvalidQuantity` for a zero quantity.
    pub fn open_position(&self, spec: &ContractSpec) -> Result<PositionId, BookError> {
        let slot = self.feeds.get(&spec.instrument).ok_or_else(|| {
            BookError::InvalidContract(format!("no market data source for {}", spec.instrument))
        })?;
        let listed_at = slot.last.as_ref().map_or_else(Utc::now, |s| s.as_of);
        let contract = OptionContract::from_spec(spec).listed(listed_at);
        self.book.write().open(contract, spec.quantity)
    }

    /// # Errors
    ///
    /// `NotFound` or `AlreadyClosed`; the book is unchanged either way.
    pub fn close_position(&self, id: PositionId) -> Result<(), BookError> {
        self.book.write().close(id)
    }

    /// # Errors
    ///
    /// Propagates a pricing failure for any live position.
    pub fn get_book_snapshot(&self) -> Result<BookSnapshot, PricingError> {
        let book = self.book.read();
        let mut exposures = Vec::new();
        for slot in self.feeds.values() {
            if let Some(state) = &slot.last {
                exposures.push(book.exposure_snapshot(self.pricing.as_ref(), state)?);
            }
        }
        Ok(BookSnapshot {
            positions: book.positions().to_vec(),
            net_exposure: exposures.iter().map(|e| e.net_exposure).sum(),
            exposures,
            hedge_ledger: book.ledger().to_vec(),
        })
    }

    /// Polls every source, expires matured positions, then hedges each
    /// instrument against its latest state.
    ///
    /// A source that times out or fails keeps its previous state. An
    /// instrument that has never produced a state is skipped. Expiry uses each
    /// instrument's own market time.
    ///
    /// # Errors
    ///
    /// Returns the first instrument failure. The remaining instruments are
    /// still hedged and their records stay in the ledger; read them back with
    /// [`HedgeSession::get_book_snapshot`].
    pub async fn run_hedge_tick(&mut self) -> Result<TickOutcome, HedgeError> {
        let timeout = Duration::from_millis(self.engine.config().feed_timeout_ms);
        let mut outcome = TickOutcome::default();

        for (instrument, slot) in &mut self.feeds {
            match tokio::time::timeout(timeout, slot.source.next_tick()).await {
                Ok(Ok(state)) => slot.last = Some(state),
                Ok(Err(e)) => {
                    warn!(instrument = %instrument, error = %e, "Market data source failed, reusing last state");
                    outcome.stale.push(instrument.clone());
                }
                Err(_) => {
                    warn!(instrument = %instrument, timeout_ms = timeout.as_millis() as u64, "Market data timed out, reusing last state");
                    outcome.stale.push(instrument.clone());
                }
            }
        }

        {
            let mut book = self.book.write();
            for (instrument, slot) in &self.feeds {
                if let Some(state) = &slot.last {
                    outcome.expired.extend(book.expire_matured(instrument, state.as_of));
                }
            }
        }

        let mut first_error = None;
        for (instrument, slot) in &self.feeds {
            let Some(state) = &slot.last else {
                warn!(instrument = %instrument, "No market state yet, skipping");
                continue;
            };
            let lot_size = slot.lot_size.unwrap_or(self.engine.config().lot_size);
            match self.engine.run_tick(&*self.book, self.pricing.as_ref(), state, lot_size) {
                Ok(result) => {
                    outcome.action_taken |= result.action_taken;
                    outcome.records.extend(result.records.iter().cloned());
                    outcome.instruments.push(result);
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        self.ticks += 1;
        self.last_tick = Some(Utc::now());

        match first_error {
            Some(e) => {
                if !outcome.records.is_empty() {
                    warn!(
                        error = %e,
                        committed = outcome.records.len(),
                        "Hedge tick partially failed, other instruments committed"
                    );
                }
                Err(e)
            }
            None => Ok(outcome),
        }
    }

    pub fn report(&self) -> BookReport {
        let states: BTreeMap<InstrumentId, MarketState> = self
            .feeds
            .iter()
            .filter_map(|(id, slot)| slot.last.clone().map(|s| (id.clone(), s)))
            .collect();
        build_report(&self.book.read(), self.pricing.as_ref(), &states, self.engine.status())
    }

    /// Applies new hedge settings from the next tick on.
    ///
    /// # Errors
    ///
    /// Rejects an inconsistent config, or one under which a registered lot
    /// size override can no longer be traded, and keeps the current one.
    pub fn update_hedge_config(&mut self, config: HedgeConfig) -> Result<()> {
        for (instrument, slot) in &self.feeds {
            if let Some(lot) = slot.lot_size {
                config
                    .check_lot_size(lot)
                    .with_context(|| format!("Invalid lot size for {instrument}"))?;
            }
        }
        self.engine.update_config(config)
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn status(&self) -> SessionStatus {
        let book = self.book.read();
        SessionStatus {
            active: self.active,
            ticks: self.ticks,
            last_tick: self.last_tick,
            open_positions: book.list_open().len(),
            hedge_records: book.ledger().len(),
            instruments: self.feeds.keys().cloned().collect(),
            engine: self.engine.status(),
        }
    }
}
