//! Simulated market data: a seeded geometric random walk per instrument.
//!
//! `next = price · exp((μ − σ²/2)·dt + σ·√dt·Z)` with `Z ~ N(0, 1)`.
//! Two feeds built with the same seed and settings emit identical sequences,
//! which is what makes hedge scenarios replayable in tests.

use std::collections::VecDeque;
use std::f64::consts::PI;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hedger_core::{FeedConfig, InstrumentId, MarketDataSource, MarketState};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tracing::debug;

use crate::types::SECONDS_PER_YEAR;

/// Decimal places kept on emitted spot prices.
const PRICE_DP: u32 = 8;

/// Random-walk price generator for one instrument.
#[derive(Debug, Clone)]
pub struct SimulatedFeed {
    instrument: InstrumentId,
    config: FeedConfig,
    rate: f64,
    tick: std::time::Duration,
    seed: u64,
    rng: ChaCha8Rng,
    level: f64,
    clock: DateTime<Utc>,
    start: DateTime<Utc>,
    last: Option<MarketState>,
    history: VecDeque<MarketState>,
}

impl SimulatedFeed {
    /// Creates a feed starting at `config.initial_price`.
    ///
    /// Without a configured seed one is drawn from entropy; it is still
    /// recorded so [`SimulatedFeed::reset`] can replay the sequence.
    pub fn new(instrument: &str, config: FeedConfig, rate: f64, tick: std::time::Duration) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        let start = Utc::now();
        Self {
            instrument: instrument.to_string(),
            level: config.initial_price.to_f64().unwrap_or(1.0),
            rng: ChaCha8Rng::seed_from_u64(seed),
            config,
            rate,
            tick,
            seed,
            clock: start,
            start,
            last: None,
            history: VecDeque::new(),
        }
    }

    /// Pins the timestamp of the first tick, for reproducible timestamps.
    #[must_use]
    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self.clock = start;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Tick length as a fraction of a year.
    pub fn dt(&self) -> f64 {
        self.tick.as_secs_f64() / SECONDS_PER_YEAR
    }

    /// Last emitted state, if any.
    pub fn last(&self) -> Option<&MarketState> {
        self.last.as_ref()
    }

    /// Recently emitted states, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &MarketState> {
        self.history.iter()
    }

    /// Advances the walk by one tick and returns the new state.
    pub fn advance(&mut self) -> MarketState {
        if self.last.is_some() {
            let dt = self.dt();
            let vol = self.config.volatility;
            let z = standard_normal(&mut self.rng);
            let step = (self.config.drift - 0.5 * vol * vol) * dt + vol * dt.sqrt() * z;
            self.level *= step.exp();
            self.clock += Duration::milliseconds(self.tick.as_millis() as i64);
        }

        let previous = self.last.as_ref().map(|s| s.spot);
        let spot = Decimal::from_f64(self.level)
            .map(|d| d.round_dp(PRICE_DP))
            .or(previous)
            .unwrap_or(self.config.initial_price);

        let state = MarketState {
            instrument: self.instrument.clone(),
            spot,
            volatility: self.config.volatility,
            rate: self.rate,
            as_of: self.clock,
        };

        debug!(instrument = %self.instrument, spot = %state.spot, "Simulated tick");

        if self.config.history_len > 0 {
            if self.history.len() == self.config.history_len {
                self.history.pop_front();
            }
            self.history.push_back(state.clone());
        }
        self.last = Some(state.clone());
        state
    }

    /// Rewinds to the initial price, clock and seed.
    pub fn reset(&mut self) {
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
        self.level = self.config.initial_price.to_f64().unwrap_or(1.0);
        self.clock = self.start;
        self.last = None;
        self.history.clear();
    }
}

#[async_trait]
impl MarketDataSource for SimulatedFeed {
    fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    async fn next_tick(&mut self) -> Result<MarketState> {
        Ok(self.advance())
    }
}

/// Box-Muller draw from N(0, 1).
fn standard_normal(rng: &mut impl Rng) -> f64 {
    // 1 - U keeps the log argument in (0, 1].
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}
