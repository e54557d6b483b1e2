use anyhow::{Context, Result};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::market::ContractSpec;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub hedge: HedgeConfig,
    pub feed: FeedConfig,
    pub instruments: Vec<InstrumentConfig>,
    pub broker: BrokerConfig,
    /// Positions opened when a session starts.
    pub positions: Vec<ContractSpec>,
}

/// Hedge policy settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HedgeConfig {
    /// Band as a fraction of gross option units (Σ |qty × multiplier|).
    pub band_fraction: f64,
    /// Lower bound on the band, in underlying units.
    pub min_band: f64,
    /// Default minimum tradable increment of the underlying.
    pub lot_size: Decimal,
    /// Largest single hedge trade, in underlying units.
    pub max_trade_units: Decimal,
    pub tick_interval_secs: u64,
    /// How long a tick waits on a market data source before reusing the last state.
    pub feed_timeout_ms: u64,
    pub risk_free_rate: f64,
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self {
            band_fraction: 0.05,
            min_band: 0.01,
            lot_size: Decimal::new(1, 2),
            max_trade_units: Decimal::from(100),
            tick_interval_secs: 60,
            feed_timeout_ms: 500,
            risk_free_rate: 0.05,
        }
    }
}

impl HedgeConfig {
    /// Checks the settings are internally consistent.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.lot_size <= Decimal::ZERO {
            anyhow::bail!("lot_size must be positive");
        }
        if self.max_trade_units < self.lot_size {
            anyhow::bail!("max_trade_units must be at least lot_size");
        }
        if !self.band_fraction.is_finite() || self.band_fraction < 0.0 {
            anyhow::bail!("band_fraction must be a non-negative number");
        }
        if !self.min_band.is_finite() || self.min_band <= 0.0 {
            anyhow::bail!("min_band must be positive");
        }
        let half_lot = decimal_to_f64(self.lot_size) / 2.0;
        if self.min_band < half_lot {
            anyhow::bail!("min_band must be at least half of lot_size ({half_lot})");
        }
        if self.tick_interval_secs == 0 {
            anyhow::bail!("tick_interval_secs must be positive");
        }
        if !self.risk_free_rate.is_finite() {
            anyhow::bail!("risk_free_rate must be finite");
        }
        Ok(())
    }

    /// Checks that `lot` can be traded under these settings: a whole number
    /// of lots must fit in `max_trade_units` and the rounding residual must
    /// fit in `min_band`.
    ///
    /// # Errors
    ///
    /// Returns an error naming the violated bound.
    pub fn check_lot_size(&self, lot: Decimal) -> Result<()> {
        if lot <= Decimal::ZERO || lot > self.max_trade_units {
            anyhow::bail!("lot_size {lot} must be in (0, max_trade_units = {}]", self.max_trade_units);
        }
        if self.min_band < decimal_to_f64(lot) / 2.0 {
            anyhow::bail!("lot_size {lot} must be at most twice min_band ({})", self.min_band);
        }
        Ok(())
    }

    /// Band applied to an instrument holding `gross_units` of option exposure.
    #[must_use]
    pub fn effective_band(&self, gross_units: f64) -> f64 {
        (self.band_fraction * gross_units).max(self.min_band)
    }
}

/// Defaults for simulated market data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub initial_price: Decimal,
    pub volatility: f64,
    pub drift: f64,
    /// Fixed seed for reproducible runs; entropy when absent.
    pub seed: Option<u64>,
    /// Number of emitted states each feed keeps for replay.
    pub history_len: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            initial_price: Decimal::new(12000, 4),
            volatility: 0.10,
            drift: 0.0,
            seed: None,
            history_len: 256,
        }
    }
}

/// Per-instrument overrides of [`FeedConfig`] and [`HedgeConfig::lot_size`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub id: String,
    pub initial_price: Option<Decimal>,
    pub volatility: Option<f64>,
    pub drift: Option<f64>,
    pub seed: Option<u64>,
    pub lot_size: Option<Decimal>,
}

impl InstrumentConfig {
    /// Feed settings for this instrument with the defaults filled in.
    #[must_use]
    pub fn feed(&self, defaults: &FeedConfig) -> FeedConfig {
        FeedConfig {
            initial_price: self.initial_price.unwrap_or(defaults.initial_price),
            volatility: self.volatility.unwrap_or(defaults.volatility),
            drift: self.drift.unwrap_or(defaults.drift),
            seed: self.seed.or(defaults.seed),
            history_len: defaults.history_len,
        }
    }
}

/// Broker credentials. Only read by an external broker integration; the
/// simulated mode never touches them.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub api_key: Option<SecretString>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub account_type: Option<String>,
}

impl AppConfig {
    /// Validates the hedge policy and instrument overrides.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.hedge.validate()?;
        for inst in &self.instruments {
            if inst.id.trim().is_empty() {
                anyhow::bail!("instrument id must not be empty");
            }
            let feed = inst.feed(&self.feed);
            if feed.initial_price <= Decimal::ZERO {
                anyhow::bail!("{}: initial_price must be positive", inst.id);
            }
            if !feed.volatility.is_finite() || feed.volatility <= 0.0 {
                anyhow::bail!("{}: volatility must be positive", inst.id);
            }
            if let Some(lot) = inst.lot_size {
                self.hedge
                    .check_lot_size(lot)
                    .with_context(|| format!("instrument {}", inst.id))?;
            }
        }
        Ok(())
    }

    /// Lot size for `instrument`, falling back to the hedge default.
    #[must_use]
    pub fn lot_size(&self, instrument: &str) -> Decimal {
        self.instruments
            .iter()
            .find(|i| i.id == instrument)
            .and_then(|i| i.lot_size)
            .unwrap_or(self.hedge.lot_size)
    }
}

fn decimal_to_f64(value: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or(f64::MAX)
}
