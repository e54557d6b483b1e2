use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifier of an underlying instrument (e.g. "EURUSD").
pub type InstrumentId = String;

/// Option kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionKind {
    Call,
    Put,
}

impl std::fmt::Display for OptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "CALL"),
            Self::Put => write!(f, "PUT"),
        }
    }
}

impl std::str::FromStr for OptionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CALL" | "C" => Ok(Self::Call),
            "PUT" | "P" => Ok(Self::Put),
            other => anyhow::bail!("Invalid option kind: {other}"),
        }
    }
}

/// Snapshot of one instrument's market at a tick.
///
/// Overwritten every tick; the hedging core never needs history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketState {
    pub instrument: InstrumentId,
    pub spot: Decimal,
    /// Annualized volatility estimate.
    pub volatility: f64,
    /// Annualized continuously-compounded risk-free rate.
    pub rate: f64,
    pub as_of: DateTime<Utc>,
}

impl MarketState {
    #[must_use]
    pub fn new(instrument: &str, spot: Decimal, volatility: f64, rate: f64) -> Self {
        Self {
            instrument: instrument.to_string(),
            spot,
            volatility,
            rate,
            as_of: Utc::now(),
        }
    }

    #[must_use]
    pub fn at(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = as_of;
        self
    }
}

/// Request to open an option position, as received from a caller or config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractSpec {
    pub instrument: InstrumentId,
    pub kind: OptionKind,
    pub strike: Decimal,
    /// Years until expiry at the time of opening.
    pub time_to_expiry: f64,
    #[serde(default)]
    pub premium: Decimal,
    #[serde(default = "default_multiplier")]
    pub multiplier: Decimal,
    /// Signed number of contracts; negative is short.
    pub quantity: i64,
}

fn default_multiplier() -> Decimal {
    Decimal::ONE
}
