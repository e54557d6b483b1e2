//! Types for option positions and the hedge ledger.

use chrono::{DateTime, Utc};
use hedger_core::{ContractSpec, InstrumentId, OptionKind};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Seconds in a 365-day year, the convention for time-to-expiry.
pub const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 60.0 * 60.0;

/// Index of a position in the book arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(pub u64);

impl std::fmt::Display for PositionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Terms of an option contract.
///
/// Immutable once created. The remaining time to expiry is derived from
/// `listed_at` at each valuation instead of being decremented in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub instrument: InstrumentId,
    pub kind: OptionKind,
    pub strike: Decimal,
    /// Years to expiry as of `listed_at`.
    pub time_to_expiry: f64,
    pub listed_at: DateTime<Utc>,
    pub premium: Decimal,
    /// Underlying units per contract.
    pub multiplier: Decimal,
}

impl OptionContract {
    /// Create a contract listed now with no premium and a multiplier of 1.
    pub fn new(instrument: &str, kind: OptionKind, strike: Decimal, time_to_expiry: f64) -> Self {
        Self {
            instrument: instrument.to_string(),
            kind,
            strike,
            time_to_expiry,
            listed_at: Utc::now(),
            premium: Decimal::ZERO,
            multiplier: Decimal::ONE,
        }
    }

    #[must_use]
    pub fn with_premium(mut self, premium: Decimal) -> Self {
        self.premium = premium;
        self
    }

    #[must_use]
    pub fn with_multiplier(mut self, multiplier: Decimal) -> Self {
        self.multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn listed(mut self, at: DateTime<Utc>) -> Self {
        self.listed_at = at;
        self
    }

    /// Contract described by an external open request, listed now.
    pub fn from_spec(spec: &ContractSpec) -> Self {
        Self::new(&spec.instrument, spec.kind, spec.strike, spec.time_to_expiry)
            .with_premium(spec.premium)
            .with_multiplier(spec.multiplier)
    }

    /// Years left until expiry at `as_of`, floored at zero.
    pub fn remaining_years(&self, as_of: DateTime<Utc>) -> f64 {
        let elapsed = (as_of - self.listed_at).num_milliseconds() as f64 / 1000.0;
        (self.time_to_expiry - elapsed.max(0.0) / SECONDS_PER_YEAR).max(0.0)
    }

    /// Human-readable description (e.g. "EURUSD 1.2000 CALL 0.250y").
    pub fn display_name(&self) -> String {
        format!(
            "{} {} {} {:.3}y",
            self.instrument, self.strike, self.kind, self.time_to_expiry
        )
    }
}

/// Lifecycle state of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    /// Open and covered by at least one hedge record.
    Hedged,
    Closed,
}

impl PositionStatus {
    /// Whether the position still carries exposure.
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Closed)
    }
}

/// Reason for closing a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Manual,
    Expired,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// An option position in the book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub contract: OptionContract,
    /// Signed contract count; negative is short.
    pub quantity: i64,
    pub status: PositionStatus,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub close_reason: Option<CloseReason>,
}

impl Position {
    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0
    }

    /// Signed underlying units controlled by the position (quantity × multiplier).
    pub fn units(&self) -> Decimal {
        Decimal::from(self.quantity) * self.contract.multiplier
    }
}

/// Trade side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Side for a signed quantity of units.
    pub fn of(units: Decimal) -> Self {
        if units.is_sign_negative() {
            Self::Sell
        } else {
            Self::Buy
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// A hedge trade decided by the engine, not yet in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeOrder {
    pub instrument: InstrumentId,
    /// Signed underlying units; positive buys.
    pub units: Decimal,
    pub price: Decimal,
    pub exposure_before: f64,
    pub contributors: Vec<PositionId>,
    pub timestamp: DateTime<Utc>,
}

/// Ledger entry for an executed hedge trade. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeRecord {
    /// Sequence number in the ledger, starting at 1.
    pub id: u64,
    pub instrument: InstrumentId,
    /// Positions that made up the hedged exposure. Lookup only.
    pub position_ids: Vec<PositionId>,
    pub units: Decimal,
    pub side: Side,
    pub price: Decimal,
    /// Net exposure of the instrument before this tick's hedges.
    pub exposure_before: f64,
    pub timestamp: DateTime<Utc>,
}

impl HedgeRecord {
    pub(crate) fn from_order(id: u64, order: HedgeOrder) -> Self {
        Self {
            id,
            side: Side::of(order.units),
            instrument: order.instrument,
            position_ids: order.contributors,
            units: order.units,
            price: order.price,
            exposure_before: order.exposure_before,
            timestamp: order.timestamp,
        }
    }

    /// Notional value of the trade (|units| × price).
    pub fn notional(&self) -> Decimal {
        self.units.abs() * self.price
    }
}
