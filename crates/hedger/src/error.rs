//! Error types for pricing, book and hedge operations.

use hedger_core::InstrumentId;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::PositionId;

/// Errors from option valuation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    /// Spot, volatility or rate unusable (non-positive or non-finite).
    #[error("Invalid market state: {0}")]
    InvalidMarketState(String),

    /// Contract terms unusable for valuation.
    #[error("Invalid contract: {0}")]
    InvalidContract(String),
}

/// Errors from position book operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BookError {
    /// Contract rejected at creation; it never enters the book.
    #[error("Invalid contract: {0}")]
    InvalidContract(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    #[error("Position {0} not found")]
    NotFound(PositionId),

    #[error("Position {0} is already closed")]
    AlreadyClosed(PositionId),

    /// The book changed between an exposure snapshot and a hedge commit.
    #[error("Book revision moved from {expected} to {actual}")]
    StaleRevision { expected: u64, actual: u64 },
}

/// Errors from a hedge tick.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HedgeError {
    /// The book stayed inconsistent after the retry; exposure is left breached.
    #[error("Hedge failed for {instrument} after {attempts} attempts: {source}")]
    Failed {
        instrument: InstrumentId,
        attempts: u32,
        #[source]
        source: BookError,
    },

    /// No whole-lot trade brings the exposure inside its band.
    #[error("Exposure {net_exposure} on {instrument} cannot be brought inside band {band} with lot size {lot_size}")]
    Unhedgeable {
        instrument: InstrumentId,
        net_exposure: f64,
        band: f64,
        lot_size: Decimal,
    },

    #[error(transparent)]
    Pricing(#[from] PricingError),
}
