//! Delta hedging of option positions with trades in the underlying.
//!
//! - Values options with Black-Scholes and aggregates delta per instrument
//! - Keeps an arena of positions plus an append-only hedge ledger
//! - Trades the underlying whenever net exposure leaves its band
//! - Simulates market data with a seeded random walk for replayable runs
//!
//! [`HedgeSession`] ties these together; [`service::run`] drives it on a timer.

pub mod book;
pub mod engine;
pub mod error;
pub mod feed;
pub mod inventory;
pub mod pricing;
pub mod reporter;
pub mod service;
pub mod session;
pub mod types;

pub use book::{BookHandle, ExposureSnapshot, PositionBook, SharedBook};
pub use engine::{EngineStatus, ExposureState, HedgeEngine, InstrumentOutcome};
pub use error::{BookError, HedgeError, PricingError};
pub use feed::SimulatedFeed;
pub use pricing::{price_and_delta, BlackScholes, OptionGreeks, PricingModel, Valuation};
pub use reporter::BookReport;
pub use session::{BookSnapshot, HedgeSession, SessionStatus, TickOutcome};
pub use types::{CloseReason, HedgeRecord, OptionContract, Position, PositionId, PositionStatus, Side};
