use crate::market::{InstrumentId, MarketState};
use anyhow::Result;
use async_trait::async_trait;

/// Source of market ticks for a single instrument.
///
/// Implementations are single-owner: each keeps its own cursor (RNG state,
/// socket, ...) and must not be shared between concurrent callers.
#[async_trait]
pub trait MarketDataSource: Send {
    /// Instrument this source produces ticks for.
    fn instrument(&self) -> &InstrumentId;

    /// Produces the next market state.
    ///
    /// Live sources may suspend here; callers bound the wait and fall back to
    /// the last known state when it stalls.
    async fn next_tick(&mut self) -> Result<MarketState>;
}
