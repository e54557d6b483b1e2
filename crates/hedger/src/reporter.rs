//! Read-only projection of the book: valuations, Greeks, exposure and P&L.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hedger_core::{InstrumentId, MarketState, OptionKind};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::book::PositionBook;
use crate::engine::{EngineStatus, ExposureState};
use crate::pricing::{OptionGreeks, PricingModel};
use crate::types::{PositionId, PositionStatus};

/// One live position valued at its instrument's latest market state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionReport {
    pub id: PositionId,
    pub instrument: InstrumentId,
    pub kind: OptionKind,
    pub strike: Decimal,
    pub quantity: i64,
    pub multiplier: Decimal,
    pub status: PositionStatus,
    pub remaining_years: Option<f64>,
    /// Fair value per underlying unit. `None` without a usable market state.
    pub fair_value: Option<f64>,
    pub greeks: Option<OptionGreeks>,
    /// Signed delta exposure in underlying units.
    pub exposure: Option<f64>,
    /// (fair value − premium) × quantity × multiplier.
    pub pnl: Option<f64>,
    /// Ledger records this position contributed to.
    pub hedge_count: usize,
}

/// Per-instrument exposure and P&L.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentReport {
    pub instrument: InstrumentId,
    pub spot: Option<Decimal>,
    pub as_of: Option<DateTime<Utc>>,
    pub option_delta: f64,
    pub hedge_units: Decimal,
    pub net_exposure: f64,
    pub band: Option<f64>,
    pub state: ExposureState,
    /// Σ quantity × multiplier × gamma.
    pub gamma: f64,
    /// Σ quantity × multiplier × vega.
    pub vega: f64,
    pub option_pnl: f64,
    pub hedge_realized_pnl: Decimal,
    pub hedge_unrealized_pnl: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookReport {
    pub generated_at: DateTime<Utc>,
    pub positions: Vec<PositionReport>,
    /// Live positions with negative quantity.
    pub short_positions: Vec<PositionId>,
    pub closed_positions: usize,
    pub instruments: Vec<InstrumentReport>,
    pub hedge_trades: usize,
    pub hedge_notional: Decimal,
    /// Option P&L plus hedge P&L across instruments, in quote currency.
    pub total_pnl: f64,
    pub engine: EngineStatus,
}

/// Builds a report from the book and the latest state of each instrument.
///
/// Positions on instruments without a state, or that fail to price, are
/// listed without valuation fields.
pub fn build_report(
    book: &PositionBook,
    pricing: &dyn PricingModel,
    states: &BTreeMap<InstrumentId, MarketState>,
    engine: EngineStatus,
) -> BookReport {
    let mut positions = Vec::new();
    let mut instruments: BTreeMap<InstrumentId, InstrumentReport> = BTreeMap::new();

    for position in book.list_open() {
        let instrument = &position.contract.instrument;
        let state = states.get(instrument);
        let valuation = state.and_then(|s| match pricing.value(&position.contract, s) {
            Ok(v) => Some(v),
            Err(e) => {
                debug!(id = %position.id, error = %e, "Position not valued");
                None
            }
        });

        let units = position.units().to_f64().unwrap_or_default();
        let premium = position.contract.premium.to_f64().unwrap_or_default();
        let pnl = valuation.map(|v| (v.fair_value - premium) * units);

        let entry = instruments
            .entry(instrument.clone())
            .or_insert_with(|| empty_instrument(instrument, state));
        if let Some(v) = valuation {
            entry.option_delta += units * v.delta;
            entry.gamma += units * v.greeks.gamma;
            entry.vega += units * v.greeks.vega;
        }
        entry.option_pnl += pnl.unwrap_or_default();

        positions.push(PositionReport {
            id: position.id,
            instrument: instrument.clone(),
            kind: position.contract.kind,
            strike: position.contract.strike,
            quantity: position.quantity,
            multiplier: position.contract.multiplier,
            status: position.status,
            remaining_years: state.map(|s| position.contract.remaining_years(s.as_of)),
            fair_value: valuation.map(|v| v.fair_value),
            greeks: valuation.map(|v| v.greeks),
            exposure: valuation.map(|v| units * v.delta),
            pnl,
            hedge_count: book
                .ledger()
                .iter()
                .filter(|r| r.position_ids.contains(&position.id))
                .count(),
        });
    }

    for (instrument, holding) in book.inventory().iter() {
        let state = states.get(instrument);
        let entry = instruments
            .entry(instrument.clone())
            .or_insert_with(|| empty_instrument(instrument, state));
        entry.hedge_units = holding.units;
        entry.hedge_realized_pnl = holding.realized_pnl;
        if let Some(s) = state {
            entry.hedge_unrealized_pnl = holding.unrealized_pnl(s.spot);
        }
    }

    for report in instruments.values_mut() {
        report.net_exposure = report.option_delta + report.hedge_units.to_f64().unwrap_or_default();
        if let Some(status) = engine.instruments.get(&report.instrument) {
            report.state = status.state;
            report.band = Some(status.band);
        }
    }

    let total_pnl: f64 = instruments
        .values()
        .map(|r| r.option_pnl + (r.hedge_realized_pnl + r.hedge_unrealized_pnl).to_f64().unwrap_or_default())
        .sum();

    BookReport {
        generated_at: Utc::now(),
        short_positions: positions
            .iter()
            .filter(|p| p.quantity < 0)
            .map(|p| p.id)
            .collect(),
        closed_positions: book.positions().iter().filter(|p| !p.is_live()).count(),
        positions,
        instruments: instruments.into_values().collect(),
        hedge_trades: book.ledger().len(),
        hedge_notional: book.ledger().iter().map(|r| r.notional()).sum(),
        total_pnl,
        engine,
    }
}

fn empty_instrument(instrument: &str, state: Option<&MarketState>) -> InstrumentReport {
    InstrumentReport {
        instrument: instrument.to_string(),
        spot: state.map(|s| s.spot),
        as_of: state.map(|s| s.as_of),
        option_delta: 0.0,
        hedge_units: Decimal::ZERO,
        net_exposure: 0.0,
        band: None,
        state: ExposureState::Balanced,
        gamma: 0.0,
        vega: 0.0,
        option_pnl: 0.0,
        hedge_realized_pnl: Decimal::ZERO,
        hedge_unrealized_pnl: Decimal::ZERO,
    }
}
